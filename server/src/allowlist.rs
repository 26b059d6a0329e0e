use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^@]+)@([^@]+)\s*$").unwrap());

/// Lowercase, trim, and strip any `+tag` suffix from the local part.
///
/// Strings that do not look like an address are still lowercased and trimmed
/// so matching stays case-insensitive.
pub fn normalize_email(addr: &str) -> String {
    let addr = addr.trim().to_lowercase();
    match RE_EMAIL.captures(&addr) {
        Some(caps) => {
            let local = caps.get(1).map_or("", |m| m.as_str());
            let domain = caps.get(2).map_or("", |m| m.as_str());
            let local = local.split('+').next().unwrap_or(local);
            format!("{local}@{domain}")
        }
        None => addr,
    }
}

/// The portion after the last `@`, lowercased. Empty when there is none.
pub fn domain_of(addr: &str) -> String {
    let addr = addr.trim().to_lowercase();
    match addr.rsplit_once('@') {
        Some((_, domain)) => domain.trim().to_string(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub domain: String,
    pub wildcard: bool,
}

/// A point-in-time view of the allowlist, tagged with the version that
/// produced it so clients can validate caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistSnapshot {
    pub emails: Vec<String>,
    pub domains: Vec<DomainRule>,
    pub version: i64,
}

impl AllowlistSnapshot {
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version)
    }
}

/// Matcher built once from a snapshot; answers membership without touching
/// the store again.
pub struct AllowlistChecker {
    emails: HashSet<String>,
    exact_domains: HashSet<String>,
    wildcard_domains: Vec<String>,
}

impl AllowlistChecker {
    pub fn new(snapshot: &AllowlistSnapshot) -> Self {
        let emails = snapshot
            .emails
            .iter()
            .map(|e| normalize_email(e))
            .collect::<HashSet<_>>();

        let mut exact_domains = HashSet::new();
        let mut wildcard_domains = Vec::new();
        for rule in &snapshot.domains {
            let dom = rule.domain.trim().to_lowercase();
            if dom.is_empty() {
                continue;
            }
            if rule.wildcard {
                wildcard_domains.push(dom);
            } else {
                exact_domains.insert(dom);
            }
        }

        AllowlistChecker {
            emails,
            exact_domains,
            wildcard_domains,
        }
    }

    pub fn is_allowed(&self, sender: &str) -> bool {
        let email = normalize_email(sender);
        if email.is_empty() {
            return false;
        }
        if self.emails.contains(&email) {
            return true;
        }
        let dom = domain_of(&email);
        if dom.is_empty() {
            return false;
        }
        if self.exact_domains.contains(&dom) {
            return true;
        }
        self.wildcard_domains
            .iter()
            .any(|wd| dom == *wd || dom.ends_with(&format!(".{wd}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(emails: &[&str], domains: &[(&str, bool)]) -> AllowlistSnapshot {
        AllowlistSnapshot {
            emails: emails.iter().map(|e| e.to_string()).collect(),
            domains: domains
                .iter()
                .map(|(d, w)| DomainRule {
                    domain: d.to_string(),
                    wildcard: *w,
                })
                .collect(),
            version: 1,
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert_eq!(normalize_email("jane+invoices@example.com"), "jane@example.com");
        assert_eq!(normalize_email("not-an-address"), "not-an-address");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for addr in ["Jane+x@Example.com", "ops@eu.acme.com", "weird"] {
            let once = normalize_email(addr);
            assert_eq!(normalize_email(&once), once);
        }
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("jane@example.com"), "example.com");
        assert_eq!(domain_of("a@b@eu.acme.com"), "eu.acme.com");
        assert_eq!(domain_of("no-at-sign"), "");
    }

    #[test]
    fn test_exact_email_match() {
        let checker = AllowlistChecker::new(&snapshot(&["Jane@Example.com"], &[]));
        assert!(checker.is_allowed("jane@example.com"));
        assert!(checker.is_allowed("jane+tag@example.com"));
        assert!(!checker.is_allowed("john@example.com"));
    }

    #[test]
    fn test_exact_domain_match() {
        let checker = AllowlistChecker::new(&snapshot(&[], &[("acme.com", false)]));
        assert!(checker.is_allowed("anyone@acme.com"));
        // exact rules do not cover subdomains
        assert!(!checker.is_allowed("ops@eu.acme.com"));
    }

    #[test]
    fn test_wildcard_domain_match() {
        let checker = AllowlistChecker::new(&snapshot(&[], &[("acme.com", true)]));
        assert!(checker.is_allowed("ops@acme.com"));
        assert!(checker.is_allowed("ops@eu.acme.com"));
        // a shared suffix is not a subdomain
        assert!(!checker.is_allowed("ops@notacme.com"));
        assert!(!checker.is_allowed("ops@acme.co"));
    }

    #[test]
    fn test_empty_sender_denied() {
        let checker = AllowlistChecker::new(&snapshot(&[], &[("acme.com", true)]));
        assert!(!checker.is_allowed(""));
        assert!(!checker.is_allowed("   "));
    }
}
