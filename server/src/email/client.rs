extern crate google_gmail1 as gmail1;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use anyhow::Context;
use google_gmail1::api::{Label, ListLabelsResponse, ListMessagesResponse, Message};
use leaky_bucket::RateLimiter;
use mail_parser::{Address, MessageParser};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND},
    http_retry::send_with_retry,
};

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
            let list_params = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", GMAIL_ENDPOINT, path)
        }
    };
}

const PAGE_SIZE: &str = "100";

pub struct EmailClient {
    http_client: reqwest::Client,
    access_token: String,
    rate_limiter: RateLimiter,
}

/// One fetched message with the headers and body the triage pipeline needs.
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    pub internal_date: i64,
    pub rfc_message_id: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub sender_header: Option<String>,
    pub subject: Option<String>,
    pub snippet: String,
    pub body: Option<String>,
}

impl EmailMessage {
    /// First non-empty address in From -> Reply-To -> Sender order.
    pub fn sender_address(&self) -> Option<String> {
        [&self.from, &self.reply_to, &self.sender_header]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .find(|s| !s.is_empty())
    }

    /// Stable identifier for dedupe: the RFC Message-ID when present,
    /// otherwise the provider id.
    pub fn stable_message_id(&self) -> String {
        match &self.rfc_message_id {
            Some(rfc) => format!("rfc:{}", rfc.trim_matches(['<', '>'])),
            None => format!("gmail:{}", self.id),
        }
    }

    pub fn deep_link(&self) -> String {
        format!("https://mail.google.com/mail/u/0/#inbox/{}", self.id)
    }
}

impl EmailClient {
    pub fn new(http_client: reqwest::Client, access_token: String) -> EmailClient {
        let rate_limiter = RateLimiter::builder()
            .initial(GMAIL_QUOTA_PER_SECOND)
            .interval(Duration::from_secs(1))
            .refill(GMAIL_QUOTA_PER_SECOND)
            .build();

        EmailClient {
            http_client,
            access_token,
            rate_limiter,
        }
    }

    pub async fn get_labels(&self) -> anyhow::Result<Vec<Label>> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.labels_list).await;
        let resp = send_with_retry(
            self.http_client
                .get(gmail_url!("labels"))
                .bearer_auth(&self.access_token),
        )
        .await?;
        let data = resp.json::<ListLabelsResponse>().await?;

        Ok(data.labels.unwrap_or_default())
    }

    /// Lowercased label name -> label id.
    pub async fn label_map(&self) -> anyhow::Result<HashMap<String, String>> {
        let labels = self.get_labels().await?;
        Ok(labels
            .into_iter()
            .filter_map(|l| match (l.name, l.id) {
                (Some(name), Some(id)) => Some((name.to_lowercase(), id)),
                _ => None,
            })
            .collect())
    }

    /// All message ids under one label, transparently following pagination.
    pub async fn list_message_ids(
        &self,
        label_id: &str,
        query: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            self.rate_limiter
                .acquire(GMAIL_API_QUOTA.messages_list)
                .await;

            let mut params = vec![
                ("labelIds".to_string(), label_id.to_string()),
                ("maxResults".to_string(), PAGE_SIZE.to_string()),
            ];
            if let Some(q) = query {
                params.push(("q".to_string(), q.to_string()));
            }
            if let Some(token) = &page_token {
                params.push(("pageToken".to_string(), token.clone()));
            }

            let resp = send_with_retry(
                self.http_client
                    .get(gmail_url!("messages"))
                    .query(&params)
                    .bearer_auth(&self.access_token),
            )
            .await?;
            let data = resp.json::<ListMessagesResponse>().await?;

            for m in data.messages.unwrap_or_default() {
                if let Some(id) = m.id {
                    ids.push(id);
                }
            }

            page_token = data.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(ids)
    }

    /// Union of message ids across several labels. A message filed under two
    /// triage labels is delivered once, under the first label that listed it.
    pub async fn list_messages_across_labels(
        &self,
        labels: &[(String, String)],
        query: Option<&str>,
    ) -> anyhow::Result<Vec<(String, String)>> {
        let mut per_label = Vec::new();
        for (name, id) in labels {
            let ids = self
                .list_message_ids(id, query)
                .await
                .context(format!("listing messages under label {name}"))?;
            per_label.push((name.clone(), ids));
        }
        Ok(dedupe_label_messages(per_label))
    }

    pub async fn get_message(&self, message_id: &str) -> anyhow::Result<EmailMessage> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        let resp = send_with_retry(
            self.http_client
                .get(gmail_url!("messages", message_id))
                .query(&[("format", "RAW")])
                .bearer_auth(&self.access_token),
        )
        .await?;
        let msg = resp.json::<Message>().await?;

        let id = msg.id.unwrap_or_default();
        let thread_id = msg.thread_id.unwrap_or_default();
        let label_ids = msg.label_ids.unwrap_or_default();
        let internal_date = msg.internal_date.unwrap_or_default();
        let snippet = sanitize_inline(&msg.snippet.unwrap_or_default());

        let raw = msg.raw.context("No raw message payload returned")?;
        let parsed = MessageParser::default()
            .parse(&raw)
            .context("Unparseable RFC-2822 payload")?;

        let subject = parsed.subject().map(sanitize_inline);
        let rfc_message_id = parsed.message_id().map(|s| s.to_string());
        let from = first_address(parsed.from());
        let reply_to = first_address(parsed.reply_to());
        let sender_header = first_address(parsed.sender());

        // prefer the plain-text part, fall back to stripped HTML
        let body = match parsed.body_text(0) {
            Some(text) => Some(text.to_string()),
            None => parsed
                .body_html(0)
                .map(|html| html2text::from_read(html.as_bytes(), 80)),
        }
        .map(|b| sanitize_body(&b));

        Ok(EmailMessage {
            id,
            thread_id,
            label_ids,
            internal_date,
            rfc_message_id,
            from,
            reply_to,
            sender_header,
            subject,
            snippet,
            body,
        })
    }
}

fn first_address(value: Option<&Address<'_>>) -> Option<String> {
    value
        .and_then(|a| a.first())
        .and_then(|a| a.address.as_ref())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn sanitize_inline(input: &str) -> String {
    static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\t\n]+").unwrap());
    static RE_NON_UNICODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x80]").unwrap());

    let s = RE_WHITESPACE.replace_all(input, " ");
    let s = RE_NON_UNICODE.replace_all(&s, "");
    s.trim().to_string()
}

fn sanitize_body(input: &str) -> String {
    static RE_HTTP_LINK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"https?://(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&//=]*)").unwrap()
    });

    let s = sanitize_inline(input);
    RE_HTTP_LINK.replace_all(&s, "[LINK]").to_string()
}

/// Flatten per-label listings into (label, id) pairs, keeping only the first
/// label a message id appears under.
pub fn dedupe_label_messages(per_label: Vec<(String, Vec<String>)>) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (label, ids) in per_label {
        for id in ids {
            if seen.insert(id.clone()) {
                out.push((label.clone(), id));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmail_url() {
        let url = gmail_url!("messages");
        assert_eq!(url, "https://www.googleapis.com/gmail/v1/users/me/messages");
        let url = gmail_url!("messages", "123");
        assert_eq!(
            url,
            "https://www.googleapis.com/gmail/v1/users/me/messages/123"
        );
    }

    #[test]
    fn test_sender_address_prefers_from() {
        let msg = EmailMessage {
            from: Some("Jane@Example.com".to_string()),
            reply_to: Some("other@example.com".to_string()),
            ..EmailMessage::default()
        };
        assert_eq!(msg.sender_address().as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_sender_address_falls_through_empty_headers() {
        let msg = EmailMessage {
            from: Some("   ".to_string()),
            reply_to: None,
            sender_header: Some("list@example.com".to_string()),
            ..EmailMessage::default()
        };
        assert_eq!(msg.sender_address().as_deref(), Some("list@example.com"));
    }

    #[test]
    fn test_stable_message_id() {
        let msg = EmailMessage {
            id: "18f0a".to_string(),
            rfc_message_id: Some("<abc@mail.example.com>".to_string()),
            ..EmailMessage::default()
        };
        assert_eq!(msg.stable_message_id(), "rfc:abc@mail.example.com");

        let msg = EmailMessage {
            id: "18f0a".to_string(),
            ..EmailMessage::default()
        };
        assert_eq!(msg.stable_message_id(), "gmail:18f0a");
    }

    #[test]
    fn test_sanitize_body_replaces_links() {
        let body = "see\r\nhttps://example.com/x?y=1 for details";
        assert_eq!(sanitize_body(body), "see [LINK] for details");
    }

    #[test]
    fn test_dedupe_label_messages() {
        let deduped = dedupe_label_messages(vec![
            (
                "to respond".to_string(),
                vec!["a".to_string(), "b".to_string()],
            ),
            ("FYI".to_string(), vec!["b".to_string(), "c".to_string()]),
        ]);
        assert_eq!(
            deduped,
            vec![
                ("to respond".to_string(), "a".to_string()),
                ("to respond".to_string(), "b".to_string()),
                ("FYI".to_string(), "c".to_string()),
            ]
        );
    }
}
