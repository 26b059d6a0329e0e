use anyhow::Context;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};

use crate::{
    allowlist::{domain_of, normalize_email, AllowlistSnapshot, DomainRule},
    error::{AppError, AppResult},
};

use super::prelude::*;

/// Collapse a display name into an opaque client id.
pub fn slug(name: &str) -> String {
    let out: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if out.is_empty() {
        "x".to_string()
    } else {
        out
    }
}

/// Increment the allowlist version inside the caller's transaction. Every
/// mutation of client_emails / client_domains / client.active must pass
/// through here before commit.
pub async fn bump_allowlist_version<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    AllowlistMeta::update_many()
        .col_expr(
            allowlist_meta::Column::Version,
            Expr::col(allowlist_meta::Column::Version).add(1),
        )
        .col_expr(
            allowlist_meta::Column::UpdatedAt,
            Expr::value(chrono::Utc::now().fixed_offset()),
        )
        .filter(allowlist_meta::Column::Id.eq(1))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn get_allowlist_version(conn: &DatabaseConnection) -> AppResult<i64> {
    let meta = AllowlistMeta::find_by_id(1)
        .one(conn)
        .await?
        .context("allowlist_meta singleton row missing")?;
    Ok(meta.version)
}

/// Emails, domains, and version read within one transaction so the snapshot
/// reflects a single point in time.
pub async fn get_allowlist_snapshot(conn: &DatabaseConnection) -> AppResult<AllowlistSnapshot> {
    let txn = conn.begin().await?;

    let meta = AllowlistMeta::find_by_id(1)
        .one(&txn)
        .await?
        .context("allowlist_meta singleton row missing")?;

    let emails: Vec<String> = ClientEmail::find()
        .join(JoinType::InnerJoin, client_email::Relation::Client.def())
        .filter(client::Column::Active.eq(true))
        .select_only()
        .column(client_email::Column::Email)
        .into_tuple()
        .all(&txn)
        .await?;

    let domains: Vec<(String, bool)> = ClientDomain::find()
        .join(JoinType::InnerJoin, client_domain::Relation::Client.def())
        .filter(client::Column::Active.eq(true))
        .select_only()
        .column(client_domain::Column::Domain)
        .column(client_domain::Column::Wildcard)
        .into_tuple()
        .all(&txn)
        .await?;

    txn.commit().await?;

    let mut emails: Vec<String> = emails
        .into_iter()
        .map(|e| normalize_email(&e))
        .filter(|e| !e.is_empty())
        .collect();
    emails.sort();
    emails.dedup();

    let mut domains: Vec<DomainRule> = domains
        .into_iter()
        .map(|(domain, wildcard)| DomainRule {
            domain: domain.trim().to_lowercase(),
            wildcard,
        })
        .filter(|d| !d.domain.is_empty())
        .collect();
    domains.sort_by(|a, b| (&a.domain, a.wildcard).cmp(&(&b.domain, b.wildcard)));
    domains.dedup();

    Ok(AllowlistSnapshot {
        emails,
        domains,
        version: meta.version,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderMatch {
    pub client_id: String,
    pub score: i32,
}

/// Resolve a sender to a client: exact email (100), exact domain (80), then
/// wildcard domain (60). Only active clients participate.
pub async fn match_sender<C: ConnectionTrait>(
    db: &C,
    sender: &str,
) -> Result<Option<SenderMatch>, DbErr> {
    let email = normalize_email(sender);
    if email.is_empty() {
        return Ok(None);
    }

    if let Some(hit) = ClientEmail::find()
        .join(JoinType::InnerJoin, client_email::Relation::Client.def())
        .filter(client::Column::Active.eq(true))
        .filter(client_email::Column::Email.eq(&email))
        .one(db)
        .await?
    {
        return Ok(Some(SenderMatch {
            client_id: hit.client_id,
            score: 100,
        }));
    }

    let dom = domain_of(&email);
    if dom.is_empty() {
        return Ok(None);
    }

    if let Some(hit) = ClientDomain::find()
        .join(JoinType::InnerJoin, client_domain::Relation::Client.def())
        .filter(client::Column::Active.eq(true))
        .filter(client_domain::Column::Wildcard.eq(false))
        .filter(client_domain::Column::Domain.eq(&dom))
        .one(db)
        .await?
    {
        return Ok(Some(SenderMatch {
            client_id: hit.client_id,
            score: 80,
        }));
    }

    let wildcards = ClientDomain::find()
        .join(JoinType::InnerJoin, client_domain::Relation::Client.def())
        .filter(client::Column::Active.eq(true))
        .filter(client_domain::Column::Wildcard.eq(true))
        .all(db)
        .await?;

    for rule in wildcards {
        if dom == rule.domain || dom.ends_with(&format!(".{}", rule.domain)) {
            return Ok(Some(SenderMatch {
                client_id: rule.client_id,
                score: 60,
            }));
        }
    }

    Ok(None)
}

// ---------------------------------------------------------------------------
// Client CRUD
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DomainRuleIn {
    pub domain: String,
    #[serde(default)]
    pub wildcard: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientIn {
    pub id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub emails: Option<Vec<String>>,
    pub domains: Option<Vec<DomainRuleIn>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub active: Option<bool>,
    pub emails: Option<Vec<String>>,
    pub domains: Option<Vec<DomainRuleIn>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub client: client::Model,
    pub emails: Vec<client_email::Model>,
    pub domains: Vec<client_domain::Model>,
}

async fn find_client_detail<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<ClientDetail>, DbErr> {
    let Some(client) = Client::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let emails = ClientEmail::find()
        .filter(client_email::Column::ClientId.eq(id))
        .order_by_asc(client_email::Column::Email)
        .all(db)
        .await?;
    let domains = ClientDomain::find()
        .filter(client_domain::Column::ClientId.eq(id))
        .order_by_asc(client_domain::Column::Domain)
        .all(db)
        .await?;
    Ok(Some(ClientDetail {
        client,
        emails,
        domains,
    }))
}

pub async fn get_client(conn: &DatabaseConnection, id: &str) -> AppResult<ClientDetail> {
    find_client_detail(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))
}

pub async fn list_clients(conn: &DatabaseConnection) -> AppResult<Vec<client::Model>> {
    let clients = Client::find()
        .order_by_asc(client::Column::Name)
        .all(conn)
        .await?;
    Ok(clients)
}

/// Replace the full email set for a client. Runs inside the caller's
/// transaction and bumps the allowlist version.
pub async fn set_client_emails<C: ConnectionTrait>(
    db: &C,
    client_id: &str,
    emails: &[String],
) -> Result<(), DbErr> {
    ClientEmail::delete_many()
        .filter(client_email::Column::ClientId.eq(client_id))
        .exec(db)
        .await?;

    let mut normalized: Vec<String> = emails
        .iter()
        .map(|e| normalize_email(e))
        .filter(|e| e.contains('@'))
        .collect();
    normalized.sort();
    normalized.dedup();

    let models = normalized.into_iter().map(|email| client_email::ActiveModel {
        id: ActiveValue::NotSet,
        client_id: ActiveValue::Set(client_id.to_string()),
        email: ActiveValue::Set(email),
        created_at: ActiveValue::NotSet,
    });
    ClientEmail::insert_many(models)
        .on_empty_do_nothing()
        .exec(db)
        .await?;

    bump_allowlist_version(db).await
}

/// Replace the full domain set for a client. Same transactional contract as
/// [`set_client_emails`].
pub async fn set_client_domains<C: ConnectionTrait>(
    db: &C,
    client_id: &str,
    domains: &[DomainRuleIn],
) -> Result<(), DbErr> {
    ClientDomain::delete_many()
        .filter(client_domain::Column::ClientId.eq(client_id))
        .exec(db)
        .await?;

    let mut normalized: Vec<(String, bool)> = domains
        .iter()
        .map(|d| (d.domain.trim().to_lowercase(), d.wildcard))
        .filter(|(d, _)| !d.is_empty() && !d.contains('@'))
        .collect();
    normalized.sort();
    normalized.dedup();

    let models = normalized
        .into_iter()
        .map(|(domain, wildcard)| client_domain::ActiveModel {
            id: ActiveValue::NotSet,
            client_id: ActiveValue::Set(client_id.to_string()),
            domain: ActiveValue::Set(domain),
            wildcard: ActiveValue::Set(wildcard),
        });
    ClientDomain::insert_many(models)
        .on_empty_do_nothing()
        .exec(db)
        .await?;

    bump_allowlist_version(db).await
}

pub async fn create_client(conn: &DatabaseConnection, input: ClientIn) -> AppResult<ClientDetail> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("client name is required".to_string()));
    }
    let id = input
        .id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| slug(&name));

    let txn = conn.begin().await?;

    let clash = Client::find()
        .filter(Expr::cust_with_values(
            "lower(\"clients\".\"name\") = ?",
            [name.to_lowercase()],
        ))
        .one(&txn)
        .await?;
    if clash.is_some() {
        return Err(AppError::Conflict(format!(
            "client name {name:?} already exists"
        )));
    }

    client::ActiveModel {
        id: ActiveValue::Set(id.clone()),
        name: ActiveValue::Set(name),
        phone: ActiveValue::Set(input.phone),
        notes: ActiveValue::Set(input.notes),
        tags: ActiveValue::Set(input.tags),
        active: ActiveValue::Set(true),
        created_at: ActiveValue::NotSet,
        updated_at: ActiveValue::NotSet,
    }
    .insert(&txn)
    .await?;

    if let Some(emails) = &input.emails {
        set_client_emails(&txn, &id, emails).await?;
    }
    if let Some(domains) = &input.domains {
        set_client_domains(&txn, &id, domains).await?;
    }

    let detail = find_client_detail(&txn, &id)
        .await?
        .context("client vanished within its own transaction")?;
    txn.commit().await?;
    Ok(detail)
}

pub async fn update_client(
    conn: &DatabaseConnection,
    id: &str,
    patch: ClientPatch,
) -> AppResult<ClientDetail> {
    let txn = conn.begin().await?;

    let existing = Client::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))?;

    let active_changed = patch.active.is_some_and(|a| a != existing.active);

    let mut model: client::ActiveModel = existing.into();
    if let Some(name) = patch.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("client name is required".to_string()));
        }
        model.name = ActiveValue::Set(name);
    }
    if let Some(phone) = patch.phone {
        model.phone = ActiveValue::Set(Some(phone));
    }
    if let Some(notes) = patch.notes {
        model.notes = ActiveValue::Set(Some(notes));
    }
    if let Some(tags) = patch.tags {
        model.tags = ActiveValue::Set(tags);
    }
    if let Some(active) = patch.active {
        model.active = ActiveValue::Set(active);
    }
    model.updated_at = ActiveValue::Set(chrono::Utc::now().fixed_offset());
    model.update(&txn).await?;

    if let Some(emails) = &patch.emails {
        set_client_emails(&txn, id, emails).await?;
    }
    if let Some(domains) = &patch.domains {
        set_client_domains(&txn, id, domains).await?;
    }
    // flipping active changes the effective allowlist even though no
    // email/domain row moved
    if active_changed && patch.emails.is_none() && patch.domains.is_none() {
        bump_allowlist_version(&txn).await?;
    }

    let detail = find_client_detail(&txn, id)
        .await?
        .context("client vanished within its own transaction")?;
    txn.commit().await?;
    Ok(detail)
}

pub async fn soft_delete_client(conn: &DatabaseConnection, id: &str) -> AppResult<()> {
    let txn = conn.begin().await?;

    let existing = Client::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))?;

    if existing.active {
        let mut model: client::ActiveModel = existing.into();
        model.active = ActiveValue::Set(false);
        model.updated_at = ActiveValue::Set(chrono::Utc::now().fixed_offset());
        model.update(&txn).await?;
        bump_allowlist_version(&txn).await?;
    }

    txn.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Attendee lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AttendeeMatch {
    pub email: String,
    pub client_id: String,
    pub client_name: String,
    pub score: i32,
}

pub async fn lookup_by_attendees(
    conn: &DatabaseConnection,
    emails: &[String],
) -> AppResult<Vec<AttendeeMatch>> {
    let mut matches = Vec::new();
    for raw in emails {
        let email = normalize_email(raw);
        if email.is_empty() {
            continue;
        }
        if let Some(hit) = match_sender(conn, &email).await? {
            let name = Client::find_by_id(&hit.client_id)
                .one(conn)
                .await?
                .map(|c| c.name)
                .unwrap_or_default();
            matches.push(AttendeeMatch {
                email,
                client_id: hit.client_id,
                client_name: name,
                score: hit.score,
            });
        }
    }
    matches.sort_by(|a, b| b.score.cmp(&a.score).then(a.email.cmp(&b.email)));
    Ok(matches)
}

// ---------------------------------------------------------------------------
// Email task reads
// ---------------------------------------------------------------------------

pub async fn email_tasks_latest(
    conn: &DatabaseConnection,
    limit: u64,
    offset: u64,
    sender: Option<String>,
    source_label: Option<String>,
) -> AppResult<Vec<email_task::Model>> {
    let mut query = EmailTask::find();
    if let Some(sender) = sender {
        query = query.filter(email_task::Column::Sender.eq(sender));
    }
    if let Some(label) = source_label {
        query = query.filter(email_task::Column::SourceLabel.eq(label));
    }
    let tasks = query
        .order_by_desc(Expr::cust("COALESCE(\"received_at\", \"created_at\")"))
        .limit(limit)
        .offset(offset)
        .all(conn)
        .await?;
    Ok(tasks)
}

// ---------------------------------------------------------------------------
// Admin maintenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AllowlistCleanupReport {
    pub moved_to_emails: u64,
    pub dedup_emails: u64,
    pub dedup_domains: u64,
    pub version_bumped: bool,
}

/// One-transaction tidy-up: rows in client_domains that are actually
/// addresses move to client_emails, then both tables are deduplicated
/// case-insensitively.
pub async fn allowlist_cleanup(conn: &DatabaseConnection) -> AppResult<AllowlistCleanupReport> {
    let txn = conn.begin().await?;

    let moved = txn
        .execute_unprepared(
            "INSERT INTO client_emails (client_id, email) \
             SELECT client_id, lower(trim(domain)) FROM client_domains \
             WHERE position('@' in domain) > 0 \
             ON CONFLICT DO NOTHING",
        )
        .await?
        .rows_affected();

    txn.execute_unprepared("DELETE FROM client_domains WHERE position('@' in domain) > 0")
        .await?;

    let dedup_emails = txn
        .execute_unprepared(
            "DELETE FROM client_emails a USING client_emails b \
             WHERE a.id > b.id AND a.client_id = b.client_id \
             AND lower(a.email) = lower(b.email)",
        )
        .await?
        .rows_affected();

    let dedup_domains = txn
        .execute_unprepared(
            "DELETE FROM client_domains a USING client_domains b \
             WHERE a.id > b.id AND a.client_id = b.client_id \
             AND lower(a.domain) = lower(b.domain) AND a.wildcard = b.wildcard",
        )
        .await?
        .rows_affected();

    bump_allowlist_version(&txn).await?;
    txn.commit().await?;

    Ok(AllowlistCleanupReport {
        moved_to_emails: moved,
        dedup_emails,
        dedup_domains,
        version_bumped: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Acme Widgets Ltd"), "acmewidgetsltd");
        assert_eq!(slug("KC Swimmers"), "kcswimmers");
        assert_eq!(slug("!!!"), "x");
    }
}
