use sea_orm::ConnectionTrait;
use serde::Deserialize;

use crate::{
    allowlist::{domain_of, normalize_email},
    error::{AppError, AppResult},
};

use super::{
    prelude::*,
    queries::{bump_allowlist_version, match_sender},
};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_MATCHED: &str = "matched";
pub const STATUS_RESOLVED: &str = "resolved";
pub const STATUS_IGNORED: &str = "ignored";

/// Record a sender the allowlist rejected. Repeat sightings of the same
/// (email, message_id) bump the hit counter instead of inserting; a fresh row
/// is immediately auto-matched against the current contact set.
pub async fn record_unknown_sender<C: ConnectionTrait>(
    db: &C,
    sender: &str,
    message_id: &str,
    subject: Option<&str>,
) -> Result<unknown_sender::Model, DbErr> {
    let email = normalize_email(sender);
    let domain = domain_of(&email);
    let now = chrono::Utc::now().fixed_offset();

    let existing = UnknownSender::find()
        .filter(unknown_sender::Column::Email.eq(&email))
        .filter(unknown_sender::Column::MessageId.eq(message_id))
        .one(db)
        .await?;

    if let Some(row) = existing {
        let hits = row.hits + 1;
        let mut model: unknown_sender::ActiveModel = row.into();
        model.hits = ActiveValue::Set(hits);
        model.last_seen = ActiveValue::Set(now);
        if let Some(subject) = subject {
            model.last_subject = ActiveValue::Set(Some(subject.to_string()));
        }
        return model.update(db).await;
    }

    let matched = match_sender(db, &email).await?;
    let (status, matched_client_id) = match matched {
        Some(hit) => (STATUS_MATCHED, Some(hit.client_id)),
        None => (STATUS_PENDING, None),
    };

    unknown_sender::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set(email),
        domain: ActiveValue::Set(domain),
        message_id: ActiveValue::Set(message_id.to_string()),
        last_subject: ActiveValue::Set(subject.map(|s| s.to_string())),
        first_seen: ActiveValue::Set(now),
        last_seen: ActiveValue::Set(now),
        hits: ActiveValue::Set(1),
        status: ActiveValue::Set(status.to_string()),
        matched_client_id: ActiveValue::Set(matched_client_id),
        resolved: ActiveValue::Set(false),
    }
    .insert(db)
    .await
}

pub async fn list_unknown_senders(
    conn: &DatabaseConnection,
    status: Option<String>,
) -> AppResult<Vec<unknown_sender::Model>> {
    let mut query = UnknownSender::find();
    if let Some(status) = status {
        query = query.filter(unknown_sender::Column::Status.eq(status));
    }
    let rows = query
        .order_by_desc(unknown_sender::Column::LastSeen)
        .all(conn)
        .await?;
    Ok(rows)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolveAction {
    ApproveEmail {
        client_id: String,
    },
    ApproveDomain {
        client_id: String,
        #[serde(default)]
        wildcard: bool,
    },
    Ignore,
}

/// Apply a review decision. Approvals extend the allowlist and bump its
/// version in the same transaction; transitions are one-way out of
/// pending/matched.
pub async fn resolve_unknown_sender(
    conn: &DatabaseConnection,
    id: i32,
    action: ResolveAction,
) -> AppResult<unknown_sender::Model> {
    let txn = conn.begin().await?;

    let row = UnknownSender::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("unknown sender {id} not found")))?;

    if row.resolved || !matches!(row.status.as_str(), STATUS_PENDING | STATUS_MATCHED) {
        return Err(AppError::Conflict(format!(
            "unknown sender {id} already {}",
            row.status
        )));
    }

    let (new_status, bump) = match &action {
        ResolveAction::ApproveEmail { client_id } => {
            Client::find_by_id(client_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("client {client_id} not found")))?;
            client_email::ActiveModel {
                id: ActiveValue::NotSet,
                client_id: ActiveValue::Set(client_id.clone()),
                email: ActiveValue::Set(row.email.clone()),
                created_at: ActiveValue::NotSet,
            }
            .insert(&txn)
            .await?;
            (STATUS_RESOLVED, true)
        }
        ResolveAction::ApproveDomain {
            client_id,
            wildcard,
        } => {
            Client::find_by_id(client_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("client {client_id} not found")))?;
            client_domain::ActiveModel {
                id: ActiveValue::NotSet,
                client_id: ActiveValue::Set(client_id.clone()),
                domain: ActiveValue::Set(row.domain.clone()),
                wildcard: ActiveValue::Set(*wildcard),
            }
            .insert(&txn)
            .await?;
            (STATUS_RESOLVED, true)
        }
        ResolveAction::Ignore => (STATUS_IGNORED, false),
    };

    let matched_client_id = match &action {
        ResolveAction::ApproveEmail { client_id }
        | ResolveAction::ApproveDomain { client_id, .. } => Some(client_id.clone()),
        ResolveAction::Ignore => row.matched_client_id.clone(),
    };

    let mut model: unknown_sender::ActiveModel = row.into();
    model.status = ActiveValue::Set(new_status.to_string());
    model.resolved = ActiveValue::Set(true);
    model.matched_client_id = ActiveValue::Set(matched_client_id);
    let updated = model.update(&txn).await?;

    if bump {
        bump_allowlist_version(&txn).await?;
    }

    txn.commit().await?;
    Ok(updated)
}
