use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::OnConflict;
use serde::{Deserialize, Serialize};

use crate::{
    db_core::{
        prelude::*,
        queries::match_sender,
        unknown_senders::record_unknown_sender,
    },
    error::{AppError, AppResult},
    server_config::ThreadMode,
};

pub const STATUS_CREATED: &str = "created";
pub const STATUS_REJECTED_ALLOWLIST: &str = "rejected_allowlist";
pub const TASK_STATUS_OPEN: &str = "open";

const SUBJECT_MAX: usize = 500;
const SNIPPET_MAX: usize = 500;
const MESSAGE_ID_MIN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Request body of the ingestion entry point.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailTaskIn {
    pub message_id: String,
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    pub gmail_link: Option<String>,
    pub thread_id: Option<String>,
    pub received_ts: Option<i64>,
    pub start_ts: Option<i64>,
    pub due_ts: Option<i64>,
    pub source_label: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub priority: Priority,
    pub client_hint: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IngestReason {
    Created,
    Duplicate,
    RejectedAllowlist,
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub helios_task_id: Option<String>,
    pub processed: bool,
    pub reason: IngestReason,
}

fn validate(input: &EmailTaskIn) -> AppResult<()> {
    if input.message_id.trim().len() < MESSAGE_ID_MIN {
        return Err(AppError::Validation(format!(
            "message_id must be at least {MESSAGE_ID_MIN} characters"
        )));
    }
    if !input.sender.contains('@') {
        return Err(AppError::Validation(
            "sender must be a full email address".to_string(),
        ));
    }
    if input.subject.chars().count() > SUBJECT_MAX {
        return Err(AppError::Validation(format!(
            "subject must be at most {SUBJECT_MAX} characters"
        )));
    }
    Ok(())
}

/// First `max` characters of the content with whitespace runs collapsed.
fn snippet_of(content: &str, max: usize) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max).collect()
}

fn ms_to_fixed(ms: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.fixed_offset())
}

/// The single ingestion routine behind both the HTTP endpoint and the label
/// sweep. At most one EmailTask and exactly one ProcessedEmail row exist per
/// message id; concurrent workers race on the ProcessedEmail primary key and
/// the loser reports a duplicate.
pub async fn ingest_email(
    conn: &DatabaseConnection,
    input: EmailTaskIn,
    thread_mode: ThreadMode,
) -> AppResult<IngestOutcome> {
    validate(&input)?;

    if let Some(existing) = ProcessedEmail::find_by_id(&input.message_id).one(conn).await? {
        return Ok(IngestOutcome {
            helios_task_id: existing.helios_task_id,
            processed: true,
            reason: IngestReason::Duplicate,
        });
    }

    let received_at = input
        .received_ts
        .and_then(ms_to_fixed)
        .unwrap_or_else(|| Utc::now().fixed_offset());

    match try_ingest(conn, &input, received_at, thread_mode).await {
        Ok(outcome) => Ok(outcome),
        // a parallel worker won the unique-constraint race on this message id
        Err(err @ AppError::Conflict(_)) => {
            let existing = ProcessedEmail::find_by_id(&input.message_id).one(conn).await?;
            match existing {
                Some(row) => Ok(IngestOutcome {
                    helios_task_id: row.helios_task_id,
                    processed: true,
                    reason: IngestReason::Duplicate,
                }),
                None => Err(err),
            }
        }
        Err(other) => Err(other),
    }
}

async fn try_ingest(
    conn: &DatabaseConnection,
    input: &EmailTaskIn,
    received_at: DateTime<FixedOffset>,
    thread_mode: ThreadMode,
) -> AppResult<IngestOutcome> {
    let txn = conn.begin().await?;

    let sender_match = match_sender(&txn, &input.sender).await?;

    if sender_match.is_none() {
        record_unknown_sender(&txn, &input.sender, &input.message_id, Some(&input.subject))
            .await?;
        processed_email::ActiveModel {
            message_id: ActiveValue::Set(input.message_id.clone()),
            helios_task_id: ActiveValue::Set(None),
            status: ActiveValue::Set(STATUS_REJECTED_ALLOWLIST.to_string()),
            received_at: ActiveValue::Set(Some(received_at)),
            processed_at: ActiveValue::NotSet,
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        return Ok(IngestOutcome {
            helios_task_id: None,
            processed: false,
            reason: IngestReason::RejectedAllowlist,
        });
    }

    if input.dry_run {
        return Ok(IngestOutcome {
            helios_task_id: None,
            processed: false,
            reason: IngestReason::DryRun,
        });
    }

    // per-thread mode: fold a follow-up email into the conversation's task
    if thread_mode == ThreadMode::PerThread {
        if let Some(thread_id) = input.thread_id.as_deref() {
            if let Some(mapping) = ThreadTask::find_by_id(thread_id).one(&txn).await? {
                if let Some(task) = EmailTask::find_by_id(&mapping.task_id).one(&txn).await? {
                    let task_id = task.id.clone();
                    append_to_thread_task(&txn, task, input).await?;

                    let mut map_model: thread_task::ActiveModel = mapping.into();
                    map_model.last_email_at = ActiveValue::Set(Some(received_at));
                    map_model.update(&txn).await?;

                    processed_email::ActiveModel {
                        message_id: ActiveValue::Set(input.message_id.clone()),
                        helios_task_id: ActiveValue::Set(Some(task_id.clone())),
                        status: ActiveValue::Set(STATUS_CREATED.to_string()),
                        received_at: ActiveValue::Set(Some(received_at)),
                        processed_at: ActiveValue::NotSet,
                    }
                    .insert(&txn)
                    .await?;
                    txn.commit().await?;

                    return Ok(IngestOutcome {
                        helios_task_id: Some(task_id),
                        processed: true,
                        reason: IngestReason::Created,
                    });
                }
            }
        }
    }

    let client_id = sender_match.map(|m| m.client_id);
    let subject: String = input.subject.chars().take(SUBJECT_MAX).collect();

    email_task::ActiveModel {
        id: ActiveValue::Set(input.message_id.clone()),
        client_id: ActiveValue::Set(client_id),
        sender: ActiveValue::Set(input.sender.trim().to_lowercase()),
        subject: ActiveValue::Set(subject),
        snippet: ActiveValue::Set(snippet_of(&input.content, SNIPPET_MAX)),
        content: ActiveValue::Set(input.content.clone()),
        gmail_link: ActiveValue::Set(input.gmail_link.clone()),
        thread_id: ActiveValue::Set(input.thread_id.clone()),
        received_at: ActiveValue::Set(Some(received_at)),
        created_at: ActiveValue::NotSet,
        source_label: ActiveValue::Set(input.source_label.clone()),
        priority: ActiveValue::Set(input.priority.as_str().to_string()),
        client_hint: ActiveValue::Set(input.client_hint.clone()),
        status: ActiveValue::Set(TASK_STATUS_OPEN.to_string()),
    }
    .insert(&txn)
    .await?;

    if input.start_ts.is_some() || input.due_ts.is_some() {
        task_meta::ActiveModel {
            task_id: ActiveValue::Set(input.message_id.clone()),
            task_type: ActiveValue::Set("flexible".to_string()),
            deadline_type: ActiveValue::Set(None),
            fixed_date: ActiveValue::Set(None),
            calendar_blocked: ActiveValue::Set(false),
            recurrence_pattern: ActiveValue::Set(None),
            client_code: ActiveValue::Set(input.client_hint.clone()),
            start_at: ActiveValue::Set(input.start_ts.and_then(ms_to_fixed)),
            due_at: ActiveValue::Set(input.due_ts.and_then(ms_to_fixed)),
            source: ActiveValue::Set(Some("email".to_string())),
        }
        .insert(&txn)
        .await?;
    }

    if let Some(thread_id) = input.thread_id.as_deref() {
        ThreadTask::insert(thread_task::ActiveModel {
            thread_id: ActiveValue::Set(thread_id.to_string()),
            task_id: ActiveValue::Set(input.message_id.clone()),
            last_email_at: ActiveValue::Set(Some(received_at)),
        })
        .on_conflict(
            OnConflict::column(thread_task::Column::ThreadId)
                .update_columns([
                    thread_task::Column::TaskId,
                    thread_task::Column::LastEmailAt,
                ])
                .to_owned(),
        )
        .exec(&txn)
        .await?;
    }

    processed_email::ActiveModel {
        message_id: ActiveValue::Set(input.message_id.clone()),
        helios_task_id: ActiveValue::Set(Some(input.message_id.clone())),
        status: ActiveValue::Set(STATUS_CREATED.to_string()),
        received_at: ActiveValue::Set(Some(received_at)),
        processed_at: ActiveValue::NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    Ok(IngestOutcome {
        helios_task_id: Some(input.message_id.clone()),
        processed: true,
        reason: IngestReason::Created,
    })
}

/// Reopen the thread's task and append the new email as a comment.
async fn append_to_thread_task<C: sea_orm::ConnectionTrait>(
    db: &C,
    task: email_task::Model,
    input: &EmailTaskIn,
) -> Result<(), DbErr> {
    let preview = snippet_of(&input.content, SNIPPET_MAX);
    let mut note = format!("\n\n--- follow-up ---\nSubject: {}\n{}", input.subject, preview);
    if let Some(link) = &input.gmail_link {
        note.push('\n');
        note.push_str(link);
    }

    let content = format!("{}{}", task.content, note);
    let mut model: email_task::ActiveModel = task.into();
    model.content = ActiveValue::Set(content);
    model.status = ActiveValue::Set(TASK_STATUS_OPEN.to_string());
    model.update(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> EmailTaskIn {
        EmailTaskIn {
            message_id: "rfc:ABC".to_string(),
            sender: "jane@example.com".to_string(),
            subject: "Hi".to_string(),
            content: "hello".to_string(),
            gmail_link: None,
            thread_id: None,
            received_ts: None,
            start_ts: None,
            due_ts: None,
            source_label: None,
            dry_run: false,
            priority: Priority::Normal,
            client_hint: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_input() {
        assert!(validate(&base_input()).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_message_id() {
        let input = EmailTaskIn {
            message_id: "m1".to_string(),
            ..base_input()
        };
        assert!(matches!(validate(&input), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_sender_without_at() {
        let input = EmailTaskIn {
            sender: "not-an-address".to_string(),
            ..base_input()
        };
        assert!(matches!(validate(&input), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_long_subject() {
        let input = EmailTaskIn {
            subject: "x".repeat(501),
            ..base_input()
        };
        assert!(matches!(validate(&input), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_snippet_collapses_and_truncates() {
        assert_eq!(snippet_of("a  b\n\nc", 500), "a b c");
        assert_eq!(snippet_of(&"x".repeat(600), 500).chars().count(), 500);
    }

    #[test]
    fn test_priority_deserializes_lowercase() {
        let p: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Priority::High);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_ingest_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&IngestReason::RejectedAllowlist).unwrap(),
            "\"rejected_allowlist\""
        );
    }
}
