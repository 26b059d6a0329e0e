use futures::future::join_all;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    server_config::cfg,
    ServerState,
};

use super::{
    client::EmailClient,
    ingest::{ingest_email, EmailTaskIn, IngestReason, Priority},
};

/// How many messages are in flight against the mail provider at once.
const SWEEP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    pub created: u32,
    pub duplicate: u32,
    pub rejected: u32,
    pub failed: u32,
}

/// Sweep the configured triage labels and push every message through the
/// ingestion routine. A failing message is counted and logged, never fatal
/// to the sweep.
pub async fn sweep_triage_labels(state: &ServerState) -> AppResult<SweepStats> {
    let token = cfg.mail_access_token.clone().ok_or_else(|| {
        AppError::Unauthorized("MAIL_ACCESS_TOKEN is not configured".to_string())
    })?;

    if cfg.triage_labels.is_empty() {
        tracing::warn!("MAIL_TRIAGE_LABELS is empty, nothing to sweep");
        return Ok(SweepStats::default());
    }

    let client = EmailClient::new(state.http_client.clone(), token);
    let label_map = client.label_map().await.map_err(AppError::Internal)?;

    let mut labels = Vec::new();
    for name in &cfg.triage_labels {
        match label_map.get(&name.to_lowercase()) {
            Some(id) => labels.push((name.clone(), id.clone())),
            None => tracing::warn!("Mail label not found in mailbox: {}", name),
        }
    }
    if labels.is_empty() {
        return Err(AppError::Validation(
            "none of the configured triage labels exist in the mailbox".to_string(),
        ));
    }

    let query = (cfg.lookback_days > 0).then(|| format!("newer_than:{}d", cfg.lookback_days));

    let pairs = client
        .list_messages_across_labels(&labels, query.as_deref())
        .await
        .map_err(AppError::Internal)?;

    tracing::info!("Sweeping {} messages across {} labels", pairs.len(), labels.len());

    let mut stats = SweepStats::default();
    for chunk in pairs.chunks(SWEEP_CONCURRENCY) {
        let results = join_all(chunk.iter().map(|(label, gmail_id)| {
            let client = &client;
            let conn = &state.conn;
            async move {
                let message = client.get_message(gmail_id).await?;
                let sender = message
                    .sender_address()
                    .ok_or_else(|| anyhow::anyhow!("message {} has no sender", gmail_id))?;

                let input = EmailTaskIn {
                    message_id: message.stable_message_id(),
                    sender,
                    subject: message
                        .subject
                        .clone()
                        .unwrap_or_else(|| "(no subject)".to_string()),
                    content: message
                        .body
                        .clone()
                        .unwrap_or_else(|| message.snippet.clone()),
                    gmail_link: Some(message.deep_link()),
                    thread_id: Some(message.thread_id.clone()),
                    received_ts: Some(message.internal_date),
                    start_ts: None,
                    due_ts: None,
                    source_label: Some(label.clone()),
                    dry_run: false,
                    priority: Priority::Normal,
                    client_hint: None,
                };

                let outcome = ingest_email(conn, input, cfg.thread_mode)
                    .await
                    .map_err(|e| anyhow::anyhow!("ingest failed: {e:?}"))?;
                Ok::<_, anyhow::Error>(outcome)
            }
        }))
        .await;

        for result in results {
            match result {
                Ok(outcome) => match outcome.reason {
                    IngestReason::Created => stats.created += 1,
                    IngestReason::Duplicate => stats.duplicate += 1,
                    IngestReason::RejectedAllowlist => stats.rejected += 1,
                    IngestReason::DryRun => {}
                },
                Err(err) => {
                    stats.failed += 1;
                    tracing::error!("Error processing message: {:?}", err);
                }
            }
        }
    }

    tracing::info!(
        "Sweep complete: {} created, {} duplicate, {} rejected, {} failed",
        stats.created,
        stats.duplicate,
        stats.rejected,
        stats.failed
    );

    Ok(stats)
}
