use axum::{extract::State, Json};
use chrono::{Duration, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;

use crate::{
    calendar::{CalendarClient, CalendarEvent, CalendarSource, PROP_BLOCK_TYPE, PROP_TASK_IDS},
    error::{AppError, AppJsonResult},
    scheduler::buckets::Bucket,
    server_config::cfg,
    ServerState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: Option<String>,
    pub title: String,
    pub context: &'static str,
    pub calendar_event_id: Option<String>,
    pub calendar_url: Option<String>,
    pub start: String,
    pub end: String,
    pub assigned_task_ids: Vec<String>,
    pub notes: String,
    pub extended: serde_json::Value,
}

/// Map a block to the coarse UI context, preferring the private bucket
/// marker over title keywords.
fn context_for(summary: &str, bucket: Option<Bucket>) -> &'static str {
    if let Some(bucket) = bucket {
        return match bucket {
            Bucket::ClientDeepWork | Bucket::SystemsDevelopment => "DeepWork",
            Bucket::AdminProcessing => "Admin",
            Bucket::MarketingCreative => "Comm",
            Bucket::Personal => "Personal",
        };
    }
    let t = summary.to_lowercase();
    if t.contains("deep work") {
        "DeepWork"
    } else if t.contains("admin") {
        "Admin"
    } else if t.contains("meeting") {
        "Meeting"
    } else if t.contains("school run") || t.contains("bsl") || t.contains("med") {
        "Personal"
    } else {
        "Comm"
    }
}

fn is_block(event: &CalendarEvent) -> bool {
    event.is_generated()
        || event.private_prop("helios_block").is_some()
        || event
            .summary
            .as_deref()
            .is_some_and(|s| s.starts_with("[BLOCK]"))
}

/// Today's blocks drawn from the fixed and suggestions calendars.
pub async fn handler_today(State(state): State<ServerState>) -> AppJsonResult<serde_json::Value> {
    let token = cfg.calendar_access_token.clone().ok_or_else(|| {
        AppError::Unauthorized("CALENDAR_ACCESS_TOKEN is not configured".to_string())
    })?;
    let client = CalendarClient::new(state.http_client.clone(), token);

    let tz = cfg.timezone;
    let now = Utc::now().with_timezone(&tz);
    let day_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap();
    let day_start = tz
        .from_local_datetime(&day_start)
        .earliest()
        .unwrap_or_else(|| now)
        .with_timezone(&Utc);
    // pad both ends to catch events straddling midnight
    let window = (
        day_start - Duration::hours(2),
        day_start + Duration::hours(28),
    );

    let calendar_ids: Vec<&String> = [&cfg.flexible_calendar_id, &cfg.fixed_calendar_id]
        .into_iter()
        .flatten()
        .collect();
    if calendar_ids.is_empty() {
        return Err(AppError::Validation(
            "no calendar ids configured".to_string(),
        ));
    }

    let mut blocks = Vec::new();
    for calendar_id in calendar_ids {
        let events = client.list_events(calendar_id, window.0, window.1).await?;
        for event in events {
            if !is_block(&event) {
                continue;
            }
            let (Some(start), Some(end)) = (
                event.start.as_ref().and_then(|t| t.resolve(tz)),
                event.end.as_ref().and_then(|t| t.resolve(tz)),
            ) else {
                continue;
            };

            let summary = event.summary.clone().unwrap_or_default();
            let bucket = event
                .private_prop(PROP_BLOCK_TYPE)
                .and_then(|b| b.parse::<Bucket>().ok());
            let assigned_task_ids = event
                .private_prop(PROP_TASK_IDS)
                .map(|s| {
                    s.split(',')
                        .filter(|x| !x.is_empty())
                        .map(|x| x.to_string())
                        .collect()
                })
                .unwrap_or_default();

            let mut extended = json!({"calendar_id": calendar_id});
            if let Some(private) = event
                .extended_properties
                .as_ref()
                .and_then(|p| p.private.as_ref())
            {
                for (key, value) in private {
                    extended[key.as_str()] = json!(value);
                }
            }

            blocks.push(ScheduleBlock {
                id: event.id.clone(),
                title: summary.replace("[BLOCK]", "").trim().to_string(),
                context: context_for(&summary, bucket),
                calendar_event_id: event.id.clone(),
                calendar_url: event.html_link.clone(),
                start: start.with_timezone(&tz).to_rfc3339(),
                end: end.with_timezone(&tz).to_rfc3339(),
                assigned_task_ids,
                notes: event.description.clone().unwrap_or_default(),
                extended,
            });
        }
    }

    blocks.sort_by(|a, b| a.start.cmp(&b.start));

    Ok(Json(json!({
        "date": now.date_naive().to_string(),
        "timezone": tz.name(),
        "now": now.to_rfc3339(),
        "blocks": blocks,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_prefers_bucket_marker() {
        assert_eq!(
            context_for("anything", Some(Bucket::SystemsDevelopment)),
            "DeepWork"
        );
        assert_eq!(context_for("anything", Some(Bucket::Personal)), "Personal");
    }

    #[test]
    fn test_context_falls_back_to_title_keywords() {
        assert_eq!(context_for("Client Deep Work: VAT", None), "DeepWork");
        assert_eq!(context_for("Admin Processing", None), "Admin");
        assert_eq!(context_for("Weekly meeting", None), "Meeting");
        assert_eq!(context_for("School Run (Morning)", None), "Personal");
        assert_eq!(context_for("Something else", None), "Comm");
    }

    #[test]
    fn test_is_block_matches_prefix_or_marker() {
        let by_title = CalendarEvent {
            summary: Some("[BLOCK] Admin Processing (30m)".to_string()),
            ..CalendarEvent::default()
        };
        assert!(is_block(&by_title));

        let plain = CalendarEvent {
            summary: Some("Standup".to_string()),
            ..CalendarEvent::default()
        };
        assert!(!is_block(&plain));
    }
}
