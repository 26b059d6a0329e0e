use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    calendar::{
        CalendarEvent, CalendarSource, EventTime, GENERATOR_VERSION, PROP_BLOCK_TYPE,
        PROP_GENERATED, PROP_IDEM, PROP_TASK_IDS, PROP_VERSION,
    },
    error::AppResult,
};

use super::planner::{Block, FixedEventsSource};

/// Busy intervals for the planner, read from the fixed-commitments calendar.
pub struct CalendarFixedEvents<'a> {
    calendar: &'a dyn CalendarSource,
    calendar_id: String,
    tz: Tz,
}

impl<'a> CalendarFixedEvents<'a> {
    pub fn new(calendar: &'a dyn CalendarSource, calendar_id: String, tz: Tz) -> Self {
        CalendarFixedEvents {
            calendar,
            calendar_id,
            tz,
        }
    }
}

#[async_trait]
impl FixedEventsSource for CalendarFixedEvents<'_> {
    async fn busy_intervals(
        &self,
        date: NaiveDate,
    ) -> AppResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let midnight = self
            .tz
            .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
        let events = self
            .calendar
            .list_events(&self.calendar_id, midnight, midnight + Duration::days(1))
            .await?;

        let mut busies = Vec::new();
        for event in events {
            let (Some(start), Some(end)) = (event.start.as_ref(), event.end.as_ref()) else {
                continue;
            };
            // all-day entries are informational markers, not busy time
            if start.is_all_day() || end.is_all_day() {
                continue;
            }
            if let (Some(s), Some(e)) = (start.resolve(self.tz), end.resolve(self.tz)) {
                if e > s {
                    busies.push((s, e));
                }
            }
        }
        Ok(busies)
    }
}

pub fn event_for_block(block: &Block) -> CalendarEvent {
    CalendarEvent {
        summary: Some(block.summary()),
        description: Some(block.description()),
        start: Some(EventTime::at(block.start)),
        end: Some(EventTime::at(block.end)),
        ..CalendarEvent::default()
    }
    .with_private_props([
        (PROP_GENERATED.to_string(), "true".to_string()),
        (PROP_VERSION.to_string(), GENERATOR_VERSION.to_string()),
        (PROP_BLOCK_TYPE.to_string(), block.bucket.to_string()),
        (PROP_TASK_IDS.to_string(), block.task_ids.join(",")),
        (PROP_IDEM.to_string(), block.idem_key()),
    ])
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ApplyReport {
    pub created: u32,
    pub skipped_existing: u32,
    pub cleared: u32,
    pub failed: u32,
}

/// Write planned blocks to the suggestions calendar. Existing generated
/// events either short-circuit via their idempotency marker or are cleared
/// first when `pre_clear` is set. A single failing write is reported and
/// does not abort the batch.
pub async fn apply_plan(
    calendar: &dyn CalendarSource,
    calendar_id: &str,
    blocks: &[Block],
    window: (DateTime<Utc>, DateTime<Utc>),
    pre_clear: bool,
) -> AppResult<ApplyReport> {
    let existing = calendar.list_events(calendar_id, window.0, window.1).await?;

    let mut report = ApplyReport::default();
    let mut existing_idems: HashSet<String> = existing
        .iter()
        .filter(|e| e.is_generated())
        .filter_map(|e| e.private_prop(PROP_IDEM).map(|s| s.to_string()))
        .collect();

    if pre_clear {
        for event in existing.iter().filter(|e| e.is_generated()) {
            let Some(id) = &event.id else { continue };
            match calendar.delete_event(calendar_id, id).await {
                Ok(()) => report.cleared += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!("Failed to clear suggestion {}: {:?}", id, err);
                }
            }
        }
        existing_idems.clear();
    }

    for block in blocks {
        if existing_idems.contains(&block.idem_key()) {
            report.skipped_existing += 1;
            continue;
        }
        match calendar
            .insert_event(calendar_id, &event_for_block(block))
            .await
        {
            Ok(_) => report.created += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(
                    "Failed to insert block {}: {:?}",
                    block.summary(),
                    err
                );
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use crate::scheduler::buckets::Bucket;

    use super::*;

    #[test]
    fn test_event_for_block_carries_markers() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 4).unwrap();
        let at = |h: u32| {
            Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap()))
        };
        let block = Block {
            bucket: Bucket::AdminProcessing,
            start: at(15),
            end: at(16),
            task_ids: vec!["t1".to_string(), "t2".to_string()],
            task_titles: vec!["a".to_string(), "b".to_string()],
        };
        let event = event_for_block(&block);
        assert!(event.is_generated());
        assert_eq!(
            event.private_prop(PROP_BLOCK_TYPE),
            Some("admin_processing")
        );
        assert_eq!(event.private_prop(PROP_TASK_IDS), Some("t1,t2"));
        assert_eq!(
            event.private_prop(PROP_IDEM),
            Some("admin_processing:2025-08-04T15:00:00+00:00")
        );
        assert_eq!(event.summary.as_deref(), Some("[BLOCK] Admin Processing: a +1 more (1h)"));
    }
}
