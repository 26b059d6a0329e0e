use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    calendar::{
        CalendarEvent, CalendarSource, EventTime, GENERATOR_VERSION, PROP_BLOCK_TYPE,
        PROP_GENERATED, PROP_IDEM, PROP_TASK_IDS, PROP_VERSION,
    },
    error::AppResult,
};

use super::{
    buckets::Bucket,
    planner::fmt_duration,
    task_source::GroupedTasks,
};

/// How far around "now" to look for the block being worked on.
const SEARCH_WINDOW_HOURS: i64 = 6;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReflowParams {
    /// Don't bother reflowing when fewer minutes than this remain.
    pub min_chunk: u32,
    /// Max minutes a single task may claim in the new block; 0 disables.
    pub per_task_cap: u32,
    pub dry_run: bool,
}

impl Default for ReflowParams {
    fn default() -> Self {
        ReflowParams {
            min_chunk: 15,
            per_task_cap: 60,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReflowOutcome {
    NoCurrentBlock,
    BelowMinChunk {
        remaining_minutes: i64,
    },
    NoCandidates,
    Reflowed {
        bucket: Bucket,
        shortened_event_id: String,
        new_event_id: Option<String>,
        task_ids: Vec<String>,
        task_titles: Vec<String>,
        remaining_minutes: i64,
        dry_run: bool,
    },
}

/// Pull the next-best tasks from a bucket to fill `minutes_needed`, skipping
/// the ids already claimed by the current block.
pub fn pick_next_tasks(
    tasks: &GroupedTasks,
    bucket: Bucket,
    minutes_needed: u32,
    exclude: &HashSet<String>,
    per_task_cap: u32,
) -> (Vec<String>, Vec<String>) {
    let mut remaining = minutes_needed;
    let mut ids = Vec::new();
    let mut titles = Vec::new();

    for task in tasks.tasks(bucket) {
        if remaining == 0 {
            break;
        }
        if exclude.contains(&task.id) || task.remaining_minutes == 0 {
            continue;
        }
        let mut take = task.remaining_minutes.min(remaining);
        if per_task_cap > 0 {
            take = take.min(per_task_cap);
        }
        if take == 0 {
            continue;
        }
        ids.push(task.id.clone());
        titles.push(task.title.clone());
        remaining = remaining.saturating_sub(take);
    }

    (ids, titles)
}

fn reflow_summary(bucket: Bucket, titles: &[String], minutes: i64) -> String {
    let label = bucket.label();
    let dur = fmt_duration(minutes);
    match titles {
        [] => format!("[BLOCK] {label} (pull-forward) ({dur})"),
        [a] => format!("[BLOCK] {label}: {a} ({dur})"),
        [a, b] => format!("[BLOCK] {label}: {a}; {b} ({dur})"),
        [a, b, rest @ ..] => {
            format!("[BLOCK] {label}: {a}; {b} +{} more ({dur})", rest.len())
        }
    }
}

fn reflow_description(bucket: Bucket, ids: &[String], titles: &[String]) -> String {
    let pairs: Vec<String> = ids
        .iter()
        .zip(titles)
        .map(|(id, title)| format!("{id} :: {title}"))
        .collect();
    format!(
        "Auto-reflowed block (finished early).\nBucket: {bucket}\nPulled forward:\n  - {}",
        pairs.join("\n  - ")
    )
}

/// Shorten the block containing "now" and refill the freed tail with the
/// next tasks from the same bucket.
pub async fn reflow_now(
    calendar: &dyn CalendarSource,
    calendar_id: &str,
    tasks: &GroupedTasks,
    now: DateTime<Utc>,
    params: &ReflowParams,
) -> AppResult<ReflowOutcome> {
    let events = calendar
        .list_events(
            calendar_id,
            now - Duration::hours(SEARCH_WINDOW_HOURS),
            now + Duration::hours(SEARCH_WINDOW_HOURS),
        )
        .await?;

    let current = events.iter().find(|event| {
        if !event.is_generated() {
            return false;
        }
        let start = event.start.as_ref().and_then(|t| t.date_time);
        let end = event.end.as_ref().and_then(|t| t.date_time);
        matches!((start, end), (Some(s), Some(e)) if s <= now && now < e)
    });

    let Some(current) = current else {
        return Ok(ReflowOutcome::NoCurrentBlock);
    };
    let Some(event_id) = current.id.clone() else {
        return Ok(ReflowOutcome::NoCurrentBlock);
    };
    let Some(end) = current.end.as_ref().and_then(|t| t.date_time) else {
        return Ok(ReflowOutcome::NoCurrentBlock);
    };

    let remaining_minutes = (end - now).num_minutes();
    if remaining_minutes < params.min_chunk as i64 {
        return Ok(ReflowOutcome::BelowMinChunk { remaining_minutes });
    }

    let Some(bucket) = current
        .private_prop(PROP_BLOCK_TYPE)
        .and_then(|b| b.parse::<Bucket>().ok())
    else {
        tracing::warn!("Current block {} has no usable bucket marker", event_id);
        return Ok(ReflowOutcome::NoCurrentBlock);
    };

    let exclude: HashSet<String> = current
        .private_prop(PROP_TASK_IDS)
        .map(|s| {
            s.split(',')
                .filter(|x| !x.is_empty())
                .map(|x| x.to_string())
                .collect()
        })
        .unwrap_or_default();

    let (task_ids, task_titles) = pick_next_tasks(
        tasks,
        bucket,
        remaining_minutes as u32,
        &exclude,
        params.per_task_cap,
    );
    if task_ids.is_empty() {
        return Ok(ReflowOutcome::NoCandidates);
    }

    if params.dry_run {
        return Ok(ReflowOutcome::Reflowed {
            bucket,
            shortened_event_id: event_id,
            new_event_id: None,
            task_ids,
            task_titles,
            remaining_minutes,
            dry_run: true,
        });
    }

    calendar
        .patch_event(
            calendar_id,
            &event_id,
            &serde_json::json!({
                "end": {"dateTime": now.to_rfc3339(), "timeZone": "UTC"}
            }),
        )
        .await?;

    let new_event = CalendarEvent {
        summary: Some(reflow_summary(bucket, &task_titles, remaining_minutes)),
        description: Some(reflow_description(bucket, &task_ids, &task_titles)),
        start: Some(EventTime::at(now)),
        end: Some(EventTime::at(end)),
        ..CalendarEvent::default()
    }
    .with_private_props([
        (PROP_GENERATED.to_string(), "true".to_string()),
        (PROP_VERSION.to_string(), GENERATOR_VERSION.to_string()),
        (PROP_BLOCK_TYPE.to_string(), bucket.to_string()),
        (PROP_TASK_IDS.to_string(), task_ids.join(",")),
        (
            PROP_IDEM.to_string(),
            format!("reflow:{}:{}", bucket, now.to_rfc3339()),
        ),
    ]);

    let created = calendar.insert_event(calendar_id, &new_event).await?;

    Ok(ReflowOutcome::Reflowed {
        bucket,
        shortened_event_id: event_id,
        new_event_id: created.id,
        task_ids,
        task_titles,
        remaining_minutes,
        dry_run: false,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::scheduler::task_source::FlexTask;

    use super::*;

    struct FakeCalendar {
        events: Mutex<Vec<CalendarEvent>>,
        next_id: Mutex<u32>,
    }

    impl FakeCalendar {
        fn with_events(events: Vec<CalendarEvent>) -> Self {
            FakeCalendar {
                events: Mutex::new(events),
                next_id: Mutex::new(100),
            }
        }

        fn snapshot(&self) -> Vec<CalendarEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CalendarSource for FakeCalendar {
        async fn list_events(
            &self,
            _calendar_id: &str,
            time_min: DateTime<Utc>,
            time_max: DateTime<Utc>,
        ) -> AppResult<Vec<CalendarEvent>> {
            Ok(self
                .snapshot()
                .into_iter()
                .filter(|e| {
                    let start = e.start.as_ref().and_then(|t| t.date_time);
                    let end = e.end.as_ref().and_then(|t| t.date_time);
                    matches!((start, end), (Some(s), Some(e2)) if e2 > time_min && s < time_max)
                })
                .collect())
        }

        async fn insert_event(
            &self,
            _calendar_id: &str,
            event: &CalendarEvent,
        ) -> AppResult<CalendarEvent> {
            let mut stored = event.clone();
            let mut next = self.next_id.lock().unwrap();
            stored.id = Some(format!("ev{}", *next));
            *next += 1;
            self.events.lock().unwrap().push(stored.clone());
            Ok(stored)
        }

        async fn patch_event(
            &self,
            _calendar_id: &str,
            event_id: &str,
            fields: &serde_json::Value,
        ) -> AppResult<CalendarEvent> {
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id.as_deref() == Some(event_id))
                .expect("patch target exists");
            if let Some(end) = fields.get("end") {
                event.end = Some(serde_json::from_value(end.clone()).unwrap());
            }
            Ok(event.clone())
        }

        async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> AppResult<()> {
            self.events
                .lock()
                .unwrap()
                .retain(|e| e.id.as_deref() != Some(event_id));
            Ok(())
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 4, h, m, 0).unwrap()
    }

    fn current_block() -> CalendarEvent {
        CalendarEvent {
            id: Some("E".to_string()),
            summary: Some("[BLOCK] Client Deep Work: T1 (2h)".to_string()),
            start: Some(EventTime::at(at(10, 0))),
            end: Some(EventTime::at(at(12, 0))),
            ..CalendarEvent::default()
        }
        .with_private_props([
            (PROP_GENERATED.to_string(), "true".to_string()),
            (
                PROP_BLOCK_TYPE.to_string(),
                "client_deep_work".to_string(),
            ),
            (PROP_TASK_IDS.to_string(), "T1".to_string()),
        ])
    }

    fn client_tasks() -> GroupedTasks {
        GroupedTasks::new(vec![
            FlexTask {
                id: "T2".to_string(),
                title: "T2".to_string(),
                bucket: Bucket::ClientDeepWork,
                remaining_minutes: 60,
                due: None,
                priority: Some(1),
            },
            FlexTask {
                id: "T3".to_string(),
                title: "T3".to_string(),
                bucket: Bucket::ClientDeepWork,
                remaining_minutes: 30,
                due: None,
                priority: Some(2),
            },
        ])
    }

    #[tokio::test]
    async fn test_reflow_shortens_and_refills() {
        let calendar = FakeCalendar::with_events(vec![current_block()]);
        let outcome = reflow_now(
            &calendar,
            "suggestions",
            &client_tasks(),
            at(10, 45),
            &ReflowParams::default(),
        )
        .await
        .unwrap();

        let ReflowOutcome::Reflowed {
            bucket,
            shortened_event_id,
            new_event_id,
            task_ids,
            remaining_minutes,
            ..
        } = outcome
        else {
            panic!("expected a reflow");
        };
        assert_eq!(bucket, Bucket::ClientDeepWork);
        assert_eq!(shortened_event_id, "E");
        assert_eq!(task_ids, vec!["T2", "T3"]);
        assert_eq!(remaining_minutes, 75);

        let events = calendar.snapshot();
        let original = events.iter().find(|e| e.id.as_deref() == Some("E")).unwrap();
        assert_eq!(
            original.end.as_ref().unwrap().date_time.unwrap(),
            at(10, 45)
        );

        let new_id = new_event_id.unwrap();
        let created = events
            .iter()
            .find(|e| e.id.as_deref() == Some(new_id.as_str()))
            .unwrap();
        assert_eq!(created.start.as_ref().unwrap().date_time.unwrap(), at(10, 45));
        assert_eq!(created.end.as_ref().unwrap().date_time.unwrap(), at(12, 0));
        assert_eq!(created.private_prop(PROP_TASK_IDS), Some("T2,T3"));
        assert!(created
            .private_prop(PROP_IDEM)
            .unwrap()
            .starts_with("reflow:client_deep_work:"));
    }

    #[tokio::test]
    async fn test_reflow_noop_below_min_chunk() {
        let calendar = FakeCalendar::with_events(vec![current_block()]);
        let outcome = reflow_now(
            &calendar,
            "suggestions",
            &client_tasks(),
            at(11, 50),
            &ReflowParams::default(),
        )
        .await
        .unwrap();
        assert!(matches!(
            outcome,
            ReflowOutcome::BelowMinChunk {
                remaining_minutes: 10
            }
        ));
        // untouched
        let events = calendar.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].end.as_ref().unwrap().date_time.unwrap(),
            at(12, 0)
        );
    }

    #[tokio::test]
    async fn test_reflow_noop_without_candidates() {
        let calendar = FakeCalendar::with_events(vec![current_block()]);
        // the only candidates are already claimed by the block
        let tasks = GroupedTasks::new(vec![FlexTask {
            id: "T1".to_string(),
            title: "T1".to_string(),
            bucket: Bucket::ClientDeepWork,
            remaining_minutes: 60,
            due: None,
            priority: None,
        }]);
        let outcome = reflow_now(
            &calendar,
            "suggestions",
            &tasks,
            at(10, 45),
            &ReflowParams::default(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ReflowOutcome::NoCandidates));
        assert_eq!(calendar.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_reflow_ignores_foreign_events() {
        let mut foreign = current_block();
        foreign.extended_properties = None;
        let calendar = FakeCalendar::with_events(vec![foreign]);
        let outcome = reflow_now(
            &calendar,
            "suggestions",
            &client_tasks(),
            at(10, 45),
            &ReflowParams::default(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ReflowOutcome::NoCurrentBlock));
    }

    #[test]
    fn test_pick_next_tasks_applies_cap_and_exclusion() {
        let tasks = GroupedTasks::new(vec![
            FlexTask {
                id: "big".to_string(),
                title: "big".to_string(),
                bucket: Bucket::AdminProcessing,
                remaining_minutes: 500,
                due: None,
                priority: Some(1),
            },
            FlexTask {
                id: "skip".to_string(),
                title: "skip".to_string(),
                bucket: Bucket::AdminProcessing,
                remaining_minutes: 500,
                due: None,
                priority: Some(2),
            },
            FlexTask {
                id: "small".to_string(),
                title: "small".to_string(),
                bucket: Bucket::AdminProcessing,
                remaining_minutes: 20,
                due: None,
                priority: Some(3),
            },
        ]);
        let exclude: HashSet<String> = ["skip".to_string()].into_iter().collect();
        let (ids, _) = pick_next_tasks(&tasks, Bucket::AdminProcessing, 90, &exclude, 60);
        // big capped at 60, then small takes 20; skip excluded
        assert_eq!(ids, vec!["big", "small"]);
    }

    #[test]
    fn test_reflow_summary_formats() {
        let titles = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            reflow_summary(Bucket::Personal, &titles(&[]), 45),
            "[BLOCK] Personal (pull-forward) (45m)"
        );
        assert_eq!(
            reflow_summary(Bucket::Personal, &titles(&["a"]), 45),
            "[BLOCK] Personal: a (45m)"
        );
        assert_eq!(
            reflow_summary(Bucket::Personal, &titles(&["a", "b"]), 75),
            "[BLOCK] Personal: a; b (1h 15m)"
        );
        assert_eq!(
            reflow_summary(Bucket::Personal, &titles(&["a", "b", "c", "d"]), 120),
            "[BLOCK] Personal: a; b +2 more (2h)"
        );
    }
}
