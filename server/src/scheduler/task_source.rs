use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db_core::prelude::*,
    error::AppResult,
};

use super::buckets::Bucket;

/// A flexible task the planner may time-box into a block.
#[derive(Debug, Clone)]
pub struct FlexTask {
    pub id: String,
    pub title: String,
    pub bucket: Bucket,
    pub remaining_minutes: u32,
    pub due: Option<DateTime<Utc>>,
    /// Lower is more urgent.
    pub priority: Option<i32>,
}

/// Tasks grouped per bucket, each bucket sorted by (priority, due) ascending
/// with the task id as a stable tiebreak.
#[derive(Debug, Clone, Default)]
pub struct GroupedTasks {
    buckets: HashMap<Bucket, Vec<FlexTask>>,
}

impl GroupedTasks {
    pub fn new(tasks: impl IntoIterator<Item = FlexTask>) -> Self {
        let mut buckets: HashMap<Bucket, Vec<FlexTask>> = HashMap::new();
        for task in tasks {
            buckets.entry(task.bucket).or_default().push(task);
        }
        for list in buckets.values_mut() {
            list.sort_by(|a, b| {
                let ka = (
                    a.priority.unwrap_or(99),
                    a.due.map(|d| d.timestamp_millis()).unwrap_or(0),
                );
                let kb = (
                    b.priority.unwrap_or(99),
                    b.due.map(|d| d.timestamp_millis()).unwrap_or(0),
                );
                ka.cmp(&kb).then_with(|| a.id.cmp(&b.id))
            });
        }
        GroupedTasks { buckets }
    }

    pub fn tasks(&self, bucket: Bucket) -> &[FlexTask] {
        self.buckets.get(&bucket).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn total_remaining(&self, bucket: Bucket) -> u32 {
        self.tasks(bucket).iter().map(|t| t.remaining_minutes).sum()
    }
}

/// Anything that can hand the planner its flexible backlog.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn grouped_tasks(&self) -> AppResult<GroupedTasks>;
}

/// Bucket assignment: canonical tag first, then the configured
/// label -> bucket map, then the admin default.
pub fn assign_bucket(
    tags: &[String],
    source_label: Option<&str>,
    label_map: &HashMap<String, Bucket>,
) -> Bucket {
    for tag in tags {
        if let Some(bucket) = Bucket::from_tag(tag) {
            return bucket;
        }
    }
    if let Some(label) = source_label {
        if let Some(bucket) = label_map.get(&label.to_lowercase()) {
            return *bucket;
        }
    }
    Bucket::AdminProcessing
}

fn priority_rank(priority: &str) -> i32 {
    match priority {
        "high" => 1,
        "normal" => 2,
        "low" => 3,
        _ => 2,
    }
}

/// Task source backed by the store: open email tasks that are not pinned to
/// a fixed date, bucketed via their client's tags and source label.
pub struct StoreTaskSource {
    conn: DatabaseConnection,
    label_map: HashMap<String, Bucket>,
    default_estimate_minutes: u32,
}

impl StoreTaskSource {
    pub fn new(conn: DatabaseConnection) -> Self {
        StoreTaskSource {
            conn,
            label_map: HashMap::new(),
            default_estimate_minutes: 30,
        }
    }

    pub fn with_label_map(mut self, label_map: HashMap<String, Bucket>) -> Self {
        self.label_map = label_map
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self
    }
}

#[async_trait]
impl TaskSource for StoreTaskSource {
    async fn grouped_tasks(&self) -> AppResult<GroupedTasks> {
        let rows = EmailTask::find()
            .filter(email_task::Column::Status.eq("open"))
            .find_also_related(TaskMeta)
            .all(&self.conn)
            .await?;

        let mut client_tags: HashMap<String, Vec<String>> = HashMap::new();
        for client in Client::find()
            .filter(client::Column::Active.eq(true))
            .all(&self.conn)
            .await?
        {
            client_tags.insert(client.id, client.tags);
        }

        let mut tasks = Vec::new();
        for (task, meta) in rows {
            // fixed commitments belong to the calendar, not the planner
            if let Some(meta) = &meta {
                if meta.task_type == "fixed_date" || meta.calendar_blocked {
                    continue;
                }
            }

            let tags = task
                .client_id
                .as_ref()
                .and_then(|id| client_tags.get(id))
                .cloned()
                .unwrap_or_default();
            let bucket = assign_bucket(&tags, task.source_label.as_deref(), &self.label_map);

            let due = meta
                .as_ref()
                .and_then(|m| m.due_at)
                .map(|d| d.with_timezone(&Utc));

            tasks.push(FlexTask {
                id: task.id,
                title: task.subject,
                bucket,
                remaining_minutes: self.default_estimate_minutes,
                due,
                priority: Some(priority_rank(&task.priority)),
            });
        }

        Ok(GroupedTasks::new(tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, bucket: Bucket, priority: Option<i32>, due_ms: Option<i64>) -> FlexTask {
        FlexTask {
            id: id.to_string(),
            title: format!("task {id}"),
            bucket,
            remaining_minutes: 30,
            due: due_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
            priority,
        }
    }

    #[test]
    fn test_grouped_tasks_sorts_by_priority_then_due() {
        let grouped = GroupedTasks::new(vec![
            task("c", Bucket::Personal, Some(2), Some(1_000)),
            task("a", Bucket::Personal, Some(1), Some(2_000)),
            task("b", Bucket::Personal, Some(1), Some(1_000)),
        ]);
        let order: Vec<&str> = grouped
            .tasks(Bucket::Personal)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_grouped_tasks_missing_priority_sorts_last() {
        let grouped = GroupedTasks::new(vec![
            task("a", Bucket::Personal, None, Some(1)),
            task("b", Bucket::Personal, Some(3), Some(1)),
        ]);
        let order: Vec<&str> = grouped
            .tasks(Bucket::Personal)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_assign_bucket_tag_wins() {
        let mut label_map = HashMap::new();
        label_map.insert("1- to respond".to_string(), Bucket::ClientDeepWork);
        assert_eq!(
            assign_bucket(
                &["systems".to_string()],
                Some("1- to respond"),
                &label_map
            ),
            Bucket::SystemsDevelopment
        );
    }

    #[test]
    fn test_assign_bucket_label_map_then_default() {
        let mut label_map = HashMap::new();
        label_map.insert("1- to respond".to_string(), Bucket::ClientDeepWork);
        assert_eq!(
            assign_bucket(&[], Some("1- To Respond"), &label_map),
            Bucket::ClientDeepWork
        );
        assert_eq!(
            assign_bucket(&[], Some("unmapped"), &label_map),
            Bucket::AdminProcessing
        );
        assert_eq!(assign_bucket(&[], None, &label_map), Bucket::AdminProcessing);
    }

    #[test]
    fn test_total_remaining() {
        let grouped = GroupedTasks::new(vec![
            task("a", Bucket::Personal, None, None),
            task("b", Bucket::Personal, None, None),
            task("c", Bucket::AdminProcessing, None, None),
        ]);
        assert_eq!(grouped.total_remaining(Bucket::Personal), 60);
        assert_eq!(grouped.total_remaining(Bucket::AdminProcessing), 30);
        assert_eq!(grouped.total_remaining(Bucket::ClientDeepWork), 0);
    }
}
