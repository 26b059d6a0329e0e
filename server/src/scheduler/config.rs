use std::collections::HashMap;

use anyhow::Context;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::buckets::Bucket;

/// Time-of-day categories a bucket may be placed into. `Gaps` means "any
/// leftover slot"; `PersonalWindow` restricts placement to the configured
/// personal windows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Placement {
    Morning,
    MidMorning,
    EarlyAfternoon,
    Afternoon,
    LateAfternoon,
    Gaps,
    PersonalWindow,
}

/// Categorize a candidate start time.
pub fn time_of_day(t: NaiveTime) -> Placement {
    let half_ten = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
    let eleven = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
    let half_two = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
    let half_four = NaiveTime::from_hms_opt(16, 30, 0).unwrap();

    if t < half_ten {
        Placement::Morning
    } else if t < eleven {
        Placement::MidMorning
    } else if t < half_two {
        Placement::EarlyAfternoon
    } else if t < half_four {
        Placement::Afternoon
    } else {
        Placement::LateAfternoon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        TimeWindow { start, end }
    }
}

#[derive(Debug, Clone)]
pub struct BucketRules {
    pub duration_min: u32,
    pub duration_max: u32,
    pub placements: Vec<Placement>,
    pub cap_per_day: u32,
}

impl BucketRules {
    pub fn allows(&self, tod: Placement) -> bool {
        self.placements.contains(&tod) || self.placements.contains(&Placement::Gaps)
    }
}

#[derive(Debug, Clone)]
pub struct HardRules {
    pub min_contiguous_minutes_for_systems: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub core_hours: TimeWindow,
    pub personal_windows: HashMap<Weekday, Vec<TimeWindow>>,
    pub weekly_weights: HashMap<Bucket, u32>,
    pub buckets: HashMap<Bucket, BucketRules>,
    pub hard_rules: HardRules,
}

impl SchedulerConfig {
    pub fn bucket_rules(&self, bucket: Bucket) -> &BucketRules {
        &self.buckets[&bucket]
    }

    pub fn weekly_weight(&self, bucket: Bucket) -> u32 {
        self.weekly_weights.get(&bucket).copied().unwrap_or(0)
    }

    /// Blocks-per-week weight scaled to an N-day window, rounding up.
    pub fn scaled_target(&self, bucket: Bucket, window_days: u32) -> u32 {
        (self.weekly_weight(bucket) * window_days).div_ceil(7)
    }

    pub fn personal_windows_for(&self, weekday: Weekday) -> &[TimeWindow] {
        self.personal_windows
            .get(&weekday)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Load overrides from a `scheduler.toml` via the config crate.
    pub fn from_file(path: &str) -> anyhow::Result<SchedulerConfig> {
        let raw: RawSchedulerConfig = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .context("reading scheduler config")?
            .try_deserialize()
            .context("deserializing scheduler config")?;
        raw.try_into()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();

        let weekday_windows = vec![
            TimeWindow::new(t(6, 0), t(8, 0)),
            TimeWindow::new(t(17, 30), t(21, 0)),
        ];
        let weekend_windows = vec![TimeWindow::new(t(8, 0), t(20, 0))];
        let personal_windows = [
            (Weekday::Mon, weekday_windows.clone()),
            (Weekday::Tue, weekday_windows.clone()),
            (Weekday::Wed, weekday_windows.clone()),
            (Weekday::Thu, weekday_windows.clone()),
            (Weekday::Fri, weekday_windows),
            (Weekday::Sat, weekend_windows.clone()),
            (Weekday::Sun, weekend_windows),
        ]
        .into_iter()
        .collect();

        let weekly_weights = [
            (Bucket::ClientDeepWork, 5),
            (Bucket::SystemsDevelopment, 3),
            (Bucket::MarketingCreative, 2),
            (Bucket::AdminProcessing, 5),
            (Bucket::Personal, 4),
        ]
        .into_iter()
        .collect();

        let buckets = [
            (
                Bucket::ClientDeepWork,
                BucketRules {
                    duration_min: 60,
                    duration_max: 120,
                    placements: vec![
                        Placement::Morning,
                        Placement::MidMorning,
                        Placement::EarlyAfternoon,
                        Placement::Afternoon,
                        Placement::Gaps,
                    ],
                    cap_per_day: 2,
                },
            ),
            (
                Bucket::SystemsDevelopment,
                BucketRules {
                    duration_min: 120,
                    duration_max: 180,
                    placements: vec![Placement::Morning, Placement::MidMorning],
                    cap_per_day: 1,
                },
            ),
            (
                Bucket::MarketingCreative,
                BucketRules {
                    duration_min: 45,
                    duration_max: 90,
                    placements: vec![Placement::EarlyAfternoon, Placement::Afternoon],
                    cap_per_day: 1,
                },
            ),
            (
                Bucket::AdminProcessing,
                BucketRules {
                    duration_min: 30,
                    duration_max: 60,
                    placements: vec![Placement::LateAfternoon, Placement::Gaps],
                    cap_per_day: 2,
                },
            ),
            (
                Bucket::Personal,
                BucketRules {
                    duration_min: 30,
                    duration_max: 90,
                    placements: vec![Placement::PersonalWindow],
                    cap_per_day: 2,
                },
            ),
        ]
        .into_iter()
        .collect();

        SchedulerConfig {
            core_hours: TimeWindow::new(t(9, 0), t(17, 30)),
            personal_windows,
            weekly_weights,
            buckets,
            hard_rules: HardRules {
                min_contiguous_minutes_for_systems: 120,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// File representation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawWindow {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct RawBucketRules {
    duration_min: u32,
    duration_max: u32,
    placements: Vec<Placement>,
    cap_per_day: u32,
}

#[derive(Debug, Deserialize)]
struct RawHardRules {
    min_contiguous_minutes_for_systems: u32,
}

#[derive(Debug, Deserialize)]
struct RawSchedulerConfig {
    core_hours: RawWindow,
    #[serde(default)]
    personal_windows: HashMap<String, Vec<RawWindow>>,
    weights: HashMap<Bucket, u32>,
    buckets: HashMap<Bucket, RawBucketRules>,
    hard_rules: RawHardRules,
}

fn parse_hhmm(value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("invalid HH:MM time: {value:?}"))
}

fn parse_weekday(key: &str) -> anyhow::Result<Weekday> {
    match key.trim().to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        other => anyhow::bail!("unknown weekday key: {other:?}"),
    }
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = anyhow::Error;

    fn try_from(raw: RawWindow) -> anyhow::Result<TimeWindow> {
        let start = parse_hhmm(&raw.start)?;
        let end = parse_hhmm(&raw.end)?;
        anyhow::ensure!(start < end, "window start must precede end");
        Ok(TimeWindow { start, end })
    }
}

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawSchedulerConfig) -> anyhow::Result<SchedulerConfig> {
        let defaults = SchedulerConfig::default();

        let mut personal_windows = HashMap::new();
        for (key, windows) in raw.personal_windows {
            let weekday = parse_weekday(&key)?;
            let windows = windows
                .into_iter()
                .map(TimeWindow::try_from)
                .collect::<anyhow::Result<Vec<_>>>()?;
            personal_windows.insert(weekday, windows);
        }

        let mut buckets = defaults.buckets;
        for (bucket, rules) in raw.buckets {
            anyhow::ensure!(
                rules.duration_min <= rules.duration_max,
                "duration_min exceeds duration_max for {bucket}"
            );
            buckets.insert(
                bucket,
                BucketRules {
                    duration_min: rules.duration_min,
                    duration_max: rules.duration_max,
                    placements: rules.placements,
                    cap_per_day: rules.cap_per_day,
                },
            );
        }

        Ok(SchedulerConfig {
            core_hours: raw.core_hours.try_into()?,
            personal_windows,
            weekly_weights: raw.weights,
            buckets,
            hard_rules: HardRules {
                min_contiguous_minutes_for_systems: raw
                    .hard_rules
                    .min_contiguous_minutes_for_systems,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_boundaries() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(time_of_day(t(9, 0)), Placement::Morning);
        assert_eq!(time_of_day(t(10, 29)), Placement::Morning);
        assert_eq!(time_of_day(t(10, 30)), Placement::MidMorning);
        assert_eq!(time_of_day(t(10, 59)), Placement::MidMorning);
        assert_eq!(time_of_day(t(11, 0)), Placement::EarlyAfternoon);
        assert_eq!(time_of_day(t(14, 29)), Placement::EarlyAfternoon);
        assert_eq!(time_of_day(t(14, 30)), Placement::Afternoon);
        assert_eq!(time_of_day(t(16, 29)), Placement::Afternoon);
        assert_eq!(time_of_day(t(16, 30)), Placement::LateAfternoon);
        assert_eq!(time_of_day(t(23, 0)), Placement::LateAfternoon);
    }

    #[test]
    fn test_scaled_target_rounds_up() {
        let cfg = SchedulerConfig::default();
        // personal weight 4, 14-day window: ceil(4 * 14 / 7) = 8
        assert_eq!(cfg.scaled_target(Bucket::Personal, 14), 8);
        // 10-day window: ceil(40 / 7) = 6
        assert_eq!(cfg.scaled_target(Bucket::Personal, 10), 6);
        assert_eq!(cfg.scaled_target(Bucket::Personal, 7), 4);
    }

    #[test]
    fn test_bucket_allows_gaps() {
        let cfg = SchedulerConfig::default();
        let admin = cfg.bucket_rules(Bucket::AdminProcessing);
        assert!(admin.allows(Placement::Morning)); // via gaps
        let systems = cfg.bucket_rules(Bucket::SystemsDevelopment);
        assert!(systems.allows(Placement::Morning));
        assert!(!systems.allows(Placement::Afternoon));
    }
}
