use std::{env, str::FromStr};

use chrono_tz::Tz;
use lazy_static::lazy_static;

use crate::scheduler::config::SchedulerConfig;

/// How the ingestion pipeline treats several emails in one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    PerEmail,
    PerThread,
}

impl FromStr for ThreadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_email" => Ok(ThreadMode::PerEmail),
            "per_thread" => Ok(ThreadMode::PerThread),
            other => Err(format!("unknown INGEST_THREAD_MODE: {other}")),
        }
    }
}

pub struct ServerConfig {
    pub timezone: Tz,
    pub triage_labels: Vec<String>,
    /// 0 means a full sweep with no `newer_than` bound.
    pub lookback_days: u32,
    pub thread_mode: ThreadMode,
    pub fixed_calendar_id: Option<String>,
    pub flexible_calendar_id: Option<String>,
    pub allowlist_cache_ttl_sec: u64,
    pub admin_token: Option<String>,
    pub mail_access_token: Option<String>,
    pub calendar_access_token: Option<String>,
    pub scheduler: SchedulerConfig,
}

impl ServerConfig {
    fn from_env() -> Self {
        let timezone = env::var("TIMEZONE")
            .unwrap_or_else(|_| "Europe/London".to_string())
            .parse::<Tz>()
            .expect("TIMEZONE is not a valid IANA zone");

        let triage_labels = env::var("MAIL_TRIAGE_LABELS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let lookback_days = env::var("MAIL_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let thread_mode = env::var("INGEST_THREAD_MODE")
            .ok()
            .map(|v| v.parse().expect("invalid INGEST_THREAD_MODE"))
            .unwrap_or(ThreadMode::PerEmail);

        let allowlist_cache_ttl_sec = env::var("ALLOWLIST_CACHE_TTL_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(21_600);

        let scheduler = match env::var("SCHEDULER_CONFIG_PATH") {
            Ok(path) => {
                SchedulerConfig::from_file(&path).expect("invalid scheduler config file")
            }
            Err(_) => SchedulerConfig::default(),
        };

        ServerConfig {
            timezone,
            triage_labels,
            lookback_days,
            thread_mode,
            fixed_calendar_id: env::var("FIXED_CALENDAR_ID").ok(),
            flexible_calendar_id: env::var("FLEXIBLE_CALENDAR_ID").ok(),
            allowlist_cache_ttl_sec,
            admin_token: env::var("ADMIN_TOKEN").ok(),
            mail_access_token: env::var("MAIL_ACCESS_TOKEN").ok(),
            calendar_access_token: env::var("CALENDAR_ACCESS_TOKEN").ok(),
            scheduler,
        }
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "timezone: {}, triage_labels: {:?}, lookback_days: {}, thread_mode: {:?}",
            self.timezone, self.triage_labels, self.lookback_days, self.thread_mode
        )
    }
}

lazy_static! {
    #[allow(non_upper_case_globals)]
    pub static ref cfg: ServerConfig = ServerConfig::from_env();
}
