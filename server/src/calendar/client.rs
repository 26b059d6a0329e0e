use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use leaky_bucket::RateLimiter;

use crate::{
    api_quota::{CALENDAR_API_QUOTA, CALENDAR_QUOTA_PER_SECOND},
    error::{AppError, AppResult},
    http_retry::send_with_retry,
};

use super::types::{CalendarEvent, EventsPage};

const CALENDAR_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3";

/// The calendar capabilities the scheduler and reflow controller need.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>>;

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> AppResult<CalendarEvent>;

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        fields: &serde_json::Value,
    ) -> AppResult<CalendarEvent>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()>;
}

pub struct CalendarClient {
    http_client: reqwest::Client,
    access_token: String,
    rate_limiter: RateLimiter,
}

impl CalendarClient {
    pub fn new(http_client: reqwest::Client, access_token: String) -> CalendarClient {
        let rate_limiter = RateLimiter::builder()
            .initial(CALENDAR_QUOTA_PER_SECOND)
            .interval(Duration::from_secs(1))
            .refill(CALENDAR_QUOTA_PER_SECOND)
            .build();

        CalendarClient {
            http_client,
            access_token,
            rate_limiter,
        }
    }

    fn events_url(calendar_id: &str) -> String {
        format!("{CALENDAR_ENDPOINT}/calendars/{calendar_id}/events")
    }

    fn event_url(calendar_id: &str, event_id: &str) -> String {
        format!("{CALENDAR_ENDPOINT}/calendars/{calendar_id}/events/{event_id}")
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl CalendarSource for CalendarClient {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            self.rate_limiter
                .acquire(CALENDAR_API_QUOTA.events_list)
                .await;

            let mut params = vec![
                ("timeMin".to_string(), rfc3339(time_min)),
                ("timeMax".to_string(), rfc3339(time_max)),
                ("singleEvents".to_string(), "true".to_string()),
                ("orderBy".to_string(), "startTime".to_string()),
                ("maxResults".to_string(), "2500".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken".to_string(), token.clone()));
            }

            let resp = send_with_retry(
                self.http_client
                    .get(Self::events_url(calendar_id))
                    .query(&params)
                    .bearer_auth(&self.access_token),
            )
            .await
            .map_err(AppError::Internal)?
            .error_for_status()?;

            let page = resp
                .json::<EventsPage>()
                .await
                .context("decoding events page")?;
            events.extend(page.items.unwrap_or_default());

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(events)
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> AppResult<CalendarEvent> {
        self.rate_limiter
            .acquire(CALENDAR_API_QUOTA.events_write)
            .await;

        let resp = send_with_retry(
            self.http_client
                .post(Self::events_url(calendar_id))
                .bearer_auth(&self.access_token)
                .json(event),
        )
        .await
        .map_err(AppError::Internal)?
        .error_for_status()?;

        let created = resp
            .json::<CalendarEvent>()
            .await
            .context("decoding inserted event")?;
        Ok(created)
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        fields: &serde_json::Value,
    ) -> AppResult<CalendarEvent> {
        self.rate_limiter
            .acquire(CALENDAR_API_QUOTA.events_write)
            .await;

        let resp = send_with_retry(
            self.http_client
                .patch(Self::event_url(calendar_id, event_id))
                .bearer_auth(&self.access_token)
                .json(fields),
        )
        .await
        .map_err(AppError::Internal)?
        .error_for_status()?;

        let patched = resp
            .json::<CalendarEvent>()
            .await
            .context("decoding patched event")?;
        Ok(patched)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()> {
        self.rate_limiter
            .acquire(CALENDAR_API_QUOTA.events_write)
            .await;

        send_with_retry(
            self.http_client
                .delete(Self::event_url(calendar_id, event_id))
                .bearer_auth(&self.access_token),
        )
        .await
        .map_err(AppError::Internal)?
        .error_for_status()?;

        Ok(())
    }
}
