use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const PROP_GENERATED: &str = "helios_generated";
pub const PROP_VERSION: &str = "helios_version";
pub const PROP_BLOCK_TYPE: &str = "helios_block_type";
pub const PROP_TASK_IDS: &str = "helios_task_ids";
pub const PROP_IDEM: &str = "helios_idem";
pub const GENERATOR_VERSION: &str = "v1";

/// Either a timed instant or an all-day date, as the provider models it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(instant: DateTime<Utc>) -> Self {
        EventTime {
            date_time: Some(instant),
            date: None,
            time_zone: Some("UTC".to_string()),
        }
    }

    /// Concrete instant: timed events as-is, all-day events pinned to local
    /// midnight.
    pub fn resolve(&self, tz: Tz) -> Option<DateTime<Utc>> {
        if let Some(dt) = self.date_time {
            return Some(dt);
        }
        let date = self.date?;
        tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtendedProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<ExtendedProperties>,
}

impl CalendarEvent {
    pub fn private_prop(&self, key: &str) -> Option<&str> {
        self.extended_properties
            .as_ref()
            .and_then(|p| p.private.as_ref())
            .and_then(|m| m.get(key))
            .map(|s| s.as_str())
    }

    pub fn is_generated(&self) -> bool {
        self.private_prop(PROP_GENERATED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn with_private_props(
        mut self,
        props: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let ext = self.extended_properties.get_or_insert_with(Default::default);
        ext.private
            .get_or_insert_with(HashMap::new)
            .extend(props);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsPage {
    pub items: Option<Vec<CalendarEvent>>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_resolves_all_day_to_local_midnight() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let t = EventTime {
            date: Some(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()),
            ..EventTime::default()
        };
        // BST: local midnight is 23:00 UTC the previous day
        let resolved = t.resolve(tz).unwrap();
        assert_eq!(resolved.to_rfc3339(), "2025-06-30T23:00:00+00:00");
        assert!(t.is_all_day());
    }

    #[test]
    fn test_private_prop_round_trip() {
        let event = CalendarEvent::default().with_private_props([
            (PROP_GENERATED.to_string(), "true".to_string()),
            (PROP_BLOCK_TYPE.to_string(), "client_deep_work".to_string()),
        ]);
        assert!(event.is_generated());
        assert_eq!(
            event.private_prop(PROP_BLOCK_TYPE),
            Some("client_deep_work")
        );
        assert_eq!(event.private_prop(PROP_IDEM), None);
    }

    #[test]
    fn test_event_deserializes_provider_shape() {
        let event: CalendarEvent = serde_json::from_str(
            r#"{
                "id": "ev1",
                "summary": "[BLOCK] Admin Processing (30m)",
                "start": {"dateTime": "2025-08-04T09:00:00Z"},
                "end": {"dateTime": "2025-08-04T09:30:00Z"},
                "extendedProperties": {"private": {"helios_generated": "true"}}
            }"#,
        )
        .unwrap();
        assert!(event.is_generated());
        assert_eq!(
            event.start.unwrap().date_time.unwrap().to_rfc3339(),
            "2025-08-04T09:00:00+00:00"
        );
    }
}
