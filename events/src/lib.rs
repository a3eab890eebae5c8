//! Shared event and device types for the notification pipeline.
//!
//! This crate has no dependencies on the other internal crates so that the
//! cache, streaming, push and routing layers can all depend on it without
//! cycles.
//!
//! # Contents
//!
//! - **Event**: the payload delivered to a device, either over a push
//!   provider or over an open event stream
//! - **Device**: a device registration as seen by the delivery pipeline
//! - **DeviceDirectory**: the external store of device registrations

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub mod error;

pub use error::{Error, ErrorKind};

/// Kinds of events a device can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    MessageEnqueued,
    WebhooksUpdated,
    MessagesExportRequested,
    SettingsUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageEnqueued => "MessageEnqueued",
            EventType::WebhooksUpdated => "WebhooksUpdated",
            EventType::MessagesExportRequested => "MessagesExportRequested",
            EventType::SettingsUpdated => "SettingsUpdated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event addressed to one or more devices.
///
/// Serializes as `{"event": "<type>", "data": {...}}`, which is the JSON object
/// written to event streams and handed to push transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventType,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Event {
    pub fn new(event: EventType, data: BTreeMap<String, String>) -> Self {
        Self { event, data }
    }

    pub fn message_enqueued() -> Self {
        Self::new(EventType::MessageEnqueued, BTreeMap::new())
    }

    pub fn webhooks_updated() -> Self {
        Self::new(EventType::WebhooksUpdated, BTreeMap::new())
    }

    /// The device should export messages received in `[since, until]`.
    pub fn messages_export_requested(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        let mut data = BTreeMap::new();
        data.insert(
            "since".to_string(),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        data.insert(
            "until".to_string(),
            until.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        Self::new(EventType::MessagesExportRequested, data)
    }

    pub fn settings_updated() -> Self {
        Self::new(EventType::SettingsUpdated, BTreeMap::new())
    }

    pub fn event_type(&self) -> EventType {
        self.event
    }
}

/// A device registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub push_token: Option<String>,
}

impl Device {
    /// The push token, if the device registered a non-empty one.
    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref().filter(|token| !token.is_empty())
    }
}

/// External store of device registrations.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// All devices of `user_id`, narrowed to a single device when `device_id` is given.
    async fn select(&self, user_id: &str, device_id: Option<&str>) -> Result<Vec<Device>, Error>;

    /// Records last-seen timestamps keyed by device id.
    async fn set_last_seen(&self, last_seen: HashMap<String, DateTime<Utc>>) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_serializes_with_type_and_data() {
        let event = Event::message_enqueued();
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"MessageEnqueued","data":{}}"#);
    }

    #[test]
    fn export_event_carries_rfc3339_range() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 1, 2, 12, 30, 0).unwrap();

        let event = Event::messages_export_requested(since, until);

        assert_eq!(event.event_type(), EventType::MessagesExportRequested);
        assert_eq!(event.data["since"], "2024-01-01T00:00:00Z");
        assert_eq!(event.data["until"], "2024-01-02T12:30:00Z");
    }

    #[test]
    fn event_without_data_field_deserializes() {
        let event: Event = serde_json::from_str(r#"{"event":"SettingsUpdated"}"#).unwrap();
        assert_eq!(event, Event::settings_updated());
    }

    #[test]
    fn empty_push_token_is_treated_as_absent() {
        let device = Device {
            id: "d1".to_string(),
            push_token: Some(String::new()),
        };
        assert_eq!(device.push_token(), None);

        let device = Device {
            id: "d2".to_string(),
            push_token: Some("token".to_string()),
        };
        assert_eq!(device.push_token(), Some("token"));
    }
}
