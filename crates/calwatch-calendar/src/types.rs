//! Calendar and Directory API types.
//!
//! Events are kept close to the wire shape: the fields the pipeline inspects are
//! typed, everything else rides along in `extra` so a round trip through the
//! service loses nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Person reference on an event (creator, organizer).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPerson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Calendar event as returned by the events list endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<EventPerson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests_can_modify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    /// Last-modified time. `None` when absent or not RFC 3339.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn creator_email(&self) -> Option<&str> {
        self.creator.as_ref().and_then(|c| c.email.as_deref())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// One page of a calendar's change feed.
///
/// `summary` is the calendar id of the account the feed belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeedPage {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub items: Vec<CalendarEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchParams {
    /// Requested lifetime in seconds, as a string.
    pub ttl: String,
}

/// Body of a `watch` call registering a push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<WatchParams>,
}

impl WatchRequest {
    pub fn web_hook(id: impl Into<String>, address: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            id: id.into(),
            kind: "web_hook".to_string(),
            address: address.into(),
            params: Some(WatchParams {
                ttl: ttl_secs.to_string(),
            }),
        }
    }
}

/// Channel descriptor returned by a `watch` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub id: String,
    pub resource_id: String,
    #[serde(default)]
    pub resource_uri: Option<String>,
    /// Epoch milliseconds, as a string.
    #[serde(default)]
    pub expiration: Option<String>,
}

impl WatchResponse {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration
            .as_deref()
            .and_then(calwatch_core::time::parse_epoch_millis)
    }
}

/// Directory user; only the primary email matters here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub primary_email: String,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Identifies an event for update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub calendar_id: String,
    pub event_id: String,
}

impl EventRef {
    pub fn new(calendar_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// Partial event body sent with `PATCH`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct EventPatch(Map<String, Value>);

impl EventPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_event_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": "evt1",
            "status": "confirmed",
            "updated": "2024-02-01T10:00:00.000Z",
            "summary": "Standup",
            "location": "Room 4",
            "start": {"dateTime": "2024-02-01T10:00:00Z"},
            "creator": {"email": "misty@cerulean.gym", "self": true},
            "guestsCanModify": true,
            "attendees": [{"email": "brock@pewter.gym"}]
        });

        let event: CalendarEvent = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(event.creator_email(), Some("misty@cerulean.gym"));
        assert_eq!(event.guests_can_modify, Some(true));
        assert_eq!(event.extra.get("location"), Some(&Value::from("Room 4")));
        assert!(event.updated_at().is_some());

        assert_eq!(serde_json::to_value(&event).unwrap(), json);
    }

    #[test]
    fn test_updated_at_unparsable() {
        let event = CalendarEvent {
            id: "evt1".into(),
            updated: Some("yesterday-ish".into()),
            ..Default::default()
        };
        assert!(event.updated_at().is_none());
    }

    #[test]
    fn test_watch_request_shape() {
        let request = WatchRequest::web_hook("EVNT-1", "https://hooks.example.com/watch/events", 7200);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "web_hook");
        assert_eq!(value["params"]["ttl"], "7200");
    }

    #[test]
    fn test_watch_response_expiration() {
        let response: WatchResponse = serde_json::from_value(serde_json::json!({
            "kind": "api#channel",
            "id": "EVNT-1",
            "resourceId": "res-1",
            "resourceUri": "https://www.googleapis.com/calendar/v3/calendars/x/events",
            "expiration": "1479344706000"
        }))
        .unwrap();
        assert_eq!(response.expires_at().unwrap().timestamp_millis(), 1_479_344_706_000);
    }

    #[test]
    fn test_event_patch() {
        let patch = EventPatch::new().set("colorId", "9");
        assert!(!patch.is_empty());
        assert_eq!(patch.get("colorId"), Some(&Value::from("9")));
        assert!(EventPatch::new().is_empty());
    }
}
