//! Push notification headers.
//!
//! The provider delivers every change notification as an empty (events) or
//! small JSON (users) POST whose meaning lives entirely in `X-Goog-*` headers.

use std::fmt;

use axum::http::HeaderMap;

const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
const HEADER_CHANNEL_EXPIRATION: &str = "x-goog-channel-expiration";
const HEADER_MESSAGE_NUMBER: &str = "x-goog-message-number";
const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";
const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
const HEADER_RESOURCE_URI: &str = "x-goog-resource-uri";

/// The `X-Goog-*` headers of a notification. Absent or non-UTF-8 headers are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalHeaders {
    pub channel_id: Option<String>,
    pub expiration: Option<String>,
    pub message_number: Option<String>,
    pub resource_id: Option<String>,
    pub resource_state: Option<String>,
    pub resource_uri: Option<String>,
}

impl CanonicalHeaders {
    /// Both the channel and resource ids are present.
    pub fn is_watch_notification(&self) -> bool {
        self.channel_id.is_some() && self.resource_id.is_some()
    }

    pub fn state(&self) -> ResourceState {
        ResourceState::parse(self.resource_state.as_deref().unwrap_or_default())
    }
}

/// Value of `X-Goog-Resource-State`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Handshake sent once when a channel is established.
    Sync,
    /// A watched calendar changed.
    Exists,
    NotExists,
    /// A user was added to the directory.
    Create,
    Other(String),
}

impl ResourceState {
    pub fn parse(value: &str) -> Self {
        match value {
            "sync" => ResourceState::Sync,
            "exists" => ResourceState::Exists,
            "not_exists" => ResourceState::NotExists,
            "create" => ResourceState::Create,
            other => ResourceState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceState::Sync => write!(f, "sync"),
            ResourceState::Exists => write!(f, "exists"),
            ResourceState::NotExists => write!(f, "not_exists"),
            ResourceState::Create => write!(f, "create"),
            ResourceState::Other(other) => write!(f, "{}", other),
        }
    }
}

/// Read the canonical notification headers out of a request.
pub fn parse_headers(headers: &HeaderMap) -> CanonicalHeaders {
    CanonicalHeaders {
        channel_id: get_header(headers, HEADER_CHANNEL_ID),
        expiration: get_header(headers, HEADER_CHANNEL_EXPIRATION),
        message_number: get_header(headers, HEADER_MESSAGE_NUMBER),
        resource_id: get_header(headers, HEADER_RESOURCE_ID),
        resource_state: get_header(headers, HEADER_RESOURCE_STATE),
        resource_uri: get_header(headers, HEADER_RESOURCE_URI),
    }
}

pub fn is_watch_notification(headers: &CanonicalHeaders) -> bool {
    headers.is_watch_notification()
}

fn get_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use axum::http::HeaderValue;

    fn notification(state: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Goog-Channel-ID", HeaderValue::from_static("EVNT-1"));
        headers.insert(
            "X-Goog-Channel-Expiration",
            HeaderValue::from_static("Tue, 29 Oct 2026 20:32:02 GMT"),
        );
        headers.insert("X-Goog-Message-Number", HeaderValue::from_static("2"));
        headers.insert("X-Goog-Resource-ID", HeaderValue::from_static("res-1"));
        headers.insert("X-Goog-Resource-State", HeaderValue::from_str(state).unwrap());
        headers.insert(
            "X-Goog-Resource-URI",
            HeaderValue::from_static("https://www.googleapis.com/calendar/v3/calendars/ash/events"),
        );
        headers
    }

    #[test]
    fn test_parse_headers_reads_every_field() {
        let parsed = parse_headers(&notification("exists"));

        assert_eq!(parsed.channel_id.as_deref(), Some("EVNT-1"));
        assert_eq!(parsed.message_number.as_deref(), Some("2"));
        assert_eq!(parsed.resource_id.as_deref(), Some("res-1"));
        assert_eq!(parsed.resource_state.as_deref(), Some("exists"));
        assert!(parsed.expiration.is_some());
        assert!(parsed.resource_uri.unwrap().ends_with("/events"));
        assert!(is_watch_notification(&parse_headers(&notification("sync"))));
    }

    #[test]
    fn test_missing_headers_are_none() {
        let parsed = parse_headers(&HeaderMap::new());
        assert_eq!(parsed, CanonicalHeaders::default());
        assert!(!parsed.is_watch_notification());
        assert_eq!(parsed.state(), ResourceState::Other(String::new()));
    }

    #[test]
    fn test_channel_without_resource_is_not_a_notification() {
        let mut headers = notification("exists");
        headers.remove(HEADER_RESOURCE_ID);
        assert!(!parse_headers(&headers).is_watch_notification());
    }

    #[test]
    fn test_non_utf8_header_is_none() {
        let mut headers = notification("exists");
        headers.insert(
            HEADER_CHANNEL_ID,
            HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap(),
        );
        assert_eq!(parse_headers(&headers).channel_id, None);
    }

    #[test]
    fn test_resource_state_parse() {
        assert_eq!(ResourceState::parse("sync"), ResourceState::Sync);
        assert_eq!(ResourceState::parse("exists"), ResourceState::Exists);
        assert_eq!(ResourceState::parse("not_exists"), ResourceState::NotExists);
        assert_eq!(ResourceState::parse("create"), ResourceState::Create);
        assert_eq!(
            ResourceState::parse("update"),
            ResourceState::Other("update".into())
        );
        assert_eq!(ResourceState::NotExists.to_string(), "not_exists");
    }
}
