//! Channel records: time-limited provider subscriptions.

use std::fmt;

use calwatch_calendar::WatchResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EVENT_PREFIX: &str = "EVNT-";
const DIRECTORY_PREFIX: &str = "DIR-";

/// What a channel watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "snake_case")]
pub enum ChannelKind {
    /// Changes to one account's primary calendar.
    Event { calendar_id: String },
    /// Accounts added to the directory.
    Directory,
}

/// Identity of a lease: at most one live channel is tracked per key.
pub type ChannelKey = ChannelKind;

impl ChannelKind {
    pub fn event(calendar_id: impl Into<String>) -> Self {
        Self::Event {
            calendar_id: calendar_id.into(),
        }
    }

    /// Value stored in the `resource_type` column.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Directory => "directory",
        }
    }

    pub fn calendar_id(&self) -> Option<&str> {
        match self {
            Self::Event { calendar_id } => Some(calendar_id),
            Self::Directory => None,
        }
    }

    /// Rebuild a kind from its stored columns.
    pub fn from_parts(resource_type: &str, calendar_id: Option<String>) -> Option<Self> {
        match (resource_type, calendar_id) {
            ("event", Some(calendar_id)) => Some(Self::Event { calendar_id }),
            ("directory", _) => Some(Self::Directory),
            _ => None,
        }
    }

    /// Fresh channel id, prefixed by kind.
    pub fn new_channel_id(&self) -> String {
        let prefix = match self {
            Self::Event { .. } => EVENT_PREFIX,
            Self::Directory => DIRECTORY_PREFIX,
        };
        format!("{}{}", prefix, uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event { calendar_id } => write!(f, "event({})", calendar_id),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// Callback URLs the provider should deliver to, per channel kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookUrls {
    pub events: String,
    pub users: String,
}

impl WebhookUrls {
    pub fn for_kind(&self, kind: &ChannelKind) -> &str {
        match kind {
            ChannelKind::Event { .. } => &self.events,
            ChannelKind::Directory => &self.users,
        }
    }
}

/// A live (or formerly live) push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    #[serde(flatten)]
    pub kind: ChannelKind,
    pub resource_id: String,
    pub sync_token: Option<String>,
    pub expiration: DateTime<Utc>,
    pub webhook_url: String,
}

impl Channel {
    /// Build a channel from the provider's answer to a watch call.
    ///
    /// Falls back to `fallback_expiration` when the provider omits one.
    pub fn from_watch(
        kind: ChannelKind,
        response: WatchResponse,
        webhook_url: &str,
        sync_token: Option<String>,
        fallback_expiration: DateTime<Utc>,
    ) -> Self {
        let expiration = response.expires_at().unwrap_or(fallback_expiration);
        Self {
            channel_id: response.id,
            kind,
            resource_id: response.resource_id,
            sync_token,
            expiration,
            webhook_url: webhook_url.to_string(),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.kind
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// Expired, or registered against a callback URL that is no longer configured.
    pub fn is_stale(&self, now: DateTime<Utc>, webhooks: &WebhookUrls) -> bool {
        self.is_expired(now) || self.webhook_url != webhooks.for_kind(&self.kind)
    }
}
