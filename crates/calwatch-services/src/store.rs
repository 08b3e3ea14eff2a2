//! Channel persistence.
//!
//! `ChannelStore` is the only shared mutable state in the service. Writers may
//! race (a renewal and a directory-triggered create for the same calendar);
//! the last write wins and the stale sweep removes leftovers.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::channel::{Channel, ChannelKind, WebhookUrls};
use crate::error::{StoreError, StoreResult};

/// Storage backend for channel records.
pub trait ChannelStore: Send + Sync {
    fn find_by_channel_id(&self, channel_id: &str) -> StoreResult<Option<Channel>>;

    /// The tracked event channel for a calendar. When a race left more than one,
    /// the one expiring last wins.
    fn find_event_channel(&self, calendar_id: &str) -> StoreResult<Option<Channel>>;

    fn find_directory_channel(&self) -> StoreResult<Option<Channel>>;

    /// Insert or replace by channel id.
    fn save(&self, channel: &Channel) -> StoreResult<()>;

    /// Returns whether a record was removed.
    fn remove(&self, channel_id: &str) -> StoreResult<bool>;

    /// Channels that are expired or point at a callback that is no longer configured.
    fn find_stale(&self, now: DateTime<Utc>, webhooks: &WebhookUrls) -> StoreResult<Vec<Channel>>;

    fn remove_stale(&self, now: DateTime<Utc>, webhooks: &WebhookUrls) -> StoreResult<usize>;

    /// Advance the cursor after a sync. Returns false when the channel is gone.
    fn update_sync_token(&self, channel_id: &str, sync_token: &str) -> StoreResult<bool>;

    fn list(&self) -> StoreResult<Vec<Channel>>;
}

const CHANNEL_COLUMNS: &str =
    "channel_id, resource_type, calendar_id, resource_id, sync_token, expiration, webhook_url";

const STALE_PREDICATE: &str = "expiration <= ?1
    OR (resource_type = 'event' AND webhook_url != ?2)
    OR (resource_type = 'directory' AND webhook_url != ?3)";

/// A `channels` row before it is checked.
struct StoredChannel {
    channel_id: String,
    resource_type: String,
    calendar_id: Option<String>,
    resource_id: String,
    sync_token: Option<String>,
    expiration_ms: i64,
    webhook_url: String,
}

impl TryFrom<StoredChannel> for Channel {
    type Error = StoreError;

    fn try_from(row: StoredChannel) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            channel_id: row.channel_id.clone(),
            reason: reason.to_string(),
        };

        let kind = ChannelKind::from_parts(&row.resource_type, row.calendar_id.clone())
            .ok_or_else(|| corrupt("unknown resource type or missing calendar id"))?;
        let expiration = DateTime::from_timestamp_millis(row.expiration_ms)
            .ok_or_else(|| corrupt("expiration out of range"))?;

        Ok(Channel {
            channel_id: row.channel_id,
            kind,
            resource_id: row.resource_id,
            sync_token: row.sync_token,
            expiration,
            webhook_url: row.webhook_url,
        })
    }
}

/// SQLite-backed channel store.
///
/// Every call is a short synchronous query run on the caller's thread; the
/// connection lock must never be held across an `.await`.
pub struct SqliteChannelStore {
    conn: Mutex<Connection>,
}

impl SqliteChannelStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                channel_id TEXT PRIMARY KEY,
                resource_type TEXT NOT NULL,
                calendar_id TEXT,
                resource_id TEXT NOT NULL,
                sync_token TEXT,
                expiration INTEGER NOT NULL,
                webhook_url TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_channels_calendar ON channels(calendar_id);
            CREATE INDEX IF NOT EXISTS idx_channels_type ON channels(resource_type);
            "#,
        )?;
        Ok(())
    }

    fn read_row(row: &rusqlite::Row) -> rusqlite::Result<StoredChannel> {
        Ok(StoredChannel {
            channel_id: row.get(0)?,
            resource_type: row.get(1)?,
            calendar_id: row.get(2)?,
            resource_id: row.get(3)?,
            sync_token: row.get(4)?,
            expiration_ms: row.get(5)?,
            webhook_url: row.get(6)?,
        })
    }

    fn query_one<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Option<Channel>> {
        let conn = self.conn.lock();
        let row = conn.query_row(sql, params, Self::read_row).optional()?;
        row.map(Channel::try_from).transpose()
    }

    fn query_many<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Channel>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Channel::try_from).collect()
    }
}

impl ChannelStore for SqliteChannelStore {
    fn find_by_channel_id(&self, channel_id: &str) -> StoreResult<Option<Channel>> {
        self.query_one(
            &format!("SELECT {} FROM channels WHERE channel_id = ?1", CHANNEL_COLUMNS),
            params![channel_id],
        )
    }

    fn find_event_channel(&self, calendar_id: &str) -> StoreResult<Option<Channel>> {
        self.query_one(
            &format!(
                "SELECT {} FROM channels
                 WHERE resource_type = 'event' AND calendar_id = ?1
                 ORDER BY expiration DESC LIMIT 1",
                CHANNEL_COLUMNS
            ),
            params![calendar_id],
        )
    }

    fn find_directory_channel(&self) -> StoreResult<Option<Channel>> {
        self.query_one(
            &format!(
                "SELECT {} FROM channels
                 WHERE resource_type = 'directory'
                 ORDER BY expiration DESC LIMIT 1",
                CHANNEL_COLUMNS
            ),
            [],
        )
    }

    fn save(&self, channel: &Channel) -> StoreResult<()> {
        self.conn.lock().execute(
            &format!(
                "INSERT OR REPLACE INTO channels ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                CHANNEL_COLUMNS
            ),
            params![
                channel.channel_id,
                channel.kind.resource_type(),
                channel.kind.calendar_id(),
                channel.resource_id,
                channel.sync_token,
                channel.expiration.timestamp_millis(),
                channel.webhook_url,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, channel_id: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM channels WHERE channel_id = ?1", params![channel_id])?;
        Ok(removed > 0)
    }

    fn find_stale(&self, now: DateTime<Utc>, webhooks: &WebhookUrls) -> StoreResult<Vec<Channel>> {
        self.query_many(
            &format!("SELECT {} FROM channels WHERE {}", CHANNEL_COLUMNS, STALE_PREDICATE),
            params![now.timestamp_millis(), webhooks.events, webhooks.users],
        )
    }

    fn remove_stale(&self, now: DateTime<Utc>, webhooks: &WebhookUrls) -> StoreResult<usize> {
        let removed = self.conn.lock().execute(
            &format!("DELETE FROM channels WHERE {}", STALE_PREDICATE),
            params![now.timestamp_millis(), webhooks.events, webhooks.users],
        )?;
        Ok(removed)
    }

    fn update_sync_token(&self, channel_id: &str, sync_token: &str) -> StoreResult<bool> {
        let updated = self.conn.lock().execute(
            "UPDATE channels SET sync_token = ?2 WHERE channel_id = ?1",
            params![channel_id, sync_token],
        )?;
        Ok(updated > 0)
    }

    fn list(&self) -> StoreResult<Vec<Channel>> {
        self.query_many(
            &format!("SELECT {} FROM channels ORDER BY expiration", CHANNEL_COLUMNS),
            [],
        )
    }
}
