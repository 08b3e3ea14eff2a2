//! Error types for the lease manager, sync engine and normalization pipeline.

use calwatch_calendar::CalendarError;
use thiserror::Error;

use crate::channel::ChannelKind;

/// Errors from the channel record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be mapped back to a channel.
    #[error("Corrupt channel record {channel_id}: {reason}")]
    Corrupt { channel_id: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum LeaseError {
    /// The provider refused or kept failing the subscription after all retries.
    #[error("Failed to create {kind} channel: {source}")]
    CreationFailed {
        kind: ChannelKind,
        #[source]
        source: CalendarError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid account email: {0:?}")]
    InvalidEmail(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to list directory accounts: {0}")]
    Directory(#[source] CalendarError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
