//! Channel lifecycle and change synchronization.
//!
//! [`LeaseManager`] keeps push channels alive, [`SyncEngine`] turns change
//! notifications into deduplicated [`NormalizedEvent`] batches, and
//! [`EventBus`] fans those batches out to [`EventObserver`]s.

pub mod bootstrap;
pub mod bus;
pub mod channel;
pub mod error;
pub mod expiring;
pub mod lease;
pub mod observers;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod sync;

pub use bootstrap::{Bootstrap, BootstrapReport};
pub use bus::{EventBatch, EventBus, EventSubscription};
pub use channel::{Channel, ChannelKey, ChannelKind, WebhookUrls};
pub use error::{BootstrapError, LeaseError, NormalizeError, StoreError, SyncError};
pub use expiring::ExpiringMap;
pub use lease::{LeaseManager, LeaseSettings};
pub use observers::{spawn_observer, EventObserver, LoggingObserver, MeetingLinkObserver};
pub use pipeline::{
    filter_for_latest_events, parse_events, parse_user_id_from_email,
    remove_non_capable_attendees, DedupCache, NormalizedEvent,
};
pub use retry::{retry_with, RetryPolicy};
pub use store::{ChannelStore, SqliteChannelStore};
pub use sync::SyncEngine;
