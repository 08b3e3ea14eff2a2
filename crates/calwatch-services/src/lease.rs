//! Channel lease management: create, persist and keep renewing push channels.
//!
//! Each tracked [`ChannelKey`] has at most one renewal task. The task sleeps
//! until shortly before the channel expires, replaces it with a new one and
//! loops with the replacement. A failed replacement ends the chain; the next
//! bootstrap pass picks the calendar up again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use calwatch_calendar::{CalendarClient, CalendarError, DirectoryClient, WatchRequest};
use calwatch_core::Config;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::channel::{Channel, ChannelKey, ChannelKind, WebhookUrls};
use crate::error::LeaseError;
use crate::retry::{retry_with, RetryPolicy};
use crate::store::ChannelStore;

/// Default lead time before expiration at which a channel is replaced.
pub const DEFAULT_RENEWAL_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LeaseSettings {
    pub webhooks: WebhookUrls,
    /// Requested channel lifetime.
    pub ttl_secs: u64,
    pub renewal_margin: Duration,
    /// Applied to the subscription request only.
    pub retry: RetryPolicy,
}

impl LeaseSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            webhooks: WebhookUrls {
                events: config.google.events_webhook_url(),
                users: config.google.users_webhook_url(),
            },
            ttl_secs: config.channels.ttl_secs,
            renewal_margin: Duration::from_secs(config.channels.renewal_margin_secs),
            retry: RetryPolicy::from_config(&config.channels),
        }
    }
}

pub struct LeaseManager {
    calendar: Arc<CalendarClient>,
    directory: Arc<DirectoryClient>,
    store: Arc<dyn ChannelStore>,
    settings: LeaseSettings,
    renewals: Mutex<HashMap<ChannelKey, CancellationToken>>,
    shutdown: CancellationToken,
}

impl LeaseManager {
    pub fn new(
        calendar: Arc<CalendarClient>,
        directory: Arc<DirectoryClient>,
        store: Arc<dyn ChannelStore>,
        settings: LeaseSettings,
    ) -> Self {
        Self {
            calendar,
            directory,
            store,
            settings,
            renewals: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &LeaseSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ChannelStore> {
        &self.store
    }

    /// Subscribe a new channel with the provider.
    ///
    /// Event channels also get a fresh sync token; the watch request and the
    /// full sync run concurrently and both must succeed.
    pub async fn create(&self, kind: &ChannelKind) -> Result<Channel, LeaseError> {
        self.subscribe(kind, None).await
    }

    /// Like [`create`](Self::create), but an event channel given `cursor`
    /// resumes from it instead of fetching a fresh sync token.
    #[instrument(skip(self, kind, cursor), fields(kind = %kind), level = "info")]
    async fn subscribe(
        &self,
        kind: &ChannelKind,
        cursor: Option<String>,
    ) -> Result<Channel, LeaseError> {
        let channel_id = kind.new_channel_id();
        let webhook_url = self.settings.webhooks.for_kind(kind);
        let request = WatchRequest::web_hook(&channel_id, webhook_url, self.settings.ttl_secs);
        let fallback_expiration =
            Utc::now() + chrono::Duration::seconds(self.settings.ttl_secs as i64);

        let created = match kind {
            ChannelKind::Event { calendar_id } => {
                let watch = retry_with(
                    &self.settings.retry,
                    || self.calendar.watch_events(calendar_id, &request),
                    CalendarError::is_retryable,
                );
                match cursor {
                    Some(cursor) => watch.await.map(|response| (response, Some(cursor))),
                    None => {
                        let fresh = self.calendar.get_sync_token(calendar_id);
                        tokio::try_join!(watch, fresh)
                            .map(|(response, token)| (response, Some(token)))
                    }
                }
            }
            ChannelKind::Directory => retry_with(
                &self.settings.retry,
                || self.directory.watch_users(&request),
                CalendarError::is_retryable,
            )
            .await
            .map(|response| (response, None)),
        };

        let (response, sync_token) = created.map_err(|source| LeaseError::CreationFailed {
            kind: kind.clone(),
            source,
        })?;

        let channel = Channel::from_watch(
            kind.clone(),
            response,
            webhook_url,
            sync_token,
            fallback_expiration,
        );
        tracing::info!(
            channel_id = %channel.channel_id,
            expiration = %channel.expiration,
            "Channel created"
        );
        Ok(channel)
    }

    /// Persist a channel record, replacing any with the same channel id.
    pub fn save(&self, channel: Channel) -> Result<Channel, LeaseError> {
        self.store.save(&channel)?;
        Ok(channel)
    }

    /// Replace `channel` with a freshly created one: create, save, then delete
    /// the old record.
    ///
    /// An event channel keeps its stored sync token, so changes not yet read
    /// through the old channel are picked up by the next sync.
    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id), level = "info")]
    pub async fn renew_once(&self, channel: &Channel) -> Result<Channel, LeaseError> {
        let next = self.save(
            self.subscribe(&channel.kind, channel.sync_token.clone())
                .await?,
        )?;

        if !self.store.remove(&channel.channel_id)? {
            tracing::debug!("Previous channel record was already gone");
        }

        tracing::info!(
            kind = %channel.kind,
            old_channel_id = %channel.channel_id,
            new_channel_id = %next.channel_id,
            "Channel renewed"
        );
        Ok(next)
    }

    /// Keep `channel` alive until shutdown. Replaces any renewal chain already
    /// running for the same key.
    pub fn renew(self: &Arc<Self>, channel: Channel) -> JoinHandle<()> {
        let token = self.shutdown.child_token();
        if let Some(previous) = self
            .renewals
            .lock()
            .insert(channel.key().clone(), token.clone())
        {
            previous.cancel();
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.renewal_loop(channel, token).await })
    }

    async fn renewal_loop(&self, mut channel: Channel, token: CancellationToken) {
        loop {
            let delay =
                calwatch_core::time::renewal_delay(channel.expiration, self.settings.renewal_margin);
            tracing::debug!(
                kind = %channel.kind,
                channel_id = %channel.channel_id,
                delay_secs = delay.as_secs(),
                "Renewal scheduled"
            );

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(channel_id = %channel.channel_id, "Renewal cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.renew_once(&channel).await {
                Ok(next) => channel = next,
                Err(e) => {
                    tracing::error!(
                        kind = %channel.kind,
                        calendar_id = channel.kind.calendar_id().unwrap_or("-"),
                        channel_id = %channel.channel_id,
                        error = %e,
                        "Channel renewal failed; coverage lapses until the next bootstrap"
                    );
                    self.forget(channel.key(), &token);
                    return;
                }
            }
        }
    }

    /// Drop the registry entry for `key` unless a newer chain has taken it over.
    fn forget(&self, key: &ChannelKey, token: &CancellationToken) {
        let mut renewals = self.renewals.lock();
        if !token.is_cancelled() {
            renewals.remove(key);
        }
    }

    /// Create, save and start renewing a channel.
    pub async fn start(self: &Arc<Self>, kind: &ChannelKind) -> Result<Channel, LeaseError> {
        let channel = self.save(self.create(kind).await?)?;
        self.renew(channel.clone());
        Ok(channel)
    }

    /// Resume renewal of the stored channel for `kind`, or start a new one.
    pub async fn ensure(self: &Arc<Self>, kind: &ChannelKind) -> Result<Channel, LeaseError> {
        let existing = match kind {
            ChannelKind::Event { calendar_id } => self.store.find_event_channel(calendar_id)?,
            ChannelKind::Directory => self.store.find_directory_channel()?,
        };

        match existing {
            Some(channel) => {
                tracing::debug!(channel_id = %channel.channel_id, "Resuming existing channel");
                self.renew(channel.clone());
                Ok(channel)
            }
            None => self.start(kind).await,
        }
    }

    pub fn is_renewing(&self, key: &ChannelKey) -> bool {
        self.renewals
            .lock()
            .get(key)
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn active_renewals(&self) -> usize {
        self.renewals
            .lock()
            .values()
            .filter(|token| !token.is_cancelled())
            .count()
    }

    /// Cancel every renewal task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let count = self.renewals.lock().drain().count();
        tracing::info!(count, "Channel renewals stopped");
    }
}
