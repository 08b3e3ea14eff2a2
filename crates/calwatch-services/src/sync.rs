//! Turns a change notification into a published batch of events.

use std::sync::Arc;

use calwatch_calendar::{CalendarClient, CalendarError, ChangeFeedPage};
use tracing::instrument;

use crate::bus::EventBus;
use crate::channel::Channel;
use crate::error::SyncError;
use crate::pipeline::{parse_events, remove_non_capable_attendees, DedupCache};
use crate::store::ChannelStore;

pub struct SyncEngine {
    calendar: Arc<CalendarClient>,
    store: Arc<dyn ChannelStore>,
    dedup: DedupCache,
    bus: EventBus,
}

impl SyncEngine {
    pub fn new(
        calendar: Arc<CalendarClient>,
        store: Arc<dyn ChannelStore>,
        dedup: DedupCache,
        bus: EventBus,
    ) -> Self {
        Self {
            calendar,
            store,
            dedup,
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Pull the delta behind a notification on `channel_id` and publish it.
    ///
    /// Returns the number of events published. Unknown channels (usually one
    /// that was just replaced by a renewal) are ignored.
    #[instrument(skip(self), level = "info")]
    pub async fn handle_change(&self, channel_id: &str) -> Result<usize, SyncError> {
        let Some(channel) = self.store.find_by_channel_id(channel_id)? else {
            tracing::debug!("No record for channel; it has likely been replaced");
            return Ok(0);
        };

        let Some(calendar_id) = channel.kind.calendar_id() else {
            tracing::debug!(kind = %channel.kind, "Change notification on a non-event channel");
            return Ok(0);
        };

        let page = self.read_changes(&channel, calendar_id).await?;
        let next_sync_token = page.next_sync_token.clone();

        // The cursor only moves once the page is known to be usable.
        let events = parse_events(page)?;

        if let Some(sync_token) = &next_sync_token {
            if !self.store.update_sync_token(channel_id, sync_token)? {
                tracing::debug!("Channel removed before its cursor could be advanced");
            }
        }

        let events = remove_non_capable_attendees(events);
        let events = self.dedup.check_against_cache(events);

        if events.is_empty() {
            tracing::debug!(calendar_id, "No new changes to publish");
            return Ok(0);
        }

        let count = events.len();
        self.bus.publish(events);
        tracing::info!(calendar_id, count, "Published calendar changes");
        Ok(count)
    }

    /// Incremental read from the stored cursor; a full resync when the cursor
    /// is missing or the provider has expired it.
    async fn read_changes(
        &self,
        channel: &Channel,
        calendar_id: &str,
    ) -> Result<ChangeFeedPage, CalendarError> {
        match self
            .calendar
            .incremental_sync(calendar_id, channel.sync_token.as_deref())
            .await
        {
            Ok(page) => Ok(page),
            Err(e @ (CalendarError::CursorInvalid | CalendarError::MissingCursor { .. })) => {
                tracing::warn!(calendar_id, reason = %e, "Falling back to full sync");
                self.calendar.full_sync(calendar_id).await
            }
            Err(e) => Err(e),
        }
    }
}
