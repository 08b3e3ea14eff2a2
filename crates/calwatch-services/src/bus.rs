//! In-process fan-out of event batches to independent observers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::pipeline::NormalizedEvent;

/// Batches retained for slow subscribers before the oldest are dropped.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

pub type EventBatch = Arc<Vec<NormalizedEvent>>;

/// Every subscriber sees every batch in publish order. Publishing never waits
/// on subscribers; one that falls more than the capacity behind loses the
/// oldest batches.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventBatch>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a batch. Returns the number of subscribers it reached.
    pub fn publish(&self, events: Vec<NormalizedEvent>) -> usize {
        let count = events.len();
        match self.sender.send(Arc::new(events)) {
            Ok(receivers) => {
                tracing::debug!(events = count, receivers, "Published event batch");
                receivers
            }
            Err(_) => {
                tracing::debug!(events = count, "No subscribers for event batch");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct EventSubscription {
    receiver: broadcast::Receiver<EventBatch>,
}

impl EventSubscription {
    /// Next batch, skipping past any lost to lag. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventBatch> {
        loop {
            match self.receiver.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged; oldest batches dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use calwatch_calendar::CalendarEvent;

    fn batch(id: &str) -> Vec<NormalizedEvent> {
        vec![NormalizedEvent {
            event: CalendarEvent {
                id: id.to_string(),
                ..Default::default()
            },
            calendar_id: "ash@pallet.town".into(),
            user_id: "ash".into(),
        }]
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_batch_in_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(batch("a")), 2);
        assert_eq!(bus.publish(batch("b")), 2);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await.unwrap()[0].event.id, "a");
            assert_eq!(sub.recv().await.unwrap()[0].event.id, "b");
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(batch("a")), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        bus.publish(batch("a"));
        bus.publish(batch("b"));
        bus.publish(batch("c"));

        assert_eq!(sub.recv().await.unwrap()[0].event.id, "b");
        assert_eq!(sub.recv().await.unwrap()[0].event.id, "c");
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
