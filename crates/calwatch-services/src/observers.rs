//! Downstream consumers of published event batches.

use std::sync::Arc;

use async_trait::async_trait;
use calwatch_calendar::{CalendarClient, EventPatch, EventRef};
use calwatch_core::MeetingLinksConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, EventBatch};
use crate::pipeline::NormalizedEvent;

/// A subscriber to the event bus. Each observer runs in its own task, so a
/// slow observer only delays itself.
#[async_trait]
pub trait EventObserver: Send + Sync {
    fn name(&self) -> &str;

    async fn on_batch(&self, batch: &[NormalizedEvent]);
}

/// Subscribe `observer` to `bus` and drive it until `shutdown` fires or the bus closes.
pub fn spawn_observer(
    observer: Arc<dyn EventObserver>,
    bus: &EventBus,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        tracing::info!(observer = observer.name(), "Observer started");
        loop {
            let batch: EventBatch = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = subscription.recv() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };
            observer.on_batch(&batch).await;
        }
        tracing::info!(observer = observer.name(), "Observer stopped");
    })
}

/// Logs every event it sees.
#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl EventObserver for LoggingObserver {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_batch(&self, batch: &[NormalizedEvent]) {
        for event in batch {
            tracing::info!(
                calendar_id = %event.calendar_id,
                event_id = %event.event.id,
                status = event.event.status.as_deref().unwrap_or("-"),
                summary = event.event.summary.as_deref().unwrap_or(""),
                "Calendar event changed"
            );
        }
    }
}

const MEETING_MARKER: &str = "WebEx Details";

/// Adds a personal meeting-room link to confirmed events whose title carries
/// the configured tag (e.g. `@webex`), and recolors them.
pub struct MeetingLinkObserver {
    calendar: Arc<CalendarClient>,
    config: MeetingLinksConfig,
}

impl MeetingLinkObserver {
    pub fn new(calendar: Arc<CalendarClient>, config: MeetingLinksConfig) -> Self {
        Self { calendar, config }
    }

    fn wants(&self, event: &NormalizedEvent) -> bool {
        let tagged = event
            .event
            .summary
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(&self.config.tag.to_lowercase()));
        let confirmed = event.event.status.as_deref() == Some("confirmed");
        let linked = event
            .event
            .description
            .as_deref()
            .is_some_and(|d| d.contains(MEETING_MARKER));

        tagged && confirmed && !linked
    }

    /// Existing description followed by the meeting-room block.
    pub fn build_description(&self, existing: &str, user_id: &str) -> String {
        format!(
            "{}\n==== {}: Do Not Touch ====\nhttp://{}.webex.com/meet/{}",
            existing, MEETING_MARKER, self.config.site, user_id
        )
    }
}

#[async_trait]
impl EventObserver for MeetingLinkObserver {
    fn name(&self) -> &str {
        "meeting-links"
    }

    async fn on_batch(&self, batch: &[NormalizedEvent]) {
        for event in batch.iter().filter(|e| self.wants(e)) {
            let description =
                self.build_description(event.event.description.as_deref().unwrap_or(""), &event.user_id);
            let patch = EventPatch::new()
                .set("description", description)
                .set("colorId", self.config.color_id.as_str());

            let target = EventRef::new(&event.calendar_id, &event.event.id);
            match self.calendar.update_event(&target, &patch).await {
                Ok(_) => tracing::info!(
                    calendar_id = %event.calendar_id,
                    event_id = %event.event.id,
                    "Added meeting link"
                ),
                Err(e) => tracing::warn!(
                    calendar_id = %event.calendar_id,
                    event_id = %event.event.id,
                    error = %e,
                    reason = %e.user_message(),
                    "Failed to add meeting link"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use calwatch_auth::StaticTokenProvider;
    use calwatch_calendar::CalendarEvent;
    use parking_lot::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(id: &str, summary: &str, status: &str, description: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            event: CalendarEvent {
                id: id.into(),
                summary: Some(summary.into()),
                status: Some(status.into()),
                description: description.map(String::from),
                ..Default::default()
            },
            calendar_id: "ash@pallet.town".into(),
            user_id: "ash".into(),
        }
    }

    fn meeting_config() -> MeetingLinksConfig {
        MeetingLinksConfig {
            tag: "@webex".into(),
            site: "pallet".into(),
            color_id: "9".into(),
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventObserver for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_batch(&self, batch: &[NormalizedEvent]) {
            self.seen
                .lock()
                .extend(batch.iter().map(|e| e.event.id.clone()));
        }
    }

    #[tokio::test]
    async fn test_spawned_observer_receives_batches_until_shutdown() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        let handle = spawn_observer(recorder.clone(), &bus, shutdown.clone());

        bus.publish(vec![event("a", "x", "confirmed", None)]);
        bus.publish(vec![event("b", "x", "confirmed", None)]);

        for _ in 0..100 {
            if recorder.seen.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*recorder.seen.lock(), vec!["a", "b"]);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_build_description() {
        let server_less = MeetingLinkObserver::new(
            Arc::new(CalendarClient::new(Arc::new(StaticTokenProvider::new("t")))),
            meeting_config(),
        );
        assert_eq!(
            server_less.build_description("Agenda", "ash"),
            "Agenda\n==== WebEx Details: Do Not Touch ====\nhttp://pallet.webex.com/meet/ash"
        );
    }

    #[tokio::test]
    async fn test_meeting_link_added_to_tagged_confirmed_events() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/calendars/ash%40pallet.town/events/tagged"))
            .and(body_partial_json(serde_json::json!({"colorId": "9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "tagged"})))
            .expect(1)
            .mount(&server)
            .await;

        let calendar = Arc::new(CalendarClient::with_base_url(
            Arc::new(StaticTokenProvider::new("t")),
            &server.uri(),
        ));
        let observer = MeetingLinkObserver::new(calendar, meeting_config());

        observer
            .on_batch(&[
                event("tagged", "Sync @WebEx", "confirmed", Some("Agenda")),
                event("cancelled", "Sync @webex", "cancelled", None),
                event("linked", "Sync @webex", "confirmed", Some("x\n==== WebEx Details: Do Not Touch ====")),
                event("plain", "Lunch", "confirmed", None),
            ])
            .await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["description"]
            .as_str()
            .unwrap()
            .ends_with("http://pallet.webex.com/meet/ash"));
    }
}
