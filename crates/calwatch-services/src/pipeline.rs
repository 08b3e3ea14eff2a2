//! Event normalization and semantic deduplication.
//!
//! Everything here is free of I/O. A change-feed page goes through
//! [`parse_events`], [`remove_non_capable_attendees`] and finally
//! [`DedupCache::check_against_cache`] before it is published.

use std::collections::HashMap;
use std::time::Duration;

use calwatch_calendar::{CalendarEvent, ChangeFeedPage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;
use crate::expiring::ExpiringMap;

/// Default lifetime of a dedup cache entry.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(30);

/// A provider event stamped with the account it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    #[serde(flatten)]
    pub event: CalendarEvent,
    pub calendar_id: String,
    pub user_id: String,
}

/// Keep only the last occurrence of each event id, in feed order.
pub fn filter_for_latest_events(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut last_index: HashMap<String, usize> = HashMap::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        last_index.insert(event.id.clone(), index);
    }

    events
        .into_iter()
        .enumerate()
        .filter(|(index, event)| last_index.get(&event.id) == Some(index))
        .map(|(_, event)| event)
        .collect()
}

/// Local part of an account email: everything before the first `@`.
pub fn parse_user_id_from_email(email: &str) -> Result<&str, NormalizeError> {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => Ok(local),
        _ => Err(NormalizeError::InvalidEmail(email.to_string())),
    }
}

/// Deduplicate a page by id and stamp each event with its calendar and user.
///
/// An empty page yields an empty batch.
pub fn parse_events(page: ChangeFeedPage) -> Result<Vec<NormalizedEvent>, NormalizeError> {
    if page.items.is_empty() {
        return Ok(Vec::new());
    }

    let calendar_id = page.summary;
    let user_id = parse_user_id_from_email(&calendar_id)?.to_string();

    Ok(filter_for_latest_events(page.items)
        .into_iter()
        .map(|event| NormalizedEvent {
            event,
            calendar_id: calendar_id.clone(),
            user_id: user_id.clone(),
        })
        .collect())
}

/// Keep events that guests may modify or that the calendar owner created.
pub fn remove_non_capable_attendees(events: Vec<NormalizedEvent>) -> Vec<NormalizedEvent> {
    events
        .into_iter()
        .filter(|e| {
            e.event.guests_can_modify == Some(true)
                || e.event.creator_email() == Some(e.calendar_id.as_str())
        })
        .collect()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: String,
    updated: Option<DateTime<Utc>>,
}

/// Serialized form used for change comparison: volatile fields blanked,
/// attendees collapsed to a count.
fn snapshot(event: &NormalizedEvent) -> String {
    let mut value = serde_json::to_value(event).unwrap_or(Value::Null);

    if let Value::Object(map) = &mut value {
        for field in ["userId", "calendarId", "htmlLink"] {
            map.insert(field.to_string(), Value::String(String::new()));
        }
        let attendees = event.event.attendees.as_ref().map_or(0, Vec::len);
        map.insert("attendees".to_string(), Value::from(attendees));
    }

    value.to_string()
}

/// Short-lived memory of recently published events, keyed by event id.
pub struct DedupCache {
    entries: Mutex<ExpiringMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(ExpiringMap::new()),
            ttl,
        }
    }

    /// Drop events that are older than, or identical to, what was seen recently.
    pub fn check_against_cache(&self, events: Vec<NormalizedEvent>) -> Vec<NormalizedEvent> {
        let mut entries = self.entries.lock();
        entries.purge_expired();

        events
            .into_iter()
            .filter(|event| {
                let incoming = CacheEntry {
                    snapshot: snapshot(event),
                    updated: event.event.updated_at(),
                };

                if let Some(cached) = entries.get(&event.event.id) {
                    if let (Some(new), Some(old)) = (incoming.updated, cached.updated) {
                        if new < old {
                            tracing::debug!(event_id = %event.event.id, "Dropping stale event");
                            return false;
                        }
                    }
                    if cached.snapshot == incoming.snapshot {
                        tracing::debug!(event_id = %event.event.id, "Dropping duplicate event");
                        return false;
                    }
                }

                entries.insert(event.event.id.clone(), incoming, self.ttl);
                true
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use calwatch_calendar::EventPerson;

    fn event(id: &str, summary: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some(summary.to_string()),
            updated: Some("2024-02-01T10:00:00.000Z".to_string()),
            ..Default::default()
        }
    }

    fn normalized(event: CalendarEvent) -> NormalizedEvent {
        NormalizedEvent {
            event,
            calendar_id: "ash@pallet.town".into(),
            user_id: "ash".into(),
        }
    }

    #[test]
    fn test_filter_keeps_last_occurrence() {
        let events = vec![
            event("a", "a1"),
            event("b", "b1"),
            event("a", "a2"),
            event("c", "c1"),
            event("b", "b2"),
        ];

        let kept: Vec<_> = filter_for_latest_events(events)
            .into_iter()
            .map(|e| e.summary.unwrap())
            .collect();
        assert_eq!(kept, vec!["a2", "c1", "b2"]);
    }

    #[test]
    fn test_filter_no_duplicates_is_identity() {
        let events = vec![event("a", "a1"), event("b", "b1")];
        assert_eq!(filter_for_latest_events(events.clone()), events);
        assert!(filter_for_latest_events(vec![]).is_empty());
    }

    #[test]
    fn test_parse_user_id_from_email() {
        assert_eq!(parse_user_id_from_email("squirtle@live.com").unwrap(), "squirtle");
        assert_eq!(parse_user_id_from_email("a@b@c").unwrap(), "a");
        assert!(matches!(
            parse_user_id_from_email("no-at-sign"),
            Err(NormalizeError::InvalidEmail(_))
        ));
        assert!(parse_user_id_from_email("@live.com").is_err());
    }

    #[test]
    fn test_parse_events_stamps_calendar_and_user() {
        let page = ChangeFeedPage {
            summary: "squirtle@live.com".into(),
            items: vec![event("a", "a1"), event("a", "a2")],
            ..Default::default()
        };

        let events = parse_events(page).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].calendar_id, "squirtle@live.com");
        assert_eq!(events[0].user_id, "squirtle");
        assert_eq!(events[0].event.summary.as_deref(), Some("a2"));
    }

    #[test]
    fn test_parse_events_empty_page() {
        let page = ChangeFeedPage {
            summary: "not an email".into(),
            ..Default::default()
        };
        assert!(parse_events(page).unwrap().is_empty());
    }

    #[test]
    fn test_normalized_event_serializes_flat() {
        let value = serde_json::to_value(normalized(event("a", "Standup"))).unwrap();
        assert_eq!(value["id"], "a");
        assert_eq!(value["calendarId"], "ash@pallet.town");
        assert_eq!(value["userId"], "ash");
    }

    #[test]
    fn test_remove_non_capable_attendees() {
        let mut open = event("open", "guests can modify");
        open.guests_can_modify = Some(true);

        let mut owned = event("owned", "created by owner");
        owned.creator = Some(EventPerson {
            email: Some("ash@pallet.town".into()),
            ..Default::default()
        });

        let mut foreign = event("foreign", "created elsewhere");
        foreign.creator = Some(EventPerson {
            email: Some("gary@pallet.town".into()),
            ..Default::default()
        });

        let kept: Vec<_> = remove_non_capable_attendees(vec![
            normalized(open),
            normalized(owned),
            normalized(foreign),
            normalized(event("plain", "no flags")),
        ])
        .into_iter()
        .map(|e| e.event.id)
        .collect();

        assert_eq!(kept, vec!["open", "owned"]);
    }

    #[test]
    fn test_dedup_first_sighting_kept_repeat_dropped() {
        let cache = DedupCache::default();
        let batch = vec![normalized(event("a", "Standup"))];

        assert_eq!(cache.check_against_cache(batch.clone()).len(), 1);
        assert!(cache.check_against_cache(batch).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dedup_ignores_volatile_fields() {
        let cache = DedupCache::default();
        let first = normalized(event("a", "Standup"));

        let mut second = first.clone();
        second.event.html_link = Some("https://calendar.google.com/event?eid=other".into());
        second.user_id = "someone-else".into();
        second.event.attendees = Some(vec![serde_json::json!({"email": "x@y.z"})]);
        let mut third = second.clone();
        third.event.attendees = Some(vec![serde_json::json!({"email": "p@q.r"})]);

        assert_eq!(cache.check_against_cache(vec![first]).len(), 1);
        // Attendee count changed 0 -> 1.
        assert_eq!(cache.check_against_cache(vec![second]).len(), 1);
        // Same count, different attendee: not a semantic change.
        assert!(cache.check_against_cache(vec![third]).is_empty());
    }

    #[test]
    fn test_dedup_content_change_kept() {
        let cache = DedupCache::default();
        let first = normalized(event("a", "Standup"));
        let mut changed = first.clone();
        changed.event.summary = Some("Standup (moved)".into());
        changed.event.updated = Some("2024-02-01T10:05:00.000Z".into());

        assert_eq!(cache.check_against_cache(vec![first]).len(), 1);
        assert_eq!(cache.check_against_cache(vec![changed.clone()]).len(), 1);
        assert!(cache.check_against_cache(vec![changed]).is_empty());
    }

    #[test]
    fn test_dedup_stale_update_dropped() {
        let cache = DedupCache::default();
        let mut newer = normalized(event("a", "Standup v2"));
        newer.event.updated = Some("2024-02-01T11:00:00.000Z".into());
        let mut older = normalized(event("a", "Standup v1"));
        older.event.updated = Some("2024-02-01T10:00:00.000Z".into());

        assert_eq!(cache.check_against_cache(vec![newer]).len(), 1);
        assert!(cache.check_against_cache(vec![older]).is_empty());
    }

    #[test]
    fn test_dedup_unparsable_timestamp_never_stale() {
        let cache = DedupCache::default();
        let first = normalized(event("a", "Standup"));
        let mut garbled = normalized(event("a", "Standup, new room"));
        garbled.event.updated = Some("not a timestamp".into());

        assert_eq!(cache.check_against_cache(vec![first]).len(), 1);
        assert_eq!(cache.check_against_cache(vec![garbled]).len(), 1);
    }

    #[test]
    fn test_dedup_entries_expire() {
        let cache = DedupCache::new(Duration::ZERO);
        let batch = vec![normalized(event("a", "Standup"))];

        assert_eq!(cache.check_against_cache(batch.clone()).len(), 1);
        assert_eq!(cache.check_against_cache(batch).len(), 1);
    }
}
