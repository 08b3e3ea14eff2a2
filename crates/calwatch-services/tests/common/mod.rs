#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use calwatch_auth::StaticTokenProvider;
use calwatch_calendar::{CalendarClient, DirectoryClient, DirectoryTarget};
use calwatch_services::{
    DedupCache, EventBus, LeaseManager, LeaseSettings, RetryPolicy, SqliteChannelStore, SyncEngine,
    WebhookUrls,
};
use chrono::Utc;
use wiremock::{MockServer, Request, ResponseTemplate};

pub const EVENTS_HOOK: &str = "https://hooks.example.com/watch/events";
pub const USERS_HOOK: &str = "https://hooks.example.com/watch/users";

pub struct Harness {
    pub calendar: Arc<CalendarClient>,
    pub directory: Arc<DirectoryClient>,
    pub store: Arc<SqliteChannelStore>,
    pub lease: Arc<LeaseManager>,
    pub engine: SyncEngine,
}

pub fn harness(server: &MockServer) -> Harness {
    let tokens = Arc::new(StaticTokenProvider::new("test_token"));
    let calendar = Arc::new(CalendarClient::with_base_url(tokens.clone(), &server.uri()));
    let directory = Arc::new(DirectoryClient::with_base_url(
        tokens,
        DirectoryTarget::Domain("pallet.town".into()),
        &server.uri(),
    ));
    let store = Arc::new(SqliteChannelStore::in_memory().unwrap());

    let settings = LeaseSettings {
        webhooks: WebhookUrls {
            events: EVENTS_HOOK.into(),
            users: USERS_HOOK.into(),
        },
        ttl_secs: 3600,
        renewal_margin: Duration::from_secs(5),
        retry: RetryPolicy::new(2, 1, 5),
    };
    let lease = Arc::new(LeaseManager::new(
        calendar.clone(),
        directory.clone(),
        store.clone(),
        settings,
    ));
    let engine = SyncEngine::new(
        calendar.clone(),
        store.clone(),
        DedupCache::default(),
        EventBus::default(),
    );

    Harness {
        calendar,
        directory,
        store,
        lease,
        engine,
    }
}

/// Echo the requested channel id back, expiring in an hour.
pub fn echo_watch(request: &Request) -> ResponseTemplate {
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let id = body["id"].as_str().unwrap().to_string();
    let expiration = (Utc::now() + chrono::Duration::hours(1)).timestamp_millis();
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": id,
        "resourceId": format!("res-{}", id),
        "expiration": expiration.to_string(),
    }))
}

pub fn encoded(calendar_id: &str) -> String {
    calendar_id.replace('@', "%40")
}
