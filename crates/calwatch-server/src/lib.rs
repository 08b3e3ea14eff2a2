//! HTTP front end for calwatch.
//!
//! # Endpoints
//!
//! - `POST /watch/events` - calendar change notifications
//! - `POST /watch/users` - directory notifications (new accounts)
//! - `GET /` - liveness text
//! - `GET /health` - returns 200 if the server is running

use std::sync::Arc;

use calwatch_core::config::{EVENTS_ROUTE, USERS_ROUTE};
use calwatch_services::{LeaseManager, SyncEngine};

pub mod notification;
pub mod routes;

pub use notification::{parse_headers, CanonicalHeaders, ResourceState};
pub use routes::{events_handler, health_handler, root_handler, users_handler, NotificationError};

/// Shared application state, handed to every handler through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    sync_engine: Arc<SyncEngine>,
    lease_manager: Arc<LeaseManager>,
}

impl AppState {
    pub fn new(sync_engine: Arc<SyncEngine>, lease_manager: Arc<LeaseManager>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                sync_engine,
                lease_manager,
            }),
        }
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.inner.sync_engine
    }

    /// Also the way handlers reach the channel store.
    pub fn lease_manager(&self) -> &Arc<LeaseManager> {
        &self.inner.lease_manager
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(EVENTS_ROUTE, post(events_handler))
        .route(USERS_ROUTE, post(users_handler))
        .with_state(app_state)
}
