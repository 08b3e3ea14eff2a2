//! Webhook and liveness handlers.
//!
//! Both webhook routes answer the provider immediately; any sync or channel
//! creation they trigger runs in a spawned task.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use calwatch_services::{ChannelKind, StoreError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::notification::{parse_headers, CanonicalHeaders, ResourceState};
use crate::AppState;

/// Why a notification was refused.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("request is not a watch notification")]
    NotWatchNotification,

    #[error("unsupported resource state: {0}")]
    UnsupportedState(ResourceState),

    #[error("channel {0} is not a known directory channel")]
    UnknownDirectoryChannel(String),

    #[error("invalid notification body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("channel store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = match &self {
            NotificationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Body of a directory `create` notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    primary_email: String,
}

fn watch_channel(headers: &CanonicalHeaders) -> Result<String, NotificationError> {
    match (&headers.channel_id, &headers.resource_id) {
        (Some(channel_id), Some(_)) => Ok(channel_id.clone()),
        _ => Err(NotificationError::NotWatchNotification),
    }
}

pub async fn root_handler() -> &'static str {
    "Google integration is running."
}

pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// `POST /watch/events`
///
/// - 200 on `sync` (the channel handshake)
/// - 200 on `exists`, after spawning the sync for that channel
/// - 400 for anything else, or when the channel headers are missing
pub async fn events_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, NotificationError> {
    let headers = parse_headers(&headers);
    let channel_id = watch_channel(&headers)?;

    match headers.state() {
        ResourceState::Sync => {
            info!(channel_id = %channel_id, "Channel established");
            Ok(StatusCode::OK)
        }
        ResourceState::Exists => {
            debug!(
                channel_id = %channel_id,
                message_number = ?headers.message_number,
                "Change notification"
            );
            let engine = app_state.sync_engine().clone();
            tokio::spawn(async move {
                if let Err(e) = engine.handle_change(&channel_id).await {
                    error!(channel_id = %channel_id, error = %e, "Failed to sync changes");
                }
            });
            Ok(StatusCode::OK)
        }
        other => {
            warn!(channel_id = %channel_id, state = %other, "Ignoring event notification");
            Err(NotificationError::UnsupportedState(other))
        }
    }
}

/// `POST /watch/users`
///
/// A `create` notification starts watching the new user's calendar, but only
/// when it arrives on a directory channel this service created.
pub async fn users_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, NotificationError> {
    let headers = parse_headers(&headers);

    if headers.state() == ResourceState::Sync {
        info!(channel_id = ?headers.channel_id, "Directory channel established");
        return Ok(StatusCode::OK);
    }

    let channel_id = watch_channel(&headers)?;
    let state = headers.state();
    if state != ResourceState::Create {
        return Err(NotificationError::UnsupportedState(state));
    }

    let lease = app_state.lease_manager();
    let is_directory_channel = lease
        .store()
        .find_by_channel_id(&channel_id)?
        .is_some_and(|channel| channel.kind == ChannelKind::Directory);
    if !is_directory_channel {
        warn!(channel_id = %channel_id, "User notification on unknown channel");
        return Err(NotificationError::UnknownDirectoryChannel(channel_id));
    }

    let user: NewUser = serde_json::from_slice(&body)?;
    info!(user = %user.primary_email, "New directory user, watching calendar");

    let lease = lease.clone();
    tokio::spawn(async move {
        let kind = ChannelKind::event(&user.primary_email);
        if let Err(e) = lease.ensure(&kind).await {
            error!(user = %user.primary_email, error = %e, "Failed to watch new user");
        }
    });

    Ok(StatusCode::OK)
}
