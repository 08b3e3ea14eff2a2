//! Google Calendar API client: change feeds, event updates and push channels.

use std::sync::Arc;

use calwatch_auth::{AccessTokenProvider, Scope};
use chrono::Utc;
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::*;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: u32 = 250;

pub struct CalendarClient {
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
}

impl CalendarClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_base_url(tokens, CALENDAR_API_BASE)
    }

    pub fn with_base_url(tokens: Arc<dyn AccessTokenProvider>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn auth_header(&self) -> Result<String, CalendarError> {
        let token = self.tokens.access_token(Scope::Calendar).await?;
        Ok(format!("Bearer {}", token))
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    /// Read every page of a feed query. Returns the last page with the items of
    /// all pages concatenated in feed order.
    async fn read_feed(&self, first_url: &str) -> Result<ChangeFeedPage, CalendarError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = first_url.to_string();
            if let Some(pt) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
            }

            // Fresh token per page: a full sync of a busy calendar can outlive one.
            let response = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header().await?)
                .send()
                .await?;

            let mut page: ChangeFeedPage = handle_response(response).await?;
            items.append(&mut page.items);

            match page.next_page_token.take() {
                Some(next) => page_token = Some(next),
                None => {
                    page.items = items;
                    return Ok(page);
                }
            }
        }
    }

    /// List events from now on, following pagination to the end of the feed.
    /// The returned page carries the `nextSyncToken` for future incremental reads.
    #[instrument(skip(self), level = "info")]
    pub async fn full_sync(&self, calendar_id: &str) -> Result<ChangeFeedPage, CalendarError> {
        let url = format!(
            "{}?timeMin={}&singleEvents=false&maxResults={}",
            self.events_url(calendar_id),
            urlencoding::encode(&Utc::now().to_rfc3339()),
            PAGE_SIZE,
        );

        let page = self.read_feed(&url).await?;
        tracing::debug!(
            calendar_id,
            items = page.items.len(),
            has_sync_token = page.next_sync_token.is_some(),
            "Full sync complete"
        );
        Ok(page)
    }

    /// Establish a fresh sync token for a calendar.
    #[instrument(skip(self), level = "info")]
    pub async fn get_sync_token(&self, calendar_id: &str) -> Result<String, CalendarError> {
        self.full_sync(calendar_id)
            .await?
            .next_sync_token
            .ok_or_else(|| CalendarError::MissingSyncToken {
                calendar_id: calendar_id.to_string(),
            })
    }

    /// Read everything that changed since `sync_token`, deletions included.
    ///
    /// Fails with [`CalendarError::CursorInvalid`] when the provider has expired
    /// the token; callers fall back to [`CalendarClient::full_sync`].
    #[instrument(skip(self, sync_token), level = "info")]
    pub async fn incremental_sync(
        &self,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> Result<ChangeFeedPage, CalendarError> {
        let sync_token = sync_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CalendarError::MissingCursor {
                calendar_id: calendar_id.to_string(),
            })?;

        let url = format!(
            "{}?syncToken={}&showDeleted=true&singleEvents=false&maxResults={}",
            self.events_url(calendar_id),
            urlencoding::encode(sync_token),
            PAGE_SIZE,
        );

        self.read_feed(&url).await
    }

    /// Patch the given fields of an existing event.
    #[instrument(skip(self, patch), level = "info")]
    pub async fn update_event(
        &self,
        event: &EventRef,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, CalendarError> {
        if event.event_id.is_empty() || event.calendar_id.is_empty() || patch.is_empty() {
            return Err(CalendarError::MissingUpdateFields);
        }

        let url = format!(
            "{}/{}",
            self.events_url(&event.calendar_id),
            urlencoding::encode(&event.event_id),
        );

        let response = self
            .client
            .patch(&url)
            .header("Authorization", self.auth_header().await?)
            .json(patch)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Register a push channel for changes to a calendar's events.
    #[instrument(skip(self), level = "info")]
    pub async fn watch_events(
        &self,
        calendar_id: &str,
        request: &WatchRequest,
    ) -> Result<WatchResponse, CalendarError> {
        let url = format!("{}/watch", self.events_url(calendar_id));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header().await?)
            .json(request)
            .send()
            .await?;

        handle_response(response).await
    }
}

/// Map a Google API response to a typed body or a [`CalendarError`].
pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, CalendarError> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(format!("JSON parse error: {}", e)))
    } else if status.as_u16() == 401 {
        Err(CalendarError::TokenExpired)
    } else if status.as_u16() == 403 {
        Err(CalendarError::AuthRequired)
    } else if status.as_u16() == 404 {
        let text = response.text().await.unwrap_or_default();
        Err(CalendarError::NotFound(text))
    } else if status.as_u16() == 409 {
        Err(CalendarError::Conflict)
    } else if status.as_u16() == 410 {
        Err(CalendarError::CursorInvalid)
    } else if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        Err(CalendarError::RateLimited(retry_after))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(CalendarError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}
