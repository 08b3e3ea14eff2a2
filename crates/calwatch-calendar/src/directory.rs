//! Admin Directory API client: account listing and new-account push channels.

use std::sync::Arc;

use calwatch_auth::{AccessTokenProvider, Scope};
use tracing::instrument;

use crate::client::handle_response;
use crate::error::CalendarError;
use crate::types::*;

const DIRECTORY_API_BASE: &str = "https://admin.googleapis.com/admin/directory/v1";
const MAX_RESULTS: u32 = 500;

/// Which accounts a directory query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryTarget {
    Domain(String),
    Customer(String),
}

impl DirectoryTarget {
    fn query(&self) -> String {
        match self {
            Self::Domain(domain) => format!("domain={}", urlencoding::encode(domain)),
            Self::Customer(customer) => format!("customer={}", urlencoding::encode(customer)),
        }
    }
}

pub struct DirectoryClient {
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
    target: DirectoryTarget,
}

impl DirectoryClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>, target: DirectoryTarget) -> Self {
        Self::with_base_url(tokens, target, DIRECTORY_API_BASE)
    }

    pub fn with_base_url(
        tokens: Arc<dyn AccessTokenProvider>,
        target: DirectoryTarget,
        base_url: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            target,
        }
    }

    async fn auth_header(&self) -> Result<String, CalendarError> {
        let token = self.tokens.access_token(Scope::UserDirectory).await?;
        Ok(format!("Bearer {}", token))
    }

    /// Fetch one page of accounts, ordered by email.
    #[instrument(skip(self), level = "info")]
    pub async fn list_users(
        &self,
        page_token: Option<&str>,
    ) -> Result<UserListResponse, CalendarError> {
        let mut url = format!(
            "{}/users?maxResults={}&orderBy=email&{}",
            self.base_url,
            MAX_RESULTS,
            self.target.query(),
        );

        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
        }

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header().await?)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch every account, following pagination.
    #[instrument(skip(self), level = "info")]
    pub async fn list_all_users(&self) -> Result<Vec<DirectoryUser>, CalendarError> {
        let mut users = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut page = self.list_users(page_token.as_deref()).await?;
            users.append(&mut page.users);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::debug!(count = users.len(), "Listed directory users");
        Ok(users)
    }

    /// Register a push channel that fires when accounts are added.
    #[instrument(skip(self), level = "info")]
    pub async fn watch_users(&self, request: &WatchRequest) -> Result<WatchResponse, CalendarError> {
        let url = format!(
            "{}/users/watch?event=add&{}",
            self.base_url,
            self.target.query(),
        );

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
