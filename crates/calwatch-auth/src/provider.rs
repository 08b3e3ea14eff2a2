use async_trait::async_trait;

use crate::error::AuthError;
use crate::scopes::Scope;

/// Source of bearer tokens for outbound provider calls.
///
/// Implementations are consulted before every request so that long paginated
/// reads pick up a refreshed token when the previous one lapses.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self, scope: Scope) -> Result<String, AuthError>;
}

/// Fixed token, for tests and local tooling.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self, _scope: Scope) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}
