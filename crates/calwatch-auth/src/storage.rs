use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::scopes::Scope;

/// Access token plus its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token for API requests
    pub access_token: String,

    /// Token expiration timestamp (Unix timestamp)
    pub expires_at: i64,

    /// Scopes granted to this token
    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - 300 // 5 minute buffer
    }
}

/// In-memory token cache, one entry per scope.
///
/// Tokens are never written to disk; a restart simply exchanges a new assertion.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<Scope, TokenSet>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a cached token for `scope` unless it is due for refresh.
    pub fn fresh(&self, scope: Scope) -> Option<TokenSet> {
        self.tokens
            .lock()
            .get(&scope)
            .filter(|token| !token.needs_refresh())
            .cloned()
    }

    pub fn store(&self, scope: Scope, token_set: TokenSet) {
        tracing::debug!(?scope, expires_at = token_set.expires_at, "Cached access token");
        self.tokens.lock().insert(scope, token_set);
    }

    pub fn invalidate(&self, scope: Scope) {
        self.tokens.lock().remove(&scope);
    }
}
