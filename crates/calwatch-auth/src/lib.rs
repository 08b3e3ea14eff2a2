//! Credentials for the Google Calendar and Admin Directory APIs.
//!
//! The service acts as a domain-wide delegated service account: a signed JWT
//! assertion is exchanged for a short-lived access token per scope.

pub mod error;
pub mod provider;
pub mod scopes;
pub mod service_account;
pub mod storage;

pub use error::AuthError;
pub use provider::{AccessTokenProvider, StaticTokenProvider};
pub use scopes::Scope;
pub use service_account::{ServiceAccountKey, ServiceAccountTokenProvider};
pub use storage::{TokenCache, TokenSet};
