//! Google Calendar and Admin Directory clients.
//!
//! Both clients pull a fresh bearer token from an [`AccessTokenProvider`] before
//! every request, so a long paginated read survives token rotation.
//!
//! [`AccessTokenProvider`]: calwatch_auth::AccessTokenProvider

pub mod client;
pub mod directory;
pub mod error;
pub mod types;

pub use client::CalendarClient;
pub use directory::{DirectoryClient, DirectoryTarget};
pub use error::CalendarError;
pub use types::*;
