//! Calendar-specific error types.

use calwatch_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthError),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The provider no longer honors the sync token (HTTP 410).
    #[error("Sync token is no longer valid")]
    CursorInvalid,

    #[error("No sync token stored for calendar {calendar_id}")]
    MissingCursor { calendar_id: String },

    #[error("Full sync for calendar {calendar_id} returned no sync token")]
    MissingSyncToken { calendar_id: String },

    #[error("Event update requires an event id, a calendar id and at least one field")]
    MissingUpdateFields,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: resource was modified")]
    Conflict,

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl CalendarError {
    /// User-friendly error message for logs and operator output.
    pub fn user_message(&self) -> String {
        match self {
            Self::Authorization(e) => e.user_message().to_string(),
            Self::AuthRequired => "The service account lacks access to this resource".to_string(),
            Self::TokenExpired => "Access token was rejected".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Retry in {} seconds.", secs),
            Self::CursorInvalid => "Sync token expired; a full sync is required".to_string(),
            Self::MissingCursor { calendar_id } => {
                format!("No sync token for {}", calendar_id)
            }
            Self::MissingSyncToken { calendar_id } => {
                format!("Could not establish a sync token for {}", calendar_id)
            }
            Self::MissingUpdateFields => "Event update is missing required fields".to_string(),
            Self::NotFound(_) => "Resource not found".to_string(),
            Self::Conflict => "Resource was modified elsewhere".to_string(),
            Self::ApiError { message, .. } => format!("Calendar error: {}", message),
            Self::InvalidResponse(_) => "Unexpected response from Google".to_string(),
            Self::NetworkError(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Whether the request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::NetworkError(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            Self::Authorization(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the stored sync token must be replaced by a full sync.
    pub fn is_cursor_invalid(&self) -> bool {
        matches!(self, Self::CursorInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_messages() {
        let err = CalendarError::RateLimited(30);
        assert!(err.user_message().contains("30"));

        let err = CalendarError::MissingCursor {
            calendar_id: "ash@pallet.town".into(),
        };
        assert!(err.user_message().contains("ash@pallet.town"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(CalendarError::RateLimited(10).is_retryable());
        assert!(CalendarError::ApiError {
            status: 503,
            message: "backend".into()
        }
        .is_retryable());
        assert!(!CalendarError::ApiError {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!CalendarError::CursorInvalid.is_retryable());
        assert!(!CalendarError::Conflict.is_retryable());
    }

    #[test]
    fn test_is_cursor_invalid() {
        assert!(CalendarError::CursorInvalid.is_cursor_invalid());
        assert!(!CalendarError::NotFound("x".into()).is_cursor_invalid());
    }
}
