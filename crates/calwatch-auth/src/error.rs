use thiserror::Error;

/// Authentication errors (service account keys, token exchange).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read service account key: {0}")]
    KeyUnreadable(String),

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    #[error("Token exchange rejected ({status}): {message}")]
    ExchangeRejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::KeyUnreadable(_) | AuthError::InvalidKey(_) => {
                "Service account key is missing or invalid. Check settings."
            }
            AuthError::Signing(_) => "Failed to sign credentials.",
            AuthError::ExchangeRejected { .. } => {
                "Google rejected the service account credentials."
            }
            AuthError::Network(_) => "Network error while authorizing. Check your connection.",
        }
    }

    /// Whether the exchange might succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::ExchangeRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(AuthError::ExchangeRejected {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!AuthError::ExchangeRejected {
            status: 400,
            message: "invalid_grant".into()
        }
        .is_retryable());
        assert!(!AuthError::InvalidKey("x".into()).is_retryable());
    }
}
