//! Authentication error types.

use crate::token::DecodeError;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token could not be decoded into claims
    #[error("Invalid token: {0}")]
    Decode(#[from] DecodeError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] robohire_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP status from the API
    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Session context requested outside of a provider scope
    #[error("No session context provided for this task")]
    NoProvider,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] robohire_config::CoreError),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Timeouts
    /// - Connection failures
    /// - 5xx and 429 responses
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout => true,
            AuthError::HttpStatus(status) => *status >= 500 || *status == 429,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_timeout() {
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_is_transient_server_status() {
        assert!(AuthError::HttpStatus(503).is_transient());
        assert!(AuthError::HttpStatus(429).is_transient());
        assert!(!AuthError::HttpStatus(400).is_transient());
    }

    #[test]
    fn test_is_not_transient_decode() {
        assert!(!AuthError::Decode(DecodeError::MissingSubject).is_transient());
    }

    #[test]
    fn test_is_not_transient_refresh_exhausted() {
        assert!(!AuthError::RefreshExhausted(3).is_transient());
    }

    #[test]
    fn test_is_not_transient_no_provider() {
        assert!(!AuthError::NoProvider.is_transient());
    }
}
