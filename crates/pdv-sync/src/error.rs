//! # Sync Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Two layers of failure                            │
//! │                                                                         │
//! │  ApiError (one remote call)            SyncError (a whole pass/worker)  │
//! │  ─────────────────────────             ───────────────────────────────  │
//! │  Authentication  401/403               Api       pull failed            │
//! │  Validation      400/422               Database  local store failed     │
//! │  NotFound        404                   InvalidConfig / InvalidUrl       │
//! │  Conflict        409                   ChannelError                     │
//! │  Server          5xx      ◄─ retry                                      │
//! │  Network                  ◄─ retry                                      │
//! │  Timeout                  ◄─ retry                                      │
//! │  Status          other                                                  │
//! │  InvalidResponse bad body                                               │
//! │                                                                         │
//! │  A failed push never becomes a SyncError: it is written to the row's   │
//! │  sync_error and the row stays dirty.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pdv_db::DbError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Validation failed ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server error ({status})")]
    Server { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Timeout | ApiError::Server { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status, .. }
            | ApiError::Validation { status, .. }
            | ApiError::Server { status }
            | ApiError::Status { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Network(_) | ApiError::Timeout | ApiError::InvalidResponse(_) => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Local store error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api(e) => e.is_retryable(),
            SyncError::Database(DbError::PoolExhausted) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(ApiError::Network("connection refused".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::Server { status: 503 }.is_retryable());

        let expired = ApiError::Authentication {
            status: 401,
            message: "expired".into(),
        };
        assert!(!expired.is_retryable());
        assert!(!ApiError::Validation { status: 422, message: "sku".into() }.is_retryable());
        assert!(!ApiError::Conflict("sale_number".into()).is_retryable());
        assert!(!ApiError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound("/products/9".into()).status(), Some(404));
        assert_eq!(ApiError::Server { status: 502 }.status(), Some(502));
        assert_eq!(ApiError::Timeout.status(), None);
    }

    #[test]
    fn test_sync_error_wraps_api() {
        let err = SyncError::from(ApiError::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Request timed out");
        assert!(!SyncError::InvalidConfig("base_url".into()).is_retryable());
    }
}
