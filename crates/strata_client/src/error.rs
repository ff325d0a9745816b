//! Error types for the client.

use crate::context::{AttemptError, AttemptResult};
use crate::signing::SigningError;
use strata_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Terminal failure of a logical call.
///
/// Variants produced after at least one request was sent carry the full
/// attempt history, so "failed on attempt 1 of 1" and "failed after three
/// retries across both replicas" are distinguishable.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Caller misuse detected before any request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Endpoint, mode or credential problem detected before any request was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The service rejected the request with a status a retry cannot cure.
    #[error("request failed with status {status}: {message}")]
    RequestFailed {
        /// HTTP status of the last attempt.
        status: u16,
        /// Body excerpt of the last attempt.
        message: String,
        /// Every attempt of the call.
        history: Vec<AttemptResult>,
    },

    /// The retry policy declined another attempt after a transient failure.
    #[error("retries exhausted after {} attempt(s): {last_error}", .history.len())]
    ExhaustedRetries {
        /// Failure of the last attempt.
        last_error: AttemptError,
        /// Every attempt of the call.
        history: Vec<AttemptResult>,
    },

    /// The caller cancelled the call.
    #[error("operation cancelled after {} attempt(s)", .history.len())]
    Cancelled {
        /// Every attempt of the call.
        history: Vec<AttemptResult>,
    },

    /// The call ran out of its time budget.
    #[error("operation timed out after {} attempt(s)", .history.len())]
    Timeout {
        /// Every attempt of the call.
        history: Vec<AttemptResult>,
    },

    /// A successful response could not be interpreted.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// What went wrong.
        message: String,
        /// Every attempt of the call.
        history: Vec<AttemptResult>,
    },
}

impl StorageError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Attempts made before the call ended. Empty if none were sent.
    pub fn history(&self) -> &[AttemptResult] {
        match self {
            StorageError::InvalidArgument(_) | StorageError::Configuration(_) => &[],
            StorageError::RequestFailed { history, .. }
            | StorageError::ExhaustedRetries { history, .. }
            | StorageError::Cancelled { history }
            | StorageError::Timeout { history }
            | StorageError::InvalidResponse { history, .. } => history,
        }
    }

    /// Number of physical requests the call made.
    pub fn attempt_count(&self) -> usize {
        self.history().len()
    }

    /// Status of the last attempt, if it got a response.
    pub fn status_code(&self) -> Option<u16> {
        self.history().last().and_then(|attempt| attempt.status_code)
    }

    /// Returns true for 4xx rejections.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StorageError::RequestFailed { status, .. } if (400..500).contains(status))
    }

    /// Returns true if the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled { .. })
    }
}

impl From<ProtocolError> for StorageError {
    fn from(err: ProtocolError) -> Self {
        if err.is_configuration() {
            StorageError::Configuration(err.to_string())
        } else {
            StorageError::InvalidArgument(err.to_string())
        }
    }
}

impl From<SigningError> for StorageError {
    fn from(err: SigningError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_protocol::StorageLocation;

    fn attempt(status: u16) -> AttemptResult {
        let now = Utc::now();
        AttemptResult {
            location: StorageLocation::Primary,
            status_code: Some(status),
            service_request_id: Some("srv-1".into()),
            start_time: now,
            end_time: now,
            error: Some(AttemptError::Status {
                status,
                message: "busy".into(),
            }),
        }
    }

    #[test]
    fn history_accessors() {
        let err = StorageError::ExhaustedRetries {
            last_error: AttemptError::Timeout,
            history: vec![attempt(503), attempt(500)],
        };
        assert_eq!(err.attempt_count(), 2);
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(
            err.to_string(),
            "retries exhausted after 2 attempt(s): request timed out"
        );
        assert!(StorageError::invalid_argument("x").history().is_empty());
    }

    #[test]
    fn client_error_classification() {
        let rejected = StorageError::RequestFailed {
            status: 404,
            message: "missing".into(),
            history: vec![attempt(404)],
        };
        assert!(rejected.is_client_error());
        let unimplemented = StorageError::RequestFailed {
            status: 501,
            message: String::new(),
            history: vec![attempt(501)],
        };
        assert!(!unimplemented.is_client_error());
        assert!(StorageError::Cancelled { history: vec![] }.is_cancelled());
    }

    #[test]
    fn conversions() {
        let err: StorageError = ProtocolError::UnsupportedLocation(StorageLocation::Secondary).into();
        assert!(matches!(err, StorageError::Configuration(_)));

        let err: StorageError = ProtocolError::DuplicateKey { name: "$top".into() }.into();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err: StorageError = SigningError::InvalidKey("short".into()).into();
        assert!(matches!(err, StorageError::Configuration(_)));
    }
}
