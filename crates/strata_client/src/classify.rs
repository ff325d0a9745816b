//! Attempt classification.

use crate::context::{AttemptError, AttemptResult};

/// Failure classes a retry may cure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    /// The transport could not complete the exchange.
    Network,
    /// The attempt ran past its deadline.
    Timeout,
    /// 408, 429, 500, 502, 503 or 504.
    Status(u16),
}

/// Failure classes that end the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Any other non-success status.
    Status(u16),
    /// The caller cancelled.
    Cancelled,
}

/// Classification of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response.
    Success,
    /// Transient failure.
    Retryable(RetryableKind),
    /// Permanent failure.
    Fatal(FatalKind),
}

/// Returns true for statuses the service documents as transient.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

impl Outcome {
    /// Classifies a response status.
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            Outcome::Success
        } else if is_retryable_status(status) {
            Outcome::Retryable(RetryableKind::Status(status))
        } else {
            Outcome::Fatal(FatalKind::Status(status))
        }
    }

    /// Classifies a recorded attempt.
    pub fn of_attempt(attempt: &AttemptResult) -> Self {
        match (&attempt.error, attempt.status_code) {
            (Some(AttemptError::Network { .. }), _) => Outcome::Retryable(RetryableKind::Network),
            (Some(AttemptError::Timeout), _) => Outcome::Retryable(RetryableKind::Timeout),
            (Some(AttemptError::Cancelled), _) => Outcome::Fatal(FatalKind::Cancelled),
            (Some(AttemptError::Status { status, .. }), _) => Self::from_status(*status),
            (None, Some(status)) => Self::from_status(status),
            (None, None) => Outcome::Retryable(RetryableKind::Network),
        }
    }

    /// Returns true for [`Outcome::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Returns true for [`Outcome::Retryable`].
    pub fn is_retryable(self) -> bool {
        matches!(self, Outcome::Retryable(_))
    }

    /// Returns true if the other replica might not share the failure.
    ///
    /// Throttling (429) is account-wide, so it retries in place.
    pub fn is_fallback_eligible(self) -> bool {
        match self {
            Outcome::Retryable(RetryableKind::Network | RetryableKind::Timeout) => true,
            Outcome::Retryable(RetryableKind::Status(status)) => status == 408 || status >= 500,
            _ => false,
        }
    }
}
