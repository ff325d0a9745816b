//! Per-call diagnostics: the ordered record of attempts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_protocol::StorageLocation;
use thiserror::Error;
use uuid::Uuid;

/// Why an attempt did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptError {
    /// The transport could not complete the exchange.
    #[error("network failure: {message}")]
    Network {
        /// Transport's description.
        message: String,
    },

    /// The attempt ran past its deadline.
    #[error("request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body excerpt or reason.
        message: String,
    },

    /// The caller cancelled while the request was in flight.
    #[error("cancelled in flight")]
    Cancelled,
}

/// Outcome of one physical request. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    /// Replica the request was sent to.
    pub location: StorageLocation,
    /// HTTP status, when a response arrived.
    pub status_code: Option<u16>,
    /// Service-assigned request id, when a response carried one.
    pub service_request_id: Option<String>,
    /// When the request was dispatched.
    pub start_time: DateTime<Utc>,
    /// When the outcome was known.
    pub end_time: DateTime<Utc>,
    /// Failure, if any.
    pub error: Option<AttemptError>,
}

impl AttemptResult {
    /// Wall-clock time spent on the attempt.
    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time).to_std().unwrap_or_default()
    }

    /// Returns true if the attempt produced a 2xx response.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status_code, Some(200..=299))
    }
}

/// Diagnostics for one logical call.
///
/// A context belongs to exactly one call. The executor appends one entry
/// per physical request; entries are never removed or rewritten. Readers
/// holding a shared reference may inspect it while the call is running and
/// will see a list that only grows.
#[derive(Debug)]
pub struct OperationContext {
    client_request_id: String,
    attempts: RwLock<Vec<AttemptResult>>,
    window: RwLock<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>,
}

impl OperationContext {
    /// Creates a context with a fresh client request id.
    pub fn new() -> Self {
        Self::with_client_request_id(Uuid::new_v4().to_string())
    }

    /// Creates a context with a caller-chosen client request id.
    pub fn with_client_request_id(id: impl Into<String>) -> Self {
        Self {
            client_request_id: id.into(),
            attempts: RwLock::new(Vec::new()),
            window: RwLock::new((None, None)),
        }
    }

    /// Id stamped on every attempt of the call.
    pub fn client_request_id(&self) -> &str {
        &self.client_request_id
    }

    /// Appends an attempt.
    pub fn record_attempt(&self, result: AttemptResult) {
        self.attempts.write().push(result);
    }

    /// Number of physical requests issued so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.read().len()
    }

    /// Most recent attempt.
    pub fn last_result(&self) -> Option<AttemptResult> {
        self.attempts.read().last().cloned()
    }

    /// Snapshot of all attempts in order.
    pub fn attempts(&self) -> Vec<AttemptResult> {
        self.attempts.read().clone()
    }

    /// When the call started, once it has.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.window.read().0
    }

    /// When the call reached its terminal outcome, once it has.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.window.read().1
    }

    pub(crate) fn mark_started(&self) {
        let mut window = self.window.write();
        if window.0.is_none() {
            window.0 = Some(Utc::now());
        }
    }

    pub(crate) fn mark_finished(&self) {
        self.window.write().1 = Some(Utc::now());
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(status: Option<u16>, error: Option<AttemptError>) -> AttemptResult {
        let now = Utc::now();
        AttemptResult {
            location: StorageLocation::Primary,
            status_code: status,
            service_request_id: None,
            start_time: now,
            end_time: now + chrono::Duration::milliseconds(15),
            error,
        }
    }

    #[test]
    fn attempts_are_appended_in_order() {
        let ctx = OperationContext::new();
        assert_eq!(ctx.attempt_count(), 0);
        assert!(ctx.last_result().is_none());

        ctx.record_attempt(attempt(
            Some(503),
            Some(AttemptError::Status {
                status: 503,
                message: "busy".into(),
            }),
        ));
        ctx.record_attempt(attempt(Some(200), None));

        let attempts = ctx.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status_code, Some(503));
        assert!(ctx.last_result().unwrap().is_success());
    }

    #[test]
    fn client_request_ids_are_unique() {
        let a = OperationContext::new();
        let b = OperationContext::new();
        assert_ne!(a.client_request_id(), b.client_request_id());
        assert_eq!(
            OperationContext::with_client_request_id("fixed").client_request_id(),
            "fixed"
        );
    }

    #[test]
    fn attempt_helpers() {
        let ok = attempt(Some(204), None);
        assert!(ok.is_success());
        assert_eq!(ok.duration(), Duration::from_millis(15));
        assert!(!attempt(None, Some(AttemptError::Timeout)).is_success());
    }

    #[test]
    fn attempt_history_serializes() {
        let failed = attempt(
            None,
            Some(AttemptError::Network {
                message: "reset".into(),
            }),
        );
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["location"], "primary");
        assert_eq!(json["error"]["kind"], "network");
    }

    #[test]
    fn call_window_is_set_once() {
        let ctx = OperationContext::new();
        assert!(ctx.start_time().is_none());
        ctx.mark_started();
        let first = ctx.start_time();
        ctx.mark_started();
        assert_eq!(ctx.start_time(), first);
        ctx.mark_finished();
        assert!(ctx.end_time() >= first);
    }
}
