//! The request executor.
//!
//! One logical call goes through `build -> sign -> send -> classify`, then
//! either ends or waits out a backoff and loops. Every physical request is
//! recorded in the call's [`OperationContext`] before the loop moves on,
//! and the call ends with exactly one result.

use crate::cancel::CancellationToken;
use crate::classify::{FatalKind, Outcome};
use crate::config::{ClientConfig, EffectiveOptions, RequestOptions};
use crate::context::{AttemptError, AttemptResult, OperationContext};
use crate::error::{StorageError, StorageResult};
use crate::retry::RetryContext;
use crate::signing::RequestSigner;
use crate::transport::{SendContext, Transport, TransportError};
use chrono::Utc;
use std::sync::Arc;
use strata_protocol::{
    headers, EndpointPair, LocationMode, ProtocolResult, StorageLocation, StorageRequest,
    StorageResponse, SERVICE_VERSION,
};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Longest body excerpt kept in error messages.
const MESSAGE_EXCERPT: usize = 256;

/// Where a command is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandLocation {
    /// Wherever the location mode says.
    #[default]
    Any,
    /// Only the writable primary.
    PrimaryOnly,
    /// Exactly this replica, for every attempt.
    Pinned(StorageLocation),
}

impl CommandLocation {
    fn initial(self, mode: LocationMode) -> StorageResult<StorageLocation> {
        match self {
            CommandLocation::Any => Ok(mode.initial_location()),
            CommandLocation::PrimaryOnly if mode.allows(StorageLocation::Primary) => {
                Ok(StorageLocation::Primary)
            }
            CommandLocation::PrimaryOnly => Err(StorageError::invalid_argument(format!(
                "operation requires the primary location, which location mode {mode} does not allow"
            ))),
            CommandLocation::Pinned(location) if mode.allows(location) => Ok(location),
            CommandLocation::Pinned(location) => Err(StorageError::invalid_argument(format!(
                "continuation was issued by the {location} location, which location mode {mode} does not allow"
            ))),
        }
    }

    fn constrain(
        self,
        requested: StorageLocation,
        current: StorageLocation,
        mode: LocationMode,
    ) -> StorageLocation {
        match self {
            CommandLocation::Any if mode.allows(requested) => requested,
            CommandLocation::Any => current,
            CommandLocation::PrimaryOnly => StorageLocation::Primary,
            CommandLocation::Pinned(location) => location,
        }
    }
}

/// One kind of logical operation the executor can run.
///
/// A command knows its resource, how to turn it into a request for a
/// given replica, and how to read a successful response. It never sees
/// failures; those belong to the executor.
pub trait StorageCommand: Send + Sync {
    /// Value produced by a successful call.
    type Output: Send;

    /// Endpoints of the resource the command addresses.
    fn endpoints(&self) -> &EndpointPair;

    /// Replica restriction for this command.
    fn location_requirement(&self) -> CommandLocation {
        CommandLocation::Any
    }

    /// Builds the request for one attempt against `base`.
    fn build(
        &self,
        base: &Url,
        location: StorageLocation,
        options: &EffectiveOptions,
    ) -> ProtocolResult<StorageRequest>;

    /// Interprets a 2xx response.
    fn parse(
        &self,
        response: StorageResponse,
        location: StorageLocation,
        options: &EffectiveOptions,
    ) -> ProtocolResult<Self::Output>;
}

enum SendOutcome {
    Completed(Result<StorageResponse, TransportError>),
    TimedOut,
    Cancelled,
}

/// Runs commands with retries, location fallback, deadlines and
/// cancellation.
///
/// Cheap to clone. Concurrent calls share the transport, signer and
/// configuration but nothing else.
pub struct Executor<T: Transport> {
    transport: Arc<T>,
    signer: Arc<dyn RequestSigner>,
    config: Arc<ClientConfig>,
}

impl<T: Transport> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            signer: Arc::clone(&self.signer),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Transport> Executor<T> {
    /// Creates an executor.
    pub fn new(config: ClientConfig, transport: T, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            transport: Arc::new(transport),
            signer,
            config: Arc::new(config),
        }
    }

    /// Client-wide configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs `command` to its single terminal outcome.
    pub async fn execute<C: StorageCommand>(
        &self,
        command: &C,
        ctx: &OperationContext,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<C::Output> {
        ctx.mark_started();
        let result = self.run(command, ctx, options, cancel).await;
        ctx.mark_finished();
        match &result {
            Ok(_) => debug!(
                client_request_id = %ctx.client_request_id(),
                attempts = ctx.attempt_count(),
                "operation succeeded"
            ),
            Err(err) => debug!(
                client_request_id = %ctx.client_request_id(),
                attempts = ctx.attempt_count(),
                error = %err,
                "operation failed"
            ),
        }
        result
    }

    async fn run<C: StorageCommand>(
        &self,
        command: &C,
        ctx: &OperationContext,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<C::Output> {
        let effective = options.resolve(&self.config);
        let mode = effective.location_mode;
        let endpoints = command.endpoints();
        endpoints.validate_mode(mode)?;

        let requirement = command.location_requirement();
        let mut location = requirement.initial(mode)?;
        let operation_deadline = effective
            .maximum_execution_time
            .map(|limit| Instant::now() + limit);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled {
                    history: ctx.attempts(),
                });
            }
            if operation_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(StorageError::Timeout {
                    history: ctx.attempts(),
                });
            }

            let request = self.prepare(command, endpoints, location, ctx, &effective)?;
            attempt += 1;

            let attempt_deadline = earliest(
                effective
                    .attempt_timeout
                    .map(|timeout| Instant::now() + timeout),
                operation_deadline,
            );
            let send_ctx = SendContext {
                deadline: attempt_deadline,
                cancel: cancel.clone(),
            };

            debug!(
                client_request_id = %ctx.client_request_id(),
                attempt,
                %location,
                uri = %request.url,
                "sending request"
            );
            let start_time = Utc::now();
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => SendOutcome::Cancelled,
                _ = sleep_until(attempt_deadline) => SendOutcome::TimedOut,
                result = self.transport.send(request, &send_ctx) => SendOutcome::Completed(result),
            };
            let end_time = Utc::now();

            let (record, response) = match sent {
                SendOutcome::Completed(Ok(response)) => {
                    let error = (!response.is_success()).then(|| AttemptError::Status {
                        status: response.status,
                        message: excerpt(&response),
                    });
                    let record = AttemptResult {
                        location,
                        status_code: Some(response.status),
                        service_request_id: response.request_id().map(str::to_string),
                        start_time,
                        end_time,
                        error,
                    };
                    (record, Some(response))
                }
                SendOutcome::Completed(Err(err)) => {
                    let error = match err {
                        TransportError::Connection(message) => AttemptError::Network { message },
                        TransportError::Timeout => AttemptError::Timeout,
                        TransportError::Cancelled if cancel.is_cancelled() => {
                            AttemptError::Cancelled
                        }
                        TransportError::Cancelled => AttemptError::Network {
                            message: "transport abandoned the request".into(),
                        },
                    };
                    (failed(location, start_time, end_time, error), None)
                }
                SendOutcome::TimedOut => (
                    failed(location, start_time, end_time, AttemptError::Timeout),
                    None,
                ),
                SendOutcome::Cancelled => (
                    failed(location, start_time, end_time, AttemptError::Cancelled),
                    None,
                ),
            };
            ctx.record_attempt(record.clone());
            debug!(
                client_request_id = %ctx.client_request_id(),
                attempt,
                %location,
                status = ?record.status_code,
                duration_ms = record.duration().as_millis() as u64,
                "attempt finished"
            );

            let outcome = Outcome::of_attempt(&record);
            match outcome {
                Outcome::Success => {
                    let Some(response) = response else {
                        return Err(StorageError::InvalidResponse {
                            message: "success recorded without a response".into(),
                            history: ctx.attempts(),
                        });
                    };
                    return command
                        .parse(response, location, &effective)
                        .map_err(|err| StorageError::InvalidResponse {
                            message: err.to_string(),
                            history: ctx.attempts(),
                        });
                }
                Outcome::Fatal(FatalKind::Cancelled) => {
                    return Err(StorageError::Cancelled {
                        history: ctx.attempts(),
                    });
                }
                Outcome::Fatal(FatalKind::Status(status)) => {
                    let message = match record.error {
                        Some(AttemptError::Status { message, .. }) => message,
                        _ => String::new(),
                    };
                    return Err(StorageError::RequestFailed {
                        status,
                        message,
                        history: ctx.attempts(),
                    });
                }
                Outcome::Retryable(_) => {}
            }

            if operation_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(StorageError::Timeout {
                    history: ctx.attempts(),
                });
            }

            let history = ctx.attempts();
            let retry_ctx = RetryContext {
                attempt,
                last: &record,
                history: &history,
                current_location: location,
                location_mode: mode,
                client_request_id: ctx.client_request_id(),
            };
            let Some(decision) = effective.retry_policy.evaluate(&retry_ctx) else {
                let last_error = record.error.unwrap_or(AttemptError::Timeout);
                return Err(StorageError::ExhaustedRetries {
                    last_error,
                    history,
                });
            };

            if operation_deadline.is_some_and(|deadline| Instant::now() + decision.backoff >= deadline)
            {
                return Err(StorageError::Timeout { history });
            }

            let next = requirement.constrain(decision.next_location, location, mode);
            warn!(
                client_request_id = %ctx.client_request_id(),
                attempt,
                status = ?record.status_code,
                backoff_ms = decision.backoff.as_millis() as u64,
                from = %location,
                to = %next,
                "retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StorageError::Cancelled { history });
                }
                _ = tokio::time::sleep(decision.backoff) => {}
            }
            location = next;
        }
    }

    /// Build and sign. Failures here happen before a request exists and
    /// are not recorded as attempts.
    fn prepare<C: StorageCommand>(
        &self,
        command: &C,
        endpoints: &EndpointPair,
        location: StorageLocation,
        ctx: &OperationContext,
        effective: &EffectiveOptions,
    ) -> StorageResult<StorageRequest> {
        let base = endpoints.resolve(location)?;
        let mut request = command.build(base, location, effective)?;
        request
            .headers
            .insert(headers::CLIENT_REQUEST_ID, ctx.client_request_id());
        request.headers.insert(headers::VERSION, SERVICE_VERSION);
        request.headers.insert(
            headers::DATE,
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
        if !request.headers.contains(headers::ACCEPT) {
            request
                .headers
                .insert(headers::ACCEPT, effective.payload_format.content_type());
        }
        self.signer.sign(&mut request)?;
        Ok(request)
    }
}

fn failed(
    location: StorageLocation,
    start_time: chrono::DateTime<Utc>,
    end_time: chrono::DateTime<Utc>,
    error: AttemptError,
) -> AttemptResult {
    AttemptResult {
        location,
        status_code: None,
        service_request_id: None,
        start_time,
        end_time,
        error: Some(error),
    }
}

fn excerpt(response: &StorageResponse) -> String {
    let text = response.body_text();
    match text.char_indices().nth(MESSAGE_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::signing::AnonymousSigner;
    use crate::transport::MockTransport;
    use std::time::Duration;
    use strata_protocol::HttpMethod;

    struct Ping {
        endpoints: EndpointPair,
        requirement: CommandLocation,
    }

    impl Ping {
        fn new(endpoints: EndpointPair) -> Self {
            Self {
                endpoints,
                requirement: CommandLocation::Any,
            }
        }
    }

    impl StorageCommand for Ping {
        type Output = u16;

        fn endpoints(&self) -> &EndpointPair {
            &self.endpoints
        }

        fn location_requirement(&self) -> CommandLocation {
            self.requirement
        }

        fn build(
            &self,
            base: &Url,
            _location: StorageLocation,
            _options: &EffectiveOptions,
        ) -> ProtocolResult<StorageRequest> {
            Ok(StorageRequest::new(HttpMethod::Get, base.clone()))
        }

        fn parse(
            &self,
            response: StorageResponse,
            _location: StorageLocation,
            _options: &EffectiveOptions,
        ) -> ProtocolResult<u16> {
            Ok(response.status)
        }
    }

    fn pair() -> EndpointPair {
        EndpointPair::parse(
            "https://acct.table.example.net",
            Some("https://acct-secondary.table.example.net"),
        )
        .unwrap()
    }

    fn executor(policy: RetryPolicy, mode: LocationMode) -> Executor<MockTransport> {
        let config = ClientConfig::new(pair())
            .with_retry_policy(policy)
            .with_location_mode(mode);
        Executor::new(config, MockTransport::new(), Arc::new(AnonymousSigner))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let exec = executor(
            RetryPolicy::linear(4, Duration::from_secs(1)),
            LocationMode::PrimaryOnly,
        );
        exec.transport().push_status(503);
        exec.transport().push_status(500);
        exec.transport().push_status(200);

        let ctx = OperationContext::new();
        let status = exec
            .execute(&Ping::new(pair()), &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(ctx.attempt_count(), 3);
        assert!(ctx.start_time().is_some() && ctx.end_time().is_some());
    }

    #[tokio::test]
    async fn stamps_standard_headers() {
        let exec = executor(RetryPolicy::NoRetry, LocationMode::PrimaryOnly);
        exec.transport().push_status(200);
        let ctx = OperationContext::with_client_request_id("req-7");
        exec.execute(&Ping::new(pair()), &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        let sent = &exec.transport().requests()[0];
        assert_eq!(sent.headers.get(headers::CLIENT_REQUEST_ID), Some("req-7"));
        assert_eq!(sent.headers.get(headers::VERSION), Some(SERVICE_VERSION));
        assert_eq!(sent.headers.get(headers::ACCEPT), Some("application/json"));
        assert!(sent.headers.get(headers::DATE).unwrap().ends_with("GMT"));
    }

    #[tokio::test]
    async fn client_error_stops_immediately() {
        let exec = executor(
            RetryPolicy::linear(5, Duration::ZERO),
            LocationMode::PrimaryOnly,
        );
        exec.transport()
            .push_response(StorageResponse::new(400).with_body("bad filter"));
        let ctx = OperationContext::new();
        let err = exec
            .execute(&Ping::new(pair()), &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.attempt_count(), 1);
        assert_eq!(ctx.attempt_count(), 1);
        assert!(err.to_string().contains("bad filter"));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_alternates_locations() {
        let exec = executor(
            RetryPolicy::linear(3, Duration::from_millis(10)),
            LocationMode::PrimaryThenSecondary,
        );
        exec.transport().push_error(TransportError::Connection("reset".into()));
        exec.transport().push_status(503);
        exec.transport().push_status(200);

        let ctx = OperationContext::new();
        exec.execute(&Ping::new(pair()), &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        let locations: Vec<_> = ctx.attempts().iter().map(|a| a.location).collect();
        assert_eq!(
            locations,
            vec![
                StorageLocation::Primary,
                StorageLocation::Secondary,
                StorageLocation::Primary
            ]
        );
        let hosts: Vec<_> = exec
            .transport()
            .requests()
            .iter()
            .map(|r| r.url.host_str().unwrap().to_string())
            .collect();
        assert_eq!(hosts[1], "acct-secondary.table.example.net");
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_command_never_leaves_its_location() {
        let exec = executor(
            RetryPolicy::linear(3, Duration::from_millis(10)),
            LocationMode::PrimaryThenSecondary,
        );
        exec.transport().push_status(503);
        exec.transport().push_status(200);

        let mut ping = Ping::new(pair());
        ping.requirement = CommandLocation::Pinned(StorageLocation::Secondary);
        let ctx = OperationContext::new();
        exec.execute(&ping, &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(ctx
            .attempts()
            .iter()
            .all(|a| a.location == StorageLocation::Secondary));
    }

    #[tokio::test]
    async fn pinned_location_outside_mode_is_rejected() {
        let exec = executor(RetryPolicy::NoRetry, LocationMode::PrimaryOnly);
        let mut ping = Ping::new(pair());
        ping.requirement = CommandLocation::Pinned(StorageLocation::Secondary);
        let ctx = OperationContext::new();
        let err = exec
            .execute(&ping, &ctx, &RequestOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(exec.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn secondary_mode_without_secondary_is_configuration_error() {
        let config = ClientConfig::new(
            EndpointPair::parse("https://acct.table.example.net", None).unwrap(),
        );
        let exec = Executor::new(config, MockTransport::new(), Arc::new(AnonymousSigner));
        let ping = Ping::new(EndpointPair::parse("https://acct.table.example.net", None).unwrap());
        let options = RequestOptions::new().with_location_mode(LocationMode::SecondaryOnly);
        let err = exec
            .execute(&ping, &OperationContext::new(), &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert_eq!(exec.transport().request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_deadline_is_terminal() {
        let exec = executor(
            RetryPolicy::linear(10, Duration::from_secs(30)),
            LocationMode::PrimaryOnly,
        );
        exec.transport().push_status(503);
        exec.transport().push_status(200);
        let options =
            RequestOptions::new().with_maximum_execution_time(Duration::from_secs(10));
        let ctx = OperationContext::new();
        let err = exec
            .execute(&Ping::new(pair()), &ctx, &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
        assert_eq!(ctx.attempt_count(), 1);
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = StorageResponse::new(500).with_body("x".repeat(1000));
        assert_eq!(excerpt(&long).len(), MESSAGE_EXCERPT + 3);
        assert_eq!(excerpt(&StorageResponse::new(500).with_body("short")), "short");
    }
}
