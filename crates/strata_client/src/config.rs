//! Client configuration and per-call options.

use crate::retry::RetryPolicy;
use std::time::Duration;
use strata_protocol::{EndpointPair, LocationMode, PayloadFormat};

/// Client-wide defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account endpoints.
    pub endpoints: EndpointPair,
    /// Retry policy applied when a call does not override it.
    pub retry_policy: RetryPolicy,
    /// Location mode applied when a call does not override it.
    pub location_mode: LocationMode,
    /// Payload format applied when a call does not override it.
    pub payload_format: PayloadFormat,
    /// Bound on a single attempt.
    pub attempt_timeout: Option<Duration>,
    /// Bound on a whole call, backoff included.
    pub maximum_execution_time: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration with the default policy and primary-only access.
    pub fn new(endpoints: EndpointPair) -> Self {
        Self {
            endpoints,
            retry_policy: RetryPolicy::default(),
            location_mode: LocationMode::default(),
            payload_format: PayloadFormat::default(),
            attempt_timeout: Some(Duration::from_secs(90)),
            maximum_execution_time: None,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the location mode.
    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Sets the payload format.
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Sets the per-call time limit.
    pub fn with_maximum_execution_time(mut self, limit: Duration) -> Self {
        self.maximum_execution_time = Some(limit);
        self
    }
}

/// Overrides for a single call. Unset fields fall back to [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Retry policy override.
    pub retry_policy: Option<RetryPolicy>,
    /// Location mode override.
    pub location_mode: Option<LocationMode>,
    /// Payload format override.
    pub payload_format: Option<PayloadFormat>,
    /// Per-attempt timeout override.
    pub attempt_timeout: Option<Duration>,
    /// Per-call time limit override.
    pub maximum_execution_time: Option<Duration>,
}

impl RequestOptions {
    /// Options that override nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Overrides the location mode.
    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = Some(mode);
        self
    }

    /// Overrides the payload format.
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = Some(format);
        self
    }

    /// Overrides the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Overrides the per-call time limit.
    pub fn with_maximum_execution_time(mut self, limit: Duration) -> Self {
        self.maximum_execution_time = Some(limit);
        self
    }

    /// Merges these overrides over `config`.
    pub fn resolve(&self, config: &ClientConfig) -> EffectiveOptions {
        EffectiveOptions {
            retry_policy: self
                .retry_policy
                .clone()
                .unwrap_or_else(|| config.retry_policy.clone()),
            location_mode: self.location_mode.unwrap_or(config.location_mode),
            payload_format: self.payload_format.unwrap_or(config.payload_format),
            attempt_timeout: self.attempt_timeout.or(config.attempt_timeout),
            maximum_execution_time: self
                .maximum_execution_time
                .or(config.maximum_execution_time),
        }
    }
}

/// Settings in force for one call, fixed when the call starts.
#[derive(Debug, Clone)]
pub struct EffectiveOptions {
    /// Retry policy.
    pub retry_policy: RetryPolicy,
    /// Location mode.
    pub location_mode: LocationMode,
    /// Payload format.
    pub payload_format: PayloadFormat,
    /// Per-attempt timeout.
    pub attempt_timeout: Option<Duration>,
    /// Per-call time limit.
    pub maximum_execution_time: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new(EndpointPair::parse("https://acct.table.example.net", None).unwrap())
            .with_payload_format(PayloadFormat::Cbor)
            .with_retry_policy(RetryPolicy::NoRetry)
    }

    #[test]
    fn config_builder() {
        let config = config()
            .with_attempt_timeout(Duration::from_secs(5))
            .with_maximum_execution_time(Duration::from_secs(20));
        assert_eq!(config.payload_format, PayloadFormat::Cbor);
        assert_eq!(config.location_mode, LocationMode::PrimaryOnly);
        assert_eq!(config.attempt_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.maximum_execution_time, Some(Duration::from_secs(20)));
    }

    #[test]
    fn empty_options_inherit_config() {
        let effective = RequestOptions::new().resolve(&config());
        assert_eq!(effective.payload_format, PayloadFormat::Cbor);
        assert_eq!(effective.retry_policy.name(), "none");
        assert_eq!(effective.attempt_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn options_override_config() {
        let effective = RequestOptions::new()
            .with_payload_format(PayloadFormat::Json)
            .with_location_mode(LocationMode::SecondaryOnly)
            .with_retry_policy(RetryPolicy::linear(2, Duration::from_millis(1)))
            .resolve(&config());
        assert_eq!(effective.payload_format, PayloadFormat::Json);
        assert_eq!(effective.location_mode, LocationMode::SecondaryOnly);
        assert_eq!(effective.retry_policy.name(), "linear");
    }
}
