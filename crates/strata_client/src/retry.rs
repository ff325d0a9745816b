//! Retry policies.
//!
//! A policy is a pure function of the attempt history. It never sleeps and
//! never touches the network: the executor asks it for a [`RetryDecision`]
//! after each retryable failure and carries the decision out itself.
//!
//! All built-in policies share two stop rules: a non-retryable outcome
//! stops, and so does reaching `max_attempts` (which counts the first
//! attempt). Location fallback follows the [`LocationMode`] and only happens
//! for failures another replica might not share.

use crate::classify::Outcome;
use crate::context::{AttemptError, AttemptResult};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strata_protocol::{LocationMode, StorageLocation};

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// How long to wait before the next attempt.
    pub backoff: Duration,
    /// Replica for the next attempt.
    pub next_location: StorageLocation,
}

/// Everything a policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    /// The attempt that just failed.
    pub last: &'a AttemptResult,
    /// Every attempt of the call so far, `last` included.
    pub history: &'a [AttemptResult],
    /// Replica `last` was sent to.
    pub current_location: StorageLocation,
    /// Location mode in effect for the call.
    pub location_mode: LocationMode,
    /// Id shared by all attempts of the call.
    pub client_request_id: &'a str,
}

impl RetryContext<'_> {
    /// Classification of the failed attempt.
    pub fn outcome(&self) -> Outcome {
        Outcome::of_attempt(self.last)
    }

    fn next_location(&self) -> StorageLocation {
        self.location_mode
            .next_location(self.current_location, self.outcome().is_fallback_eligible())
    }

    fn should_stop(&self, max_attempts: u32) -> bool {
        !self.outcome().is_retryable() || self.attempt >= max_attempts
    }
}

/// A caller-supplied retry rule.
pub trait RetryEvaluator: Send + Sync + fmt::Debug {
    /// Returns a decision to retry, or `None` to stop.
    fn evaluate(&self, ctx: &RetryContext<'_>) -> Option<RetryDecision>;
}

/// Fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRetry {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    /// Delay before every retry.
    pub delta_backoff: Duration,
}

impl LinearRetry {
    /// Creates a linear policy.
    pub fn new(max_attempts: u32, delta_backoff: Duration) -> Self {
        Self {
            max_attempts,
            delta_backoff,
        }
    }

    fn evaluate(&self, ctx: &RetryContext<'_>) -> Option<RetryDecision> {
        if ctx.should_stop(self.max_attempts) {
            return None;
        }
        Some(RetryDecision {
            backoff: self.delta_backoff,
            next_location: ctx.next_location(),
        })
    }
}

impl Default for LinearRetry {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(30))
    }
}

/// Exponentially growing delay with bounded jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialRetry {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    /// Base unit of the backoff curve.
    pub delta_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl ExponentialRetry {
    /// Creates an exponential policy with a 90 second ceiling.
    pub fn new(max_attempts: u32, delta_backoff: Duration) -> Self {
        Self {
            max_attempts,
            delta_backoff,
            max_backoff: Duration::from_secs(90),
        }
    }

    /// Sets the ceiling.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// `min(max_backoff, delta * (2^(n-1) - 1) / 2 + jitter)` with jitter in
    /// `[0, delta / 5)`. The jitter is drawn from a generator seeded by the
    /// call's id and the attempt number, so the result is reproducible yet
    /// differs between calls. Because every step of the curve grows by at
    /// least `delta / 2`, the delay never decreases with `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32, client_request_id: &str) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62);
        let factor = (1u64 << exponent) - 1;
        let base_nanos = (self.delta_backoff.as_nanos() / 2).saturating_mul(u128::from(factor));

        let jitter_bound = self.delta_backoff.as_nanos() / 5;
        let jitter = if jitter_bound == 0 {
            0
        } else {
            let mut rng = StdRng::seed_from_u64(jitter_seed(client_request_id, attempt));
            rng.gen_range(0..jitter_bound)
        };

        let total = base_nanos.saturating_add(jitter);
        if total >= self.max_backoff.as_nanos() {
            self.max_backoff
        } else {
            // Below max_backoff, so it fits in a u64 worth of nanoseconds.
            Duration::from_nanos(u64::try_from(total).unwrap_or(u64::MAX))
        }
    }

    fn evaluate(&self, ctx: &RetryContext<'_>) -> Option<RetryDecision> {
        if ctx.should_stop(self.max_attempts) {
            return None;
        }
        Some(RetryDecision {
            backoff: self.delay_for_attempt(ctx.attempt, ctx.client_request_id),
            next_location: ctx.next_location(),
        })
    }
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(4))
    }
}

fn jitter_seed(client_request_id: &str, attempt: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(client_request_id.as_bytes());
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(seed)
}

/// How a call reacts to transient failures.
///
/// Policies are immutable and cheap to clone; one value may serve any
/// number of concurrent calls.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Every call makes exactly one attempt.
    NoRetry,
    /// Fixed delay.
    Linear(LinearRetry),
    /// Exponential delay.
    Exponential(ExponentialRetry),
    /// Caller-supplied rule.
    Custom(Arc<dyn RetryEvaluator>),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential(ExponentialRetry::default())
    }
}

impl RetryPolicy {
    /// Linear policy shorthand.
    pub fn linear(max_attempts: u32, delta_backoff: Duration) -> Self {
        RetryPolicy::Linear(LinearRetry::new(max_attempts, delta_backoff))
    }

    /// Exponential policy shorthand.
    pub fn exponential(max_attempts: u32, delta_backoff: Duration) -> Self {
        RetryPolicy::Exponential(ExponentialRetry::new(max_attempts, delta_backoff))
    }

    /// Wraps a custom evaluator.
    pub fn custom(evaluator: impl RetryEvaluator + 'static) -> Self {
        RetryPolicy::Custom(Arc::new(evaluator))
    }

    /// Decides whether to retry after the attempt described by `ctx`.
    pub fn evaluate(&self, ctx: &RetryContext<'_>) -> Option<RetryDecision> {
        match self {
            RetryPolicy::NoRetry => None,
            RetryPolicy::Linear(policy) => policy.evaluate(ctx),
            RetryPolicy::Exponential(policy) => policy.evaluate(ctx),
            RetryPolicy::Custom(evaluator) => evaluator.evaluate(ctx),
        }
    }

    /// Short name for logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            RetryPolicy::NoRetry => "none",
            RetryPolicy::Linear(_) => "linear",
            RetryPolicy::Exponential(_) => "exponential",
            RetryPolicy::Custom(_) => "custom",
        }
    }

    /// Delays the policy would produce if every attempt failed with a 503,
    /// considering at most `attempts` attempts. The list ends where the
    /// policy stops.
    pub fn delay_schedule(
        &self,
        attempts: u32,
        mode: LocationMode,
        client_request_id: &str,
    ) -> Vec<RetryDecision> {
        let mut history = Vec::new();
        let mut decisions = Vec::new();
        let mut location = mode.initial_location();
        for attempt in 1..=attempts {
            let now = Utc::now();
            history.push(AttemptResult {
                location,
                status_code: Some(503),
                service_request_id: None,
                start_time: now,
                end_time: now,
                error: Some(AttemptError::Status {
                    status: 503,
                    message: "server busy".into(),
                }),
            });
            let Some(last) = history.last() else { break };
            let ctx = RetryContext {
                attempt,
                last,
                history: &history,
                current_location: location,
                location_mode: mode,
                client_request_id,
            };
            match self.evaluate(&ctx) {
                Some(decision) => {
                    location = decision.next_location;
                    decisions.push(decision);
                }
                None => break,
            }
        }
        decisions
    }
}
