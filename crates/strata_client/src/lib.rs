//! # Strata Client
//!
//! Request execution engine for a geo-replicated table storage service.
//!
//! This crate provides:
//! - An executor that drives one logical call through build, sign, send
//!   and classify, with retries and primary/secondary fallback
//! - Retry policies (none, linear, exponential, custom)
//! - Per-call diagnostics in an [`OperationContext`]
//! - Paged query enumeration with continuation tokens and take budgets
//! - Transport and signing abstractions, with loopback and mock transports
//!
//! ## Architecture
//!
//! Every logical call is one [`Executor::execute`] invocation:
//! 1. Resolve options and the first location
//! 2. Build, stamp and sign the request
//! 3. Send under the attempt and call deadlines
//! 4. Record the attempt, classify it, and either finish or back off
//!
//! ## Key Invariants
//!
//! - Exactly one terminal outcome per call
//! - One context entry per physical request, in order
//! - Policies are pure; only the executor sleeps
//! - Continuations are replayed against the replica that issued them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod classify;
mod client;
mod config;
mod context;
mod error;
mod executor;
mod query;
mod retry;
mod signing;
mod transport;

pub use cancel::CancellationToken;
pub use classify::{is_retryable_status, FatalKind, Outcome, RetryableKind};
pub use client::{TableClient, TableReference};
pub use config::{ClientConfig, EffectiveOptions, RequestOptions};
pub use context::{AttemptError, AttemptResult, OperationContext};
pub use error::{StorageError, StorageResult};
pub use executor::{CommandLocation, Executor, StorageCommand};
pub use query::{QueryEnumerable, QueryEnumerator, QuerySegment, TakeBudget};
pub use retry::{
    ExponentialRetry, LinearRetry, RetryContext, RetryDecision, RetryEvaluator, RetryPolicy,
};
pub use signing::{AnonymousSigner, RequestSigner, SharedKeySigner, SigningError};
pub use transport::{LoopbackTransport, MockTransport, SendContext, Transport, TransportError};
