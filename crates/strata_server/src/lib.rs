//! # Strata Server
//!
//! In-memory reference implementation of the table service.
//!
//! This crate provides:
//! - Paged table queries with `$filter`, `$select` and `$top`
//! - Continuation markers in response headers, honored on replay
//! - Atomic batch inserts with duplicate-key detection
//! - Shared-key signature verification (HMAC-SHA256)
//! - JSON and CBOR payloads, negotiated via `Accept`
//!
//! # Architecture
//!
//! [`TableServer`] implements [`strata_protocol::ServiceHandler`], so a
//! client can talk to it through a loopback transport with no sockets.
//! Tables live in a [`TableStore`]; servers that share a store act as the
//! primary and secondary replicas of one account.
//!
//! # Paging
//!
//! A query returns at most `min($top, max_page_size)` entities. If more
//! matches exist, the key of the next match comes back in the
//! `x-ms-continuation-NextPartitionKey` / `NextRowKey` headers, and a
//! request carrying those markers resumes exactly there.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod filter;
mod handler;
mod server;
mod store;

pub use auth::SignatureVerifier;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use filter::{CompareOp, Filter, Literal};
pub use handler::{HandlerContext, RequestHandler, Resource};
pub use server::TableServer;
pub use store::{EntityKey, ScanPage, TableStore};
