//! # Strata Protocol
//!
//! Wire-level types for a geo-replicated table storage service.
//!
//! This crate provides:
//! - `QueryStringBuilder` for request URIs
//! - `EndpointPair`, `StorageLocation` and `LocationMode` for replica selection
//! - `ContinuationToken` for resuming paged queries
//! - `TableEntity`, `TableQuery` and the JSON/CBOR payload codecs
//! - `StorageRequest`/`StorageResponse` and the canonical signing string
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod continuation;
pub mod endpoint;
pub mod entity;
mod error;
pub mod http;
pub mod location;
pub mod payload;
pub mod query;
pub mod query_string;
pub mod signing;

pub use continuation::ContinuationToken;
pub use endpoint::EndpointPair;
pub use entity::{PropertyValue, TableEntity};
pub use error::{ProtocolError, ProtocolResult};
pub use http::{
    headers, HeaderMap, HttpMethod, ServiceHandler, StorageRequest, StorageResponse,
    SERVICE_VERSION,
};
pub use location::{LocationMode, StorageLocation};
pub use payload::{codec_for, CborCodec, JsonCodec, PayloadCodec, PayloadFormat};
pub use query::{TableQuery, SERVER_MAX_PAGE_SIZE};
pub use query_string::QueryStringBuilder;
