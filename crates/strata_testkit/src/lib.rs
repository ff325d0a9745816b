//! # Strata Testkit
//!
//! Test utilities for the strata table client.
//!
//! This crate provides:
//! - A seeded, two-replica account served in-process
//! - A geo-replicated router with per-replica outage switches
//! - A fault-injecting transport wrapper
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pages_through_table() {
//!     let account = TestAccount::seeded(2, 100);
//!     let rows = account
//!         .table()
//!         .execute_query(TableQuery::new())
//!         .enumerate()
//!         .collect_all()
//!         .await
//!         .unwrap();
//!     assert_eq!(rows.len(), 200);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod geo;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::geo::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use geo::*;
