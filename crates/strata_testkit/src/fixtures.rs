//! Test fixtures and account helpers.
//!
//! Provides a seeded, two-replica account served in-process, plus clients
//! wired to it through the loopback transport.

use crate::geo::GeoReplicatedService;
use std::sync::Arc;
use strata_client::{
    ClientConfig, LoopbackTransport, SharedKeySigner, TableClient, TableReference,
};
use strata_protocol::{EndpointPair, TableEntity};
use strata_server::{ServerConfig, TableServer};

/// Account name used by fixtures.
pub const ACCOUNT: &str = "devstoreaccount";
/// Primary endpoint of the fixture account.
pub const PRIMARY_URL: &str = "https://devstoreaccount.table.example.net";
/// Secondary endpoint of the fixture account.
pub const SECONDARY_URL: &str = "https://devstoreaccount-secondary.table.example.net";
/// Account key used when signatures are required.
pub const ACCOUNT_KEY: &[u8] = b"strata-test-account-key-32-bytes";
/// Table created by [`TestAccount::seeded`].
pub const TABLE: &str = "tablesquery";

/// Client type produced by the fixtures.
pub type LoopbackClient = TableClient<LoopbackTransport<Arc<GeoReplicatedService>>>;

/// Endpoints of the fixture account, secondary included.
pub fn test_endpoints() -> EndpointPair {
    EndpointPair::parse(PRIMARY_URL, Some(SECONDARY_URL)).expect("Invalid fixture endpoints")
}

/// Entity shaped like the seeded rows: `foo` plus four letter columns.
pub fn sample_entity(partition_key: impl Into<String>, row_key: impl Into<String>) -> TableEntity {
    TableEntity::new(partition_key, row_key)
        .with_property("foo", "bar")
        .with_property("A", "a")
        .with_property("B", "b")
        .with_property("C", "c")
        .with_property("D", "d")
}

/// Creates `table` and fills it with `batches` partitions named
/// `tables_batch_{i}`, each holding `rows` entities keyed `0000`, `0001`, ...
pub fn seed_table(server: &TableServer, table: &str, batches: usize, rows: usize) {
    server.create_table(table);
    for batch in 0..batches {
        let partition = format!("tables_batch_{batch}");
        let entities = (0..rows)
            .map(|row| sample_entity(partition.clone(), format!("{row:04}")))
            .collect();
        server
            .insert_batch(table, entities)
            .expect("Failed to seed table");
    }
}

/// A two-replica account served in-process.
pub struct TestAccount {
    /// Service routing by host to the primary or secondary replica.
    pub service: Arc<GeoReplicatedService>,
}

impl TestAccount {
    /// Creates an account with no tables.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::new(ACCOUNT))
    }

    /// Creates an account whose replicas use `config`.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            service: Arc::new(GeoReplicatedService::new(config, &test_endpoints())),
        }
    }

    /// Creates an account whose replicas require shared-key signatures.
    pub fn with_auth() -> Self {
        Self::with_config(ServerConfig::new(ACCOUNT).with_auth(ACCOUNT_KEY.to_vec()))
    }

    /// Creates an account with [`TABLE`] seeded by [`seed_table`].
    pub fn seeded(batches: usize, rows: usize) -> Self {
        let account = Self::new();
        seed_table(account.primary(), TABLE, batches, rows);
        account
    }

    /// The primary replica.
    pub fn primary(&self) -> &TableServer {
        self.service.primary()
    }

    /// A client with default retries and the given tweaks applied.
    pub fn client(&self, configure: impl FnOnce(ClientConfig) -> ClientConfig) -> LoopbackClient {
        let config = configure(ClientConfig::new(test_endpoints()));
        TableClient::new(config, LoopbackTransport::new(Arc::clone(&self.service)))
    }

    /// A client that signs with the fixture account key.
    pub fn signed_client(
        &self,
        configure: impl FnOnce(ClientConfig) -> ClientConfig,
    ) -> LoopbackClient {
        let config = configure(ClientConfig::new(test_endpoints()));
        let signer =
            SharedKeySigner::from_bytes(ACCOUNT, ACCOUNT_KEY.to_vec()).expect("Invalid fixture key");
        TableClient::with_signer(
            config,
            LoopbackTransport::new(Arc::clone(&self.service)),
            Arc::new(signer),
        )
    }

    /// Reference to [`TABLE`] through a default client.
    pub fn table(&self) -> TableReference<LoopbackTransport<Arc<GeoReplicatedService>>> {
        self.client(|c| c)
            .table(TABLE)
            .expect("Invalid fixture table name")
    }
}

impl Default for TestAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_fills_partitions() {
        let account = TestAccount::seeded(3, 20);
        assert_eq!(account.primary().entity_count(TABLE).unwrap(), 60);
    }

    #[test]
    fn endpoints_have_both_replicas() {
        let endpoints = test_endpoints();
        assert!(endpoints.has_secondary());
        assert_eq!(endpoints.primary().host_str(), Some("devstoreaccount.table.example.net"));
    }

    #[test]
    fn sample_entity_shape() {
        let entity = sample_entity("p", "0001");
        assert_eq!(entity.properties.len(), 5);
        assert_eq!(entity.property("foo").and_then(|v| v.as_str()), Some("bar"));
    }
}
