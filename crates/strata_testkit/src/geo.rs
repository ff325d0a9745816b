//! A two-replica account served in-process.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_protocol::{
    headers, EndpointPair, ServiceHandler, StorageLocation, StorageRequest, StorageResponse,
};
use strata_server::{ServerConfig, TableServer, TableStore};

/// Routes requests to a primary or secondary [`TableServer`] by host.
///
/// Both replicas share one store. Either replica can be put into an
/// outage, in which it answers every request with a fixed status.
pub struct GeoReplicatedService {
    primary: TableServer,
    secondary: TableServer,
    hosts: HashMap<String, StorageLocation>,
    outages: RwLock<HashMap<StorageLocation, u16>>,
    primary_hits: AtomicU64,
    secondary_hits: AtomicU64,
}

impl GeoReplicatedService {
    /// Creates replicas for the hosts in `endpoints`.
    pub fn new(config: ServerConfig, endpoints: &EndpointPair) -> Self {
        let store = Arc::new(TableStore::new());
        let mut hosts = HashMap::new();
        if let Some(host) = endpoints.primary().host_str() {
            hosts.insert(host.to_string(), StorageLocation::Primary);
        }
        if let Some(host) = endpoints.secondary().and_then(|url| url.host_str()) {
            hosts.insert(host.to_string(), StorageLocation::Secondary);
        }
        Self {
            primary: TableServer::with_store(config.clone(), Arc::clone(&store)),
            secondary: TableServer::with_store(config, store),
            hosts,
            outages: RwLock::new(HashMap::new()),
            primary_hits: AtomicU64::new(0),
            secondary_hits: AtomicU64::new(0),
        }
    }

    /// The primary replica.
    pub fn primary(&self) -> &TableServer {
        &self.primary
    }

    /// The secondary replica.
    pub fn secondary(&self) -> &TableServer {
        &self.secondary
    }

    /// Makes `location` answer every request with `status`.
    pub fn set_outage(&self, location: StorageLocation, status: u16) {
        self.outages.write().insert(location, status);
    }

    /// Ends an outage.
    pub fn clear_outage(&self, location: StorageLocation) {
        self.outages.write().remove(&location);
    }

    /// Requests that reached `location`, outages included.
    pub fn hits(&self, location: StorageLocation) -> u64 {
        match location {
            StorageLocation::Primary => self.primary_hits.load(Ordering::Relaxed),
            StorageLocation::Secondary => self.secondary_hits.load(Ordering::Relaxed),
        }
    }

    fn route(&self, request: &StorageRequest) -> Option<StorageLocation> {
        request
            .url
            .host_str()
            .and_then(|host| self.hosts.get(host).copied())
    }
}

impl ServiceHandler for GeoReplicatedService {
    fn handle(&self, request: &StorageRequest) -> StorageResponse {
        let Some(location) = self.route(request) else {
            return StorageResponse::new(404).with_body("unknown host");
        };
        let (server, hits) = match location {
            StorageLocation::Primary => (&self.primary, &self.primary_hits),
            StorageLocation::Secondary => (&self.secondary, &self.secondary_hits),
        };
        hits.fetch_add(1, Ordering::Relaxed);

        let outage = self.outages.read().get(&location).copied();
        if let Some(status) = outage {
            tracing::debug!(%location, status, "replica in outage");
            return StorageResponse::new(status)
                .with_header(headers::REQUEST_ID, format!("outage-{location}"))
                .with_body("replica unavailable");
        }
        server.handle(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{test_endpoints, ACCOUNT};
    use strata_protocol::HttpMethod;
    use url::Url;

    fn get(base: &Url) -> StorageRequest {
        StorageRequest::new(HttpMethod::Get, base.join("people()").unwrap())
    }

    #[test]
    fn routes_by_host() {
        let endpoints = test_endpoints();
        let service = GeoReplicatedService::new(ServerConfig::new(ACCOUNT), &endpoints);
        service.primary().create_table("people");

        assert_eq!(service.handle(&get(endpoints.primary())).status, 200);
        assert_eq!(service.handle(&get(endpoints.secondary().unwrap())).status, 200);
        assert_eq!(service.hits(StorageLocation::Primary), 1);
        assert_eq!(service.hits(StorageLocation::Secondary), 1);

        let stray = Url::parse("https://elsewhere.example.net/").unwrap();
        assert_eq!(service.handle(&get(&stray)).status, 404);
    }

    #[test]
    fn outage_affects_one_replica() {
        let endpoints = test_endpoints();
        let service = GeoReplicatedService::new(ServerConfig::new(ACCOUNT), &endpoints);
        service.primary().create_table("people");
        service.set_outage(StorageLocation::Primary, 503);

        assert_eq!(service.handle(&get(endpoints.primary())).status, 503);
        assert_eq!(service.handle(&get(endpoints.secondary().unwrap())).status, 200);

        service.clear_outage(StorageLocation::Primary);
        assert_eq!(service.handle(&get(endpoints.primary())).status, 200);
    }
}
