//! The reference table service.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::TableStore;
use std::sync::Arc;
use strata_protocol::{
    headers, ServiceHandler, StorageRequest, StorageResponse, TableEntity, SERVICE_VERSION,
};
use uuid::Uuid;

/// In-memory table service.
///
/// Answers query and insert requests for the tables in its store. Two
/// servers built over the same [`TableStore`] behave as the primary and
/// secondary replica of one account.
///
/// # Example
///
/// ```
/// use strata_server::{ServerConfig, TableServer};
/// use strata_protocol::TableEntity;
///
/// let server = TableServer::new(ServerConfig::new("acct"));
/// server.create_table("people");
/// server.insert_entity("people", TableEntity::new("p", "r")).unwrap();
/// assert_eq!(server.entity_count("people").unwrap(), 1);
/// ```
pub struct TableServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl TableServer {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(TableStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<TableStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Creates a table. Returns false if it already existed.
    pub fn create_table(&self, name: &str) -> bool {
        self.context.store.create_table(name)
    }

    /// Inserts one entity directly, bypassing the request path.
    pub fn insert_entity(&self, table: &str, entity: TableEntity) -> ServerResult<()> {
        self.context.store.insert(table, entity)
    }

    /// Inserts entities atomically, bypassing the request path.
    pub fn insert_batch(&self, table: &str, entities: Vec<TableEntity>) -> ServerResult<()> {
        self.context.store.insert_batch(table, entities)
    }

    /// Number of entities in a table.
    pub fn entity_count(&self, table: &str) -> ServerResult<usize> {
        self.context.store.count(table)
    }

    /// Requests received over [`ServiceHandler::handle`].
    pub fn request_count(&self) -> u64 {
        self.context.request_count()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<TableStore> {
        &self.context.store
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }
}

impl ServiceHandler for TableServer {
    fn handle(&self, request: &StorageRequest) -> StorageResponse {
        let mut response = match self.handler.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    method = %request.method,
                    path = request.url.path(),
                    status = err.status_code(),
                    error = %err,
                    "request rejected"
                );
                StorageResponse::new(err.status_code())
                    .with_header(headers::CONTENT_TYPE, "application/json")
                    .with_body(err.to_body())
            }
        };
        response.headers.insert(headers::REQUEST_ID, Uuid::new_v4().to_string());
        response.headers.insert(headers::VERSION, SERVICE_VERSION);
        if let Some(id) = request.headers.get(headers::CLIENT_REQUEST_ID) {
            response.headers.insert(headers::CLIENT_REQUEST_ID, id);
        }
        response
    }
}
