//! Table client surface.

use crate::cancel::CancellationToken;
use crate::config::{ClientConfig, EffectiveOptions, RequestOptions};
use crate::context::OperationContext;
use crate::error::{StorageError, StorageResult};
use crate::executor::{CommandLocation, Executor, StorageCommand};
use crate::query::{QueryCommand, QueryEnumerable, QuerySegment};
use crate::signing::{AnonymousSigner, RequestSigner};
use crate::transport::Transport;
use std::sync::Arc;
use strata_protocol::{
    codec_for, headers, ContinuationToken, EndpointPair, HttpMethod, ProtocolResult,
    StorageLocation, StorageRequest, StorageResponse, TableEntity, TableQuery,
    SERVER_MAX_PAGE_SIZE,
};
use url::Url;

/// Entry point: configuration, transport and credentials for one account.
pub struct TableClient<T: Transport> {
    executor: Executor<T>,
}

impl<T: Transport> TableClient<T> {
    /// Creates a client that sends unsigned requests.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_signer(config, transport, Arc::new(AnonymousSigner))
    }

    /// Creates a client that signs every request with `signer`.
    pub fn with_signer(config: ClientConfig, transport: T, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            executor: Executor::new(config, transport, signer),
        }
    }

    /// Returns a reference to table `name`.
    pub fn table(&self, name: &str) -> StorageResult<TableReference<T>> {
        validate_table_name(name)?;
        let base = &self.executor.config().endpoints;
        Ok(TableReference {
            name: name.to_string(),
            endpoints: base.join(name)?,
            query_endpoints: base.join(&format!("{name}()"))?,
            executor: self.executor.clone(),
        })
    }

    /// The executor shared by every table reference.
    pub fn executor(&self) -> &Executor<T> {
        &self.executor
    }

    /// Client-wide configuration.
    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }
}

fn validate_table_name(name: &str) -> StorageResult<()> {
    let valid = (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(StorageError::invalid_argument(format!(
            "invalid table name {name:?}: expected 3-63 alphanumeric characters starting with a letter"
        )))
    }
}

/// A handle on one table. Cheap to clone.
pub struct TableReference<T: Transport> {
    name: String,
    endpoints: EndpointPair,
    query_endpoints: EndpointPair,
    executor: Executor<T>,
}

impl<T: Transport> Clone for TableReference<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            endpoints: self.endpoints.clone(),
            query_endpoints: self.query_endpoints.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<T: Transport> TableReference<T> {
    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoints of the table's query resource.
    pub fn query_endpoints(&self) -> &EndpointPair {
        &self.query_endpoints
    }

    /// Fetches a single page.
    ///
    /// The take count, if any, caps the page size. The service's token is
    /// returned as is: it may point past the take count.
    pub async fn execute_query_segmented(
        &self,
        query: &TableQuery,
        token: Option<&ContinuationToken>,
        ctx: &OperationContext,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<QuerySegment> {
        let page_size = query
            .take_count()
            .map(|take| take.min(SERVER_MAX_PAGE_SIZE));
        self.query_page(query, token, page_size, ctx, options, cancel)
            .await
    }

    /// Prepares a query for paged enumeration.
    pub fn execute_query(&self, query: TableQuery) -> QueryEnumerable<T> {
        QueryEnumerable::new(self.clone(), query)
    }

    /// Inserts entities in one request. Writes always go to the primary.
    pub async fn insert_entities(
        &self,
        entities: Vec<TableEntity>,
        ctx: &OperationContext,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        if entities.is_empty() {
            return Err(StorageError::invalid_argument("no entities to insert"));
        }
        let command = InsertEntities {
            endpoints: &self.endpoints,
            entities,
        };
        self.executor.execute(&command, ctx, options, cancel).await
    }

    pub(crate) async fn query_page(
        &self,
        query: &TableQuery,
        token: Option<&ContinuationToken>,
        page_size: Option<u32>,
        ctx: &OperationContext,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<QuerySegment> {
        let command = QueryCommand::new(&self.query_endpoints, query, token, page_size);
        self.executor.execute(&command, ctx, options, cancel).await
    }
}

struct InsertEntities<'a> {
    endpoints: &'a EndpointPair,
    entities: Vec<TableEntity>,
}

impl StorageCommand for InsertEntities<'_> {
    type Output = ();

    fn endpoints(&self) -> &EndpointPair {
        self.endpoints
    }

    fn location_requirement(&self) -> CommandLocation {
        CommandLocation::PrimaryOnly
    }

    fn build(
        &self,
        base: &Url,
        _location: StorageLocation,
        options: &EffectiveOptions,
    ) -> ProtocolResult<StorageRequest> {
        let format = options.payload_format;
        let body = codec_for(format).serialize_entities(&self.entities)?;
        Ok(StorageRequest::new(HttpMethod::Post, base.clone())
            .with_header(headers::CONTENT_TYPE, format.content_type())
            .with_body(body))
    }

    fn parse(
        &self,
        _response: StorageResponse,
        _location: StorageLocation,
        _options: &EffectiveOptions,
    ) -> ProtocolResult<()> {
        Ok(())
    }
}
