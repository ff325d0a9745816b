//! Request handlers for the table endpoints.

use crate::auth::SignatureVerifier;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::filter::Filter;
use crate::store::{EntityKey, TableStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_protocol::continuation::{NEXT_PARTITION_KEY_PARAM, NEXT_ROW_KEY_PARAM};
use strata_protocol::query::{FILTER_PARAM, SELECT_PARAM, TOP_PARAM};
use strata_protocol::{
    codec_for, headers, HttpMethod, PayloadFormat, StorageRequest, StorageResponse,
};

/// State shared by every request.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Table data (shared across replicas).
    pub store: Arc<TableStore>,
    verifier: Option<SignatureVerifier>,
    requests: AtomicU64,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(config: ServerConfig, store: Arc<TableStore>) -> Self {
        let verifier = match (&config.require_auth, &config.account_key) {
            (true, Some(key)) => Some(SignatureVerifier::new(config.account.clone(), key.clone())),
            _ => None,
        };
        Self {
            config,
            store,
            verifier,
            requests: AtomicU64::new(0),
        }
    }

    /// Requests received so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Which resource a request path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// `/{table}()`, the query resource.
    Query(String),
    /// `/{table}`, the entity collection.
    Collection(String),
}

impl Resource {
    /// Parses the last path segment. A prefix such as an account name is ignored.
    pub fn from_path(path: &str) -> ServerResult<Self> {
        let segment = path.rsplit('/').next().unwrap_or_default();
        let resource = match segment.strip_suffix("()") {
            Some(table) => Resource::Query(table.to_string()),
            None => Resource::Collection(segment.to_string()),
        };
        if resource.table().is_empty() {
            return Err(ServerError::InvalidRequest(format!("no table in path {path:?}")));
        }
        Ok(resource)
    }

    /// Table name.
    pub fn table(&self) -> &str {
        match self {
            Resource::Query(t) | Resource::Collection(t) => t,
        }
    }
}

/// Handler for table requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Authenticates, routes and answers one request.
    pub fn dispatch(&self, request: &StorageRequest) -> ServerResult<StorageResponse> {
        self.context.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(verifier) = &self.context.verifier {
            verifier.verify(request)?;
        }
        match (request.method, Resource::from_path(request.url.path())?) {
            (HttpMethod::Get, Resource::Query(table)) => self.handle_query(request, &table),
            (HttpMethod::Post, Resource::Collection(table)) => self.handle_insert(request, &table),
            (method, resource) => Err(ServerError::MethodNotAllowed(format!(
                "{method} on {resource:?}"
            ))),
        }
    }

    /// Handles a paged query.
    pub fn handle_query(
        &self,
        request: &StorageRequest,
        table: &str,
    ) -> ServerResult<StorageResponse> {
        let max = self.context.config.max_page_size;
        let limit = match request.query_param(TOP_PARAM) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(top) if top > 0 => top.min(max),
                _ => {
                    return Err(ServerError::InvalidRequest(format!(
                        "{TOP_PARAM} must be a positive integer, got {raw:?}"
                    )))
                }
            },
            None => max,
        };
        let filter = request
            .query_param(FILTER_PARAM)
            .map(|raw| Filter::parse(&raw))
            .transpose()?;
        let select: Option<Vec<String>> = request.query_param(SELECT_PARAM).map(|raw| {
            raw.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        });
        let start = start_key(request)?;
        let format = response_format(request, self.context.config.default_format)?;

        let mut page = self.context.store.scan(table, start.as_ref(), limit as usize, |e| {
            filter.as_ref().map_or(true, |f| f.matches(e))
        })?;
        if let Some(columns) = &select {
            for entity in &mut page.entities {
                entity.project(columns);
            }
        }

        let body = codec_for(format).serialize_entities(&page.entities)?;
        let mut response = StorageResponse::new(200)
            .with_header(headers::CONTENT_TYPE, format.content_type())
            .with_body(body);
        if let Some((pk, rk)) = page.next_key {
            response = response
                .with_header(headers::NEXT_PARTITION_KEY, pk)
                .with_header(headers::NEXT_ROW_KEY, rk);
        }
        tracing::debug!(
            table,
            returned = page.entities.len(),
            limit,
            more = response.headers.contains(headers::NEXT_PARTITION_KEY),
            "query page served"
        );
        Ok(response)
    }

    /// Handles an entity insert. The whole body is stored or nothing is.
    pub fn handle_insert(
        &self,
        request: &StorageRequest,
        table: &str,
    ) -> ServerResult<StorageResponse> {
        let content_type = request.headers.get(headers::CONTENT_TYPE).ok_or_else(|| {
            ServerError::InvalidRequest(format!("missing {}", headers::CONTENT_TYPE))
        })?;
        let format = PayloadFormat::from_content_type(content_type)
            .ok_or_else(|| ServerError::UnsupportedMediaType(content_type.to_string()))?;
        let entities = codec_for(format).parse_entities(&request.body, content_type)?;
        if entities.is_empty() {
            return Err(ServerError::InvalidRequest("empty insert".into()));
        }
        let count = entities.len();
        self.context.store.insert_batch(table, entities)?;
        tracing::debug!(table, count, "entities inserted");
        Ok(StorageResponse::new(204))
    }
}

fn start_key(request: &StorageRequest) -> ServerResult<Option<EntityKey>> {
    match (
        request.query_param(NEXT_PARTITION_KEY_PARAM),
        request.query_param(NEXT_ROW_KEY_PARAM),
    ) {
        (Some(pk), rk) => Ok(Some((pk, rk.unwrap_or_default()))),
        (None, None) => Ok(None),
        (None, Some(_)) => Err(ServerError::InvalidRequest(format!(
            "{NEXT_ROW_KEY_PARAM} without {NEXT_PARTITION_KEY_PARAM}"
        ))),
    }
}

fn response_format(request: &StorageRequest, default: PayloadFormat) -> ServerResult<PayloadFormat> {
    match request.headers.get(headers::ACCEPT) {
        None => Ok(default),
        Some(accept) if accept.trim() == "*/*" => Ok(default),
        Some(accept) => PayloadFormat::from_content_type(accept)
            .ok_or_else(|| ServerError::UnsupportedMediaType(accept.to_string())),
    }
}
