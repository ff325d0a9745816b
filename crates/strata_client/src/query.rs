//! Segmented query execution.
//!
//! A query is served in pages. Each page is one logical call through the
//! executor, so each page gets its own retries and its own
//! [`OperationContext`]. Between pages the enumerator keeps the server's
//! continuation token and the caller's remaining take budget.
//!
//! Page size is `min(1000, remaining)`, sent as `$top`, so the service
//! normally never returns more than the budget allows. If it does anyway,
//! the surplus is dropped, the token for that page is discarded and a
//! warning names how many entities were dropped.

use crate::cancel::CancellationToken;
use crate::client::TableReference;
use crate::config::{EffectiveOptions, RequestOptions};
use crate::context::OperationContext;
use crate::error::{StorageError, StorageResult};
use crate::executor::{CommandLocation, StorageCommand};
use crate::transport::Transport;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use strata_protocol::{
    codec_for, headers, ContinuationToken, EndpointPair, HttpMethod, PayloadFormat,
    ProtocolResult, QueryStringBuilder, StorageLocation, StorageRequest, StorageResponse,
    TableEntity, TableQuery, SERVER_MAX_PAGE_SIZE,
};
use tracing::{debug, info, warn};
use url::Url;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySegment {
    /// Entities in service order.
    pub results: Vec<TableEntity>,
    /// Where the next page starts, or `None` at the end of the results.
    pub continuation_token: Option<ContinuationToken>,
}

impl QuerySegment {
    /// Returns true if the service has more results after this page.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// How many more entities the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeBudget {
    /// The configured take count, if any.
    pub requested: Option<u32>,
    /// What is left of it.
    pub remaining: Option<u32>,
}

impl TakeBudget {
    /// A budget of `requested` entities, or an unbounded one.
    pub fn new(requested: Option<u32>) -> Self {
        Self {
            requested,
            remaining: requested,
        }
    }

    /// Returns true once the whole take count has been delivered.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Page size to request next.
    pub fn page_size(&self) -> u32 {
        self.remaining
            .map_or(SERVER_MAX_PAGE_SIZE, |remaining| remaining.min(SERVER_MAX_PAGE_SIZE))
    }

    fn consume(&mut self, delivered: usize) {
        if let Some(ref mut remaining) = self.remaining {
            let delivered = u32::try_from(delivered).unwrap_or(u32::MAX);
            *remaining = remaining.saturating_sub(delivered);
        }
    }
}

/// Executor command for one page of a query.
pub(crate) struct QueryCommand<'a> {
    endpoints: &'a EndpointPair,
    query: &'a TableQuery,
    token: Option<&'a ContinuationToken>,
    page_size: Option<u32>,
}

impl<'a> QueryCommand<'a> {
    pub(crate) fn new(
        endpoints: &'a EndpointPair,
        query: &'a TableQuery,
        token: Option<&'a ContinuationToken>,
        page_size: Option<u32>,
    ) -> Self {
        Self {
            endpoints,
            query,
            token,
            page_size,
        }
    }
}

impl StorageCommand for QueryCommand<'_> {
    type Output = QuerySegment;

    fn endpoints(&self) -> &EndpointPair {
        self.endpoints
    }

    fn location_requirement(&self) -> CommandLocation {
        // Server continuity is only guaranteed against the issuing replica.
        self.token
            .and_then(ContinuationToken::target_location)
            .map_or(CommandLocation::Any, CommandLocation::Pinned)
    }

    fn build(
        &self,
        base: &Url,
        _location: StorageLocation,
        options: &EffectiveOptions,
    ) -> ProtocolResult<StorageRequest> {
        let mut builder = QueryStringBuilder::new();
        self.query.apply_to_query(&mut builder, self.page_size)?;
        if let Some(token) = self.token {
            token.apply_to_query(&mut builder)?;
        }
        Ok(
            StorageRequest::new(HttpMethod::Get, builder.merge_into_url(base))
                .with_header(headers::ACCEPT, options.payload_format.content_type()),
        )
    }

    fn parse(
        &self,
        response: StorageResponse,
        location: StorageLocation,
        options: &EffectiveOptions,
    ) -> ProtocolResult<QuerySegment> {
        let content_type = response
            .headers
            .get(headers::CONTENT_TYPE)
            .unwrap_or(options.payload_format.content_type());
        let format = PayloadFormat::from_content_type(content_type).unwrap_or(options.payload_format);
        let results = codec_for(format).parse_entities(&response.body, content_type)?;
        Ok(QuerySegment {
            results,
            continuation_token: ContinuationToken::from_response(&response, location),
        })
    }
}

/// A query bound to a table, ready to be enumerated any number of times.
///
/// Every call to [`enumerate`](Self::enumerate) starts an independent
/// session from the first page; sessions share no mutable state.
pub struct QueryEnumerable<T: Transport> {
    table: TableReference<T>,
    query: TableQuery,
    options: RequestOptions,
    cancel: CancellationToken,
}

impl<T: Transport> Clone for QueryEnumerable<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            query: self.query.clone(),
            options: self.options.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Transport> QueryEnumerable<T> {
    pub(crate) fn new(table: TableReference<T>, query: TableQuery) -> Self {
        Self {
            table,
            query,
            options: RequestOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Applies per-call options to every page request.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Ties every page request to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The query being enumerated.
    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    /// Starts a fresh session at the first page.
    pub fn enumerate(&self) -> QueryEnumerator<T> {
        QueryEnumerator {
            source: self.clone(),
            token: None,
            budget: TakeBudget::new(self.query.take_count()),
            finished: false,
            pages_fetched: 0,
        }
    }

    /// Resumes a session from a token and budget saved from an earlier one.
    pub fn enumerate_from(&self, token: ContinuationToken, budget: TakeBudget) -> QueryEnumerator<T> {
        QueryEnumerator {
            source: self.clone(),
            token: Some(token),
            finished: budget.is_exhausted(),
            budget,
            pages_fetched: 0,
        }
    }
}

/// One paging session over a query.
///
/// Not meant to be driven from two tasks at once; `next_page` takes
/// `&mut self`. A failed page leaves the token and budget untouched, so
/// calling `next_page` again retries the same page.
pub struct QueryEnumerator<T: Transport> {
    source: QueryEnumerable<T>,
    token: Option<ContinuationToken>,
    budget: TakeBudget,
    finished: bool,
    pages_fetched: usize,
}

impl<T: Transport> QueryEnumerator<T> {
    /// Fetches the next page, or returns `None` once the session is over.
    pub async fn next_page(&mut self, ctx: &OperationContext) -> StorageResult<Option<Vec<TableEntity>>> {
        if self.finished {
            return Ok(None);
        }

        let page_size = self.budget.page_size();
        let segment = self
            .source
            .table
            .query_page(
                &self.source.query,
                self.token.as_ref(),
                Some(page_size),
                ctx,
                &self.source.options,
                &self.source.cancel,
            )
            .await?;

        let QuerySegment {
            mut results,
            continuation_token,
        } = segment;
        let mut next_token = continuation_token;

        if let Some(remaining) = self.budget.remaining {
            let remaining = remaining as usize;
            if results.len() > remaining {
                warn!(
                    client_request_id = %ctx.client_request_id(),
                    dropped = results.len() - remaining,
                    requested = page_size,
                    "service returned more entities than requested; truncating page and ending enumeration"
                );
                results.truncate(remaining);
                next_token = None;
            }
        }

        self.budget.consume(results.len());
        self.pages_fetched += 1;
        if self.budget.is_exhausted() {
            next_token = None;
        }
        self.finished = next_token.is_none();
        self.token = next_token;

        debug!(
            client_request_id = %ctx.client_request_id(),
            page = self.pages_fetched,
            entities = results.len(),
            remaining = ?self.budget.remaining,
            more = !self.finished,
            "query page received"
        );
        Ok(Some(results))
    }

    /// Token for resuming after the last page, if the session is not over.
    pub fn continuation_token(&self) -> Option<&ContinuationToken> {
        self.token.as_ref()
    }

    /// Current take budget.
    pub fn budget(&self) -> TakeBudget {
        self.budget
    }

    /// Returns true once no more pages will be requested.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of pages delivered by this session.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Drains the session, one fresh [`OperationContext`] per page.
    pub async fn collect_all(&mut self) -> StorageResult<Vec<TableEntity>> {
        let mut all = Vec::new();
        loop {
            let ctx = OperationContext::new();
            match self.next_page(&ctx).await? {
                Some(page) => all.extend(page),
                None => break,
            }
        }
        info!(
            entities = all.len(),
            pages = self.pages_fetched,
            "query enumeration complete"
        );
        Ok(all)
    }

    /// Turns the session into a stream of pages, one fresh
    /// [`OperationContext`] per page. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = StorageResult<Vec<TableEntity>>> {
        stream::try_unfold(self, |mut enumerator| async move {
            let ctx = OperationContext::new();
            let page = enumerator.next_page(&ctx).await?;
            Ok::<_, StorageError>(page.map(|page| (page, enumerator)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use strata_protocol::LocationMode;

    #[test]
    fn budget_page_sizes() {
        let unbounded = TakeBudget::new(None);
        assert_eq!(unbounded.page_size(), SERVER_MAX_PAGE_SIZE);
        assert!(!unbounded.is_exhausted());

        let mut budget = TakeBudget::new(Some(1200));
        assert_eq!(budget.page_size(), 1000);
        budget.consume(1000);
        assert_eq!(budget.page_size(), 200);
        budget.consume(200);
        assert!(budget.is_exhausted());
        assert_eq!(budget.requested, Some(1200));
    }

    fn effective() -> EffectiveOptions {
        EffectiveOptions {
            retry_policy: RetryPolicy::NoRetry,
            location_mode: LocationMode::PrimaryThenSecondary,
            payload_format: PayloadFormat::Json,
            attempt_timeout: None,
            maximum_execution_time: None,
        }
    }

    fn pair() -> EndpointPair {
        EndpointPair::parse(
            "https://acct.table.example.net/people()",
            Some("https://acct-secondary.table.example.net/people()"),
        )
        .unwrap()
    }

    #[test]
    fn command_builds_paged_request() {
        let query = TableQuery::new().with_filter("a eq 'b'");
        let token_response = StorageResponse::new(200)
            .with_header(headers::NEXT_PARTITION_KEY, "p1")
            .with_header(headers::NEXT_ROW_KEY, "r1");
        let token =
            ContinuationToken::from_response(&token_response, StorageLocation::Secondary).unwrap();
        let endpoints = pair();
        let command = QueryCommand::new(&endpoints, &query, Some(&token), Some(250));

        assert_eq!(
            command.location_requirement(),
            CommandLocation::Pinned(StorageLocation::Secondary)
        );

        let base = endpoints.resolve(StorageLocation::Secondary).unwrap();
        let request = command
            .build(base, StorageLocation::Secondary, &effective())
            .unwrap();
        assert_eq!(request.query_param("$top").as_deref(), Some("250"));
        assert_eq!(request.query_param("$filter").as_deref(), Some("a eq 'b'"));
        assert_eq!(request.query_param("NextPartitionKey").as_deref(), Some("p1"));
        assert_eq!(request.query_param("NextRowKey").as_deref(), Some("r1"));
        assert_eq!(request.headers.get(headers::ACCEPT), Some("application/json"));
    }

    #[test]
    fn command_parses_by_content_type() {
        let entities = vec![TableEntity::new("p", "r").with_property("foo", "bar")];
        let body = codec_for(PayloadFormat::Cbor)
            .serialize_entities(&entities)
            .unwrap();
        let response = StorageResponse::new(200)
            .with_header(headers::CONTENT_TYPE, "application/cbor")
            .with_body(body);

        let query = TableQuery::new();
        let endpoints = pair();
        let command = QueryCommand::new(&endpoints, &query, None, None);
        let segment = command
            .parse(response, StorageLocation::Primary, &effective())
            .unwrap();
        assert_eq!(segment.results, entities);
        assert!(!segment.has_more());
        assert_eq!(command.location_requirement(), CommandLocation::Any);
    }

    #[tokio::test]
    async fn over_delivery_is_truncated_and_ends_the_session() {
        use crate::client::TableClient;
        use crate::config::ClientConfig;
        use crate::transport::MockTransport;

        let endpoints = EndpointPair::parse("https://acct.table.example.net", None).unwrap();
        let client = TableClient::new(ClientConfig::new(endpoints), MockTransport::new());
        let entities: Vec<_> = (0..5)
            .map(|i| TableEntity::new("p", format!("{i:04}")))
            .collect();
        let body = codec_for(PayloadFormat::Json)
            .serialize_entities(&entities)
            .unwrap();
        client.executor().transport().push_response(
            StorageResponse::new(200)
                .with_header(headers::CONTENT_TYPE, "application/json")
                .with_header(headers::NEXT_PARTITION_KEY, "p")
                .with_header(headers::NEXT_ROW_KEY, "0005")
                .with_body(body),
        );

        let mut enumerator = client
            .table("people")
            .unwrap()
            .execute_query(TableQuery::new().take(3).unwrap())
            .enumerate();
        let page = enumerator
            .next_page(&OperationContext::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(page, entities[..3].to_vec());
        assert!(enumerator.continuation_token().is_none());
        assert!(enumerator.is_finished());
        assert_eq!(enumerator.budget().remaining, Some(0));
        let sent = &client.executor().transport().requests()[0];
        assert_eq!(sent.query_param("$top").as_deref(), Some("3"));
        assert!(enumerator
            .next_page(&OperationContext::new())
            .await
            .unwrap()
            .is_none());
        assert_eq!(client.executor().transport().request_count(), 1);
    }
}
