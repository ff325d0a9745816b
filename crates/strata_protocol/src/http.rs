//! Request and response values exchanged with the storage service.
//!
//! These are plain data. Building the bytes that go over a socket is the
//! transport's business; interpreting them is the command's.

use bytes::Bytes;
use std::fmt;
use url::Url;

/// Well-known header names.
pub mod headers {
    /// Caller-chosen id echoed by the service, correlates all attempts of a call.
    pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
    /// Service-assigned id of one physical request.
    pub const REQUEST_ID: &str = "x-ms-request-id";
    /// Protocol version spoken by the client.
    pub const VERSION: &str = "x-ms-version";
    /// Request timestamp covered by the signature.
    pub const DATE: &str = "x-ms-date";
    /// Signature header.
    pub const AUTHORIZATION: &str = "Authorization";
    /// Accepted response payload type.
    pub const ACCEPT: &str = "Accept";
    /// Payload type of the body.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Continuation marker: next partition key.
    pub const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
    /// Continuation marker: next row key.
    pub const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";
    /// Continuation marker: next table name.
    pub const NEXT_TABLE_NAME: &str = "x-ms-continuation-NextTableName";
}

/// Protocol version sent with every request.
pub const SERVICE_VERSION: &str = "2013-08-15";

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// MERGE (entity merge)
    Merge,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the method token.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Merge => "MERGE",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, case-insensitive header list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Looks up a header by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully built request for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRequest {
    /// Method.
    pub method: HttpMethod,
    /// Target URI, query string included.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl StorageRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the value of query parameter `name`, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// A raw response as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl StorageResponse {
    /// Creates a response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The service-assigned request id, if the service returned one.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(headers::REQUEST_ID)
    }

    /// Body interpreted as UTF-8, lossy. Used for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An in-process service that answers requests synchronously.
///
/// Implemented by the reference server and by test routers so that the
/// loopback transport can exercise the full request path without sockets.
pub trait ServiceHandler: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: &StorageRequest) -> StorageResponse;
}

impl<H: ServiceHandler + ?Sized> ServiceHandler for std::sync::Arc<H> {
    fn handle(&self, request: &StorageRequest) -> StorageResponse {
        (**self).handle(request)
    }
}
