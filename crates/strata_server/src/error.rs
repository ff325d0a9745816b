//! Error types for the reference table service.

use serde::Serialize;
use strata_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors the service reports back as status responses.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// `$filter` the service cannot evaluate.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Signature missing or wrong.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unknown table.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Insert collided with an existing key.
    #[error("entity already exists: ({partition_key}, {row_key})")]
    EntityAlreadyExists {
        /// Partition key of the collision.
        partition_key: String,
        /// Row key of the collision.
        row_key: String,
    },

    /// Method not supported on the resource.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Body or `Accept` format the service does not speak.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::InvalidQuery(_) => 400,
            ServerError::AuthenticationFailed(_) => 403,
            ServerError::TableNotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::EntityAlreadyExists { .. } => 409,
            ServerError::UnsupportedMediaType(_) => 415,
            ServerError::Internal(_) => 500,
        }
    }

    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "InvalidInput",
            ServerError::InvalidQuery(_) => "InvalidQuery",
            ServerError::AuthenticationFailed(_) => "AuthenticationFailed",
            ServerError::TableNotFound(_) => "TableNotFound",
            ServerError::MethodNotAllowed(_) => "MethodNotAllowed",
            ServerError::EntityAlreadyExists { .. } => "EntityAlreadyExists",
            ServerError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            ServerError::Internal(_) => "InternalError",
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// JSON error body sent with the status.
    pub fn to_body(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            message: String,
        }
        serde_json::to_vec(&ErrorBody {
            code: self.code(),
            message: self.to_string(),
        })
        .unwrap_or_default()
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnsupportedContentType(ct) => ServerError::UnsupportedMediaType(ct),
            other => ServerError::InvalidRequest(other.to_string()),
        }
    }
}
