//! Error types for the protocol crate.

use crate::location::StorageLocation;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or interpreting wire-level values.
///
/// None of these involve I/O. They signal caller misuse or malformed
/// input and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A query parameter was added twice to the same builder.
    #[error("duplicate query parameter: {name}")]
    DuplicateKey {
        /// Name of the repeated parameter.
        name: String,
    },

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A URI could not be parsed or is not usable as an endpoint.
    #[error("invalid uri {uri}: {reason}")]
    InvalidUri {
        /// The offending input.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The resource has no endpoint for the requested location.
    #[error("no endpoint configured for {0} location")]
    UnsupportedLocation(StorageLocation),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The response declared a content type no codec understands.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl ProtocolError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error stems from configuration rather than a
    /// single call's arguments.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnsupportedLocation(_) | ProtocolError::InvalidUri { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::DuplicateKey {
            name: "$top".into(),
        };
        assert_eq!(err.to_string(), "duplicate query parameter: $top");

        let err = ProtocolError::UnsupportedLocation(StorageLocation::Secondary);
        assert_eq!(
            err.to_string(),
            "no endpoint configured for secondary location"
        );
    }

    #[test]
    fn configuration_classification() {
        assert!(ProtocolError::UnsupportedLocation(StorageLocation::Secondary).is_configuration());
        assert!(ProtocolError::invalid_uri("nope", "relative").is_configuration());
        assert!(!ProtocolError::invalid_argument("take").is_configuration());
    }
}
