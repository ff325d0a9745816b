//! Server-issued continuation tokens.

use crate::error::{ProtocolError, ProtocolResult};
use crate::http::{headers, StorageResponse};
use crate::location::StorageLocation;
use crate::query_string::QueryStringBuilder;
use serde::{Deserialize, Serialize};

/// Query parameter carrying the next partition key.
pub const NEXT_PARTITION_KEY_PARAM: &str = "NextPartitionKey";
/// Query parameter carrying the next row key.
pub const NEXT_ROW_KEY_PARAM: &str = "NextRowKey";
/// Query parameter carrying the next table name.
pub const NEXT_TABLE_NAME_PARAM: &str = "NextTableName";

/// An opaque cursor letting a paged query resume where a page ended.
///
/// Tokens are produced from response headers and replayed verbatim. The
/// location the token came from travels with it: the service only
/// guarantees continuity against the replica that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_row_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_location: Option<StorageLocation>,
}

impl ContinuationToken {
    /// Extracts the token from a response, if the service issued one.
    pub fn from_response(response: &StorageResponse, location: StorageLocation) -> Option<Self> {
        let marker = |name: &str| response.headers.get(name).map(str::to_string);
        let token = Self {
            next_partition_key: marker(headers::NEXT_PARTITION_KEY),
            next_row_key: marker(headers::NEXT_ROW_KEY),
            next_table_name: marker(headers::NEXT_TABLE_NAME),
            target_location: Some(location),
        };
        if token.has_markers() {
            Some(token)
        } else {
            None
        }
    }

    fn has_markers(&self) -> bool {
        self.next_partition_key.is_some()
            || self.next_row_key.is_some()
            || self.next_table_name.is_some()
    }

    /// The replica that issued the token.
    pub fn target_location(&self) -> Option<StorageLocation> {
        self.target_location
    }

    /// Adds the resume markers to a request's query string.
    pub fn apply_to_query(&self, builder: &mut QueryStringBuilder) -> ProtocolResult<()> {
        if let Some(ref pk) = self.next_partition_key {
            builder.add(NEXT_PARTITION_KEY_PARAM, Some(pk))?;
        }
        if let Some(ref rk) = self.next_row_key {
            builder.add(NEXT_ROW_KEY_PARAM, Some(rk))?;
        }
        if let Some(ref table) = self.next_table_name {
            builder.add(NEXT_TABLE_NAME_PARAM, Some(table))?;
        }
        Ok(())
    }

    /// Serializes the token for storage outside the process.
    pub fn to_opaque_string(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::codec(e.to_string()))
    }

    /// Restores a token produced by [`to_opaque_string`](Self::to_opaque_string).
    pub fn from_opaque_string(raw: &str) -> ProtocolResult<Self> {
        let token: Self = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::invalid_argument(format!("malformed continuation token: {e}")))?;
        if !token.has_markers() {
            return Err(ProtocolError::invalid_argument(
                "malformed continuation token: no resume markers",
            ));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged_response() -> StorageResponse {
        StorageResponse::new(200)
            .with_header(headers::NEXT_PARTITION_KEY, "tables_batch_9")
            .with_header(headers::NEXT_ROW_KEY, "0042")
    }

    #[test]
    fn no_token_without_markers() {
        let response = StorageResponse::new(200);
        assert!(ContinuationToken::from_response(&response, StorageLocation::Primary).is_none());
    }

    #[test]
    fn token_carries_issuing_location() {
        let token =
            ContinuationToken::from_response(&paged_response(), StorageLocation::Secondary).unwrap();
        assert_eq!(token.target_location(), Some(StorageLocation::Secondary));
    }

    #[test]
    fn token_applies_markers_to_query() {
        let token =
            ContinuationToken::from_response(&paged_response(), StorageLocation::Primary).unwrap();
        let mut builder = QueryStringBuilder::new();
        token.apply_to_query(&mut builder).unwrap();
        assert_eq!(
            builder.render(),
            "?NextPartitionKey=tables_batch_9&NextRowKey=0042"
        );
    }

    #[test]
    fn opaque_string_roundtrip() {
        let token =
            ContinuationToken::from_response(&paged_response(), StorageLocation::Primary).unwrap();
        let raw = token.to_opaque_string().unwrap();
        assert_eq!(ContinuationToken::from_opaque_string(&raw).unwrap(), token);
    }

    #[test]
    fn opaque_string_rejects_garbage() {
        assert!(ContinuationToken::from_opaque_string("not json").is_err());
        assert!(ContinuationToken::from_opaque_string("{}").is_err());
    }
}
