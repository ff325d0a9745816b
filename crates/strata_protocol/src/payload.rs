//! Payload formats and codecs.
//!
//! The executor never looks inside bodies. Commands hand entities to a
//! [`PayloadCodec`] chosen by the call's [`PayloadFormat`], which is part
//! of the per-call configuration rather than client-wide state.

use crate::entity::TableEntity;
use crate::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire format for entity payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// JSON envelope.
    #[default]
    Json,
    /// CBOR envelope.
    Cbor,
}

impl PayloadFormat {
    /// MIME type sent in `Accept` and `Content-Type`.
    pub fn content_type(self) -> &'static str {
        match self {
            PayloadFormat::Json => "application/json",
            PayloadFormat::Cbor => "application/cbor",
        }
    }

    /// Maps a `Content-Type` header back to a format. Parameters are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Some(PayloadFormat::Json),
            "application/cbor" => Some(PayloadFormat::Cbor),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Json => f.write_str("json"),
            PayloadFormat::Cbor => f.write_str("cbor"),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(PayloadFormat::Json),
            "cbor" => Ok(PayloadFormat::Cbor),
            other => Err(format!("unknown payload format: {other}")),
        }
    }
}

/// Serialization collaborator: entities to bytes and back.
pub trait PayloadCodec: Send + Sync {
    /// Format produced by this codec.
    fn format(&self) -> PayloadFormat;

    /// Encodes a list of entities.
    fn serialize_entities(&self, entities: &[TableEntity]) -> ProtocolResult<Bytes>;

    /// Decodes a list of entities from a body of the given content type.
    fn parse_entities(&self, body: &[u8], content_type: &str) -> ProtocolResult<Vec<TableEntity>>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    value: &'a [TableEntity],
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    value: Vec<TableEntity>,
}

fn check_content_type(expected: PayloadFormat, content_type: &str) -> ProtocolResult<()> {
    match PayloadFormat::from_content_type(content_type) {
        Some(found) if found == expected => Ok(()),
        _ => Err(ProtocolError::UnsupportedContentType(content_type.to_string())),
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Json
    }

    fn serialize_entities(&self, entities: &[TableEntity]) -> ProtocolResult<Bytes> {
        serde_json::to_vec(&EnvelopeRef { value: entities })
            .map(Bytes::from)
            .map_err(|e| ProtocolError::codec(e.to_string()))
    }

    fn parse_entities(&self, body: &[u8], content_type: &str) -> ProtocolResult<Vec<TableEntity>> {
        check_content_type(PayloadFormat::Json, content_type)?;
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(envelope.value)
    }
}

/// CBOR codec backed by `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl PayloadCodec for CborCodec {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Cbor
    }

    fn serialize_entities(&self, entities: &[TableEntity]) -> ProtocolResult<Bytes> {
        let mut out = Vec::new();
        ciborium::into_writer(&EnvelopeRef { value: entities }, &mut out)
            .map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    fn parse_entities(&self, body: &[u8], content_type: &str) -> ProtocolResult<Vec<TableEntity>> {
        check_content_type(PayloadFormat::Cbor, content_type)?;
        let envelope: Envelope =
            ciborium::from_reader(body).map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(envelope.value)
    }
}

/// Returns the codec for `format`.
pub fn codec_for(format: PayloadFormat) -> &'static dyn PayloadCodec {
    match format {
        PayloadFormat::Json => &JsonCodec,
        PayloadFormat::Cbor => &CborCodec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropertyValue;

    fn sample() -> Vec<TableEntity> {
        vec![
            TableEntity::new("p", "0001")
                .with_property("foo", "bar")
                .with_property("bin", PropertyValue::Binary(vec![1, 2, 3])),
            TableEntity::new("p", "0002").with_property("count", 9i64),
        ]
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(
            PayloadFormat::from_content_type("application/json;odata=nometadata"),
            Some(PayloadFormat::Json)
        );
        assert_eq!(
            PayloadFormat::from_content_type(" Application/CBOR "),
            Some(PayloadFormat::Cbor)
        );
        assert_eq!(PayloadFormat::from_content_type("text/xml"), None);
    }

    #[test]
    fn codecs_preserve_entities() {
        for format in [PayloadFormat::Json, PayloadFormat::Cbor] {
            let codec = codec_for(format);
            let bytes = codec.serialize_entities(&sample()).unwrap();
            let parsed = codec.parse_entities(&bytes, format.content_type()).unwrap();
            assert_eq!(parsed, sample(), "format {format}");
        }
    }

    #[test]
    fn mismatched_content_type_rejected() {
        let bytes = JsonCodec.serialize_entities(&sample()).unwrap();
        assert!(matches!(
            JsonCodec.parse_entities(&bytes, "application/cbor"),
            Err(ProtocolError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn corrupt_body_is_codec_error() {
        assert!(matches!(
            CborCodec.parse_entities(b"\xff\x00", "application/cbor"),
            Err(ProtocolError::Codec { .. })
        ));
    }
}
