//! Primary/secondary endpoint pair for a storage resource.

use crate::error::{ProtocolError, ProtocolResult};
use crate::location::{LocationMode, StorageLocation};
use serde::{Deserialize, Serialize};
use url::Url;

/// The two addresses of a geo-replicated resource.
///
/// The primary is always present. The secondary is a read-only replica
/// and may be absent, in which case secondary-targeting modes are invalid.
/// Immutable once constructed; clones are cheap enough to hand to every
/// concurrent call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPair {
    primary: Url,
    secondary: Option<Url>,
}

impl EndpointPair {
    /// Creates a pair with only a primary endpoint.
    pub fn new(primary: Url) -> ProtocolResult<Self> {
        validate_endpoint(&primary)?;
        Ok(Self {
            primary,
            secondary: None,
        })
    }

    /// Adds a secondary endpoint.
    pub fn with_secondary(mut self, secondary: Url) -> ProtocolResult<Self> {
        validate_endpoint(&secondary)?;
        self.secondary = Some(secondary);
        Ok(self)
    }

    /// Parses a pair from strings.
    pub fn parse(primary: &str, secondary: Option<&str>) -> ProtocolResult<Self> {
        let primary =
            Url::parse(primary).map_err(|e| ProtocolError::invalid_uri(primary, e.to_string()))?;
        let pair = Self::new(primary)?;
        match secondary {
            Some(raw) => {
                let url =
                    Url::parse(raw).map_err(|e| ProtocolError::invalid_uri(raw, e.to_string()))?;
                pair.with_secondary(url)
            }
            None => Ok(pair),
        }
    }

    /// Returns the primary endpoint.
    pub fn primary(&self) -> &Url {
        &self.primary
    }

    /// Returns the secondary endpoint, if configured.
    pub fn secondary(&self) -> Option<&Url> {
        self.secondary.as_ref()
    }

    /// Returns true if a secondary endpoint is configured.
    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Resolves the physical URI for `location`.
    pub fn resolve(&self, location: StorageLocation) -> ProtocolResult<&Url> {
        match location {
            StorageLocation::Primary => Ok(&self.primary),
            StorageLocation::Secondary => self
                .secondary
                .as_ref()
                .ok_or(ProtocolError::UnsupportedLocation(StorageLocation::Secondary)),
        }
    }

    /// Checks that every location `mode` may target can be resolved.
    pub fn validate_mode(&self, mode: LocationMode) -> ProtocolResult<()> {
        if mode.requires_secondary() && self.secondary.is_none() {
            return Err(ProtocolError::UnsupportedLocation(StorageLocation::Secondary));
        }
        Ok(())
    }

    /// Derives the pair for a child resource by appending one path segment
    /// to both endpoints.
    pub fn join(&self, segment: &str) -> ProtocolResult<Self> {
        Ok(Self {
            primary: push_segment(&self.primary, segment)?,
            secondary: self
                .secondary
                .as_ref()
                .map(|url| push_segment(url, segment))
                .transpose()?,
        })
    }

    /// Applies the same transformation to both endpoints.
    pub(crate) fn map_urls(&self, f: impl Fn(&Url) -> Url) -> Self {
        Self {
            primary: f(&self.primary),
            secondary: self.secondary.as_ref().map(f),
        }
    }
}

fn validate_endpoint(url: &Url) -> ProtocolResult<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProtocolError::invalid_uri(
            url.as_str(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    if url.host_str().is_none() || url.cannot_be_a_base() {
        return Err(ProtocolError::invalid_uri(url.as_str(), "missing host"));
    }
    Ok(())
}

fn push_segment(url: &Url, segment: &str) -> ProtocolResult<Url> {
    let mut joined = url.clone();
    joined
        .path_segments_mut()
        .map_err(|_| ProtocolError::invalid_uri(url.as_str(), "cannot be a base"))?
        .pop_if_empty()
        .push(segment);
    Ok(joined)
}
