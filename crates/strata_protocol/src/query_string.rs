//! Query-string construction.
//!
//! A [`QueryStringBuilder`] collects name/value pairs for one request and
//! merges them into a base URI without disturbing the parameters the URI
//! already carries. Values are percent-encoded exactly once, on `add`.

use crate::endpoint::EndpointPair;
use crate::error::{ProtocolError, ProtocolResult};
use url::Url;

/// Accumulates query parameters for a single request.
///
/// Keys are unique. A fresh builder is expected per logical call; adding
/// a name twice is treated as a bug in the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStringBuilder {
    parameters: Vec<(String, Option<String>)>,
}

impl QueryStringBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, escaping the value.
    ///
    /// A `None` value renders as a bare key (`?comp`).
    pub fn add(&mut self, name: impl Into<String>, value: Option<&str>) -> ProtocolResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ProtocolError::DuplicateKey { name });
        }
        let value = value.map(|v| urlencoding::encode(v).into_owned());
        self.parameters.push((name, value));
        Ok(())
    }

    /// Returns true if `name` has already been added.
    pub fn contains(&self, name: &str) -> bool {
        self.parameters.iter().any(|(k, _)| k == name)
    }

    /// Returns the escaped value stored for `name`.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.parameters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_deref())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if no parameters were added.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Renders `?k1=v1&k2=v2`, or an empty string when there is nothing to render.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, (name, value)) in self.parameters.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(name);
            if let Some(value) = value {
                out.push('=');
                out.push_str(value);
            }
        }
        out
    }

    /// Parses `uri` and appends the rendered parameters to its query.
    pub fn merge_into(&self, uri: &str) -> ProtocolResult<Url> {
        let url = Url::parse(uri)
            .map_err(|e| ProtocolError::invalid_argument(format!("malformed uri {uri}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ProtocolError::invalid_argument(format!(
                "malformed uri {uri}: cannot carry a query"
            )));
        }
        Ok(self.merge_into_url(&url))
    }

    /// Appends the rendered parameters to the query of `url`.
    ///
    /// Existing parameters are kept verbatim and joined with `&`. The
    /// input is left untouched.
    pub fn merge_into_url(&self, url: &Url) -> Url {
        let rendered = self.render();
        let to_append = rendered.strip_prefix('?').unwrap_or(&rendered);
        if to_append.is_empty() {
            return url.clone();
        }

        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{to_append}"),
            _ => to_append.to_string(),
        };

        let mut merged = url.clone();
        merged.set_query(Some(&query));
        merged
    }

    /// Applies the parameters to both endpoints of a pair.
    pub fn merge_into_pair(&self, pair: &EndpointPair) -> EndpointPair {
        pair.map_urls(|url| self.merge_into_url(url))
    }
}
