//! Table query description.

use crate::error::{ProtocolError, ProtocolResult};
use crate::query_string::QueryStringBuilder;

/// Largest page the service returns for a single query request.
pub const SERVER_MAX_PAGE_SIZE: u32 = 1000;

/// Query parameter carrying the filter expression.
pub const FILTER_PARAM: &str = "$filter";
/// Query parameter carrying the projected columns.
pub const SELECT_PARAM: &str = "$select";
/// Query parameter carrying the requested page size.
pub const TOP_PARAM: &str = "$top";

/// A table query: optional filter, projection and take count.
///
/// The filter is an opaque expression string handed to the service as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableQuery {
    filter: Option<String>,
    select: Option<Vec<String>>,
    take_count: Option<u32>,
}

impl TableQuery {
    /// Creates a query over the whole table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the query to `count` entities in total.
    ///
    /// Fails before any request is built when `count` is not positive.
    pub fn take(mut self, count: i64) -> ProtocolResult<Self> {
        self.take_count = Some(validate_take_count(count)?);
        Ok(self)
    }

    /// Sets the filter expression.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Restricts the returned properties.
    pub fn with_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Filter expression, if any.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Projected columns, if any.
    pub fn select(&self) -> Option<&[String]> {
        self.select.as_deref()
    }

    /// Configured take count, if any.
    pub fn take_count(&self) -> Option<u32> {
        self.take_count
    }

    /// Writes `$filter`, `$select` and `$top` for a page of `page_size`.
    pub fn apply_to_query(
        &self,
        builder: &mut QueryStringBuilder,
        page_size: Option<u32>,
    ) -> ProtocolResult<()> {
        if let Some(ref filter) = self.filter {
            builder.add(FILTER_PARAM, Some(filter))?;
        }
        if let Some(ref columns) = self.select {
            builder.add(SELECT_PARAM, Some(&columns.join(",")))?;
        }
        if let Some(size) = page_size {
            builder.add(TOP_PARAM, Some(&size.to_string()))?;
        }
        Ok(())
    }
}

/// Validates a caller-supplied take count.
pub fn validate_take_count(count: i64) -> ProtocolResult<u32> {
    if count <= 0 {
        return Err(ProtocolError::invalid_argument(
            "Take count must be positive and greater than 0.",
        ));
    }
    u32::try_from(count)
        .map_err(|_| ProtocolError::invalid_argument(format!("Take count {count} is too large.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_count_must_be_positive() {
        for bad in [0, -1] {
            let err = TableQuery::new().take(bad).unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid argument: Take count must be positive and greater than 0."
            );
        }
        assert_eq!(TableQuery::new().take(100).unwrap().take_count(), Some(100));
        assert!(TableQuery::new().take(i64::MAX).is_err());
    }

    #[test]
    fn applies_parameters() {
        let query = TableQuery::new()
            .with_filter("PartitionKey eq 'tables_batch_1'")
            .with_select(["a", "c"]);
        let mut builder = QueryStringBuilder::new();
        query.apply_to_query(&mut builder, Some(100)).unwrap();

        assert_eq!(
            builder.get(FILTER_PARAM),
            Some(Some("PartitionKey%20eq%20%27tables_batch_1%27"))
        );
        assert_eq!(builder.get(SELECT_PARAM), Some(Some("a%2Cc")));
        assert_eq!(builder.get(TOP_PARAM), Some(Some("100")));
    }

    #[test]
    fn no_top_without_page_size() {
        let mut builder = QueryStringBuilder::new();
        TableQuery::new().apply_to_query(&mut builder, None).unwrap();
        assert!(builder.is_empty());
    }
}
