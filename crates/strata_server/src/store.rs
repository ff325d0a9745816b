//! In-memory table storage.

use crate::error::{ServerError, ServerResult};
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use strata_protocol::TableEntity;

/// Primary key of an entity: `(partition_key, row_key)`.
pub type EntityKey = (String, String);

/// One page of a table scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    /// Matching entities, in key order.
    pub entities: Vec<TableEntity>,
    /// Key the next page starts at, if more matches exist.
    pub next_key: Option<EntityKey>,
}

/// Tables held in memory, each ordered by entity key.
///
/// Replicas of a geo-replicated account share one store, so writes on the
/// primary are visible on the secondary immediately.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<BTreeMap<String, BTreeMap<EntityKey, TableEntity>>>,
}

impl TableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table. Returns false if it already existed.
    pub fn create_table(&self, name: &str) -> bool {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return false;
        }
        tables.insert(name.to_string(), BTreeMap::new());
        true
    }

    /// Returns true if the table exists.
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Number of entities in a table.
    pub fn count(&self, table: &str) -> ServerResult<usize> {
        self.tables
            .read()
            .get(table)
            .map(BTreeMap::len)
            .ok_or_else(|| ServerError::TableNotFound(table.to_string()))
    }

    /// Inserts one entity.
    pub fn insert(&self, table: &str, entity: TableEntity) -> ServerResult<()> {
        self.insert_batch(table, vec![entity])
    }

    /// Inserts entities atomically: either all are stored or none.
    ///
    /// Duplicate keys, whether against stored entities or within the
    /// batch, fail the whole batch.
    pub fn insert_batch(&self, table: &str, entities: Vec<TableEntity>) -> ServerResult<()> {
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| ServerError::TableNotFound(table.to_string()))?;

        let mut staged: BTreeMap<EntityKey, TableEntity> = BTreeMap::new();
        for entity in entities {
            let key = (entity.partition_key.clone(), entity.row_key.clone());
            if rows.contains_key(&key) || staged.contains_key(&key) {
                return Err(ServerError::EntityAlreadyExists {
                    partition_key: key.0,
                    row_key: key.1,
                });
            }
            staged.insert(key, entity);
        }

        let now = Utc::now();
        let etag = format!(
            "W/\"datetime'{}'\"",
            now.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        for (key, mut entity) in staged {
            entity.timestamp = Some(now);
            entity.etag = Some(etag.clone());
            rows.insert(key, entity);
        }
        Ok(())
    }

    /// Scans a table from `start` (inclusive) in key order.
    ///
    /// Collects up to `limit` entities accepted by `matches`. If another
    /// match exists past the page, its key is returned as `next_key`.
    pub fn scan<F>(
        &self,
        table: &str,
        start: Option<&EntityKey>,
        limit: usize,
        matches: F,
    ) -> ServerResult<ScanPage>
    where
        F: Fn(&TableEntity) -> bool,
    {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| ServerError::TableNotFound(table.to_string()))?;

        let lower = match start {
            Some(key) => Bound::Included(key.clone()),
            None => Bound::Unbounded,
        };
        let mut hits = rows
            .range((lower, Bound::Unbounded))
            .filter(|(_, entity)| matches(entity));

        let mut page = ScanPage::default();
        for (_, entity) in hits.by_ref().take(limit) {
            page.entities.push(entity.clone());
        }
        page.next_key = hits.next().map(|(key, _)| key.clone());
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(rows: usize) -> TableStore {
        let store = TableStore::new();
        store.create_table("people");
        let entities = (0..rows)
            .map(|i| TableEntity::new("p", format!("{i:04}")))
            .collect();
        store.insert_batch("people", entities).unwrap();
        store
    }

    #[test]
    fn create_table_once() {
        let store = TableStore::new();
        assert!(store.create_table("people"));
        assert!(!store.create_table("people"));
        assert!(store.table_exists("people"));
        assert_eq!(store.table_names(), vec!["people".to_string()]);
    }

    #[test]
    fn insert_assigns_system_fields() {
        let store = seeded(1);
        let page = store.scan("people", None, 10, |_| true).unwrap();
        let entity = &page.entities[0];
        assert!(entity.timestamp.is_some());
        assert!(entity.etag.as_deref().unwrap().starts_with("W/"));
    }

    #[test]
    fn duplicate_key_rejects_whole_batch() {
        let store = seeded(2);
        let batch = vec![TableEntity::new("p", "9999"), TableEntity::new("p", "0001")];
        let err = store.insert_batch("people", batch).unwrap_err();
        assert!(matches!(err, ServerError::EntityAlreadyExists { .. }));
        assert_eq!(store.count("people").unwrap(), 2);

        let within = vec![TableEntity::new("q", "a"), TableEntity::new("q", "a")];
        assert!(store.insert_batch("people", within).is_err());
        assert_eq!(store.count("people").unwrap(), 2);
    }

    #[test]
    fn unknown_table() {
        let store = TableStore::new();
        assert!(matches!(
            store.count("nope"),
            Err(ServerError::TableNotFound(_))
        ));
        assert!(store.insert("nope", TableEntity::new("p", "r")).is_err());
    }

    #[test]
    fn scan_pages_through_in_key_order() {
        let store = seeded(25);
        let first = store.scan("people", None, 10, |_| true).unwrap();
        assert_eq!(first.entities.len(), 10);
        assert_eq!(first.entities[0].row_key, "0000");
        let next = first.next_key.clone().unwrap();
        assert_eq!(next, ("p".to_string(), "0010".to_string()));

        let second = store.scan("people", Some(&next), 10, |_| true).unwrap();
        assert_eq!(second.entities[0].row_key, "0010");

        let last = store
            .scan("people", second.next_key.as_ref(), 10, |_| true)
            .unwrap();
        assert_eq!(last.entities.len(), 5);
        assert!(last.next_key.is_none());
    }

    #[test]
    fn scan_with_predicate_reports_next_match() {
        let store = seeded(30);
        let even = |e: &TableEntity| e.row_key.ends_with(['0', '2', '4', '6', '8']);
        let page = store.scan("people", None, 3, even).unwrap();
        let keys: Vec<_> = page.entities.iter().map(|e| e.row_key.as_str()).collect();
        assert_eq!(keys, vec!["0000", "0002", "0004"]);
        assert_eq!(page.next_key.unwrap().1, "0006");
    }

    #[test]
    fn exact_page_has_no_next_key() {
        let store = seeded(10);
        let page = store.scan("people", None, 10, |_| true).unwrap();
        assert_eq!(page.entities.len(), 10);
        assert!(page.next_key.is_none());
    }
}
