//! Per-kind record store.
//!
//! A [`KindStore`] keeps one kind's records keyed by [`ObjectKey`] together
//! with every secondary index registered for that kind. The primary map and
//! the index tables sit behind a single read-write lock, so an upsert or a
//! delete is observed by readers either entirely or not at all.

use crate::index::{IndexFunc, IndexTable, namespace_index_func};
use crate::record::Record;
use kindcache_common::{Error, Kind, NAMESPACE_INDEX, ObjectKey, Result};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use tracing::debug;

/// Records and index tables of one kind store
pub struct StoreContents<R> {
    items: HashMap<ObjectKey, R>,
    indices: HashMap<String, IndexTable<R>>,
}

impl<R: Record> StoreContents<R> {
    fn new() -> Self {
        let mut indices = HashMap::new();
        indices.insert(
            NAMESPACE_INDEX.to_string(),
            IndexTable::new(NAMESPACE_INDEX, namespace_index_func()),
        );
        Self {
            items: HashMap::new(),
            indices,
        }
    }

    /// Look up a record by primary key
    pub fn get(&self, key: &ObjectKey) -> Option<&R> {
        self.items.get(key)
    }

    /// Look up an index table by its internal name
    pub fn index(&self, name: &str) -> Option<&IndexTable<R>> {
        self.indices.get(name)
    }

    /// All records in the store, in no particular order
    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.items.values()
    }

    /// All primary keys in the store, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.items.keys()
    }

    /// Records indexed under `value` in the index `name`
    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<&R>> {
        let table = self
            .index(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        Ok(table
            .keys_for(value)
            .filter_map(|key| self.items.get(key))
            .collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn upsert(&mut self, key: ObjectKey, record: R) {
        for table in self.indices.values_mut() {
            table.remove(&key);
        }
        for table in self.indices.values_mut() {
            table.insert(&key, &record);
        }
        self.items.insert(key, record);
    }

    fn delete(&mut self, key: &ObjectKey) -> Option<R> {
        let removed = self.items.remove(key)?;
        for table in self.indices.values_mut() {
            table.remove(key);
        }
        Some(removed)
    }

    fn add_index(&mut self, name: &str, func: IndexFunc<R>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::malformed_index("index name must not be empty"));
        }
        if self.indices.contains_key(name) {
            return Err(Error::malformed_index(format!("indexer conflict: {name}")));
        }

        let mut table = IndexTable::new(name, func);
        for (key, record) in &self.items {
            table.insert(key, record);
        }
        self.indices.insert(name.to_string(), table);
        Ok(())
    }
}

/// Keyed collection of one kind's records plus its index tables
pub struct KindStore<R> {
    kind: Kind,
    contents: RwLock<StoreContents<R>>,
}

impl<R: Record> KindStore<R> {
    /// Create an empty store with only the namespace index
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            contents: RwLock::new(StoreContents::new()),
        }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Insert or replace the record stored under `key`.
    ///
    /// Index entries of the replaced record are dropped before the new
    /// record's entries are added.
    pub fn upsert(&self, key: ObjectKey, record: R) {
        self.contents.write().upsert(key, record);
    }

    /// Remove the record stored under `key` and all of its index entries
    pub fn delete(&self, key: &ObjectKey) -> Option<R> {
        self.contents.write().delete(key)
    }

    /// Copy of the record stored under `key`
    pub fn get_by_key(&self, key: &ObjectKey) -> Option<R> {
        self.contents.read().get(key).map(Record::deep_copy)
    }

    /// Copies of all records
    pub fn list_all(&self) -> Vec<R> {
        self.contents.read().records().map(Record::deep_copy).collect()
    }

    /// Copies of all records in `namespace`
    pub fn list_by_namespace(&self, namespace: &str) -> Vec<R> {
        let contents = self.contents.read();
        contents
            .by_index(NAMESPACE_INDEX, namespace)
            .map(|records| records.into_iter().map(Record::deep_copy).collect())
            .unwrap_or_default()
    }

    /// Register a new index and index every record already in the store
    pub fn add_indexer(&self, name: &str, func: IndexFunc<R>) -> Result<()> {
        let mut contents = self.contents.write();
        contents.add_index(name, func)?;
        debug!(
            "Registered index '{}' on {} ({} records)",
            name,
            self.kind,
            contents.len()
        );
        Ok(())
    }

    /// Copies of the records indexed under `value` in the index `name`
    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<R>> {
        let contents = self.contents.read();
        let records = contents.by_index(name, value)?;
        Ok(records.into_iter().map(Record::deep_copy).collect())
    }

    /// Primary keys indexed under `value` in the index `name`
    pub fn index_keys(&self, name: &str, value: &str) -> Result<Vec<ObjectKey>> {
        let contents = self.contents.read();
        let table = contents
            .index(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        Ok(table.keys_for(value).cloned().collect())
    }

    /// Names of all registered indexes, including the namespace index
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contents.read().indices.keys().cloned().collect();
        names.sort();
        names
    }

    /// All primary keys in the store
    pub fn list_keys(&self) -> Vec<ObjectKey> {
        self.contents.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.read().is_empty()
    }

    /// Hold the read lock and inspect the store contents directly
    pub fn read(&self) -> RwLockReadGuard<'_, StoreContents<R>> {
        self.contents.read()
    }
}
