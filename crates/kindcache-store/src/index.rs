//! Secondary index tables
//!
//! An [`IndexTable`] maps index values to the primary keys of the records
//! that produced them. It also remembers which values each key contributed,
//! so an overwritten or deleted record can be unindexed without
//! re-running the extraction function on the old record.

use crate::record::Record;
use kindcache_common::{ObjectKey, namespaced_index_value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Computes the index values of a record
pub type IndexFunc<R> = Arc<dyn Fn(&R) -> Vec<String> + Send + Sync>;

/// Index over record namespaces, used for namespace-scoped listing
pub fn namespace_index_func<R: Record>() -> IndexFunc<R> {
    Arc::new(|record: &R| vec![record.namespace().to_string()])
}

/// Wrap a field extraction function so each base value is qualified by the
/// record's namespace and by the all-namespaces marker.
///
/// Cluster-scoped records only get the all-namespaces form.
pub fn namespaced_field_func<R, F>(extract: F) -> IndexFunc<R>
where
    R: Record,
    F: Fn(&R) -> Vec<String> + Send + Sync + 'static,
{
    Arc::new(move |record: &R| {
        let namespace = record.namespace();
        let base = extract(record);
        let mut values = Vec::with_capacity(if namespace.is_empty() {
            base.len()
        } else {
            base.len() * 2
        });
        for value in &base {
            values.push(namespaced_index_value(namespace, value));
        }
        if !namespace.is_empty() {
            for value in &base {
                values.push(namespaced_index_value("", value));
            }
        }
        values
    })
}

/// Named mapping from index value to the set of matching primary keys
pub struct IndexTable<R> {
    name: String,
    func: IndexFunc<R>,
    entries: HashMap<String, HashSet<ObjectKey>>,
    attributed: HashMap<ObjectKey, Vec<String>>,
}

impl<R> IndexTable<R> {
    /// Create an empty index table
    pub fn new(name: impl Into<String>, func: IndexFunc<R>) -> Self {
        Self {
            name: name.into(),
            func,
            entries: HashMap::new(),
            attributed: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compute the index values of a record without touching the table
    pub fn values_for(&self, record: &R) -> Vec<String> {
        (self.func)(record)
    }

    /// Index a record under `key`, replacing whatever `key` had before
    pub fn insert(&mut self, key: &ObjectKey, record: &R) {
        self.remove(key);

        let mut values = self.values_for(record);
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return;
        }
        for value in &values {
            self.entries
                .entry(value.clone())
                .or_default()
                .insert(key.clone());
        }
        self.attributed.insert(key.clone(), values);
    }

    /// Drop every entry attributed to `key`
    pub fn remove(&mut self, key: &ObjectKey) {
        let Some(values) = self.attributed.remove(key) else {
            return;
        };
        for value in values {
            if let Some(keys) = self.entries.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.entries.remove(&value);
                }
            }
        }
    }

    /// Keys indexed under `value`
    pub fn keys_for(&self, value: &str) -> impl Iterator<Item = &ObjectKey> {
        self.entries.get(value).into_iter().flatten()
    }

    /// Number of keys indexed under `value`
    #[must_use]
    pub fn count(&self, value: &str) -> usize {
        self.entries.get(value).map_or(0, HashSet::len)
    }

    /// Values `key` is currently indexed under
    pub fn values_of(&self, key: &ObjectKey) -> &[String] {
        self.attributed.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct index values
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<R> fmt::Debug for IndexTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexTable")
            .field("name", &self.name)
            .field("values", &self.entries.len())
            .field("keys", &self.attributed.len())
            .finish_non_exhaustive()
    }
}
