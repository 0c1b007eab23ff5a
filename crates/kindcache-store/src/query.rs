//! List query planning
//!
//! A list request narrows its candidates in this order of preference:
//!
//! 1. the index of the first field requirement, qualified by the requested
//!    namespace (or by the all-namespaces marker when none is set);
//! 2. the built-in namespace index;
//! 3. a full scan of the store.
//!
//! Further field requirements are applied by an [`Intersection`] strategy.
//! The candidates are then filtered by label, capped by the limit, and
//! returned as copies tagged with the store's kind.

use crate::record::Record;
use crate::selector::{FieldRequirement, FieldSelector, LabelSelector};
use crate::store::{KindStore, StoreContents};
use kindcache_common::{
    Error, NAMESPACE_INDEX, ObjectKey, Result, field_index_name, namespaced_index_value,
};
use std::collections::HashSet;
use tracing::debug;

/// Options of a list request
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Restrict results to one namespace (None or empty = all namespaces)
    pub namespace: Option<String>,
    /// Field equality requirements
    pub field_selector: Option<FieldSelector>,
    /// Label requirements
    pub label_selector: Option<LabelSelector>,
    /// Maximum number of results (None or 0 = unlimited)
    pub limit: Option<usize>,
}

impl ListOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn matching_fields(mut self, selector: FieldSelector) -> Self {
        self.field_selector = Some(selector);
        self
    }

    /// Add a `field=value` requirement to the field selector
    #[must_use]
    pub fn matching_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let selector = self.field_selector.take().unwrap_or_default();
        self.field_selector = Some(selector.and(FieldRequirement::equals(field, value)));
        self
    }

    #[must_use]
    pub fn matching_labels(mut self, selector: LabelSelector) -> Self {
        self.label_selector = Some(selector);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested namespace, empty for all namespaces
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    fn field_requirements(&self) -> &[FieldRequirement] {
        self.field_selector
            .as_ref()
            .map(FieldSelector::requirements)
            .unwrap_or_default()
    }

    /// How candidates for this request are looked up
    pub fn strategy(&self) -> LookupStrategy {
        if let Some(first) = self.field_requirements().first() {
            LookupStrategy::FieldIndex {
                index: field_index_name(&first.field),
                value: namespaced_index_value(self.namespace(), &first.value),
            }
        } else if !self.namespace().is_empty() {
            LookupStrategy::NamespaceIndex(self.namespace().to_string())
        } else {
            LookupStrategy::FullScan
        }
    }
}

/// Candidate lookup chosen for a list request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Look up `value` in the field index `index`
    FieldIndex { index: String, value: String },
    /// Look up a namespace in the namespace index
    NamespaceIndex(String),
    /// Walk every record in the store
    FullScan,
}

/// Narrows a store's records to those matching every field requirement
pub trait Intersection<R>: Send + Sync {
    /// Records matching all `requirements`, each qualified by `namespace`
    fn candidates<'a>(
        &self,
        contents: &'a StoreContents<R>,
        requirements: &[FieldRequirement],
        namespace: &str,
    ) -> Result<Vec<&'a R>>;
}

/// Looks up the first requirement in its index, then keeps the candidates
/// whose own index values satisfy each remaining requirement.
///
/// Cost grows with the size of the first lookup times the number of
/// requirements, not with the size of the later indexes.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterIntersection;

impl<R: Record> Intersection<R> for FilterIntersection {
    fn candidates<'a>(
        &self,
        contents: &'a StoreContents<R>,
        requirements: &[FieldRequirement],
        namespace: &str,
    ) -> Result<Vec<&'a R>> {
        let Some((first, rest)) = requirements.split_first() else {
            return Ok(contents.records().collect());
        };

        let value = namespaced_index_value(namespace, &first.value);
        let mut records = contents.by_index(&field_index_name(&first.field), &value)?;
        if records.is_empty() {
            return Ok(records);
        }

        for requirement in rest {
            let name = field_index_name(&requirement.field);
            let table = contents
                .index(&name)
                .ok_or_else(|| Error::IndexNotFound(name.clone()))?;
            let wanted = namespaced_index_value(namespace, &requirement.value);
            records.retain(|record| table.values_for(record).contains(&wanted));
            if records.is_empty() {
                break;
            }
        }
        Ok(records)
    }
}

/// Intersects the key sets of every requirement's index, smallest first
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexMergeIntersection;

impl<R: Record> Intersection<R> for IndexMergeIntersection {
    fn candidates<'a>(
        &self,
        contents: &'a StoreContents<R>,
        requirements: &[FieldRequirement],
        namespace: &str,
    ) -> Result<Vec<&'a R>> {
        if requirements.is_empty() {
            return Ok(contents.records().collect());
        }

        let mut sets: Vec<HashSet<&ObjectKey>> = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let name = field_index_name(&requirement.field);
            let table = contents
                .index(&name)
                .ok_or_else(|| Error::IndexNotFound(name.clone()))?;
            let value = namespaced_index_value(namespace, &requirement.value);
            sets.push(table.keys_for(&value).collect());
        }
        sets.sort_by_key(HashSet::len);

        let (smallest, others) = sets.split_at(1);
        Ok(smallest[0]
            .iter()
            .filter(|key| others.iter().all(|set| set.contains(*key)))
            .filter_map(|key| contents.get(key))
            .collect())
    }
}

/// Run a list request against one store.
///
/// `default_limit` applies when the request sets no limit of its own.
pub fn execute<R: Record>(
    store: &KindStore<R>,
    options: &ListOptions,
    intersection: &dyn Intersection<R>,
    default_limit: Option<usize>,
) -> Result<Vec<R>> {
    if let Some(selector) = &options.field_selector {
        selector.validate_exact()?;
    }

    let strategy = options.strategy();
    let contents = store.read();
    let candidates = match &strategy {
        LookupStrategy::FieldIndex { .. } => intersection.candidates(
            &contents,
            options.field_requirements(),
            options.namespace(),
        )?,
        LookupStrategy::NamespaceIndex(namespace) => {
            contents.by_index(NAMESPACE_INDEX, namespace)?
        }
        LookupStrategy::FullScan => contents.records().collect(),
    };

    let limit = options.limit.or(default_limit).filter(|&n| n > 0);
    let mut results = Vec::with_capacity(limit.map_or(candidates.len(), |n| n.min(candidates.len())));
    for record in candidates {
        if limit.is_some_and(|n| results.len() >= n) {
            break;
        }
        if let Some(selector) = &options.label_selector
            && !selector.matches(record.labels())
        {
            continue;
        }
        let mut copy = record.deep_copy();
        copy.set_kind(store.kind());
        results.push(copy);
    }

    debug!(
        "Listed {} record(s) of {} via {:?}",
        results.len(),
        store.kind(),
        strategy
    );
    Ok(results)
}
