//! Kind resolution
//!
//! The cache asks a [`KindResolver`] which kind a record belongs to before
//! routing it to a store. [`Scheme`] is the table-driven implementation;
//! any `Fn(&R) -> Result<Kind>` closure works as well.

use crate::record::Record;
use kindcache_common::{Error, Kind, Result};
use std::collections::HashMap;

/// Maps a record to its kind
pub trait KindResolver<R>: Send + Sync {
    /// Resolve the kind of `record`
    fn resolve(&self, record: &R) -> Result<Kind>;
}

impl<R, F> KindResolver<R> for F
where
    F: Fn(&R) -> Result<Kind> + Send + Sync,
{
    fn resolve(&self, record: &R) -> Result<Kind> {
        self(record)
    }
}

/// Registry of record type names and the kinds they map to
#[derive(Clone, Debug, Default)]
pub struct Scheme {
    types: HashMap<String, Kind>,
}

impl Scheme {
    /// Create an empty scheme
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type name, replacing any earlier registration
    pub fn register(&mut self, type_name: impl Into<String>, kind: Kind) -> &mut Self {
        self.types.insert(type_name.into(), kind);
        self
    }

    /// Register a kind under its own kind name
    pub fn register_kind(&mut self, kind: Kind) -> &mut Self {
        self.register(kind.kind.clone(), kind)
    }

    /// Look up the kind registered for a type name
    pub fn kind_for(&self, type_name: &str) -> Option<&Kind> {
        self.types.get(type_name)
    }

    /// All registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.types.values()
    }

    /// Check if a type name is registered
    #[must_use]
    pub fn recognizes(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }
}

impl<R: Record> KindResolver<R> for Scheme {
    fn resolve(&self, record: &R) -> Result<Kind> {
        let type_name = record.type_name();
        if type_name.is_empty() {
            return Err(Error::kind_resolution(format!(
                "record {} has no type name",
                record.key()
            )));
        }
        self.kind_for(type_name).cloned().ok_or_else(|| {
            Error::kind_resolution(format!("no kind is registered for type {type_name}"))
        })
    }
}
