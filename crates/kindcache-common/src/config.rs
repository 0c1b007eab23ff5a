//! Configuration types for kindcache

use crate::types::Kind;
use serde::{Deserialize, Serialize};

/// Root configuration for a kind cache
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Kinds whose stores are created when the cache is constructed.
    /// Kinds not listed here are still registered lazily on first add.
    pub kinds: Vec<Kind>,
    /// Limit applied to list requests that do not set one (None = unlimited)
    pub default_limit: Option<usize>,
}

impl CacheConfig {
    /// Create a configuration pre-registering the given kinds
    pub fn with_kinds(kinds: impl IntoIterator<Item = Kind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }
}
