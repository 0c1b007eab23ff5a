//! Core type definitions for kindcache
//!
//! This module defines the identifiers shared by every component: record
//! kinds, primary keys, label sets and the namespace qualification used by
//! secondary indexes.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label mapping attached to a record
pub type Labels = BTreeMap<String, String>;

/// Namespace used to index and query records across all namespaces.
pub const ALL_NAMESPACES: &str = "__all";

/// Name of the index every kind store maintains over record namespaces.
pub const NAMESPACE_INDEX: &str = "namespace";

/// Prefix applied to user-registered field index names.
const FIELD_INDEX_PREFIX: &str = "field:";

/// Identifier of a record type (group, version and kind)
///
/// The core group is represented by an empty `group`.
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Display,
)]
#[display("{group}/{version}, Kind={kind}")]
pub struct Kind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Kind {
    /// Create a new kind
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build a kind from an `apiVersion` string (`apps/v1` or `v1`) and a kind name
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// The `apiVersion` form of this kind's group and version
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The kind a list of this kind's items refers to.
    ///
    /// `DeploymentList` maps to `Deployment`; kinds without the `List`
    /// suffix are returned unchanged.
    #[must_use]
    pub fn item_kind(&self) -> Self {
        match self.kind.strip_suffix("List") {
            Some(item) if !item.is_empty() => Self::new(&self.group, &self.version, item),
            _ => self.clone(),
        }
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({self})")
    }
}

/// Primary key of a record within its kind store
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a key for a namespaced record
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a key for a cluster-scoped record
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    /// Whether the key carries a namespace
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}", self.namespace, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({self})")
    }
}

/// Qualify an index value with a namespace.
///
/// An empty namespace qualifies with [`ALL_NAMESPACES`].
#[must_use]
pub fn namespaced_index_value(namespace: &str, value: &str) -> String {
    if namespace.is_empty() {
        format!("{ALL_NAMESPACES}/{value}")
    } else {
        format!("{namespace}/{value}")
    }
}

/// Internal index name for a user field index
#[must_use]
pub fn field_index_name(field: &str) -> String {
    format!("{FIELD_INDEX_PREFIX}{field}")
}
