//! kindcache store - in-memory, kind-partitioned record cache
//!
//! Records are grouped by [`Kind`](kindcache_common::Kind). Each kind gets a
//! [`KindStore`] holding the records by primary key together with a
//! namespace index and any number of registered field indexes. [`KindCache`]
//! routes records to their store and answers list queries through the
//! cheapest available index.

pub mod cache;
pub mod index;
pub mod object;
pub mod query;
pub mod record;
pub mod resolver;
pub mod selector;
pub mod stats;
pub mod store;

// Re-exports
pub use cache::KindCache;
pub use index::{IndexFunc, IndexTable};
pub use object::{Object, ObjectMeta};
pub use query::{FilterIntersection, IndexMergeIntersection, Intersection, ListOptions};
pub use record::Record;
pub use resolver::{KindResolver, Scheme};
pub use selector::{FieldRequirement, FieldSelector, LabelRequirement, LabelSelector, Operator};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{KindStore, StoreContents};
