//! Record capability set
//!
//! The cache never looks inside a record beyond the accessors below. Kind
//! resolution is delegated to a [`KindResolver`](crate::resolver::KindResolver)
//! and field extraction to the functions registered with each index.

use kindcache_common::{Kind, Labels, ObjectKey};

/// A value that can be held by a kind store
///
/// Implementors with several record shapes should use a closed enum, one
/// variant per shape, so a single cache can hold all of them.
pub trait Record: Clone + Send + Sync + 'static {
    /// Name of the concrete record type, used by [`Scheme`](crate::resolver::Scheme)
    fn type_name(&self) -> &str;

    /// Namespace of the record, empty for cluster-scoped records
    fn namespace(&self) -> &str;

    /// Name of the record, unique within its namespace
    fn name(&self) -> &str;

    /// Labels attached to the record
    fn labels(&self) -> &Labels;

    /// Tag the record with its resolved kind
    fn set_kind(&mut self, kind: &Kind);

    /// Produce an independent copy of the record
    #[must_use]
    fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Primary key of the record within its kind store
    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }
}
