//! Multi-kind cache engine
//!
//! [`KindCache`] routes every record to the [`KindStore`] of its kind. Stores
//! for configured kinds exist from construction; any other kind gets a store
//! the first time one of its records is added. Stores are never dropped.
//!
//! The kind map has its own lock, held for writing only while a store is
//! created. Everything else goes through the per-store lock.

use crate::index::namespaced_field_func;
use crate::query::{FilterIntersection, Intersection, ListOptions, execute};
use crate::record::Record;
use crate::resolver::KindResolver;
use crate::stats::CacheStats;
use crate::store::KindStore;
use kindcache_common::{CacheConfig, Error, Kind, Result, field_index_name};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory cache of records grouped by kind
pub struct KindCache<R: Record> {
    stores: RwLock<HashMap<Kind, Arc<KindStore<R>>>>,
    resolver: Arc<dyn KindResolver<R>>,
    intersection: Arc<dyn Intersection<R>>,
    default_limit: Option<usize>,
    stats: CacheStats,
}

impl<R: Record> KindCache<R> {
    /// Create a cache with a store for every configured kind
    pub fn new(config: &CacheConfig, resolver: impl KindResolver<R> + 'static) -> Self {
        let cache = Self {
            stores: RwLock::new(HashMap::new()),
            resolver: Arc::new(resolver),
            intersection: Arc::new(FilterIntersection),
            default_limit: config.default_limit,
            stats: CacheStats::default(),
        };
        for kind in &config.kinds {
            cache.store_or_create(kind);
        }
        cache
    }

    /// Replace the strategy used to combine several field requirements
    #[must_use]
    pub fn with_intersection(mut self, intersection: impl Intersection<R> + 'static) -> Self {
        self.intersection = Arc::new(intersection);
        self
    }

    /// Insert or replace a record
    pub fn add(&self, record: R) -> Result<()> {
        let kind = self.resolve(&record, "add")?;
        let store = self.store_or_create(&kind);
        store.upsert(record.key(), record);
        CacheStats::record(&self.stats.adds);
        Ok(())
    }

    /// Copy of the cached record with the same kind and key as `record`.
    ///
    /// A kind without a store is reported as not found, not as an error.
    pub fn get(&self, record: &R) -> Result<Option<R>> {
        let kind = self.resolve(record, "get")?;
        let found = self
            .store(&kind)
            .and_then(|store| store.get_by_key(&record.key()));
        if found.is_some() {
            CacheStats::record(&self.stats.hits);
        } else {
            CacheStats::record(&self.stats.misses);
        }
        Ok(found)
    }

    /// Remove the cached record with the same kind and key as `record`.
    ///
    /// Succeeds without doing anything when the kind or the key is unknown.
    pub fn delete(&self, record: &R) -> Result<()> {
        let kind = self.resolve(record, "delete")?;
        if let Some(store) = self.store(&kind)
            && store.delete(&record.key()).is_some()
        {
            CacheStats::record(&self.stats.deletes);
        }
        Ok(())
    }

    /// List records of `kind` matching `options`.
    ///
    /// A list kind such as `DeploymentList` lists `Deployment` records.
    /// Unlike [`get`](Self::get) and [`delete`](Self::delete), a kind
    /// without a store is an error.
    pub fn list(&self, kind: &Kind, options: &ListOptions) -> Result<Vec<R>> {
        let kind = kind.item_kind();
        let store = self
            .store(&kind)
            .ok_or_else(|| Error::KindNotFound(kind.clone()))?;
        let records = execute(
            &store,
            options,
            self.intersection.as_ref(),
            self.default_limit,
        )?;
        CacheStats::record(&self.stats.lists);
        Ok(records)
    }

    /// Register a field index on `kind`.
    ///
    /// `extract` returns the base values of a record; they are indexed
    /// per namespace and across all namespaces. If `kind` has no store yet,
    /// nothing is registered and the call still succeeds, so add a record
    /// of the kind (or configure the kind) before indexing it.
    pub fn index_field<F>(&self, kind: &Kind, field: &str, extract: F) -> Result<()>
    where
        F: Fn(&R) -> Vec<String> + Send + Sync + 'static,
    {
        if field.is_empty() {
            return Err(Error::malformed_index("index name must not be empty"));
        }
        let Some(store) = self.store(kind) else {
            warn!(
                "Index '{}' not registered: no store for {} yet",
                field, kind
            );
            return Ok(());
        };
        store.add_indexer(&field_index_name(field), namespaced_field_func(extract))
    }

    /// Underlying store of `kind`, for direct inspection
    pub fn raw_store_for(&self, kind: &Kind) -> Option<Arc<KindStore<R>>> {
        self.store(kind)
    }

    /// All kinds with a store
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.stores.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Operation counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn resolve(&self, record: &R, op: &str) -> Result<Kind> {
        if record.name().is_empty() {
            return Err(Error::nil_input(format!("cannot {op} a record without a name")));
        }
        self.resolver.resolve(record)
    }

    fn store(&self, kind: &Kind) -> Option<Arc<KindStore<R>>> {
        self.stores.read().get(kind).cloned()
    }

    fn store_or_create(&self, kind: &Kind) -> Arc<KindStore<R>> {
        if let Some(store) = self.store(kind) {
            return store;
        }
        let mut stores = self.stores.write();
        Arc::clone(stores.entry(kind.clone()).or_insert_with(|| {
            debug!("Created store for {}", kind);
            CacheStats::record(&self.stats.stores_created);
            Arc::new(KindStore::new(kind.clone()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::query::IndexMergeIntersection;
    use crate::resolver::Scheme;
    use crate::selector::{FieldRequirement, FieldSelector, LabelSelector, Operator};
    use rand::Rng;

    fn deployment_kind() -> Kind {
        Kind::new("apps", "v1", "Deployment")
    }

    fn pod_kind() -> Kind {
        Kind::new("", "v1", "Pod")
    }

    fn scheme() -> Scheme {
        let mut scheme = Scheme::new();
        scheme.register_kind(deployment_kind()).register_kind(pod_kind());
        scheme
    }

    fn new_cache(kinds: &[Kind]) -> KindCache<Object> {
        KindCache::new(&CacheConfig::with_kinds(kinds.iter().cloned()), scheme())
    }

    fn deployment(namespace: &str, name: &str) -> Object {
        Object::new("Deployment", namespace, name)
    }

    fn index_annotation(cache: &KindCache<Object>) {
        cache
            .index_field(&deployment_kind(), "customIdx", |o: &Object| {
                o.annotation("my.domain/label")
                    .map(str::to_string)
                    .into_iter()
                    .collect()
            })
            .unwrap();
    }

    #[test]
    fn test_custom_index_scenario() {
        let cache = new_cache(&[deployment_kind()]);
        index_annotation(&cache);

        cache
            .add(deployment("default", "deploy").with_annotation("my.domain/label", "someval"))
            .unwrap();

        let results = cache
            .list(
                &deployment_kind(),
                &ListOptions::new().matching_field("customIdx", "someval"),
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.name, "deploy");
        assert_eq!(results[0].api_version, "apps/v1");
    }

    #[test]
    fn test_get_on_empty_cache() {
        let cache = new_cache(&[]);
        let result = cache.get(&deployment("default", "deploy")).unwrap();
        assert!(result.is_none());
        assert_eq!(cache.stats().snapshot().misses, 1);
        assert_eq!(cache.stats().snapshot().hit_ratio(), Some(0.0));
    }

    #[test]
    fn test_list_unknown_kind() {
        let cache = new_cache(&[]);
        let result = cache.list(&deployment_kind(), &ListOptions::new());
        assert!(matches!(result, Err(Error::KindNotFound(_))));
    }

    #[test]
    fn test_list_configured_kind_is_empty() {
        let cache = new_cache(&[deployment_kind()]);
        assert!(cache.list(&deployment_kind(), &ListOptions::new()).unwrap().is_empty());
        assert_eq!(cache.kinds(), vec![deployment_kind()]);
    }

    #[test]
    fn test_list_kind_hint() {
        let cache = new_cache(&[]);
        cache.add(deployment("default", "deploy")).unwrap();
        let list_kind = Kind::new("apps", "v1", "DeploymentList");
        assert_eq!(cache.list(&list_kind, &ListOptions::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_add_creates_store_lazily() {
        let cache = new_cache(&[]);
        assert!(cache.raw_store_for(&pod_kind()).is_none());

        cache.add(Object::new("Pod", "default", "p")).unwrap();
        let store = cache.raw_store_for(&pod_kind()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.kind(), &pod_kind());
        assert_eq!(cache.stats().snapshot().stores_created, 1);
    }

    #[test]
    fn test_add_get_delete() {
        let cache = new_cache(&[]);
        let obj = deployment("default", "deploy").with_label("app", "web");
        cache.add(obj.clone()).unwrap();

        assert_eq!(cache.get(&obj).unwrap(), Some(obj.clone()));

        cache.delete(&obj).unwrap();
        assert_eq!(cache.get(&obj).unwrap(), None);

        // Deleting again, or deleting an unknown kind, is not an error
        cache.delete(&obj).unwrap();
        cache.delete(&Object::new("Pod", "default", "p")).unwrap();
    }

    #[test]
    fn test_nil_record() {
        let cache = new_cache(&[]);
        let unnamed = deployment("default", "");
        assert!(matches!(cache.add(unnamed.clone()), Err(Error::NilInput(_))));
        assert!(matches!(cache.get(&unnamed), Err(Error::NilInput(_))));
        assert!(matches!(cache.delete(&unnamed), Err(Error::NilInput(_))));
    }

    #[test]
    fn test_unresolvable_kind() {
        let cache = new_cache(&[]);
        let unknown = Object::new("Secret", "default", "s");
        assert!(matches!(
            cache.add(unknown.clone()),
            Err(Error::KindResolutionFailed(_))
        ));
        assert!(matches!(
            cache.get(&unknown),
            Err(Error::KindResolutionFailed(_))
        ));
        assert!(cache.kinds().is_empty());
    }

    #[test]
    fn test_upsert_replaces_and_unindexes() {
        let cache = new_cache(&[deployment_kind()]);
        index_annotation(&cache);

        let r1 = deployment("default", "deploy").with_annotation("my.domain/label", "old");
        let r2 = deployment("default", "deploy").with_annotation("my.domain/label", "new");
        cache.add(r1).unwrap();
        cache.add(r2.clone()).unwrap();

        assert_eq!(cache.get(&r2).unwrap(), Some(r2));
        let old = cache
            .list(&deployment_kind(), &ListOptions::new().matching_field("customIdx", "old"))
            .unwrap();
        assert!(old.is_empty());
        let new = cache
            .list(&deployment_kind(), &ListOptions::new().matching_field("customIdx", "new"))
            .unwrap();
        assert_eq!(new.len(), 1);
    }

    #[test]
    fn test_delete_unindexes() {
        let cache = new_cache(&[deployment_kind()]);
        index_annotation(&cache);
        let obj = deployment("default", "deploy").with_annotation("my.domain/label", "v");
        cache.add(obj.clone()).unwrap();

        let options = ListOptions::new().matching_field("customIdx", "v");
        assert_eq!(cache.list(&deployment_kind(), &options).unwrap().len(), 1);
        cache.delete(&obj).unwrap();
        assert!(cache.list(&deployment_kind(), &options).unwrap().is_empty());
    }

    #[test]
    fn test_namespace_duality() {
        let cache = new_cache(&[deployment_kind()]);
        index_annotation(&cache);
        cache
            .add(deployment("team-a", "deploy").with_annotation("my.domain/label", "v"))
            .unwrap();

        let scoped = ListOptions::new()
            .in_namespace("team-a")
            .matching_field("customIdx", "v");
        let across = ListOptions::new().matching_field("customIdx", "v");
        let elsewhere = ListOptions::new()
            .in_namespace("team-b")
            .matching_field("customIdx", "v");

        assert_eq!(cache.list(&deployment_kind(), &scoped).unwrap().len(), 1);
        assert_eq!(cache.list(&deployment_kind(), &across).unwrap().len(), 1);
        assert!(cache.list(&deployment_kind(), &elsewhere).unwrap().is_empty());
    }

    #[test]
    fn test_index_field_on_unknown_kind_is_noop() {
        let cache = new_cache(&[]);
        index_annotation(&cache);

        // The store created by this add never got the index
        cache
            .add(deployment("default", "deploy").with_annotation("my.domain/label", "v"))
            .unwrap();
        let store = cache.raw_store_for(&deployment_kind()).unwrap();
        assert_eq!(store.index_names(), vec!["namespace".to_string()]);

        let result = cache.list(
            &deployment_kind(),
            &ListOptions::new().matching_field("customIdx", "v"),
        );
        assert!(matches!(result, Err(Error::IndexNotFound(_))));
    }

    #[test]
    fn test_index_field_after_data() {
        let cache = new_cache(&[]);
        cache
            .add(deployment("default", "deploy").with_annotation("my.domain/label", "v"))
            .unwrap();
        index_annotation(&cache);

        let results = cache
            .list(&deployment_kind(), &ListOptions::new().matching_field("customIdx", "v"))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_index_field_conflict() {
        let cache = new_cache(&[deployment_kind()]);
        index_annotation(&cache);
        let again = cache.index_field(&deployment_kind(), "customIdx", |_: &Object| Vec::new());
        assert!(matches!(again, Err(Error::MalformedIndexTarget(_))));
        let empty = cache.index_field(&deployment_kind(), "", |_: &Object| Vec::new());
        assert!(matches!(empty, Err(Error::MalformedIndexTarget(_))));
    }

    fn populate_labelled_pods(cache: &KindCache<Object>) {
        for field in ["app", "tier"] {
            let path = format!("metadata.labels.{field}");
            cache
                .index_field(&pod_kind(), field, move |o: &Object| o.field_values(&path))
                .unwrap();
        }
        cache
            .add(Object::new("Pod", "default", "both").with_label("app", "a").with_label("tier", "b"))
            .unwrap();
        cache
            .add(Object::new("Pod", "default", "app-only").with_label("app", "a"))
            .unwrap();
        cache
            .add(Object::new("Pod", "default", "tier-only").with_label("tier", "b"))
            .unwrap();
    }

    #[test]
    fn test_multi_requirement_intersection() {
        let options = ListOptions::new()
            .matching_field("app", "a")
            .matching_field("tier", "b");

        let filtered = new_cache(&[pod_kind()]);
        populate_labelled_pods(&filtered);
        let merged = new_cache(&[pod_kind()]).with_intersection(IndexMergeIntersection);
        populate_labelled_pods(&merged);

        for cache in [&filtered, &merged] {
            let results = cache.list(&pod_kind(), &options).unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].metadata.name, "both");
        }
    }

    #[test]
    fn test_non_equality_rejected() {
        let cache = new_cache(&[pod_kind()]);
        let selector = FieldSelector::from_requirements([
            FieldRequirement::equals("app", "a"),
            FieldRequirement::new("tier", Operator::NotEquals, "b"),
        ]);
        let result = cache.list(&pod_kind(), &ListOptions::new().matching_fields(selector));
        assert!(matches!(result, Err(Error::UnsupportedSelector(_))));
    }

    #[test]
    fn test_label_selector_and_limit() {
        let cache = new_cache(&[pod_kind()]);
        for i in 0..10 {
            let tier = if i < 6 { "web" } else { "db" };
            cache
                .add(Object::new("Pod", "default", format!("p{i}")).with_label("tier", tier))
                .unwrap();
        }
        let options = ListOptions::new()
            .matching_labels(LabelSelector::parse("tier=web").unwrap())
            .limit(4);
        let results = cache.list(&pod_kind(), &options).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.metadata.labels["tier"] == "web"));

        let all = ListOptions::new().matching_labels(LabelSelector::parse("tier=web").unwrap());
        assert_eq!(cache.list(&pod_kind(), &all).unwrap().len(), 6);
    }

    #[test]
    fn test_default_limit_from_config() {
        let config = CacheConfig {
            kinds: vec![pod_kind()],
            default_limit: Some(3),
        };
        let cache: KindCache<Object> = KindCache::new(&config, scheme());
        for i in 0..5 {
            cache.add(Object::new("Pod", "default", format!("p{i}"))).unwrap();
        }
        assert_eq!(cache.list(&pod_kind(), &ListOptions::new()).unwrap().len(), 3);
        assert_eq!(cache.list(&pod_kind(), &ListOptions::new().limit(0)).unwrap().len(), 5);
    }

    #[test]
    fn test_copy_isolation() {
        let cache = new_cache(&[]);
        let obj = deployment("default", "deploy").with_label("app", "web");
        cache.add(obj.clone()).unwrap();

        let mut got = cache.get(&obj).unwrap().unwrap();
        got.metadata.labels.insert("app".into(), "mutated".into());
        let mut listed = cache.list(&deployment_kind(), &ListOptions::new()).unwrap();
        listed[0].metadata.name = "renamed".into();

        assert_eq!(cache.get(&obj).unwrap(), Some(obj));
        let again = cache.list(&deployment_kind(), &ListOptions::new()).unwrap();
        assert_eq!(again[0].metadata.name, "deploy");
        assert_eq!(again[0].metadata.labels["app"], "web");
    }

    #[test]
    fn test_closure_resolver() {
        let cache: KindCache<Object> = KindCache::new(&CacheConfig::default(), |o: &Object| -> Result<Kind> {
            Ok(Kind::new("example.com", "v1", o.kind.clone()))
        });
        cache.add(Object::new("Widget", "", "w")).unwrap();
        assert_eq!(cache.kinds(), vec![Kind::new("example.com", "v1", "Widget")]);
    }

    #[test]
    fn test_concurrent_add_and_list() {
        let cache = Arc::new(new_cache(&[]));
        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = Arc::clone(&cache);
                s.spawn(move || {
                    for i in 0..100 {
                        cache
                            .add(Object::new("Pod", format!("ns{t}"), format!("p{i}")))
                            .unwrap();
                        if let Ok(records) = cache.list(&pod_kind(), &ListOptions::new()) {
                            assert!(!records.is_empty());
                        }
                    }
                });
            }
        });
        assert_eq!(cache.kinds(), vec![pod_kind()]);
        assert_eq!(cache.stats().snapshot().stores_created, 1);
        assert_eq!(
            cache
                .list(&pod_kind(), &ListOptions::new().in_namespace("ns2"))
                .unwrap()
                .len(),
            100
        );
        assert_eq!(cache.list(&pod_kind(), &ListOptions::new()).unwrap().len(), 400);
    }

    #[test]
    fn test_randomized_index_consistency() {
        let cache = new_cache(&[pod_kind()]);
        cache
            .index_field(&pod_kind(), "app", |o: &Object| o.field_values("metadata.labels.app"))
            .unwrap();

        let apps = ["web", "api", "db"];
        let mut expected: HashMap<String, &str> = HashMap::new();
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let name = format!("p{}", rng.gen_range(0..20));
            if rng.gen_bool(0.25) {
                cache.delete(&Object::new("Pod", "default", name.as_str())).unwrap();
                expected.remove(&name);
            } else {
                let app = apps[rng.gen_range(0..apps.len())];
                cache
                    .add(Object::new("Pod", "default", name.as_str()).with_label("app", app))
                    .unwrap();
                expected.insert(name, app);
            }
        }

        for app in apps {
            let mut want: Vec<&String> = expected
                .iter()
                .filter(|(_, a)| **a == app)
                .map(|(n, _)| n)
                .collect();
            want.sort();
            let mut got: Vec<String> = cache
                .list(&pod_kind(), &ListOptions::new().matching_field("app", app))
                .unwrap()
                .into_iter()
                .map(|o| o.metadata.name)
                .collect();
            got.sort();
            assert_eq!(got.iter().collect::<Vec<_>>(), want);
        }
    }
}
