//! Shared fixtures for the sync integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use vcluster_syncer::reconcilers::Reconciler;
use vcluster_syncer::retry::RetryConfig;
use vcluster_syncer::store::{MemoryStore, ObjectStore, SyncObject};
use vcluster_syncer::syncer::{SyncContext, Synchronizer};
use vcluster_syncer::translate::Translator;

/// Name of the virtual cluster under test
pub const VCLUSTER_NAME: &str = "suffix";

/// Host namespace everything is synced into
pub const TARGET_NAMESPACE: &str = "test";

/// resourceVersion carried by pre-existing fixtures
pub const FIXTURE_RESOURCE_VERSION: &str = "999";

pub fn translator() -> Arc<Translator> {
    Arc::new(Translator::single_namespace(VCLUSTER_NAME, TARGET_NAMESPACE).unwrap())
}

pub fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Metadata of a virtual object as read back from the API
pub fn virtual_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        resource_version: Some(FIXTURE_RESOURCE_VERSION.to_string()),
        ..Default::default()
    }
}

/// Fast retry schedule so conflict tests do not sleep
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
    }
}

/// Virtual and host stores plus a reconciler over them
pub struct Harness<S: Synchronizer> {
    pub translator: Arc<Translator>,
    pub virtual_store: Arc<MemoryStore<S::Object>>,
    pub host_store: Arc<MemoryStore<S::Object>>,
    pub reconciler: Reconciler<S>,
}

impl<S: Synchronizer> Harness<S> {
    pub fn new(
        syncer: S,
        virtual_objects: Vec<S::Object>,
        host_objects: Vec<S::Object>,
    ) -> Self {
        Self::with_stores(
            syncer,
            translator(),
            MemoryStore::with_objects(virtual_objects),
            MemoryStore::with_objects(host_objects),
        )
    }

    /// Harness over caller-built stores; `translator` must be the one `syncer` was built with
    pub fn with_stores(
        syncer: S,
        translator: Arc<Translator>,
        virtual_store: MemoryStore<S::Object>,
        host_store: MemoryStore<S::Object>,
    ) -> Self {
        let virtual_store = Arc::new(virtual_store);
        let host_store = Arc::new(host_store);
        let reconciler = Reconciler::new(
            syncer,
            virtual_store.clone() as Arc<dyn ObjectStore<S::Object>>,
            host_store.clone() as Arc<dyn ObjectStore<S::Object>>,
            translator.clone(),
        )
        .with_retry(fast_retry());

        Self {
            translator,
            virtual_store,
            host_store,
            reconciler,
        }
    }

    pub fn context(&self) -> SyncContext<S::Object> {
        self.reconciler.context()
    }

    pub fn syncer(&self) -> &S {
        self.reconciler.syncer()
    }
}

/// Single host object in `store`, panicking unless there is exactly one
pub fn only_object<K: SyncObject>(store: &MemoryStore<K>) -> K {
    let mut objects = store.objects();
    assert_eq!(objects.len(), 1, "expected exactly one object, got {:?}", objects);
    objects.remove(0)
}
