use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::ResourceExt;

use super::{ObjectStore, SyncObject};
use crate::translate::parse_selector_string;
use crate::{Error, Result};

type Key = (String, String);

type Labels = BTreeMap<String, String>;

/// In-memory [`ObjectStore`] with resourceVersion compare-and-swap.
///
/// Mirrors the semantics the engine relies on from a real API server, so
/// synchronizers can be exercised without a cluster. Writes made through
/// [`ObjectStore`] are counted; out-of-band edits through [`MemoryStore::insert`]
/// and [`MemoryStore::remove`] are not.
///
/// Namespaces are only checked once [`MemoryStore::enforcing_namespaces`] is
/// set; then creates into a namespace that was never ensured or added fail
/// like they do on an API server.
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    namespaces: Mutex<BTreeMap<String, Labels>>,
    enforce_namespaces: bool,
    resource_version: AtomicU64,
    writes: AtomicUsize,
}

impl<K: SyncObject> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            namespaces: Mutex::new(BTreeMap::new()),
            enforce_namespaces: false,
            resource_version: AtomicU64::new(1),
            writes: AtomicUsize::new(0),
        }
    }
}

impl<K: SyncObject> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `objects`
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let store = Self::new();
        for object in objects {
            store.insert(object);
        }
        store
    }

    /// Reject creates into namespaces that do not exist
    pub fn enforcing_namespaces(mut self) -> Self {
        self.enforce_namespaces = true;
        self
    }

    /// Add an unlabelled namespace without going through the API
    pub fn add_namespace(&self, namespace: &str) {
        self.namespaces().entry(namespace.to_string()).or_default();
    }

    /// Labels of `namespace`, if it exists
    pub fn namespace_labels(&self, namespace: &str) -> Option<Labels> {
        self.namespaces().get(namespace).cloned()
    }

    /// Put an object in place without going through the API, keeping its
    /// resourceVersion if it has one
    pub fn insert(&self, mut object: K) {
        if object.meta().resource_version.is_none() {
            object.meta_mut().resource_version = Some(self.next_resource_version());
        }
        self.lock().insert(key_of(&object), object);
    }

    /// Remove an object without going through the API
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock().remove(&(namespace.to_string(), name.to_string()))
    }

    /// Current copy of an object
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored objects, ordered by namespace and name
    pub fn objects(&self) -> Vec<K> {
        self.lock().values().cloned().collect()
    }

    /// Number of successful create/update/delete calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Key, K>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn namespaces(&self) -> MutexGuard<'_, BTreeMap<String, Labels>> {
        self.namespaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_resource_version(&self) -> String {
        self.resource_version
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    fn replace(&self, object: &K, operation: &str) -> Result<K> {
        let key = key_of(object);
        let mut objects = self.lock();

        let current = objects.get(&key).ok_or_else(|| {
            Error::NotFound(format!("{} {}/{}", operation, key.0, key.1))
        })?;

        if let Some(expected) = object.meta().resource_version.as_ref() {
            if current.meta().resource_version.as_ref() != Some(expected) {
                return Err(Error::Conflict(format!(
                    "{} {}/{}: resourceVersion {} is stale",
                    operation, key.0, key.1, expected
                )));
            }
        }

        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_resource_version());
        objects.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

#[async_trait]
impl<K: SyncObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.object(namespace, name))
    }

    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>> {
        let terms = label_selector.map(parse_selector_string).unwrap_or_default();

        Ok(self
            .lock()
            .values()
            .filter(|object| namespace.map_or(true, |ns| object.namespace().as_deref() == Some(ns)))
            .filter(|object| {
                let labels = object.labels();
                terms.iter().all(|(key, value)| labels.get(key) == Some(value))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, object: &K) -> Result<K> {
        let key = key_of(object);
        if self.enforce_namespaces && !self.namespaces().contains_key(&key.0) {
            return Err(Error::NamespaceNotFound(format!(
                "create {}/{}: namespace {} not found",
                key.0, key.1, key.0
            )));
        }

        let mut objects = self.lock();
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("create {}/{}", key.0, key.1)));
        }

        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_resource_version());
        objects.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(&self, object: &K) -> Result<K> {
        self.replace(object, "update")
    }

    async fn update_status(&self, object: &K) -> Result<K> {
        self.replace(object, "update status")
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        if self.remove(namespace, name).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn ensure_namespace(&self, namespace: &str, labels: &Labels) -> Result<()> {
        self.namespaces()
            .entry(namespace.to_string())
            .or_insert_with(|| labels.clone());
        Ok(())
    }
}

fn key_of<K: SyncObject>(object: &K) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}
