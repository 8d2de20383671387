//! Object-store boundary shared by the virtual and host clusters
//!
//! Both clusters expose the same declarative API: get/list/create/update/
//! delete with resourceVersion-based optimistic concurrency. The sync engine
//! only talks to [`ObjectStore`], so the same synchronizers run against a live
//! API server ([`KubeStore`]) or an in-memory one ([`MemoryStore`]).

mod kube_store;
mod memory;

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

/// A namespaced, statically typed resource the engine can sync
pub trait SyncObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> SyncObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Declarative object API of one cluster for one kind
#[async_trait]
pub trait ObjectStore<K: SyncObject>: Send + Sync {
    /// Read an object; a missing object is `Ok(None)`
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// List objects, optionally restricted to a namespace and an equality
    /// label selector (`k1=v1,k2=v2`)
    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>>;

    /// Create an object; fails with `AlreadyExists` if the name is taken
    async fn create(&self, object: &K) -> Result<K>;

    /// Replace an object; fails with `Conflict` if its resourceVersion is stale
    async fn update(&self, object: &K) -> Result<K>;

    /// Replace the status subresource of an object
    async fn update_status(&self, object: &K) -> Result<K>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create `namespace` with `labels` unless it already exists. An existing
    /// namespace is left untouched.
    async fn ensure_namespace(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<()>;
}
