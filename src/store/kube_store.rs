use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use super::{ObjectStore, SyncObject};
use crate::{Error, Result};

/// [`ObjectStore`] backed by a Kubernetes API server
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: SyncObject> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K: SyncObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, "get", namespace, name))
    }

    async fn list(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>> {
        let api: Api<K> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = api
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, "list", namespace.unwrap_or_default(), ""))?;
        Ok(list.items)
    }

    async fn create(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();

        debug!(namespace = %namespace, name = %name, "Creating object");
        self.api(&namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, "create", &namespace, &name))
    }

    async fn update(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();

        debug!(namespace = %namespace, name = %name, "Updating object");
        self.api(&namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, "update", &namespace, &name))
    }

    async fn update_status(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        let data = serde_json::to_vec(object)?;

        debug!(namespace = %namespace, name = %name, "Updating object status");
        self.api(&namespace)
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|e| map_kube_error(e, "update status", &namespace, &name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        debug!(namespace = %namespace, name = %name, "Deleting object");
        match self.api(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error(e, "delete", namespace, name)),
        }
    }

    async fn ensure_namespace(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let existing = namespaces
            .get_opt(namespace)
            .await
            .map_err(|e| map_kube_error(e, "get namespace", "", namespace))?;
        if existing.is_some() {
            return Ok(());
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace = %namespace, "Created host namespace");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => Ok(()),
            Err(e) => Err(map_kube_error(e, "create namespace", "", namespace)),
        }
    }
}

/// Classify API failures into the engine's error taxonomy.
///
/// A 404 on create means the namespace is missing, not that the object raced
/// away, so it is not reported as `NotFound`.
fn map_kube_error(err: kube::Error, operation: &str, namespace: &str, name: &str) -> Error {
    let target = format!("{} {}/{}", operation, namespace, name);
    match &err {
        kube::Error::Api(response) if response.code == 404 && operation == "create" => {
            Error::NamespaceNotFound(format!("{}: {}", target, response.message))
        }
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            Error::AlreadyExists(format!("{}: {}", target, response.message))
        }
        kube::Error::Api(response) if response.code == 409 => {
            Error::Conflict(format!("{}: {}", target, response.message))
        }
        kube::Error::Api(response) if response.code == 404 => {
            Error::NotFound(format!("{}: {}", target, response.message))
        }
        _ => Error::KubeError(format!("Failed to {}: {}", target, err)),
    }
}
