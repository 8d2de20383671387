//! Forward (virtual -> host) and reverse (host -> virtual) identity resolution
//!
//! Every synced kind gets a [`Mapper`]. Most kinds use [`NameMapper`], which
//! applies the translator's name rules; kinds whose host identity depends on
//! more than the virtual name supply their own implementation. The reconcile
//! loop only ever sees the trait.

mod configmaps;
mod generic;
mod index;

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::GroupVersionKind;

use crate::translate::{gvk_string, Translator};
use crate::Result;

pub use configmaps::{ConfigMapMapper, ROOT_CA_CONFIG_MAP};
pub use generic::{NameMapper, NameTranslator};
pub use index::ReverseIndex;

/// Namespace and name of an object on either cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of an object from its metadata
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity resolution for one resource kind
pub trait Mapper: Send + Sync {
    /// Kind this mapper resolves
    fn gvk(&self) -> &GroupVersionKind;

    /// Host identity a virtual object is stored under
    fn virtual_to_host(&self, virtual_id: &NamespacedName) -> Result<NamespacedName>;

    /// Virtual identity a host object was produced from. `None` when the
    /// object carries no complete ownership record for this kind and cluster.
    fn host_to_virtual(&self, host_meta: &ObjectMeta) -> Option<NamespacedName>;
}

/// Reverse lookup through the ownership record embedded in the host object
pub(crate) fn virtual_from_record(
    translator: &Translator,
    gvk: &GroupVersionKind,
    host_meta: &ObjectMeta,
) -> Option<NamespacedName> {
    let record = translator.ownership_record(host_meta)?;
    if record.kind != gvk_string(gvk) || record.marker.as_deref() != Some(translator.name()) {
        return None;
    }
    Some(NamespacedName::new(record.namespace, record.name))
}
