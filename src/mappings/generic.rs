use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::GroupVersionKind;
use kube::Resource;

use super::{virtual_from_record, Mapper, NamespacedName};
use crate::translate::{gvk_of, Translator};
use crate::Result;

/// Derives a host name from a virtual (name, namespace) pair
pub type NameTranslator = fn(&Translator, &str, &str) -> Result<String>;

/// Mapper that only rewrites names, the common case for namespaced kinds
#[derive(Clone)]
pub struct NameMapper {
    translator: Arc<Translator>,
    gvk: GroupVersionKind,
    host_name: NameTranslator,
}

impl NameMapper {
    /// Mapper for `K` using the translator's default host name rule
    pub fn new<K: Resource<DynamicType = ()>>(translator: Arc<Translator>) -> Self {
        Self::with_name_translator::<K>(translator, Translator::host_name)
    }

    /// Mapper for `K` with a custom name rule
    pub fn with_name_translator<K: Resource<DynamicType = ()>>(
        translator: Arc<Translator>,
        host_name: NameTranslator,
    ) -> Self {
        Self {
            translator,
            gvk: gvk_of::<K>(),
            host_name,
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }
}

impl Mapper for NameMapper {
    fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    fn virtual_to_host(&self, virtual_id: &NamespacedName) -> Result<NamespacedName> {
        let name = (self.host_name)(&self.translator, &virtual_id.name, &virtual_id.namespace)?;
        let namespace = self.translator.host_namespace(&virtual_id.namespace)?;
        Ok(NamespacedName::new(namespace, name))
    }

    fn host_to_virtual(&self, host_meta: &ObjectMeta) -> Option<NamespacedName> {
        virtual_from_record(&self.translator, &self.gvk, host_meta)
    }
}
