use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::GroupVersionKind;

use super::{Mapper, NameMapper, NamespacedName};
use crate::translate::{safe_concat_name, NamespaceMode, Translator};
use crate::Result;

/// ConfigMap the control plane publishes into every namespace
pub const ROOT_CA_CONFIG_MAP: &str = "kube-root-ca.crt";

/// ConfigMap mapper that keeps the virtual root CA bundle away from the
/// host's own `kube-root-ca.crt`.
///
/// In multi-namespace mode names are not rewritten, so the virtual bundle
/// would land on top of the one the host control plane maintains.
pub struct ConfigMapMapper {
    inner: NameMapper,
}

impl ConfigMapMapper {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self {
            inner: NameMapper::new::<ConfigMap>(translator),
        }
    }
}

impl Mapper for ConfigMapMapper {
    fn gvk(&self) -> &GroupVersionKind {
        self.inner.gvk()
    }

    fn virtual_to_host(&self, virtual_id: &NamespacedName) -> Result<NamespacedName> {
        let translator = self.inner.translator();
        if virtual_id.name == ROOT_CA_CONFIG_MAP
            && matches!(translator.mode(), NamespaceMode::MultiNamespace)
        {
            let namespace = translator.host_namespace(&virtual_id.namespace)?;
            let name = safe_concat_name(&["vcluster", ROOT_CA_CONFIG_MAP, "x", translator.name()]);
            return Ok(NamespacedName::new(namespace, name));
        }

        self.inner.virtual_to_host(virtual_id)
    }

    fn host_to_virtual(&self, host_meta: &ObjectMeta) -> Option<NamespacedName> {
        self.inner.host_to_virtual(host_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ca_is_renamed_in_multi_namespace_mode() {
        let mapper = ConfigMapMapper::new(Arc::new(Translator::multi_namespace("suffix").unwrap()));

        let root_ca = mapper
            .virtual_to_host(&NamespacedName::new("default", ROOT_CA_CONFIG_MAP))
            .unwrap();
        assert_eq!(root_ca.name, "vcluster-kube-root-ca.crt-x-suffix");

        let other = mapper
            .virtual_to_host(&NamespacedName::new("default", "settings"))
            .unwrap();
        assert_eq!(other.name, "settings");
        assert_eq!(other.namespace, root_ca.namespace);
    }

    #[test]
    fn root_ca_uses_regular_names_in_single_namespace_mode() {
        let mapper = ConfigMapMapper::new(Arc::new(
            Translator::single_namespace("suffix", "test").unwrap(),
        ));

        let root_ca = mapper
            .virtual_to_host(&NamespacedName::new("default", ROOT_CA_CONFIG_MAP))
            .unwrap();
        assert_eq!(root_ca.name, "kube-root-ca.crt-x-default-x-suffix");
    }
}
