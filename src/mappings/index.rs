use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{Mapper, NamespacedName};

/// Reverse index over existing host objects: which host objects claim which
/// virtual identity.
///
/// Built from a host listing; lets a sweep spot several host objects claiming
/// the same virtual object without any state outside the host objects.
#[derive(Clone, Debug, Default)]
pub struct ReverseIndex {
    by_host: BTreeMap<NamespacedName, NamespacedName>,
    by_virtual: BTreeMap<NamespacedName, Vec<NamespacedName>>,
}

impl ReverseIndex {
    /// Index every host object that resolves through `mapper`
    pub fn build<'a, I>(mapper: &dyn Mapper, host_objects: I) -> Self
    where
        I: IntoIterator<Item = &'a ObjectMeta>,
    {
        let mut index = Self::default();
        for meta in host_objects {
            if let Some(virtual_id) = mapper.host_to_virtual(meta) {
                index.insert(NamespacedName::from_meta(meta), virtual_id);
            }
        }
        index
    }

    pub fn insert(&mut self, host_id: NamespacedName, virtual_id: NamespacedName) {
        if let Some(previous) = self.by_host.insert(host_id.clone(), virtual_id.clone()) {
            self.detach(&host_id, &previous);
        }
        self.by_virtual.entry(virtual_id).or_default().push(host_id);
    }

    pub fn remove_host(&mut self, host_id: &NamespacedName) -> Option<NamespacedName> {
        let virtual_id = self.by_host.remove(host_id)?;
        self.detach(host_id, &virtual_id);
        Some(virtual_id)
    }

    /// Virtual identity claimed by a host object
    pub fn virtual_for(&self, host_id: &NamespacedName) -> Option<&NamespacedName> {
        self.by_host.get(host_id)
    }

    /// Host objects claiming a virtual identity
    pub fn hosts_for(&self, virtual_id: &NamespacedName) -> &[NamespacedName] {
        self.by_virtual
            .get(virtual_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Virtual identities claimed by more than one host object
    pub fn duplicates(&self) -> impl Iterator<Item = (&NamespacedName, &[NamespacedName])> {
        self.by_virtual
            .iter()
            .filter(|(_, hosts)| hosts.len() > 1)
            .map(|(virtual_id, hosts)| (virtual_id, hosts.as_slice()))
    }

    /// Number of indexed host objects
    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }

    fn detach(&mut self, host_id: &NamespacedName, virtual_id: &NamespacedName) {
        if let Some(hosts) = self.by_virtual.get_mut(virtual_id) {
            hosts.retain(|h| h != host_id);
            if hosts.is_empty() {
                self.by_virtual.remove(virtual_id);
            }
        }
    }
}
