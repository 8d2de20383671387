//! ConfigMap synchronizer

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

use crate::mappings::{ConfigMapMapper, Mapper};
use crate::syncer::{new_host_object, updated_host_object, SyncContext, Synchronizer};
use crate::translate::Translator;
use crate::Result;

pub struct ConfigMapSyncer {
    mapper: Arc<dyn Mapper>,
}

impl ConfigMapSyncer {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self {
            mapper: Arc::new(ConfigMapMapper::new(translator)),
        }
    }
}

#[async_trait]
impl Synchronizer for ConfigMapSyncer {
    type Object = ConfigMap;

    fn resource(&self) -> &'static str {
        "configmaps"
    }

    fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    fn translate_to_host(
        &self,
        ctx: &SyncContext<ConfigMap>,
        virtual_obj: &ConfigMap,
    ) -> Result<Option<ConfigMap>> {
        new_host_object(self, ctx, virtual_obj).map(Some)
    }

    fn translate_update(
        &self,
        ctx: &SyncContext<ConfigMap>,
        host_obj: &ConfigMap,
        virtual_obj: &ConfigMap,
    ) -> Result<ConfigMap> {
        let mut updated = updated_host_object(self, ctx, host_obj, virtual_obj);
        updated.data = virtual_obj.data.clone();
        updated.binary_data = virtual_obj.binary_data.clone();
        updated.immutable = virtual_obj.immutable;
        Ok(updated)
    }

    fn requires_recreate(&self, host_obj: &ConfigMap, virtual_obj: &ConfigMap) -> bool {
        host_obj.immutable == Some(true)
            && (host_obj.data != virtual_obj.data || host_obj.binary_data != virtual_obj.binary_data)
    }
}
