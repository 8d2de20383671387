//! ServiceAccount synchronizer
//!
//! Only metadata is synced. Host service accounts never mount API
//! credentials and never reference host secrets, whatever the virtual object
//! asks for: tenant workloads authenticate against the virtual control plane.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;

use crate::mappings::{Mapper, NameMapper};
use crate::syncer::{new_host_object, updated_host_object, SyncContext, Synchronizer};
use crate::translate::Translator;
use crate::Result;

pub struct ServiceAccountSyncer {
    mapper: Arc<dyn Mapper>,
}

impl ServiceAccountSyncer {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self {
            mapper: Arc::new(NameMapper::new::<ServiceAccount>(translator)),
        }
    }
}

#[async_trait]
impl Synchronizer for ServiceAccountSyncer {
    type Object = ServiceAccount;

    fn resource(&self) -> &'static str {
        "serviceaccounts"
    }

    fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    fn translate_to_host(
        &self,
        ctx: &SyncContext<ServiceAccount>,
        virtual_obj: &ServiceAccount,
    ) -> Result<Option<ServiceAccount>> {
        let mut host_obj = new_host_object(self, ctx, virtual_obj)?;
        apply_host_overrides(&mut host_obj);
        Ok(Some(host_obj))
    }

    fn translate_update(
        &self,
        ctx: &SyncContext<ServiceAccount>,
        host_obj: &ServiceAccount,
        virtual_obj: &ServiceAccount,
    ) -> Result<ServiceAccount> {
        let mut updated = updated_host_object(self, ctx, host_obj, virtual_obj);
        apply_host_overrides(&mut updated);
        Ok(updated)
    }
}

fn apply_host_overrides(service_account: &mut ServiceAccount) {
    service_account.automount_service_account_token = Some(false);
    service_account.secrets = None;
    service_account.image_pull_secrets = None;
}
