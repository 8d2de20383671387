//! Secret synchronizer

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;

use crate::mappings::{Mapper, NameMapper};
use crate::syncer::{new_host_object, updated_host_object, SyncContext, Synchronizer};
use crate::translate::Translator;
use crate::Result;

/// Token secrets are minted by the virtual control plane and are meaningless
/// (and dangerous to populate) on the host
pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";

const DEFAULT_SECRET_TYPE: &str = "Opaque";

pub struct SecretSyncer {
    mapper: Arc<dyn Mapper>,
}

impl SecretSyncer {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self {
            mapper: Arc::new(NameMapper::new::<Secret>(translator)),
        }
    }
}

#[async_trait]
impl Synchronizer for SecretSyncer {
    type Object = Secret;

    fn resource(&self) -> &'static str {
        "secrets"
    }

    fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    fn translate_to_host(
        &self,
        ctx: &SyncContext<Secret>,
        virtual_obj: &Secret,
    ) -> Result<Option<Secret>> {
        if secret_type(virtual_obj) == SERVICE_ACCOUNT_TOKEN_TYPE {
            return Ok(None);
        }

        let mut host_obj = new_host_object(self, ctx, virtual_obj)?;
        host_obj.string_data = None;
        Ok(Some(host_obj))
    }

    fn translate_update(
        &self,
        ctx: &SyncContext<Secret>,
        host_obj: &Secret,
        virtual_obj: &Secret,
    ) -> Result<Secret> {
        let mut updated = updated_host_object(self, ctx, host_obj, virtual_obj);
        updated.data = virtual_obj.data.clone();
        updated.immutable = virtual_obj.immutable;
        Ok(updated)
    }

    fn requires_recreate(&self, host_obj: &Secret, virtual_obj: &Secret) -> bool {
        secret_type(host_obj) != secret_type(virtual_obj)
            || (host_obj.immutable == Some(true) && host_obj.data != virtual_obj.data)
    }
}

fn secret_type(secret: &Secret) -> &str {
    secret.type_.as_deref().unwrap_or(DEFAULT_SECRET_TYPE)
}
