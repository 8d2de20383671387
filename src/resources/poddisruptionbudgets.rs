//! PodDisruptionBudget synchronizer
//!
//! The whole spec is virtual-authoritative. The selector is rewritten on every
//! pass so it can only match pods synced from the same virtual namespace;
//! status is host-authoritative and mirrored back to the virtual object.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use kube::ResourceExt;

use crate::mappings::{Mapper, NameMapper};
use crate::syncer::{new_host_object, updated_host_object, SyncContext, Synchronizer};
use crate::translate::Translator;
use crate::Result;

pub struct PodDisruptionBudgetSyncer {
    mapper: Arc<dyn Mapper>,
}

impl PodDisruptionBudgetSyncer {
    pub fn new(translator: Arc<Translator>) -> Self {
        Self {
            mapper: Arc::new(NameMapper::new::<PodDisruptionBudget>(translator)),
        }
    }
}

#[async_trait]
impl Synchronizer for PodDisruptionBudgetSyncer {
    type Object = PodDisruptionBudget;

    fn resource(&self) -> &'static str {
        "poddisruptionbudgets"
    }

    fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    fn translate_to_host(
        &self,
        ctx: &SyncContext<PodDisruptionBudget>,
        virtual_obj: &PodDisruptionBudget,
    ) -> Result<Option<PodDisruptionBudget>> {
        let mut host_obj = new_host_object(self, ctx, virtual_obj)?;
        host_obj.spec = host_spec(&ctx.translator, virtual_obj);
        host_obj.status = None;
        Ok(Some(host_obj))
    }

    fn translate_update(
        &self,
        ctx: &SyncContext<PodDisruptionBudget>,
        host_obj: &PodDisruptionBudget,
        virtual_obj: &PodDisruptionBudget,
    ) -> Result<PodDisruptionBudget> {
        let mut updated = updated_host_object(self, ctx, host_obj, virtual_obj);
        updated.spec = host_spec(&ctx.translator, virtual_obj);
        Ok(updated)
    }

    fn translate_back(
        &self,
        host_obj: &PodDisruptionBudget,
        virtual_obj: &PodDisruptionBudget,
    ) -> Option<PodDisruptionBudget> {
        let mut status = host_obj.status.clone()?;
        status.observed_generation = observed_generation(host_obj, virtual_obj);
        if Some(&status) == virtual_obj.status.as_ref() {
            return None;
        }

        let mut mirrored = virtual_obj.clone();
        mirrored.status = Some(status);
        Some(mirrored)
    }
}

/// `observedGeneration` for the mirrored status, in terms of the virtual
/// object's generation. Once the host has observed its own latest spec it has
/// observed the virtual one too; until then the virtual value stands.
fn observed_generation(host_obj: &PodDisruptionBudget, virtual_obj: &PodDisruptionBudget) -> Option<i64> {
    let host_observed = host_obj
        .status
        .as_ref()
        .and_then(|status| status.observed_generation)
        .unwrap_or_default();
    let host_generation = host_obj.metadata.generation.unwrap_or_default();

    if host_observed >= host_generation {
        virtual_obj.metadata.generation
    } else {
        virtual_obj
            .status
            .as_ref()
            .and_then(|status| status.observed_generation)
    }
}

fn host_spec(translator: &Translator, virtual_obj: &PodDisruptionBudget) -> Option<PodDisruptionBudgetSpec> {
    let virtual_namespace = virtual_obj.namespace().unwrap_or_default();
    virtual_obj
        .spec
        .as_ref()
        .map(|spec| PodDisruptionBudgetSpec {
            selector: translator.host_label_selector(spec.selector.as_ref(), &virtual_namespace),
            ..spec.clone()
        })
}
