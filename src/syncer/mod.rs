//! Per-kind synchronizer contract
//!
//! A [`Synchronizer`] decides what happens to one virtual/host pair:
//!
//! | virtual | host    | operation                          |
//! |---------|---------|------------------------------------|
//! | absent  | absent  | nothing                            |
//! | present | absent  | [`Synchronizer::sync_to_host`]     |
//! | absent  | present | [`Synchronizer::sync_to_virtual`]  |
//! | present | present | [`Synchronizer::sync`]             |
//!
//! Kinds only describe how a host object is built from a virtual one
//! ([`Synchronizer::translate_to_host`]) and how an existing host object is
//! brought back in line ([`Synchronizer::translate_update`]); the create,
//! update and delete plumbing comes from the provided methods.

mod context;
mod locks;

use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use tracing::{debug, info};

use crate::mappings::{Mapper, NamespacedName};
use crate::store::SyncObject;
use crate::translate::gvk_string;
use crate::{Error, Result};

pub use context::SyncContext;
pub use locks::IdentityLocks;

/// Outcome of a sync operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncResult {
    /// Both sides already agree
    Unchanged,
    /// A host object was created
    Created,
    /// The host object (or host-authoritative fields on the virtual object) was updated
    Updated,
    /// The host object was deleted
    Deleted,
    /// The object is not eligible for syncing, or not ours to touch
    Skipped,
}

impl SyncResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncResult::Unchanged => "unchanged",
            SyncResult::Created => "created",
            SyncResult::Updated => "updated",
            SyncResult::Deleted => "deleted",
            SyncResult::Skipped => "skipped",
        }
    }
}

/// Reconciliation logic for one resource kind
#[async_trait]
pub trait Synchronizer: Send + Sync + 'static {
    type Object: SyncObject;

    /// Plural resource name, used in logs and metric labels
    fn resource(&self) -> &'static str;

    /// Identity resolution for this kind
    fn mapper(&self) -> &Arc<dyn Mapper>;

    /// Build the host object for a virtual object that has no host
    /// counterpart yet. `None` means the object must not be synced.
    fn translate_to_host(
        &self,
        ctx: &SyncContext<Self::Object>,
        virtual_obj: &Self::Object,
    ) -> Result<Option<Self::Object>>;

    /// Recompute the host object from the current virtual object. Starts from
    /// `host_obj` so fields the kind does not sync stay as the host has them.
    fn translate_update(
        &self,
        ctx: &SyncContext<Self::Object>,
        host_obj: &Self::Object,
        virtual_obj: &Self::Object,
    ) -> Result<Self::Object>;

    /// Virtual object with host-authoritative fields mirrored back, for kinds
    /// that have any
    fn translate_back(
        &self,
        _host_obj: &Self::Object,
        _virtual_obj: &Self::Object,
    ) -> Option<Self::Object> {
        None
    }

    /// Whether the host object has to be replaced instead of updated, e.g.
    /// because a differing field is immutable
    fn requires_recreate(&self, _host_obj: &Self::Object, _virtual_obj: &Self::Object) -> bool {
        false
    }

    /// Virtual object present, host counterpart absent: create it
    async fn sync_to_host(
        &self,
        ctx: &SyncContext<Self::Object>,
        virtual_obj: &Self::Object,
    ) -> Result<SyncResult> {
        create_host(self, ctx, virtual_obj).await
    }

    /// Host object present, virtual counterpart absent: garbage-collect it if
    /// it is ours, leave it alone otherwise
    async fn sync_to_virtual(
        &self,
        ctx: &SyncContext<Self::Object>,
        host_obj: &Self::Object,
    ) -> Result<SyncResult> {
        delete_orphan(self, ctx, host_obj).await
    }

    /// Both present: push virtual-authoritative fields to the host and pull
    /// host-authoritative fields back
    async fn sync(
        &self,
        ctx: &SyncContext<Self::Object>,
        host_obj: &Self::Object,
        virtual_obj: &Self::Object,
    ) -> Result<SyncResult> {
        update_pair(self, ctx, host_obj, virtual_obj).await
    }
}

/// Clone of `virtual_obj` carrying the translated identity and ownership
/// record. Kinds strip or rewrite fields on top of it.
pub fn new_host_object<S: Synchronizer + ?Sized>(
    syncer: &S,
    ctx: &SyncContext<S::Object>,
    virtual_obj: &S::Object,
) -> Result<S::Object> {
    let virtual_id = NamespacedName::from_meta(virtual_obj.meta());
    let host_id = syncer.mapper().virtual_to_host(&virtual_id)?;

    let mut host_obj = virtual_obj.clone();
    *host_obj.meta_mut() = ctx.translator.host_metadata(
        virtual_obj.meta(),
        syncer.mapper().gvk(),
        &host_id.name,
        &host_id.namespace,
    );
    Ok(host_obj)
}

/// Clone of `host_obj` with its ownership record and pass-through metadata
/// recomputed from `virtual_obj`
pub fn updated_host_object<S: Synchronizer + ?Sized>(
    syncer: &S,
    ctx: &SyncContext<S::Object>,
    host_obj: &S::Object,
    virtual_obj: &S::Object,
) -> S::Object {
    let mut updated = host_obj.clone();
    ctx.translator.apply_ownership_metadata(
        updated.meta_mut(),
        virtual_obj.meta(),
        syncer.mapper().gvk(),
    );
    updated
}

async fn create_host<S: Synchronizer + ?Sized>(
    syncer: &S,
    ctx: &SyncContext<S::Object>,
    virtual_obj: &S::Object,
) -> Result<SyncResult> {
    let virtual_id = NamespacedName::from_meta(virtual_obj.meta());
    let Some(host_obj) = syncer.translate_to_host(ctx, virtual_obj)? else {
        debug!(
            resource = syncer.resource(),
            object = %virtual_id,
            "Object is not eligible for syncing"
        );
        return Ok(SyncResult::Skipped);
    };

    let host_id = NamespacedName::from_meta(host_obj.meta());
    if ctx.translator.owns_host_namespaces() {
        let labels = ctx.translator.host_namespace_labels(&virtual_id.namespace);
        ctx.host_client
            .ensure_namespace(&host_id.namespace, &labels)
            .await?;
    }

    match ctx.host_client.create(&host_obj).await {
        Ok(_) => {
            info!(
                resource = syncer.resource(),
                pass = ctx.pass_id,
                object = %virtual_id,
                host = %host_id,
                "Created host object"
            );
            Ok(SyncResult::Created)
        }
        Err(Error::AlreadyExists(message)) => {
            // Somebody got there first. If it is ours, the retry takes the
            // update path; if it is not, refuse to adopt it.
            match ctx.host_client.get(&host_id.namespace, &host_id.name).await? {
                Some(existing) if !ctx.translator.is_managed_by(existing.meta()) => {
                    Err(collision(syncer, &host_id, "object exists and is not managed by this virtual cluster"))
                }
                _ => Err(Error::AlreadyExists(message)),
            }
        }
        Err(e) => Err(e),
    }
}

async fn delete_orphan<S: Synchronizer + ?Sized>(
    syncer: &S,
    ctx: &SyncContext<S::Object>,
    host_obj: &S::Object,
) -> Result<SyncResult> {
    let host_id = NamespacedName::from_meta(host_obj.meta());
    if !ctx.translator.is_managed_by(host_obj.meta()) {
        debug!(
            resource = syncer.resource(),
            host = %host_id,
            "Ignoring host object not managed by this virtual cluster"
        );
        return Ok(SyncResult::Skipped);
    }

    ctx.host_client
        .delete(&host_id.namespace, &host_id.name)
        .await?;
    info!(
        resource = syncer.resource(),
        pass = ctx.pass_id,
        host = %host_id,
        "Deleted host object without virtual counterpart"
    );
    Ok(SyncResult::Deleted)
}

async fn update_pair<S: Synchronizer + ?Sized>(
    syncer: &S,
    ctx: &SyncContext<S::Object>,
    host_obj: &S::Object,
    virtual_obj: &S::Object,
) -> Result<SyncResult> {
    let virtual_id = NamespacedName::from_meta(virtual_obj.meta());
    let host_id = NamespacedName::from_meta(host_obj.meta());

    if !ctx.translator.is_managed_by(host_obj.meta()) {
        return Err(collision(
            syncer,
            &host_id,
            "object exists and is not managed by this virtual cluster",
        ));
    }
    match syncer.mapper().host_to_virtual(host_obj.meta()) {
        Some(owner) if owner == virtual_id => {}
        Some(owner) => {
            return Err(collision(
                syncer,
                &host_id,
                &format!("object belongs to virtual object {}", owner),
            ))
        }
        None => {
            return Err(collision(
                syncer,
                &host_id,
                "object carries no ownership record for this kind",
            ))
        }
    }

    if syncer.requires_recreate(host_obj, virtual_obj) {
        ctx.host_client
            .delete(&host_id.namespace, &host_id.name)
            .await?;
        info!(
            resource = syncer.resource(),
            pass = ctx.pass_id,
            object = %virtual_id,
            host = %host_id,
            "Deleted host object for recreation"
        );
        return Ok(SyncResult::Deleted);
    }

    let mut result = SyncResult::Unchanged;

    let desired = syncer.translate_update(ctx, host_obj, virtual_obj)?;
    if desired != *host_obj {
        ctx.host_client.update(&desired).await?;
        info!(
            resource = syncer.resource(),
            pass = ctx.pass_id,
            object = %virtual_id,
            host = %host_id,
            "Updated host object"
        );
        result = SyncResult::Updated;
    }

    if let Some(mirrored) = syncer.translate_back(host_obj, virtual_obj) {
        if mirrored != *virtual_obj {
            ctx.virtual_client.update_status(&mirrored).await?;
            debug!(
                resource = syncer.resource(),
                pass = ctx.pass_id,
                object = %virtual_id,
                "Mirrored host status to virtual object"
            );
            result = SyncResult::Updated;
        }
    }

    Ok(result)
}

fn collision<S: Synchronizer + ?Sized>(syncer: &S, host_id: &NamespacedName, reason: &str) -> Error {
    Error::IdentityCollision {
        kind: gvk_string(syncer.mapper().gvk()),
        host: host_id.to_string(),
        reason: reason.to_string(),
    }
}
