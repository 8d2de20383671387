//! Reconciliation passes for one resource kind
//!
//! A pass reads both sides of one identity fresh, picks the synchronizer
//! operation from which sides exist and applies it. Passes for the same
//! identity are serialized; passes that lose an optimistic-concurrency race
//! are recomputed from a fresh read.

use std::sync::Arc;

use kube::Resource;
use tracing::{debug, info, instrument, warn};

use crate::mappings::{NamespacedName, ReverseIndex};
use crate::metrics::prometheus::{MANAGED_OBJECTS, SYNC_ACTIONS};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::store::ObjectStore;
use crate::syncer::{IdentityLocks, SyncContext, SyncResult, Synchronizer};
use crate::translate::Translator;
use crate::{Error, Result};

/// Counts from one sweep over the managed host objects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Host objects left in place with a live virtual counterpart
    pub managed: usize,
    /// Orphans and stale duplicates that were deleted
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Virtual identities claimed by more than one host object
    pub duplicates: usize,
}

/// Drives a [`Synchronizer`] against the virtual and host object stores
pub struct Reconciler<S: Synchronizer> {
    syncer: Arc<S>,
    virtual_client: Arc<dyn ObjectStore<S::Object>>,
    host_client: Arc<dyn ObjectStore<S::Object>>,
    translator: Arc<Translator>,
    locks: IdentityLocks,
    retry: RetryConfig,
}

impl<S: Synchronizer> Reconciler<S> {
    pub fn new(
        syncer: S,
        virtual_client: Arc<dyn ObjectStore<S::Object>>,
        host_client: Arc<dyn ObjectStore<S::Object>>,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            syncer: Arc::new(syncer),
            virtual_client,
            host_client,
            translator,
            locks: IdentityLocks::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Override the conflict retry schedule
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn syncer(&self) -> &S {
        &self.syncer
    }

    pub fn translator(&self) -> &Arc<Translator> {
        &self.translator
    }

    pub fn resource(&self) -> &'static str {
        self.syncer.resource()
    }

    /// Fresh context for one pass
    pub fn context(&self) -> SyncContext<S::Object> {
        SyncContext::new(
            self.virtual_client.clone(),
            self.host_client.clone(),
            self.translator.clone(),
        )
    }

    /// Bring the host side of virtual object `id` in line with it
    pub async fn reconcile_virtual(&self, id: &NamespacedName) -> Result<SyncResult> {
        let _guard = self.locks.lock(id).await;
        self.reconcile_locked(id).await
    }

    /// Reconcile starting from a host object: resolve its owner and reconcile
    /// that, or delete the host object if it is a stale duplicate
    pub async fn reconcile_host(&self, host_obj: &S::Object) -> Result<SyncResult> {
        let host_id = NamespacedName::from_meta(host_obj.meta());
        if !self.translator.is_managed_by(host_obj.meta()) {
            return Ok(SyncResult::Skipped);
        }
        let Some(virtual_id) = self.syncer.mapper().host_to_virtual(host_obj.meta()) else {
            debug!(
                resource = self.resource(),
                host = %host_id,
                "Host object has no ownership record for this kind"
            );
            return Ok(SyncResult::Skipped);
        };

        let canonical = self.syncer.mapper().virtual_to_host(&virtual_id).ok();
        if canonical.as_ref() == Some(&host_id) {
            return self.reconcile_virtual(&virtual_id).await;
        }

        let _guard = self.locks.lock(&virtual_id).await;
        self.host_client
            .delete(&host_id.namespace, &host_id.name)
            .await?;
        info!(
            resource = self.resource(),
            object = %virtual_id,
            host = %host_id,
            "Deleted stale duplicate host object"
        );
        self.record(SyncResult::Deleted);
        Ok(SyncResult::Deleted)
    }

    /// Reconcile every host object carrying this virtual cluster's marker.
    /// Catches orphans whose virtual deletion was never observed.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let selector = self.translator.marker_selector();
        let hosts = self
            .host_client
            .list(self.translator.host_namespace_scope(), Some(&selector))
            .await?;

        let index = ReverseIndex::build(self.syncer.mapper().as_ref(), hosts.iter().map(|h| h.meta()));
        let mut report = SweepReport::default();

        for (virtual_id, claimants) in index.duplicates() {
            warn!(
                resource = self.resource(),
                object = %virtual_id,
                claimants = claimants.len(),
                "Virtual object claimed by several host objects"
            );
            report.duplicates += 1;
        }

        for host_obj in &hosts {
            match self.reconcile_host(host_obj).await {
                Ok(SyncResult::Deleted) => report.deleted += 1,
                Ok(SyncResult::Skipped) => report.skipped += 1,
                Ok(_) => report.managed += 1,
                Err(e) => {
                    warn!(
                        resource = self.resource(),
                        host = %NamespacedName::from_meta(host_obj.meta()),
                        error = %e,
                        "Sweep failed for host object"
                    );
                    report.failed += 1;
                }
            }
        }

        MANAGED_OBJECTS
            .with_label_values(&[self.resource()])
            .set(report.managed as f64);
        info!(
            resource = self.resource(),
            managed = report.managed,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            "Sweep finished"
        );

        Ok(report)
    }

    async fn reconcile_locked(&self, id: &NamespacedName) -> Result<SyncResult> {
        let result = retry_with_backoff(&self.retry, self.resource(), Error::is_conflict, move || {
            self.pass(id)
        })
        .await?;
        self.record(result);
        Ok(result)
    }

    #[instrument(
        skip(self),
        fields(resource = self.syncer.resource(), object = %id, pass = tracing::field::Empty)
    )]
    async fn pass(&self, id: &NamespacedName) -> Result<SyncResult> {
        let ctx = self.context();
        tracing::Span::current().record("pass", ctx.pass_id);

        let virtual_obj = ctx
            .virtual_client
            .get(&id.namespace, &id.name)
            .await?
            .filter(|v| v.meta().deletion_timestamp.is_none());
        let host_id = self.syncer.mapper().virtual_to_host(id)?;
        let host_obj = ctx.host_client.get(&host_id.namespace, &host_id.name).await?;

        match (virtual_obj, host_obj) {
            (None, None) => Ok(SyncResult::Unchanged),
            (Some(virtual_obj), None) => self.syncer.sync_to_host(&ctx, &virtual_obj).await,
            (None, Some(host_obj)) => {
                if self.syncer.mapper().host_to_virtual(host_obj.meta()).as_ref() != Some(id) {
                    debug!(host = %host_id, "Host object does not belong to this virtual object");
                    return Ok(SyncResult::Skipped);
                }
                self.syncer.sync_to_virtual(&ctx, &host_obj).await
            }
            (Some(virtual_obj), Some(host_obj)) => {
                match self.syncer.sync(&ctx, &host_obj, &virtual_obj).await? {
                    // Replaced rather than updated
                    SyncResult::Deleted => self.syncer.sync_to_host(&ctx, &virtual_obj).await,
                    result => Ok(result),
                }
            }
        }
    }

    fn record(&self, result: SyncResult) {
        SYNC_ACTIONS
            .with_label_values(&[self.resource(), result.as_str()])
            .inc();
    }
}
