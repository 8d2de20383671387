//! Sync controllers for one resource kind
//!
//! Two controllers share one [`Reconciler`]:
//! - the virtual side reconciles virtual objects and is also triggered by
//!   changes to the managed host objects they map to;
//! - the host side reconciles managed host objects and is also triggered by
//!   virtual objects, so a virtual deletion reaches the host copy even though
//!   the virtual object is gone by the time the event is handled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::events::{self, WarningLedger};
use crate::controllers::Context;
use crate::mappings::NamespacedName;
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};
use crate::reconcilers::Reconciler;
use crate::retry::RetryConfig;
use crate::store::{KubeStore, ObjectStore};
use crate::syncer::{SyncResult, Synchronizer};
use crate::Error;

/// First requeue delay after a transient failure
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Cap for transient-failure backoff, and the requeue delay for failures
/// that need someone to change the objects involved
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Age after which a backoff or warning entry that was not refreshed is
/// dropped. Failing objects requeue within [`MAX_BACKOFF`], so only entries of
/// objects that are gone get this old.
pub const STALE_ENTRY_AGE: Duration = Duration::from_secs(600);

/// Per-identity exponential backoff, reset by a successful pass
#[derive(Default)]
pub struct Backoffs {
    delays: Mutex<HashMap<String, (Duration, Instant)>>,
}

impl Backoffs {
    /// Delay before the next attempt for `key`
    pub fn next(&self, key: &str) -> Duration {
        self.next_at(key, Instant::now())
    }

    fn next_at(&self, key: &str, now: Instant) -> Duration {
        let mut delays = self.delays.lock().unwrap_or_else(PoisonError::into_inner);
        delays.retain(|_, (_, updated)| now.saturating_duration_since(*updated) < STALE_ENTRY_AGE);

        let delay = delays
            .get(key)
            .map(|(previous, _)| (*previous * 2).min(MAX_BACKOFF))
            .unwrap_or(INITIAL_BACKOFF);
        delays.insert(key.to_string(), (delay, now));
        delay
    }

    pub fn reset(&self, key: &str) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.delays.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Controller context for one kind
pub struct KindContext<S: Synchronizer> {
    pub reconciler: Arc<Reconciler<S>>,
    /// Used to publish events on virtual objects
    pub virtual_client: Client,
    pub backoffs: Backoffs,
    pub warnings: WarningLedger,
    pub resync_interval: Duration,
}

impl<S: Synchronizer> KindContext<S> {
    /// Drop the failure bookkeeping of one side of an identity
    fn settle(&self, side: &str, id: &NamespacedName) {
        let key = backoff_key(side, id);
        self.backoffs.reset(&key);
        self.warnings.clear(&key);
    }
}

/// Run the startup sweep and both controllers for the kind `syncer` handles
pub async fn run<S: Synchronizer>(ctx: Arc<Context>, syncer: S) {
    let translator = ctx.translator.clone();
    let virtual_store: Arc<dyn ObjectStore<S::Object>> =
        Arc::new(KubeStore::new(ctx.virtual_client.clone()));
    let host_store: Arc<dyn ObjectStore<S::Object>> =
        Arc::new(KubeStore::new(ctx.host_client.clone()));

    let reconciler = Arc::new(
        Reconciler::new(syncer, virtual_store, host_store, translator.clone())
            .with_retry(RetryConfig::with_max_attempts(ctx.config.max_conflict_retries)),
    );
    let resource = reconciler.resource();

    info!(resource, "Running startup sweep");
    if let Err(e) = reconciler.sweep().await {
        warn!(resource, error = %e, "Startup sweep failed");
    }
    ctx.sweep_done();

    let virtual_api: Api<S::Object> = Api::all(ctx.virtual_client.clone());
    let host_api: Api<S::Object> = match translator.host_namespace_scope() {
        Some(namespace) => Api::namespaced(ctx.host_client.clone(), namespace),
        None => Api::all(ctx.host_client.clone()),
    };
    let managed = watcher::Config::default().labels(&translator.marker_selector());

    let kind_ctx = Arc::new(KindContext {
        reconciler: reconciler.clone(),
        virtual_client: ctx.virtual_client.clone(),
        backoffs: Backoffs::default(),
        warnings: WarningLedger::new(STALE_ENTRY_AGE),
        resync_interval: ctx.config.resync_interval(),
    });

    info!(resource, "Starting sync controllers");

    let to_virtual = reconciler.syncer().mapper().clone();
    let virtual_side = Controller::new(virtual_api.clone(), watcher::Config::default().any_semantic())
        .watches(host_api.clone(), managed.clone(), move |host_obj: S::Object| {
            to_virtual
                .host_to_virtual(host_obj.meta())
                .map(|id| ObjectRef::new(&id.name).within(&id.namespace))
        })
        .shutdown_on_signal()
        .run(reconcile_virtual::<S>, virtual_error_policy::<S>, kind_ctx.clone())
        .for_each(move |res| {
            match res {
                Ok((object, _)) => debug!(resource, object = %object, "Reconciled virtual object"),
                Err(e) => debug!(resource, error = %e, "Virtual reconcile failed"),
            }
            futures::future::ready(())
        });

    let to_host = reconciler.syncer().mapper().clone();
    let host_side = Controller::new(host_api, managed)
        .watches(virtual_api, watcher::Config::default(), move |virtual_obj: S::Object| {
            to_host
                .virtual_to_host(&NamespacedName::from_meta(virtual_obj.meta()))
                .ok()
                .map(|id| ObjectRef::new(&id.name).within(&id.namespace))
        })
        .shutdown_on_signal()
        .run(reconcile_host::<S>, host_error_policy::<S>, kind_ctx)
        .for_each(move |res| {
            match res {
                Ok((object, _)) => debug!(resource, object = %object, "Reconciled host object"),
                Err(e) => debug!(resource, error = %e, "Host reconcile failed"),
            }
            futures::future::ready(())
        });

    tokio::join!(virtual_side, host_side);

    info!(resource, "Sync controllers stopped");
}

#[instrument(
    skip(object, ctx),
    fields(
        resource = ctx.reconciler.resource(),
        name = %object.name_any(),
        namespace = object.namespace().unwrap_or_default()
    )
)]
async fn reconcile_virtual<S: Synchronizer>(
    object: Arc<S::Object>,
    ctx: Arc<KindContext<S>>,
) -> Result<Action, Error> {
    let resource = ctx.reconciler.resource();
    let id = NamespacedName::from_meta(object.meta());
    let start = Instant::now();

    RECONCILIATIONS.with_label_values(&[resource, "virtual"]).inc();
    let result = ctx.reconciler.reconcile_virtual(&id).await;
    RECONCILE_DURATION
        .with_label_values(&[resource])
        .observe(start.elapsed().as_secs_f64());

    let result = result?;
    ctx.settle("virtual", &id);
    if result != SyncResult::Unchanged {
        info!(result = result.as_str(), "Synced {}", id);
    }

    Ok(Action::requeue(ctx.resync_interval))
}

#[instrument(
    skip(object, ctx),
    fields(
        resource = ctx.reconciler.resource(),
        name = %object.name_any(),
        namespace = object.namespace().unwrap_or_default()
    )
)]
async fn reconcile_host<S: Synchronizer>(
    object: Arc<S::Object>,
    ctx: Arc<KindContext<S>>,
) -> Result<Action, Error> {
    let resource = ctx.reconciler.resource();
    let host_id = NamespacedName::from_meta(object.meta());
    let start = Instant::now();

    RECONCILIATIONS.with_label_values(&[resource, "host"]).inc();
    let result = ctx.reconciler.reconcile_host(object.as_ref()).await;
    RECONCILE_DURATION
        .with_label_values(&[resource])
        .observe(start.elapsed().as_secs_f64());

    let result = result?;
    ctx.settle("host", &host_id);

    match result {
        SyncResult::Deleted => {
            // The virtual object is gone too, so its side will not reconcile again
            if let Some(owner) = ctx.reconciler.syncer().mapper().host_to_virtual(object.meta()) {
                ctx.settle("virtual", &owner);
            }
            Ok(Action::await_change())
        }
        _ => Ok(Action::requeue(ctx.resync_interval)),
    }
}

fn virtual_error_policy<S: Synchronizer>(
    object: Arc<S::Object>,
    err: &Error,
    ctx: Arc<KindContext<S>>,
) -> Action {
    let resource = ctx.reconciler.resource();
    let id = NamespacedName::from_meta(object.meta());
    RECONCILIATION_ERRORS
        .with_label_values(&[resource, err.reason()])
        .inc();

    if err.is_transient() {
        let delay = ctx.backoffs.next(&backoff_key("virtual", &id));
        warn!(resource, object = %id, error = %err, delay_secs = delay.as_secs(), "Sync failed, backing off");
        return Action::requeue(delay);
    }

    error!(resource, object = %id, error = %err, "Sync failed permanently until the objects change");
    let reason = err.reason();
    if ctx.warnings.should_publish(&backoff_key("virtual", &id), reason) {
        let client = ctx.virtual_client.clone();
        let message = err.to_string();
        tokio::spawn(async move {
            events::publish_warning(client, object.as_ref(), reason, &message).await;
        });
    } else {
        debug!(resource, object = %id, reason, "Warning already published");
    }

    Action::requeue(MAX_BACKOFF)
}

fn host_error_policy<S: Synchronizer>(
    object: Arc<S::Object>,
    err: &Error,
    ctx: Arc<KindContext<S>>,
) -> Action {
    let resource = ctx.reconciler.resource();
    let host_id = NamespacedName::from_meta(object.meta());
    RECONCILIATION_ERRORS
        .with_label_values(&[resource, err.reason()])
        .inc();

    if err.is_transient() {
        let delay = ctx.backoffs.next(&backoff_key("host", &host_id));
        warn!(resource, host = %host_id, error = %err, delay_secs = delay.as_secs(), "Host sync failed, backing off");
        Action::requeue(delay)
    } else {
        error!(resource, host = %host_id, error = %err, "Host sync failed");
        Action::requeue(MAX_BACKOFF)
    }
}

fn backoff_key(side: &str, id: &NamespacedName) -> String {
    format!("{}:{}", side, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_caps_and_resets() {
        let backoffs = Backoffs::default();
        assert_eq!(backoffs.next("virtual:ns/a"), Duration::from_secs(1));
        assert_eq!(backoffs.next("virtual:ns/a"), Duration::from_secs(2));
        assert_eq!(backoffs.next("virtual:ns/a"), Duration::from_secs(4));
        assert_eq!(backoffs.next("virtual:ns/b"), Duration::from_secs(1));

        for _ in 0..20 {
            backoffs.next("virtual:ns/a");
        }
        assert_eq!(backoffs.next("virtual:ns/a"), MAX_BACKOFF);

        backoffs.reset("virtual:ns/a");
        assert_eq!(backoffs.next("virtual:ns/a"), INITIAL_BACKOFF);
    }

    #[test]
    fn test_backoff_entries_of_vanished_objects_are_pruned() {
        let backoffs = Backoffs::default();
        let start = Instant::now();
        backoffs.next_at("virtual:ns/deleted", start);
        backoffs.next_at("virtual:ns/failing", start);

        // Still-failing objects are refreshed at least every MAX_BACKOFF
        let mut now = start;
        for _ in 0..3 {
            now += MAX_BACKOFF;
            backoffs.next_at("virtual:ns/failing", now);
        }

        assert_eq!(backoffs.len(), 1);
        assert_eq!(backoffs.next_at("virtual:ns/failing", now), Duration::from_secs(16));
        assert_eq!(backoffs.next_at("virtual:ns/deleted", now), INITIAL_BACKOFF);
    }

    #[test]
    fn test_backoff_key_separates_sides() {
        let id = NamespacedName::new("ns", "a");
        assert_ne!(backoff_key("virtual", &id), backoff_key("host", &id));
    }
}
