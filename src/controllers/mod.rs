//! Controllers driving the sync engine from watch events on both clusters

pub mod events;
pub mod sync_controller;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kube::Client;
use tracing::info;

use crate::config::SyncerConfig;
use crate::metrics;
use crate::translate::Translator;

/// Shared context for every kind's controllers
pub struct Context {
    /// Client for the virtual control plane
    pub virtual_client: Client,
    /// Client for the host cluster
    pub host_client: Client,
    pub translator: Arc<Translator>,
    pub config: Arc<SyncerConfig>,
    /// Kinds whose startup sweep has not finished yet
    pending_sweeps: AtomicUsize,
}

impl Context {
    pub fn new(
        virtual_client: Client,
        host_client: Client,
        translator: Translator,
        config: SyncerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            virtual_client,
            host_client,
            translator: Arc::new(translator),
            config: Arc::new(config),
            pending_sweeps: AtomicUsize::new(0),
        })
    }

    /// Announce a kind whose startup sweep gates readiness
    pub fn register_kind(&self) {
        self.pending_sweeps.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a finished startup sweep; the last one marks the syncer ready
    pub fn sweep_done(&self) {
        if self.pending_sweeps.fetch_sub(1, Ordering::SeqCst) == 1 {
            info!("Startup sweeps finished, syncer is ready");
            metrics::set_ready(true);
        }
    }
}
