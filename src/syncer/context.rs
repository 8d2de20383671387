use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::{ObjectStore, SyncObject};
use crate::translate::Translator;

static PASS_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle for one reconciliation pass: both cluster clients, the translator
/// and a pass id for correlating log lines
pub struct SyncContext<K: SyncObject> {
    pub virtual_client: Arc<dyn ObjectStore<K>>,
    pub host_client: Arc<dyn ObjectStore<K>>,
    pub translator: Arc<Translator>,
    pub pass_id: u64,
}

impl<K: SyncObject> SyncContext<K> {
    /// Context for a new pass with a fresh pass id
    pub fn new(
        virtual_client: Arc<dyn ObjectStore<K>>,
        host_client: Arc<dyn ObjectStore<K>>,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            virtual_client,
            host_client,
            translator,
            pass_id: PASS_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl<K: SyncObject> Clone for SyncContext<K> {
    fn clone(&self) -> Self {
        Self {
            virtual_client: self.virtual_client.clone(),
            host_client: self.host_client.clone(),
            translator: self.translator.clone(),
            pass_id: self.pass_id,
        }
    }
}
