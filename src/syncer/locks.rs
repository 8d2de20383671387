use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::mappings::NamespacedName;

/// Per-identity mutual exclusion.
///
/// A virtual identity is reconciled by at most one pass at a time, no matter
/// which cluster's event triggered the pass. Distinct identities never block
/// each other. Entries are dropped once nobody holds or waits on them.
#[derive(Clone, Default)]
pub struct IdentityLocks {
    inner: Arc<Mutex<HashMap<NamespacedName, Weak<AsyncMutex<()>>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pass holds `identity`, then hold it until the
    /// guard is dropped
    pub async fn lock(&self, identity: &NamespacedName) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);

            match locks.get(identity).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(identity.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };

        mutex.lock_owned().await
    }

    /// Number of identities currently held or waited on
    pub fn active(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_identity_is_serialized() {
        let locks = IdentityLocks::new();
        let id = NamespacedName::new("default", "web");

        let guard = locks.lock(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn distinct_identities_do_not_block() {
        let locks = IdentityLocks::new();
        let _a = locks.lock(&NamespacedName::new("default", "a")).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&NamespacedName::new("default", "b")),
        )
        .await
        .expect("distinct identity should not wait");
        assert_eq!(locks.active(), 2);
    }
}
