//! Per-owner mutual exclusion and the refresh runner built on it

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::Result;
use super::events::EventSink;
use super::model::ImportSnapshot;
use super::result::{RefreshReport, RefreshResult};
use super::worker::{RefreshOptions, RefreshWorker};
use crate::store::PoolStore;

/// One async lock per owner id. Refreshes of the same owner queue up;
/// different owners never wait on each other.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    acquired: AtomicU64,
    waited: AtomicU64,
}

impl OwnerLocks {
    pub fn new() -> Self {
        OwnerLocks::default()
    }

    fn lock_for(&self, owner_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(owner_id.to_string()).or_default().clone()
    }

    /// Wait for the owner's lock. Released when the guard drops.
    pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(owner_id);

        let guard = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.waited.fetch_add(1, Ordering::Relaxed);
                debug!("Owner lock: waiting for running refresh of '{}'", owner_id);
                lock.lock_owned().await
            }
        };

        self.acquired.fetch_add(1, Ordering::Relaxed);
        guard
    }

    /// Take the owner's lock only if nobody holds it
    pub fn try_acquire(&self, owner_id: &str) -> Option<OwnedMutexGuard<()>> {
        let guard = self.lock_for(owner_id).try_lock_owned().ok()?;
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Some(guard)
    }

    pub fn is_locked(&self, owner_id: &str) -> bool {
        self.lock_for(owner_id).try_lock().is_err()
    }

    /// (acquired, waited) counts
    pub fn stats(&self) -> (u64, u64) {
        (
            self.acquired.load(Ordering::Relaxed),
            self.waited.load(Ordering::Relaxed),
        )
    }
}

/// Runs refreshes with a fresh worker per call, serialized per owner
#[derive(Clone)]
pub struct RefreshScheduler {
    store: Arc<dyn PoolStore>,
    events: Arc<dyn EventSink>,
    locks: Arc<OwnerLocks>,
    options: RefreshOptions,
}

impl RefreshScheduler {
    pub fn new(store: Arc<dyn PoolStore>, events: Arc<dyn EventSink>) -> Self {
        RefreshScheduler {
            store,
            events,
            locks: Arc::new(OwnerLocks::new()),
            options: RefreshOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RefreshOptions) -> Self {
        self.options = options;
        self
    }

    pub fn locks(&self) -> &Arc<OwnerLocks> {
        &self.locks
    }

    /// Refresh one owner from an upstream snapshot. The owner's lock is held
    /// for the whole refresh and released on success and failure alike.
    pub async fn run(&self, owner_id: &str, snapshot: ImportSnapshot) -> Result<RefreshReport> {
        let _guard = self.locks.acquire(owner_id).await;

        let mut worker = RefreshWorker::with_options(self.options.clone());
        worker.add_snapshot(snapshot)?;
        worker
            .run(self.store.clone(), self.events.clone(), owner_id)
            .await
    }

    /// `run`, keeping only the per-entity result
    pub async fn refresh(&self, owner_id: &str, snapshot: ImportSnapshot) -> Result<RefreshResult> {
        Ok(self.run(owner_id, snapshot).await?.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::events::RecordingEventSink;
    use crate::refresh::fixtures::{product_info, subscription};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn snapshot(ids: &[&str]) -> ImportSnapshot {
        ImportSnapshot {
            subscriptions: ids
                .iter()
                .map(|id| subscription(id, product_info("prod-a", &[])))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_same_owner_is_exclusive() {
        let locks = OwnerLocks::new();
        let guard = locks.acquire("org1").await;

        assert!(locks.is_locked("org1"));
        assert!(locks.try_acquire("org1").is_none());
        assert!(locks.try_acquire("org2").is_some());

        drop(guard);
        assert!(!locks.is_locked("org1"));
    }

    #[tokio::test]
    async fn test_waiter_runs_after_release() {
        let locks = Arc::new(OwnerLocks::new());
        let guard = locks.acquire("org1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("org1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.stats(), (2, 1));
    }

    #[tokio::test]
    async fn test_scheduler_refreshes_owners_independently() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler = RefreshScheduler::new(store.clone(), sink.clone());

        let (a, b) = tokio::join!(
            scheduler.refresh("org1", snapshot(&["pool-1", "pool-2"])),
            scheduler.refresh("org2", snapshot(&["pool-1"])),
        );

        assert_eq!(a.unwrap().pools_created(), 2);
        assert_eq!(b.unwrap().pools_created(), 1);
        assert_eq!(store.pools("org1").unwrap().len(), 2);
        assert_eq!(store.pools("org2").unwrap().len(), 1);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_lock_is_released_after_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let scheduler = RefreshScheduler::new(store.clone(), Arc::new(RecordingEventSink::new()));

        assert!(scheduler.refresh("org1", snapshot(&["pool-1"])).await.is_err());
        assert!(!scheduler.locks().is_locked("org1"));

        store.set_fail_writes(false);
        let result = scheduler.refresh("org1", snapshot(&["pool-1"])).await.unwrap();
        assert_eq!(result.pools_created(), 1);
    }

    #[tokio::test]
    async fn test_run_reports_applied_batch_under_lock() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler = RefreshScheduler::new(store.clone(), sink.clone());

        let first = scheduler.run("org1", snapshot(&["pool-1"])).await.unwrap();
        assert_eq!(first.operations.creations().len(), 1);
        assert_eq!(first.summary.created, 1);
        assert_eq!(first.summary.dependencies_saved, 1);
        assert_eq!(sink.take().len(), 1);

        let second = scheduler.run("org1", snapshot(&["pool-1"])).await.unwrap();
        assert!(second.operations.is_empty());
        assert!(sink.is_empty());
        assert_eq!(scheduler.locks().stats(), (2, 0));
        assert!(!scheduler.locks().is_locked("org1"));
    }
}
