use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{PoolStore, PoolTransaction, StoreError};
use crate::refresh::model::{Content, ExistingSnapshot, Pool, Product};
use crate::refresh::operations::PoolUpdate;

#[derive(Debug, Default)]
struct OwnerData {
    pools: BTreeMap<String, Pool>,
    products: BTreeMap<String, Product>,
    content: BTreeMap<String, Content>,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    transactions: AtomicUsize,
    writes: AtomicUsize,
    commits: AtomicUsize,
}

/// Snapshot of the calls a `MemoryStore` has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: usize,
    pub transactions: usize,
    pub writes: usize,
    pub commits: usize,
}

impl StoreStats {
    /// Calls that reached the write path
    pub fn write_calls(&self) -> usize {
        self.transactions + self.writes + self.commits
    }
}

/// In-process store. Writes are staged per transaction and only become
/// visible on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    owners: Arc<Mutex<HashMap<String, OwnerData>>>,
    counters: Arc<Counters>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Replace an owner's persisted entities
    pub fn load(&self, owner_id: &str, snapshot: ExistingSnapshot) -> Result<(), StoreError> {
        let mut owners = self.owners.lock()?;
        let data = owners.entry(owner_id.to_string()).or_default();
        data.pools = snapshot.pools.into_iter().map(|p| (p.id.clone(), p)).collect();
        data.products = snapshot.products.into_iter().map(|p| (p.id.clone(), p)).collect();
        data.content = snapshot.content.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(())
    }

    pub fn pools(&self, owner_id: &str) -> Result<Vec<Pool>, StoreError> {
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .map(|data| data.pools.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn pool(&self, owner_id: &str, pool_id: &str) -> Result<Option<Pool>, StoreError> {
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .and_then(|data| data.pools.get(pool_id))
            .cloned())
    }

    pub fn product(&self, owner_id: &str, product_id: &str) -> Result<Option<Product>, StoreError> {
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .and_then(|data| data.products.get(product_id))
            .cloned())
    }

    pub fn content_item(&self, owner_id: &str, content_id: &str) -> Result<Option<Content>, StoreError> {
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .and_then(|data| data.content.get(content_id))
            .cloned())
    }

    /// Make every subsequent write call fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.counters.reads.load(Ordering::SeqCst),
            transactions: self.counters.transactions.load(Ordering::SeqCst),
            writes: self.counters.writes.load(Ordering::SeqCst),
            commits: self.counters.commits.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_pools(&self, owner_id: &str) -> Result<Vec<Pool>, StoreError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.pools(owner_id)
    }

    async fn list_products(&self, owner_id: &str) -> Result<Vec<Product>, StoreError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .map(|data| data.products.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_content(&self, owner_id: &str) -> Result<Vec<Content>, StoreError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let owners = self.owners.lock()?;
        Ok(owners
            .get(owner_id)
            .map(|data| data.content.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn PoolTransaction>, StoreError> {
        self.counters.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
            finished: false,
        }))
    }
}

#[derive(Debug)]
enum StagedWrite {
    Create(Pool),
    Update(Pool),
    Delete { owner_id: String, pool_id: String },
    SaveProduct { owner_id: String, product: Product },
    RemoveProduct { owner_id: String, product_id: String },
    SaveContent { owner_id: String, content: Content },
    RemoveContent { owner_id: String, content_id: String },
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: Vec<StagedWrite>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_writable(&self) -> Result<(), StoreError> {
        self.store.counters.writes.fetch_add(1, Ordering::SeqCst);
        if self.finished {
            return Err(StoreError::TransactionClosed);
        }
        if self.store.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PoolTransaction for MemoryTransaction {
    async fn create_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(pools.iter().cloned().map(StagedWrite::Create));
        Ok(())
    }

    async fn update_pools(&mut self, updates: &[PoolUpdate]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged
            .extend(updates.iter().map(|u| StagedWrite::Update(u.pool.clone())));
        Ok(())
    }

    async fn delete_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(pools.iter().map(|p| StagedWrite::Delete {
            owner_id: p.owner_id.clone(),
            pool_id: p.id.clone(),
        }));
        Ok(())
    }

    async fn save_products(&mut self, owner_id: &str, products: &[Product]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(products.iter().map(|product| StagedWrite::SaveProduct {
            owner_id: owner_id.to_string(),
            product: product.clone(),
        }));
        Ok(())
    }

    async fn remove_products(&mut self, owner_id: &str, product_ids: &[String]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(product_ids.iter().map(|id| StagedWrite::RemoveProduct {
            owner_id: owner_id.to_string(),
            product_id: id.clone(),
        }));
        Ok(())
    }

    async fn save_content(&mut self, owner_id: &str, content: &[Content]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(content.iter().map(|item| StagedWrite::SaveContent {
            owner_id: owner_id.to_string(),
            content: item.clone(),
        }));
        Ok(())
    }

    async fn remove_content(&mut self, owner_id: &str, content_ids: &[String]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.staged.extend(content_ids.iter().map(|id| StagedWrite::RemoveContent {
            owner_id: owner_id.to_string(),
            content_id: id.clone(),
        }));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.store.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.finished {
            return Err(StoreError::TransactionClosed);
        }
        if self.store.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".to_string()));
        }

        let mut owners = self.store.owners.lock()?;

        // Reject the whole batch before applying any of it
        for write in &self.staged {
            match write {
                StagedWrite::Create(pool) => {
                    let exists = owners
                        .get(&pool.owner_id)
                        .is_some_and(|data| data.pools.contains_key(&pool.id));
                    if exists {
                        return Err(StoreError::Constraint(format!(
                            "pool '{}' already exists",
                            pool.id
                        )));
                    }
                }
                StagedWrite::Update(pool) => {
                    let exists = owners
                        .get(&pool.owner_id)
                        .is_some_and(|data| data.pools.contains_key(&pool.id));
                    if !exists {
                        return Err(StoreError::Constraint(format!(
                            "pool '{}' does not exist",
                            pool.id
                        )));
                    }
                }
                _ => {}
            }
        }

        for write in self.staged.drain(..) {
            match write {
                StagedWrite::Create(pool) | StagedWrite::Update(pool) => {
                    owners
                        .entry(pool.owner_id.clone())
                        .or_default()
                        .pools
                        .insert(pool.id.clone(), pool);
                }
                StagedWrite::Delete { owner_id, pool_id } => {
                    if let Some(data) = owners.get_mut(&owner_id) {
                        data.pools.remove(&pool_id);
                    }
                }
                StagedWrite::SaveProduct { owner_id, product } => {
                    owners
                        .entry(owner_id)
                        .or_default()
                        .products
                        .insert(product.id.clone(), product);
                }
                StagedWrite::RemoveProduct { owner_id, product_id } => {
                    if let Some(data) = owners.get_mut(&owner_id) {
                        data.products.remove(&product_id);
                    }
                }
                StagedWrite::SaveContent { owner_id, content } => {
                    owners
                        .entry(owner_id)
                        .or_default()
                        .content
                        .insert(content.id.clone(), content);
                }
                StagedWrite::RemoveContent { owner_id, content_id } => {
                    if let Some(data) = owners.get_mut(&owner_id) {
                        data.content.remove(&content_id);
                    }
                }
            }
        }

        self.finished = true;
        Ok(())
    }
}
