//! The batch of writes produced by one refresh

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use super::error::{RefreshError, Result};
use super::model::{Content, Pool, PoolField, Product};

/// A pool rewrite carrying only what changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolUpdate {
    /// The pool as it should be persisted
    pub pool: Pool,
    /// Fields that differ from the persisted row
    pub changed_fields: BTreeSet<PoolField>,
    /// Whether a product or content below the pool changed
    pub dependencies_changed: bool,
}

impl PoolUpdate {
    pub fn new(previous: &Pool, desired: &Pool, dependencies_changed: bool) -> Self {
        let changed_fields = previous.changed_fields(desired);
        let mut pool = previous.clone();
        pool.apply_fields(desired, &changed_fields);

        PoolUpdate {
            pool,
            changed_fields,
            dependencies_changed,
        }
    }

    pub fn pool_id(&self) -> &str {
        &self.pool.id
    }

    pub fn has_changed(&self, field: PoolField) -> bool {
        self.changed_fields.contains(&field)
    }

    /// New quantity, when the quantity is part of the update
    pub fn quantity(&self) -> Option<i64> {
        self.has_changed(PoolField::Quantity).then_some(self.pool.quantity)
    }
}

/// Product and content rows rewritten together with the pools, so the next
/// refresh finds the imported dependencies already persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyChanges {
    pub saved_products: Vec<Product>,
    pub removed_products: Vec<String>,
    pub saved_content: Vec<Content>,
    pub removed_content: Vec<String>,
}

impl DependencyChanges {
    pub fn saved(&self) -> usize {
        self.saved_products.len() + self.saved_content.len()
    }

    pub fn removed(&self) -> usize {
        self.removed_products.len() + self.removed_content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved() == 0 && self.removed() == 0
    }
}

/// Creations, updates and deletions for one owner. A pool appears in at most
/// one category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolOperations {
    owner_id: String,
    creations: Vec<Pool>,
    updates: Vec<PoolUpdate>,
    deletions: Vec<Pool>,
    dependencies: DependencyChanges,
    #[serde(skip)]
    pool_ids: HashSet<String>,
}

impl PoolOperations {
    pub fn new() -> Self {
        PoolOperations::default()
    }

    /// Batch whose product and content writes belong to `owner_id`
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        PoolOperations {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn claim(&mut self, pool_id: &str) -> Result<()> {
        if !self.pool_ids.insert(pool_id.to_string()) {
            return Err(RefreshError::ConflictingOperation(pool_id.to_string()));
        }
        Ok(())
    }

    pub fn create(&mut self, pool: Pool) -> Result<()> {
        self.claim(&pool.id)?;
        self.creations.push(pool);
        Ok(())
    }

    pub fn update(&mut self, update: PoolUpdate) -> Result<()> {
        self.claim(update.pool_id())?;
        self.updates.push(update);
        Ok(())
    }

    pub fn delete(&mut self, pool: Pool) -> Result<()> {
        self.claim(&pool.id)?;
        self.deletions.push(pool);
        Ok(())
    }

    pub fn save_product(&mut self, product: Product) {
        self.dependencies.saved_products.push(product);
    }

    pub fn remove_product(&mut self, product_id: impl Into<String>) {
        self.dependencies.removed_products.push(product_id.into());
    }

    pub fn save_content(&mut self, content: Content) {
        self.dependencies.saved_content.push(content);
    }

    pub fn remove_content(&mut self, content_id: impl Into<String>) {
        self.dependencies.removed_content.push(content_id.into());
    }

    pub fn creations(&self) -> &[Pool] {
        &self.creations
    }

    pub fn updates(&self) -> &[PoolUpdate] {
        &self.updates
    }

    pub fn deletions(&self) -> &[Pool] {
        &self.deletions
    }

    pub fn dependencies(&self) -> &DependencyChanges {
        &self.dependencies
    }

    pub fn update_for(&self, pool_id: &str) -> Option<&PoolUpdate> {
        self.updates.iter().find(|u| u.pool_id() == pool_id)
    }

    pub fn contains(&self, pool_id: &str) -> bool {
        self.pool_ids.contains(pool_id)
    }

    /// Number of pool operations
    pub fn len(&self) -> usize {
        self.creations.len() + self.updates.len() + self.deletions.len()
    }

    /// Neither pool operations nor dependency writes
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.dependencies.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Pool>, Vec<PoolUpdate>, Vec<Pool>, DependencyChanges) {
        (self.creations, self.updates, self.deletions, self.dependencies)
    }
}
