//! Refresh entry point for one owner

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{RefreshError, Result};
use super::events::EventSink;
use super::factory::NodeFactory;
use super::mapper::EntityMappers;
use super::model::{
    Content, ContentInfo, ImportSnapshot, Pool, Product, ProductInfo, SubscriptionInfo,
};
use super::processor::PoolOpProcessor;
use super::reconcile;
use super::result::{RefreshPlan, RefreshReport, RefreshResult};
use crate::store::PoolStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshOptions {
    /// Publish pool events after a batch commits
    pub emit_events: bool,
    /// Abort instead of reporting when a surviving entity references a
    /// deleted one
    pub fail_on_integrity_issues: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        RefreshOptions {
            emit_events: true,
            fail_on_integrity_issues: false,
        }
    }
}

/// Collects an owner's imported snapshot, then reconciles it against what
/// the store holds. A worker serves one refresh; never share one between
/// concurrent refreshes.
#[derive(Debug, Default)]
pub struct RefreshWorker {
    mappers: EntityMappers,
    options: RefreshOptions,
}

impl RefreshWorker {
    pub fn new() -> Self {
        RefreshWorker::default()
    }

    pub fn with_options(options: RefreshOptions) -> Self {
        RefreshWorker {
            mappers: EntityMappers::new(),
            options,
        }
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    pub fn add_subscriptions(
        &mut self,
        subscriptions: impl IntoIterator<Item = SubscriptionInfo>,
    ) -> Result<&mut Self> {
        for subscription in subscriptions {
            let products: Vec<ProductInfo> = subscription
                .product
                .iter()
                .chain(subscription.derived_product.iter())
                .cloned()
                .collect();

            if let Some(previous) = self.mappers.pools.add_imported_entity(subscription)? {
                if self.mappers.pools.imported_entity(&previous.id) != Some(&previous) {
                    log::warn!(
                        "Subscription '{}' was imported twice with different data; keeping the latest",
                        previous.id
                    );
                }
            }

            for product in products {
                self.map_product(product)?;
            }
        }
        Ok(self)
    }

    pub fn add_products(&mut self, products: impl IntoIterator<Item = ProductInfo>) -> Result<&mut Self> {
        for product in products {
            self.map_product(product)?;
        }
        Ok(self)
    }

    pub fn add_content(&mut self, content: impl IntoIterator<Item = ContentInfo>) -> Result<&mut Self> {
        for item in content {
            self.map_content(item)?;
        }
        Ok(self)
    }

    /// Map everything in an upstream snapshot
    pub fn add_snapshot(&mut self, snapshot: ImportSnapshot) -> Result<&mut Self> {
        self.add_subscriptions(snapshot.subscriptions)?;
        self.add_products(snapshot.products)?;
        self.add_content(snapshot.content)?;
        Ok(self)
    }

    /// Map a product along with its derived product, provided products and
    /// content
    fn map_product(&mut self, product: ProductInfo) -> Result<()> {
        let mut nested: Vec<ProductInfo> = product.provided_products.clone();
        if let Some(derived) = &product.derived_product {
            nested.push(derived.as_ref().clone());
        }
        let content: Vec<ContentInfo> = product
            .product_content
            .iter()
            .map(|pc| pc.content.clone())
            .collect();

        if let Some(previous) = self.mappers.products.add_imported_entity(product)? {
            if self.mappers.products.imported_entity(&previous.id) != Some(&previous) {
                log::warn!(
                    "Product '{}' was imported twice with different data; keeping the latest",
                    previous.id
                );
            }
        }

        for product in nested {
            self.map_product(product)?;
        }
        for item in content {
            self.map_content(item)?;
        }
        Ok(())
    }

    fn map_content(&mut self, content: ContentInfo) -> Result<()> {
        if let Some(previous) = self.mappers.content.add_imported_entity(content)? {
            if self.mappers.content.imported_entity(&previous.id) != Some(&previous) {
                log::warn!(
                    "Content '{}' was imported twice with different data; keeping the latest",
                    previous.id
                );
            }
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> &HashMap<String, SubscriptionInfo> {
        self.mappers.pools.imported_entities()
    }

    pub fn products(&self) -> &HashMap<String, ProductInfo> {
        self.mappers.products.imported_entities()
    }

    pub fn content(&self) -> &HashMap<String, ContentInfo> {
        self.mappers.content.imported_entities()
    }

    pub fn clear(&mut self) {
        self.mappers.clear();
    }

    /// Replace the loaded existing entities with the given ones
    pub fn set_existing(
        &mut self,
        pools: Vec<Pool>,
        products: Vec<Product>,
        content: Vec<Content>,
    ) -> Result<()> {
        self.mappers.clear_existing_entities();
        self.mappers.pools.add_existing_entities(pools)?;
        self.mappers.products.add_existing_entities(products)?;
        self.mappers.content.add_existing_entities(content)?;
        Ok(())
    }

    /// Load the owner's persisted entities
    pub async fn load_existing(&mut self, store: &dyn PoolStore, owner: &str) -> Result<()> {
        let pools = store.list_pools(owner).await?;
        let products = store.list_products(owner).await?;
        let content = store.list_content(owner).await?;

        log::debug!(
            "Loaded {} pools, {} products and {} content for owner '{}'",
            pools.len(),
            products.len(),
            content.len(),
            owner
        );
        self.set_existing(pools, products, content)
    }

    /// Build, diff and linearize the graph over what is currently mapped.
    /// Nothing is written.
    pub fn reconcile(&self, owner: &str) -> Result<RefreshPlan> {
        let mut factory = NodeFactory::with_standard_builders(&self.mappers);
        factory.build_nodes(owner)?;

        let builders = factory.builders().clone();
        let issues = reconcile::diff_graph(factory.graph_mut(), &builders)?;
        if !issues.is_empty() && self.options.fail_on_integrity_issues {
            return Err(RefreshError::IntegrityViolation {
                owner: owner.to_string(),
                issues,
            });
        }

        let graph = factory.into_graph();
        let operations = reconcile::linearize(&graph, owner)?;
        let result = RefreshResult::from_graph(owner, &graph, issues, &operations);

        Ok(RefreshPlan { operations, result })
    }

    /// Load the owner's persisted entities and reconcile against them
    pub async fn plan(&mut self, store: &dyn PoolStore, owner: &str) -> Result<RefreshPlan> {
        self.load_existing(store, owner).await?;
        self.reconcile(owner)
    }

    /// Plan, then apply the operations and publish their events
    pub async fn run(
        &mut self,
        store: Arc<dyn PoolStore>,
        events: Arc<dyn EventSink>,
        owner: &str,
    ) -> Result<RefreshReport> {
        let plan = match self.plan(store.as_ref(), owner).await {
            Ok(plan) => plan,
            Err(err) => {
                log::error!("Refresh of owner '{}' aborted: {}", owner, err);
                return Err(err);
            }
        };

        let processor = PoolOpProcessor::new(store, events).emit_events(self.options.emit_events);
        let summary = match processor.process(plan.operations.clone()).await {
            Ok(summary) => summary,
            Err(err) => {
                log::error!("Refresh of owner '{}' failed to apply: {}", owner, err);
                return Err(err);
            }
        };

        log::info!(
            "Refreshed owner '{}': {} created, {} updated, {} deleted",
            owner,
            summary.created,
            summary.updated,
            summary.deleted
        );
        Ok(RefreshReport {
            operations: plan.operations,
            result: plan.result,
            summary,
        })
    }

    /// `run`, keeping only the per-entity result
    pub async fn execute(
        &mut self,
        store: Arc<dyn PoolStore>,
        events: Arc<dyn EventSink>,
        owner: &str,
    ) -> Result<RefreshResult> {
        Ok(self.run(store, events, owner).await?.result)
    }
}
