//! Applies a batch of pool operations atomically, then notifies

use std::sync::Arc;

use serde::Serialize;

use super::error::Result;
use super::events::{EventSink, PoolEvent, PoolEventKind};
use super::operations::PoolOperations;
use crate::store::PoolStore;

/// What a processed batch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Product and content rows saved
    pub dependencies_saved: usize,
    /// Product and content rows removed
    pub dependencies_removed: usize,
    pub events: usize,
}

pub struct PoolOpProcessor {
    store: Arc<dyn PoolStore>,
    events: Arc<dyn EventSink>,
    emit_events: bool,
}

impl PoolOpProcessor {
    pub fn new(store: Arc<dyn PoolStore>, events: Arc<dyn EventSink>) -> Self {
        PoolOpProcessor {
            store,
            events,
            emit_events: true,
        }
    }

    pub fn emit_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// Persist creations, updates and deletions, together with the product
    /// and content rows they depend on, in one transaction and publish one
    /// event per pool once it commits. An empty batch touches neither the
    /// store nor the sink.
    pub async fn process(&self, operations: PoolOperations) -> Result<ProcessSummary> {
        if operations.is_empty() {
            log::debug!("No pool operations to apply");
            return Ok(ProcessSummary::default());
        }

        let owner_id = operations.owner_id().to_string();
        let (creations, updates, deletions, dependencies) = operations.into_parts();

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.store.begin().await?;
        if !dependencies.saved_content.is_empty() {
            tx.save_content(&owner_id, &dependencies.saved_content).await?;
        }
        if !dependencies.saved_products.is_empty() {
            tx.save_products(&owner_id, &dependencies.saved_products).await?;
        }
        if !creations.is_empty() {
            tx.create_pools(&creations).await?;
        }
        if !updates.is_empty() {
            tx.update_pools(&updates).await?;
        }
        if !deletions.is_empty() {
            tx.delete_pools(&deletions).await?;
        }
        if !dependencies.removed_products.is_empty() {
            tx.remove_products(&owner_id, &dependencies.removed_products).await?;
        }
        if !dependencies.removed_content.is_empty() {
            tx.remove_content(&owner_id, &dependencies.removed_content).await?;
        }
        tx.commit().await?;

        let mut summary = ProcessSummary {
            created: creations.len(),
            updated: updates.len(),
            deleted: deletions.len(),
            dependencies_saved: dependencies.saved(),
            dependencies_removed: dependencies.removed(),
            events: 0,
        };
        log::info!(
            "Applied pool operations: {} created, {} updated, {} deleted ({} dependencies saved, {} removed)",
            summary.created,
            summary.updated,
            summary.deleted,
            summary.dependencies_saved,
            summary.dependencies_removed
        );

        if !self.emit_events {
            return Ok(summary);
        }

        let events = creations
            .iter()
            .map(|pool| PoolEvent::new(PoolEventKind::PoolCreated, &pool.owner_id, &pool.id))
            .chain(updates.iter().map(|update| {
                PoolEvent::new(PoolEventKind::PoolUpdated, &update.pool.owner_id, &update.pool.id)
            }))
            .chain(
                deletions
                    .iter()
                    .map(|pool| PoolEvent::new(PoolEventKind::PoolDeleted, &pool.owner_id, &pool.id)),
            );

        for event in events {
            self.events.publish(event).await;
            summary.events += 1;
        }

        Ok(summary)
    }
}
