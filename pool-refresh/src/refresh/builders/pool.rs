use super::{NodeBuilder, deleted_children, entity_not_found};
use crate::refresh::error::Result;
use crate::refresh::factory::NodeFactory;
use crate::refresh::mapper::EntityMappers;
use crate::refresh::node::{
    EntityNode, EntityType, ExistingEntity, ImportedEntity, NodeGraph, NodeId,
};
use crate::refresh::result::IntegrityIssue;

/// Builds pool nodes; children are the pool's product and derived product
#[derive(Debug, Default)]
pub struct PoolNodeBuilder;

impl NodeBuilder for PoolNodeBuilder {
    fn entity_type(&self) -> EntityType {
        EntityType::Pool
    }

    fn build_node<'a>(
        &self,
        factory: &mut NodeFactory<'a>,
        mappers: &'a EntityMappers,
        owner: &str,
        id: &str,
    ) -> Result<EntityNode<'a>> {
        let mapper = &mappers.pools;
        if !mapper.has_entity(id) {
            return Err(entity_not_found(owner, EntityType::Pool, id));
        }

        let existing = mapper.existing_entity(id);
        let imported = mapper.imported_entity(id);

        let mut node = EntityNode::new(owner, EntityType::Pool, id)
            .with_existing(existing.map(ExistingEntity::Pool))
            .with_imported(imported.map(ImportedEntity::Subscription));

        if let Some(pool) = existing {
            if !pool.pool_type.is_refreshable() {
                log::debug!("Pool '{}' is a {} pool; refresh will not touch it", id, pool.pool_type);
                node.set_skip(true);
            }
        }

        let (product_id, derived_product_id) = match (imported, existing) {
            (Some(sub), _) => (sub.product_id(), sub.derived_product_id()),
            (None, Some(pool)) => (pool.product_id.as_deref(), pool.derived_product_id.as_deref()),
            (None, None) => (None, None),
        };

        for product_id in [product_id, derived_product_id].into_iter().flatten() {
            let child = factory.build_node(owner, EntityType::Product, product_id)?;
            node.add_child(child);
        }

        Ok(node)
    }

    fn check_integrity(&self, graph: &NodeGraph<'_>, node: NodeId) -> Vec<IntegrityIssue> {
        deleted_children(graph, node)
    }
}
