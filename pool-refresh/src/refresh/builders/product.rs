use super::{NodeBuilder, deleted_children, entity_not_found};
use crate::refresh::error::Result;
use crate::refresh::factory::NodeFactory;
use crate::refresh::mapper::EntityMappers;
use crate::refresh::node::{
    EntityNode, EntityType, ExistingEntity, ImportedEntity, NodeGraph, NodeId,
};
use crate::refresh::result::IntegrityIssue;

/// Builds product nodes; children are the derived product, the provided
/// products and the product's content
#[derive(Debug, Default)]
pub struct ProductNodeBuilder;

impl NodeBuilder for ProductNodeBuilder {
    fn entity_type(&self) -> EntityType {
        EntityType::Product
    }

    fn build_node<'a>(
        &self,
        factory: &mut NodeFactory<'a>,
        mappers: &'a EntityMappers,
        owner: &str,
        id: &str,
    ) -> Result<EntityNode<'a>> {
        let mapper = &mappers.products;
        if !mapper.has_entity(id) {
            return Err(entity_not_found(owner, EntityType::Product, id));
        }

        let existing = mapper.existing_entity(id);
        let imported = mapper.imported_entity(id);

        let mut node = EntityNode::new(owner, EntityType::Product, id)
            .with_existing(existing.map(ExistingEntity::Product))
            .with_imported(imported.map(ImportedEntity::Product));

        let mut product_ids: Vec<&'a str> = Vec::new();
        let mut content_ids: Vec<&'a str> = Vec::new();

        match (imported, existing) {
            (Some(info), _) => {
                product_ids.extend(info.derived_product_id());
                product_ids.extend(info.provided_products.iter().map(|p| p.id.as_str()));
                content_ids.extend(info.product_content.iter().map(|pc| pc.content.id.as_str()));
            }
            (None, Some(product)) => {
                product_ids.extend(product.derived_product_id.as_deref());
                product_ids.extend(product.provided_product_ids.iter().map(String::as_str));
                content_ids.extend(product.product_content.iter().map(|pc| pc.content_id.as_str()));
            }
            (None, None) => {}
        }

        for product_id in product_ids {
            let child = factory.build_node(owner, EntityType::Product, product_id)?;
            node.add_child(child);
        }

        for content_id in content_ids {
            let child = factory.build_node(owner, EntityType::Content, content_id)?;
            node.add_child(child);
        }

        Ok(node)
    }

    fn check_integrity(&self, graph: &NodeGraph<'_>, node: NodeId) -> Vec<IntegrityIssue> {
        deleted_children(graph, node)
    }
}
