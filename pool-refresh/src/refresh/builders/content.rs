use super::{NodeBuilder, entity_not_found};
use crate::refresh::error::Result;
use crate::refresh::factory::NodeFactory;
use crate::refresh::mapper::EntityMappers;
use crate::refresh::node::{EntityNode, EntityType, ExistingEntity, ImportedEntity};

/// Content is a leaf
#[derive(Debug, Default)]
pub struct ContentNodeBuilder;

impl NodeBuilder for ContentNodeBuilder {
    fn entity_type(&self) -> EntityType {
        EntityType::Content
    }

    fn build_node<'a>(
        &self,
        _factory: &mut NodeFactory<'a>,
        mappers: &'a EntityMappers,
        owner: &str,
        id: &str,
    ) -> Result<EntityNode<'a>> {
        let mapper = &mappers.content;
        if !mapper.has_entity(id) {
            return Err(entity_not_found(owner, EntityType::Content, id));
        }

        Ok(EntityNode::new(owner, EntityType::Content, id)
            .with_existing(mapper.existing_entity(id).map(ExistingEntity::Content))
            .with_imported(mapper.imported_entity(id).map(ImportedEntity::Content)))
    }
}
