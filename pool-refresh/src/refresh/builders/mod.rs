//! Per-type node builders
//!
//! A builder turns one mapped id into a node and asks the factory for the
//! nodes of every entity the source version references. Builders never recurse
//! on their own; all recursion goes through `NodeFactory::build_node`.

mod content;
mod pool;
mod product;

pub use content::ContentNodeBuilder;
pub use pool::PoolNodeBuilder;
pub use product::ProductNodeBuilder;

use super::error::{RefreshError, Result};
use super::factory::NodeFactory;
use super::mapper::EntityMappers;
use super::node::{ChangeState, EntityNode, EntityType, NodeGraph, NodeId};
use super::result::IntegrityIssue;

pub trait NodeBuilder: Send + Sync {
    /// Type tag this builder is registered under
    fn entity_type(&self) -> EntityType;

    /// Build the node for `id`, requesting children through `factory`
    fn build_node<'a>(
        &self,
        factory: &mut NodeFactory<'a>,
        mappers: &'a EntityMappers,
        owner: &str,
        id: &str,
    ) -> Result<EntityNode<'a>>;

    /// Inspect a reconciled node for references the refresh cannot resolve
    /// on its own. Called once per node after its state is final.
    fn check_integrity(&self, _graph: &NodeGraph<'_>, _node: NodeId) -> Vec<IntegrityIssue> {
        Vec::new()
    }
}

pub(crate) fn entity_not_found(owner: &str, entity_type: EntityType, id: &str) -> RefreshError {
    RefreshError::EntityNotFound {
        owner: owner.to_string(),
        entity_type,
        id: id.to_string(),
    }
}

/// Children being deleted while their parent survives
pub(crate) fn deleted_children(graph: &NodeGraph<'_>, node_id: NodeId) -> Vec<IntegrityIssue> {
    let parent = graph.node(node_id);
    if parent.state() == Some(ChangeState::Deleted) {
        return Vec::new();
    }

    graph
        .children_of(node_id)
        .filter(|(_, child)| child.state() == Some(ChangeState::Deleted))
        .map(|(_, child)| IntegrityIssue::deleted_child(parent, child))
        .collect()
}
