//! Node construction with identity dedup
//!
//! Every node is requested through `NodeFactory::build_node`. A key that was
//! already requested resolves to the same `NodeId`, including keys whose
//! builder is still running further up the call stack, so shared products
//! and content are built once and cyclic references terminate.

use std::collections::HashMap;
use std::sync::Arc;

use super::builders::{ContentNodeBuilder, NodeBuilder, PoolNodeBuilder, ProductNodeBuilder};
use super::error::{RefreshError, Result};
use super::mapper::EntityMappers;
use super::node::{EntityType, NodeGraph, NodeId};

pub struct NodeFactory<'a> {
    builders: HashMap<EntityType, Arc<dyn NodeBuilder>>,
    mappers: &'a EntityMappers,
    graph: NodeGraph<'a>,
}

impl<'a> NodeFactory<'a> {
    /// Factory with no builders registered
    pub fn new(mappers: &'a EntityMappers) -> Self {
        NodeFactory {
            builders: HashMap::new(),
            mappers,
            graph: NodeGraph::new(),
        }
    }

    /// Factory with the pool, product and content builders registered
    pub fn with_standard_builders(mappers: &'a EntityMappers) -> Self {
        NodeFactory::new(mappers)
            .with_builder(PoolNodeBuilder)
            .with_builder(ProductNodeBuilder)
            .with_builder(ContentNodeBuilder)
    }

    pub fn with_builder(mut self, builder: impl NodeBuilder + 'static) -> Self {
        self.add_builder(Arc::new(builder));
        self
    }

    /// Register a builder, replacing any previous one for the same type
    pub fn add_builder(&mut self, builder: Arc<dyn NodeBuilder>) {
        self.builders.insert(builder.entity_type(), builder);
    }

    pub fn builder(&self, entity_type: EntityType) -> Option<&Arc<dyn NodeBuilder>> {
        self.builders.get(&entity_type)
    }

    pub(crate) fn builders(&self) -> &HashMap<EntityType, Arc<dyn NodeBuilder>> {
        &self.builders
    }

    /// Return the node for the key, building it (and its descendants) on
    /// first request
    pub fn build_node(&mut self, owner: &str, entity_type: EntityType, id: &str) -> Result<NodeId> {
        if let Some(node_id) = self.graph.lookup(owner, entity_type, id) {
            return Ok(node_id);
        }

        let builder = self
            .builders
            .get(&entity_type)
            .cloned()
            .ok_or(RefreshError::MissingBuilder(entity_type))?;

        let node_id = self.graph.reserve(owner, entity_type, id);
        log::trace!("Building {} node '{}' for owner '{}'", entity_type, id, owner);

        let mappers = self.mappers;
        let node = builder.build_node(self, mappers, owner, id)?;
        self.graph.fill(node_id, node)?;
        self.graph.mark_finished(node_id);

        Ok(node_id)
    }

    /// Build a node for every mapped entity of every type, pools first
    pub fn build_nodes(&mut self, owner: &str) -> Result<()> {
        let mappers = self.mappers;
        for entity_type in EntityType::all() {
            for id in mappers.entity_ids(*entity_type) {
                self.build_node(owner, *entity_type, id)?;
            }
        }

        log::debug!(
            "Built {} nodes for owner '{}'",
            self.graph.len(),
            owner
        );
        Ok(())
    }

    pub fn graph(&self) -> &NodeGraph<'a> {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut NodeGraph<'a> {
        &mut self.graph
    }

    pub fn into_graph(self) -> NodeGraph<'a> {
        self.graph
    }
}
