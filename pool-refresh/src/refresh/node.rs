//! Entity graph vertices and the arena that owns them
//!
//! Nodes live in a single `Vec` and refer to each other by `NodeId`. The
//! arena's key index doubles as the factory's node cache, so a node shared by
//! several parents exists exactly once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::{RefreshError, Result};
use super::model::{
    Content, ContentInfo, Entity, Pool, Product, ProductInfo, SubscriptionInfo,
};

/// Type tag of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Pool,
    Product,
    Content,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Pool => "pool",
            EntityType::Product => "product",
            EntityType::Content => "content",
        }
    }

    /// All types, roots first
    pub fn all() -> &'static [EntityType] {
        &[EntityType::Pool, EntityType::Product, EntityType::Content]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of diffing a node against its persisted version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeState {
    /// Persisted and imported versions match, and so do all children
    Unchanged,
    /// Only present in the import
    New,
    /// Present in both, own fields differ
    Updated,
    /// Only present in storage
    Deleted,
    /// Own fields match but a direct child changed
    ChildChanged,
}

impl ChangeState {
    /// States that make a parent `ChildChanged`
    pub fn propagates(&self) -> bool {
        matches!(
            self,
            ChangeState::New | ChangeState::Updated | ChangeState::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeState::Unchanged => "unchanged",
            ChangeState::New => "new",
            ChangeState::Updated => "updated",
            ChangeState::Deleted => "deleted",
            ChangeState::ChildChanged => "child-changed",
        }
    }
}

impl std::fmt::Display for ChangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index of a node in its `NodeGraph`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Borrowed persisted payload of a node
#[derive(Debug, Clone, Copy)]
pub enum ExistingEntity<'a> {
    Pool(&'a Pool),
    Product(&'a Product),
    Content(&'a Content),
}

impl<'a> ExistingEntity<'a> {
    pub fn entity_type(&self) -> EntityType {
        match *self {
            ExistingEntity::Pool(_) => EntityType::Pool,
            ExistingEntity::Product(_) => EntityType::Product,
            ExistingEntity::Content(_) => EntityType::Content,
        }
    }

    pub fn entity_id(&self) -> &'a str {
        match *self {
            ExistingEntity::Pool(pool) => pool.entity_id(),
            ExistingEntity::Product(product) => product.entity_id(),
            ExistingEntity::Content(content) => content.entity_id(),
        }
    }

    pub fn as_pool(&self) -> Option<&'a Pool> {
        match *self {
            ExistingEntity::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&'a Product> {
        match *self {
            ExistingEntity::Product(product) => Some(product),
            _ => None,
        }
    }

    pub fn as_content(&self) -> Option<&'a Content> {
        match *self {
            ExistingEntity::Content(content) => Some(content),
            _ => None,
        }
    }
}

/// Borrowed upstream payload of a node
#[derive(Debug, Clone, Copy)]
pub enum ImportedEntity<'a> {
    Subscription(&'a SubscriptionInfo),
    Product(&'a ProductInfo),
    Content(&'a ContentInfo),
}

impl<'a> ImportedEntity<'a> {
    pub fn entity_type(&self) -> EntityType {
        match *self {
            ImportedEntity::Subscription(_) => EntityType::Pool,
            ImportedEntity::Product(_) => EntityType::Product,
            ImportedEntity::Content(_) => EntityType::Content,
        }
    }

    pub fn entity_id(&self) -> &'a str {
        match *self {
            ImportedEntity::Subscription(sub) => sub.entity_id(),
            ImportedEntity::Product(product) => product.entity_id(),
            ImportedEntity::Content(content) => content.entity_id(),
        }
    }

    pub fn as_subscription(&self) -> Option<&'a SubscriptionInfo> {
        match *self {
            ImportedEntity::Subscription(sub) => Some(sub),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&'a ProductInfo> {
        match *self {
            ImportedEntity::Product(product) => Some(product),
            _ => None,
        }
    }

    pub fn as_content(&self) -> Option<&'a ContentInfo> {
        match *self {
            ImportedEntity::Content(content) => Some(content),
            _ => None,
        }
    }
}

/// One entity of one owner, with its existing and imported versions
#[derive(Debug, Clone)]
pub struct EntityNode<'a> {
    owner: String,
    entity_type: EntityType,
    entity_id: String,
    existing: Option<ExistingEntity<'a>>,
    imported: Option<ImportedEntity<'a>>,
    children: Vec<NodeId>,
    state: Option<ChangeState>,
    skip: bool,
}

impl<'a> EntityNode<'a> {
    pub fn new(owner: impl Into<String>, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        EntityNode {
            owner: owner.into(),
            entity_type,
            entity_id: entity_id.into(),
            existing: None,
            imported: None,
            children: Vec::new(),
            state: None,
            skip: false,
        }
    }

    pub fn with_existing(mut self, existing: Option<ExistingEntity<'a>>) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_imported(mut self, imported: Option<ImportedEntity<'a>>) -> Self {
        self.imported = imported;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn existing_entity(&self) -> Option<ExistingEntity<'a>> {
        self.existing
    }

    pub fn imported_entity(&self) -> Option<ImportedEntity<'a>> {
        self.imported
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attach a child; attaching the same child twice keeps one edge
    pub fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Final state, or `None` until the diff pass reached this node
    pub fn state(&self) -> Option<ChangeState> {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ChangeState) {
        self.state = Some(state);
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    /// Reserved slot that has not been filled by a builder yet
    pub fn is_placeholder(&self) -> bool {
        self.existing.is_none() && self.imported.is_none()
    }

    /// Whether the node's own fields differ between existing and imported.
    /// Always false unless both versions are present.
    pub fn own_fields_changed(&self) -> bool {
        match (self.existing, self.imported) {
            (Some(ExistingEntity::Pool(pool)), Some(ImportedEntity::Subscription(sub))) => {
                pool.differs_from(sub)
            }
            (Some(ExistingEntity::Product(product)), Some(ImportedEntity::Product(info))) => {
                product.differs_from(info)
            }
            (Some(ExistingEntity::Content(content)), Some(ImportedEntity::Content(info))) => {
                content.differs_from(info)
            }
            _ => false,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RefreshError {
        RefreshError::InvalidNode {
            entity_type: self.entity_type,
            id: self.entity_id.clone(),
            reason: reason.into(),
        }
    }

    /// Check the construction invariants of a built node
    pub fn validate(&self) -> Result<()> {
        if self.is_placeholder() {
            return Err(self.invalid("node has neither an existing nor an imported entity"));
        }

        if let Some(existing) = self.existing {
            if existing.entity_type() != self.entity_type {
                return Err(self.invalid(format!(
                    "existing entity is a {}",
                    existing.entity_type()
                )));
            }
            if existing.entity_id() != self.entity_id {
                return Err(self.invalid(format!(
                    "existing entity has id '{}'",
                    existing.entity_id()
                )));
            }
        }

        if let Some(imported) = self.imported {
            if imported.entity_type() != self.entity_type {
                return Err(self.invalid(format!(
                    "imported entity is a {}",
                    imported.entity_type()
                )));
            }
            if imported.entity_id() != self.entity_id {
                return Err(self.invalid(format!(
                    "imported entity has id '{}'",
                    imported.entity_id()
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    owner: String,
    entity_type: EntityType,
    id: String,
}

impl NodeKey {
    fn new(owner: &str, entity_type: EntityType, id: &str) -> Self {
        NodeKey {
            owner: owner.to_string(),
            entity_type,
            id: id.to_string(),
        }
    }
}

/// Arena of the nodes built during one refresh
#[derive(Debug, Default)]
pub struct NodeGraph<'a> {
    nodes: Vec<EntityNode<'a>>,
    index: HashMap<NodeKey, NodeId>,
    finish_order: Vec<NodeId>,
}

impl<'a> NodeGraph<'a> {
    pub fn new() -> Self {
        NodeGraph::default()
    }

    pub fn lookup(&self, owner: &str, entity_type: EntityType, id: &str) -> Option<NodeId> {
        self.index.get(&NodeKey::new(owner, entity_type, id)).copied()
    }

    /// Allocate an empty slot for a node before its builder runs, so that
    /// descendants asking for the same key resolve to this slot
    pub(crate) fn reserve(&mut self, owner: &str, entity_type: EntityType, id: &str) -> NodeId {
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(EntityNode::new(owner, entity_type, id));
        self.index.insert(NodeKey::new(owner, entity_type, id), node_id);
        node_id
    }

    /// Populate a reserved slot in place. Edges already pointing at the slot
    /// stay valid. Children attached to the slot while it was being built are
    /// kept.
    pub(crate) fn fill(&mut self, node_id: NodeId, mut node: EntityNode<'a>) -> Result<()> {
        node.validate()?;

        let slot = &mut self.nodes[node_id.0];
        if slot.owner != node.owner
            || slot.entity_type != node.entity_type
            || slot.entity_id != node.entity_id
        {
            return Err(RefreshError::InvalidNode {
                entity_type: slot.entity_type,
                id: slot.entity_id.clone(),
                reason: format!(
                    "builder returned {} node '{}' for this slot",
                    node.entity_type, node.entity_id
                ),
            });
        }

        for child in std::mem::take(&mut slot.children) {
            node.add_child(child);
        }
        *slot = node;
        Ok(())
    }

    pub(crate) fn mark_finished(&mut self, node_id: NodeId) {
        self.finish_order.push(node_id);
    }

    pub fn node(&self, node_id: NodeId) -> &EntityNode<'a> {
        &self.nodes[node_id.0]
    }

    pub fn get(&self, node_id: NodeId) -> Option<&EntityNode<'a>> {
        self.nodes.get(node_id.0)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> &mut EntityNode<'a> {
        &mut self.nodes[node_id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &EntityNode<'a>)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    pub fn nodes_of_type(&self, entity_type: EntityType) -> impl Iterator<Item = (NodeId, &EntityNode<'a>)> {
        self.iter().filter(move |(_, node)| node.entity_type == entity_type)
    }

    pub fn children_of(&self, node_id: NodeId) -> impl Iterator<Item = (NodeId, &EntityNode<'a>)> {
        self.nodes[node_id.0]
            .children
            .iter()
            .map(|child| (*child, &self.nodes[child.0]))
    }

    /// Nodes in the order their builders finished: children before parents
    pub fn finish_order(&self) -> &[NodeId] {
        &self.finish_order
    }
}
