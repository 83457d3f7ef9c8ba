use std::collections::BTreeMap;

use serde::Serialize;

use super::node::{ChangeState, EntityNode, EntityType, NodeGraph};
use super::operations::PoolOperations;
use super::processor::ProcessSummary;

/// A reference the refresh leaves dangling: the parent survives while the
/// child it points at is being deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    pub owner_id: String,
    pub parent_type: EntityType,
    pub parent_id: String,
    pub parent_state: Option<ChangeState>,
    pub child_type: EntityType,
    pub child_id: String,
}

impl IntegrityIssue {
    pub fn deleted_child(parent: &EntityNode<'_>, child: &EntityNode<'_>) -> Self {
        IntegrityIssue {
            owner_id: parent.owner().to_string(),
            parent_type: parent.entity_type(),
            parent_id: parent.entity_id().to_string(),
            parent_state: parent.state(),
            child_type: child.entity_type(),
            child_id: child.entity_id().to_string(),
        }
    }
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' still references deleted {} '{}'",
            self.parent_type, self.parent_id, self.child_type, self.child_id
        )
    }
}

/// Per-entity outcome of one refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshResult {
    owner_id: String,
    states: BTreeMap<EntityType, BTreeMap<String, ChangeState>>,
    integrity_issues: Vec<IntegrityIssue>,
    pools_created: usize,
    pools_updated: usize,
    pools_deleted: usize,
}

impl RefreshResult {
    pub fn new(owner_id: impl Into<String>) -> Self {
        RefreshResult {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    /// Collect the final state of every reconciled node
    pub fn from_graph(
        owner_id: &str,
        graph: &NodeGraph<'_>,
        integrity_issues: Vec<IntegrityIssue>,
        operations: &PoolOperations,
    ) -> Self {
        let mut result = RefreshResult::new(owner_id);
        for (_, node) in graph.iter() {
            if let Some(state) = node.state() {
                result.record(node.entity_type(), node.entity_id(), state);
            }
        }
        result.integrity_issues = integrity_issues;
        result.pools_created = operations.creations().len();
        result.pools_updated = operations.updates().len();
        result.pools_deleted = operations.deletions().len();
        result
    }

    pub fn record(&mut self, entity_type: EntityType, id: impl Into<String>, state: ChangeState) {
        self.states.entry(entity_type).or_default().insert(id.into(), state);
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn state_of(&self, entity_type: EntityType, id: &str) -> Option<ChangeState> {
        self.states.get(&entity_type)?.get(id).copied()
    }

    pub fn count(&self, entity_type: EntityType, state: ChangeState) -> usize {
        self.states
            .get(&entity_type)
            .map(|states| states.values().filter(|s| **s == state).count())
            .unwrap_or(0)
    }

    /// Ids of the given type that ended in the given state, sorted
    pub fn entity_ids(&self, entity_type: EntityType, state: ChangeState) -> Vec<&str> {
        self.states
            .get(&entity_type)
            .map(|states| {
                states
                    .iter()
                    .filter(|(_, s)| **s == state)
                    .map(|(id, _)| id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_changes(&self) -> bool {
        self.states
            .values()
            .flat_map(|states| states.values())
            .any(|state| *state != ChangeState::Unchanged)
    }

    pub fn integrity_issues(&self) -> &[IntegrityIssue] {
        &self.integrity_issues
    }

    pub fn pools_created(&self) -> usize {
        self.pools_created
    }

    pub fn pools_updated(&self) -> usize {
        self.pools_updated
    }

    pub fn pools_deleted(&self) -> usize {
        self.pools_deleted
    }
}

/// Reconciled graph outcome plus the writes it calls for
#[derive(Debug, Serialize)]
pub struct RefreshPlan {
    pub operations: PoolOperations,
    pub result: RefreshResult,
}

/// A plan after it was applied
#[derive(Debug, Serialize)]
pub struct RefreshReport {
    pub operations: PoolOperations,
    pub result: RefreshResult,
    pub summary: ProcessSummary,
}
