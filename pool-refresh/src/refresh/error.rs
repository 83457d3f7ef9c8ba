use thiserror::Error;

use super::node::EntityType;
use super::result::IntegrityIssue;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("No node builder registered for entity type '{0}'")]
    MissingBuilder(EntityType),

    #[error("{entity_type} '{id}' of owner '{owner}' is referenced but not present in the existing or imported data")]
    EntityNotFound {
        owner: String,
        entity_type: EntityType,
        id: String,
    },

    #[error("Invalid {entity_type} node '{id}': {reason}")]
    InvalidNode {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("{entity_type} does not contain a mappable id")]
    MissingId { entity_type: EntityType },

    #[error("Pool '{0}' already has a pending operation")]
    ConflictingOperation(String),

    #[error("{} referential integrity issue(s) found for owner '{owner}'", .issues.len())]
    IntegrityViolation {
        owner: String,
        issues: Vec<IntegrityIssue>,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Coarse classification used by callers deciding whether a retry makes sense
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup or programming defect; never retried
    Configuration,
    /// The owner's snapshot is inconsistent
    DataConsistency,
    /// Malformed upstream data rejected before a refresh starts
    InvalidInput,
    /// Storage failed while applying the batch
    Persistence,
}

impl RefreshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefreshError::MissingBuilder(_)
            | RefreshError::InvalidNode { .. }
            | RefreshError::ConflictingOperation(_) => ErrorKind::Configuration,
            RefreshError::EntityNotFound { .. } | RefreshError::IntegrityViolation { .. } => {
                ErrorKind::DataConsistency
            }
            RefreshError::MissingId { .. } => ErrorKind::InvalidInput,
            RefreshError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, RefreshError>;
