//! Entity refresh engine
//!
//! Reconciles an owner's persisted pools, products and content against a
//! fresh upstream snapshot:
//!
//! 1. `RefreshWorker` maps existing and imported entities per type
//! 2. `NodeFactory` builds a deduplicated dependency graph through the
//!    per-type `NodeBuilder`s
//! 3. the diff pass assigns a `ChangeState` to every node, children first
//! 4. the graph is linearized into `PoolOperations`: pool writes plus the
//!    product and content rows they depend on
//! 5. `PoolOpProcessor` applies them in one transaction and publishes events

pub mod builders;
pub mod error;
pub mod events;
pub mod factory;
pub mod mapper;
pub mod model;
pub mod node;
pub mod operations;
pub mod processor;
pub mod reconcile;
pub mod result;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builders::{ContentNodeBuilder, NodeBuilder, PoolNodeBuilder, ProductNodeBuilder};
pub use error::{ErrorKind, RefreshError, Result};
pub use events::{EventSink, FanoutEventSink, LoggingEventSink, PoolEvent, PoolEventKind, RecordingEventSink};
pub use factory::NodeFactory;
pub use mapper::{EntityMapper, EntityMappers};
pub use node::{ChangeState, EntityNode, EntityType, NodeGraph, NodeId};
pub use operations::{DependencyChanges, PoolOperations, PoolUpdate};
pub use processor::{PoolOpProcessor, ProcessSummary};
pub use result::{IntegrityIssue, RefreshPlan, RefreshReport, RefreshResult};
pub use scheduler::{OwnerLocks, RefreshScheduler};
pub use worker::{RefreshOptions, RefreshWorker};
