//! Pool change notifications
//!
//! Events are published only after the batch that caused them has been
//! committed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolEventKind {
    PoolCreated,
    PoolUpdated,
    PoolDeleted,
}

impl PoolEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEventKind::PoolCreated => "pool-created",
            PoolEventKind::PoolUpdated => "pool-updated",
            PoolEventKind::PoolDeleted => "pool-deleted",
        }
    }
}

impl std::fmt::Display for PoolEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEvent {
    pub event_id: Uuid,
    pub kind: PoolEventKind,
    pub owner_id: String,
    pub pool_id: String,
    pub timestamp: DateTime<Utc>,
}

impl PoolEvent {
    pub fn new(kind: PoolEventKind, owner_id: impl Into<String>, pool_id: impl Into<String>) -> Self {
        PoolEvent {
            event_id: Uuid::new_v4(),
            kind,
            owner_id: owner_id.into(),
            pool_id: pool_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of pool events. Delivery guarantees belong to the implementation.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: PoolEvent);
}

/// Keeps every published event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PoolEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        RecordingEventSink::default()
    }

    pub fn events(&self) -> Vec<PoolEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn take(&self) -> Vec<PoolEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: PoolEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each event to the log
#[derive(Debug, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn publish(&self, event: PoolEvent) {
        log::info!(
            "{} owner={} pool={} event={}",
            event.kind,
            event.owner_id,
            event.pool_id,
            event.event_id
        );
    }
}

/// Publishes every event to each of its sinks, in order
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        FanoutEventSink::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn publish(&self, event: PoolEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let first = Arc::new(RecordingEventSink::new());
        let second = Arc::new(RecordingEventSink::new());
        let fanout = FanoutEventSink::new()
            .with_sink(first.clone())
            .with_sink(Arc::new(LoggingEventSink))
            .with_sink(second.clone());

        fanout.publish(PoolEvent::new(PoolEventKind::PoolCreated, "org1", "pool-1")).await;

        assert_eq!(first.events(), second.events());
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_event_kind_serializes_kebab_case() {
        let event = PoolEvent::new(PoolEventKind::PoolCreated, "org1", "pool-1");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "pool-created");
        assert_eq!(value["pool_id"], "pool-1");
        assert_eq!(value["owner_id"], "org1");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = PoolEvent::new(PoolEventKind::PoolDeleted, "org1", "pool-1");
        let b = PoolEvent::new(PoolEventKind::PoolDeleted, "org1", "pool-1");
        assert_ne!(a.event_id, b.event_id);
    }

    #[tokio::test]
    async fn test_recording_sink_take_drains() {
        let sink = RecordingEventSink::new();
        sink.publish(PoolEvent::new(PoolEventKind::PoolUpdated, "org1", "pool-1")).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }
}
