//! Append-only event log boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::events::{EventAck, EventId, EventRecord};

/// Durable, append-only store of event records.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a record. Durable once this returns.
    ///
    /// Appending a record whose id is already stored with identical content
    /// succeeds, so a failed persist can be retried safely.
    async fn append(&self, record: &EventRecord) -> Result<(), PersistenceError>;

    /// Append an acknowledgment for a stored record.
    async fn append_ack(&self, ack: &EventAck) -> Result<(), PersistenceError>;
}

#[derive(Default)]
struct MemoryState {
    records: Vec<EventRecord>,
    index: HashMap<EventId, usize>,
    acks: HashMap<EventId, EventAck>,
}

/// In-process event log.
#[derive(Default)]
pub struct MemoryEventLog {
    state: RwLock<MemoryState>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Get a record with its acknowledgment folded in.
    pub async fn get(&self, event_id: &str) -> Option<EventRecord> {
        let state = self.state.read().await;
        let record = state.index.get(event_id).map(|&i| &state.records[i])?;
        Some(fold_ack(record, &state.acks))
    }

    /// Get the acknowledgment for an event.
    pub async fn get_ack(&self, event_id: &str) -> Option<EventAck> {
        self.state.read().await.acks.get(event_id).cloned()
    }

    /// All records in append order.
    pub async fn list(&self) -> Vec<EventRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .map(|r| fold_ack(r, &state.acks))
            .collect()
    }

    /// Most recent records for a device, newest first.
    pub async fn by_device(&self, device_id: &str, limit: usize) -> Vec<EventRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .rev()
            .filter(|r| r.device_id() == device_id)
            .take(limit)
            .map(|r| fold_ack(r, &state.acks))
            .collect()
    }
}

fn fold_ack(record: &EventRecord, acks: &HashMap<EventId, EventAck>) -> EventRecord {
    if acks.contains_key(&record.event_id) {
        record.acknowledged_view()
    } else {
        record.clone()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, record: &EventRecord) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(&i) = state.index.get(&record.event_id) {
            return if state.records[i] == *record {
                Ok(())
            } else {
                Err(PersistenceError::Duplicate(record.event_id.clone()))
            };
        }

        let position = state.records.len();
        state.records.push(record.clone());
        state.index.insert(record.event_id.clone(), position);
        Ok(())
    }

    async fn append_ack(&self, ack: &EventAck) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if !state.index.contains_key(&ack.event_id) {
            return Err(PersistenceError::UnknownEvent(ack.event_id.clone()));
        }
        // First ack wins; later duplicates from the device are ignored.
        state
            .acks
            .entry(ack.event_id.clone())
            .or_insert_with(|| ack.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use serde_json::Map;

    fn record(device_id: &str) -> EventRecord {
        EventRecord::new(CommandKind::ReadClock, device_id.to_string(), Map::new(), true)
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let log = MemoryEventLog::new();
        assert!(log.is_empty().await);

        let r = record("dev-1");
        log.append(&r).await.unwrap();

        assert_eq!(log.len().await, 1);
        assert_eq!(log.get(&r.event_id).await, Some(r));
        assert!(log.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let log = MemoryEventLog::new();
        let r = record("dev-1");

        log.append(&r).await.unwrap();
        log.append(&r).await.unwrap();
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_conflicting_duplicate_rejected() {
        let log = MemoryEventLog::new();
        let r = record("dev-1");
        log.append(&r).await.unwrap();

        let mut altered = r.clone();
        altered.event_data.event_sent = false;
        assert!(matches!(
            log.append(&altered).await,
            Err(PersistenceError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_ack_folds_into_view() {
        let log = MemoryEventLog::new();
        let r = record("dev-1");
        log.append(&r).await.unwrap();

        log.append_ack(&EventAck::new(r.event_id.clone(), None))
            .await
            .unwrap();

        assert!(log.get(&r.event_id).await.unwrap().event_ack);
        assert!(log.get_ack(&r.event_id).await.is_some());
    }

    #[tokio::test]
    async fn test_ack_unknown_event() {
        let log = MemoryEventLog::new();
        let result = log.append_ack(&EventAck::new("nope".to_string(), None)).await;
        assert!(matches!(result, Err(PersistenceError::UnknownEvent(_))));
    }

    #[tokio::test]
    async fn test_by_device_newest_first() {
        let log = MemoryEventLog::new();
        let first = record("dev-1");
        let other = record("dev-2");
        let second = record("dev-1");
        for r in [&first, &other, &second] {
            log.append(r).await.unwrap();
        }

        let events = log.by_device("dev-1", 10).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, second.event_id);
        assert_eq!(events[1].event_id, first.event_id);

        assert_eq!(log.by_device("dev-1", 1).await.len(), 1);
    }
}
