//! Event log storage using redb.
//!
//! Records are written once, in append order, and never rewritten.
//! Acknowledgments are stored separately and joined when reading.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use demandlink_commands::{EventAck, EventLog, EventRecord, PersistenceError};

use crate::{Error, Result};

// Events table: key = append sequence, value = EventRecord (JSON)
const EVENTS_TABLE: TableDefinition<u64, &str> = TableDefinition::new("events");

// Event id index: key = event_id, value = append sequence
const EVENT_INDEX_TABLE: TableDefinition<&str, u64> = TableDefinition::new("events_index");

// Acks table: key = event_id, value = EventAck (JSON)
const ACKS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("events_acks");

/// Persistent, append-only event log.
#[derive(Clone)]
pub struct RedbEventLog {
    db: Arc<Database>,
}

impl RedbEventLog {
    /// Open an event log in the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let db = Database::create(path.join("events.redb"))?;

        // Create tables
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(EVENTS_TABLE)?;
            write_txn.open_table(EVENT_INDEX_TABLE)?;
            write_txn.open_table(ACKS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Append a record. Identical re-appends are accepted without a second write.
    pub fn append_record(&self, record: &EventRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut index = write_txn.open_table(EVENT_INDEX_TABLE)?;
            let mut events = write_txn.open_table(EVENTS_TABLE)?;

            let existing = index.get(record.event_id.as_str())?.map(|g| g.value());
            if let Some(seq) = existing {
                let stored = events
                    .get(seq)?
                    .map(|g| g.value().to_string())
                    .ok_or_else(|| {
                        Error::Storage(format!("Index points at missing event {}", seq))
                    })?;
                let stored: EventRecord = serde_json::from_str(&stored)?;
                if stored == *record {
                    debug!(event_id = %record.event_id, "Event already stored");
                    return Ok(());
                }
                return Err(Error::Conflict(record.event_id.clone()));
            }

            let seq = events.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
            events.insert(seq, json.as_str())?;
            index.insert(record.event_id.as_str(), seq)?;
        }
        write_txn.commit()?;

        debug!(event_id = %record.event_id, "Event stored");
        Ok(())
    }

    /// Store an acknowledgment. The first ack for an event wins.
    pub fn append_ack_record(&self, ack: &EventAck) -> Result<()> {
        let json = serde_json::to_string(ack)?;
        let write_txn = self.db.begin_write()?;
        {
            let index = write_txn.open_table(EVENT_INDEX_TABLE)?;
            if index.get(ack.event_id.as_str())?.is_none() {
                return Err(Error::NotFound(ack.event_id.clone()));
            }

            let mut acks = write_txn.open_table(ACKS_TABLE)?;
            let already_acked = acks.get(ack.event_id.as_str())?.is_some();
            if !already_acked {
                acks.insert(ack.event_id.as_str(), json.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a record with its acknowledgment folded in.
    pub fn get(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(EVENT_INDEX_TABLE)?;
        let events = read_txn.open_table(EVENTS_TABLE)?;
        let acks = read_txn.open_table(ACKS_TABLE)?;

        let Some(seq) = index.get(event_id)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let Some(json) = events.get(seq)?.map(|g| g.value().to_string()) else {
            return Ok(None);
        };
        let record: EventRecord = serde_json::from_str(&json)?;

        if acks.get(event_id)?.is_some() {
            Ok(Some(record.acknowledged_view()))
        } else {
            Ok(Some(record))
        }
    }

    /// Get the acknowledgment for an event.
    pub fn get_ack(&self, event_id: &str) -> Result<Option<EventAck>> {
        let read_txn = self.db.begin_read()?;
        let acks = read_txn.open_table(ACKS_TABLE)?;
        match acks.get(event_id)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Most recent records, newest first, optionally for one device.
    pub fn list(&self, device_id: Option<&str>, limit: usize) -> Result<Vec<EventRecord>> {
        let read_txn = self.db.begin_read()?;
        let events = read_txn.open_table(EVENTS_TABLE)?;
        let acks = read_txn.open_table(ACKS_TABLE)?;

        let mut result = Vec::new();
        for entry in events.iter()?.rev() {
            if result.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            let record: EventRecord = serde_json::from_str(value.value())?;
            if device_id.is_some_and(|d| record.device_id() != d) {
                continue;
            }
            if acks.get(record.event_id.as_str())?.is_some() {
                result.push(record.acknowledged_view());
            } else {
                result.push(record);
            }
        }
        Ok(result)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<u64> {
        use redb::ReadableTableMetadata;

        let read_txn = self.db.begin_read()?;
        let events = read_txn.open_table(EVENTS_TABLE)?;
        Ok(events.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl EventLog for RedbEventLog {
    async fn append(&self, record: &EventRecord) -> std::result::Result<(), PersistenceError> {
        let log = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || log.append_record(&record))
            .await
            .map_err(Error::from)??;
        Ok(())
    }

    async fn append_ack(&self, ack: &EventAck) -> std::result::Result<(), PersistenceError> {
        let log = self.clone();
        let ack = ack.clone();
        tokio::task::spawn_blocking(move || log.append_ack_record(&ack))
            .await
            .map_err(Error::from)??;
        Ok(())
    }
}
