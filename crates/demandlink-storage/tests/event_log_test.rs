//! Redb event log tests.
//!
//! Covers the event log boundary, durability across reopen and the
//! acknowledgment join.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde_json::json;

use demandlink_commands::{
    AckHandler, CommandDispatcher, CommandKind, EventLog, PersistenceError, TransportError,
    adapter::DeviceTransport,
};
use demandlink_storage::RedbEventLog;

/// Transport that accepts everything except devices named "offline".
struct StubTransport;

#[async_trait]
impl DeviceTransport for StubTransport {
    async fn send(&self, device_id: &str, _payload: Bytes) -> Result<bool, TransportError> {
        Ok(device_id != "offline")
    }
}

fn open(dir: &tempfile::TempDir) -> Arc<RedbEventLog> {
    Arc::new(RedbEventLog::open(dir.path()).unwrap())
}

#[tokio::test]
async fn test_dispatch_persists_record_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let log = open(&dir);
    let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log.clone());
    let start = Utc.with_ymd_and_hms(2024, 8, 15, 18, 0, 0).unwrap();

    let record = dispatcher
        .start_load_shed("wh-1", Some(start), 90)
        .await
        .unwrap();

    let stored = log.get(&record.event_id).unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.event_data.fields["start_time"], "2024-08-15T18:00:00Z");
    assert_eq!(stored.event_data.fields["duration"], 90);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let record = {
        let log = open(&dir);
        let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log);
        dispatcher.read_clock("offline").await.unwrap()
    };

    let log = open(&dir);
    let stored = log.get(&record.event_id).unwrap().unwrap();
    assert!(!stored.event_data.event_sent);
    assert!(!stored.event_ack);
}

#[tokio::test]
async fn test_list_newest_first_with_device_filter() {
    let dir = tempfile::tempdir().unwrap();
    let log = open(&dir);
    let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log.clone());

    let first = dispatcher.read_clock("dev-a").await.unwrap();
    let _other = dispatcher.request_connection_info("dev-b").await.unwrap();
    let last = dispatcher.end_load_shed("dev-a").await.unwrap();

    let all = log.list(None, 10).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].event_id, last.event_id);

    let dev_a = log.list(Some("dev-a"), 10).unwrap();
    assert_eq!(dev_a.len(), 2);
    assert_eq!(dev_a[0].event_type, CommandKind::EndLoadShed);
    assert_eq!(dev_a[1].event_id, first.event_id);

    assert_eq!(log.list(None, 1).unwrap().len(), 1);
}

#[tokio::test]
async fn test_idempotent_append_through_trait() {
    let dir = tempfile::tempdir().unwrap();
    let log = open(&dir);
    let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log.clone());

    let record = dispatcher.read_clock("dev-1").await.unwrap();
    dispatcher.persist(&record).await.unwrap();

    assert_eq!(log.len().unwrap(), 1);
}

#[tokio::test]
async fn test_conflicting_append_is_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let log = open(&dir);
    let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log.clone());

    let mut record = dispatcher.read_clock("dev-1").await.unwrap();
    record.event_data.event_sent = false;

    assert!(matches!(
        log.append(&record).await,
        Err(PersistenceError::Duplicate(_))
    ));
}

#[tokio::test]
async fn test_ack_is_separate_update() {
    let dir = tempfile::tempdir().unwrap();
    let log = open(&dir);
    let dispatcher = CommandDispatcher::new(Arc::new(StubTransport), log.clone());
    let acks = AckHandler::new(log.clone());

    let record = dispatcher.request_connection_info("dev-1").await.unwrap();
    assert!(!log.get(&record.event_id).unwrap().unwrap().event_ack);

    acks.acknowledge(&record.event_id, Some(json!({"rssi": -61})))
        .await
        .unwrap();
    // A late duplicate ack keeps the first one
    acks.acknowledge(&record.event_id, None).await.unwrap();

    let viewed = log.get(&record.event_id).unwrap().unwrap();
    assert!(viewed.event_ack);
    assert_eq!(viewed.event_data, record.event_data);

    let ack = log.get_ack(&record.event_id).unwrap().unwrap();
    assert_eq!(ack.data, Some(json!({"rssi": -61})));
    assert!(log.list(None, 10).unwrap()[0].event_ack);
}

#[tokio::test]
async fn test_ack_for_unknown_event() {
    let dir = tempfile::tempdir().unwrap();
    let acks = AckHandler::new(open(&dir));

    assert!(matches!(
        acks.acknowledge("00000000-0000-0000-0000-000000000000", None)
            .await,
        Err(PersistenceError::UnknownEvent(_))
    ));
}
