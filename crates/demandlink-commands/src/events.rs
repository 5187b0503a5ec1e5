//! Event records for issued commands.
//!
//! Every dispatched command produces exactly one [`EventRecord`]. Records are
//! immutable once built; acknowledgment arrives later as a separate
//! [`EventAck`] keyed by the same event id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::command::{CommandKind, DeviceId};

/// Unique event identifier (UUID v4 string).
pub type EventId = String;

/// Event type. One per command kind.
pub type EventType = CommandKind;

/// Command-specific event data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventData {
    /// Target device ID
    pub device_id: DeviceId,
    /// Kind-specific parameter fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Whether the transport accepted the payload
    pub event_sent: bool,
}

/// Durable record of one command issuance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Event ID
    pub event_id: EventId,
    /// Event type
    pub event_type: EventType,
    /// Event data
    pub event_data: EventData,
    /// Whether the device has acknowledged the command
    pub event_ack: bool,
}

impl EventRecord {
    /// Create a new, unacknowledged record with a fresh event id.
    pub fn new(
        event_type: EventType,
        device_id: DeviceId,
        fields: Map<String, Value>,
        event_sent: bool,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            event_data: EventData {
                device_id,
                fields,
                event_sent,
            },
            event_ack: false,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.event_data.device_id
    }

    pub fn was_sent(&self) -> bool {
        self.event_data.event_sent
    }

    /// View of this record with an acknowledgment folded in.
    ///
    /// Used by readers that join records with their acks; the stored record
    /// itself is never rewritten.
    pub fn acknowledged_view(&self) -> Self {
        Self {
            event_ack: true,
            ..self.clone()
        }
    }
}

/// Acknowledgment update for a previously recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventAck {
    /// Acknowledged event ID
    pub event_id: EventId,
    /// When the acknowledgment was recorded
    pub acknowledged_at: DateTime<Utc>,
    /// Device response data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventAck {
    pub fn new(event_id: EventId, data: Option<Value>) -> Self {
        Self {
            event_id,
            acknowledged_at: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_new() {
        let record =
            EventRecord::new(CommandKind::ReadClock, "dev-1".to_string(), Map::new(), true);

        assert!(Uuid::parse_str(&record.event_id).is_ok());
        assert_eq!(record.event_type, CommandKind::ReadClock);
        assert_eq!(record.device_id(), "dev-1");
        assert!(record.was_sent());
        assert!(!record.event_ack);
    }

    #[test]
    fn test_event_ids_unique() {
        let a = EventRecord::new(CommandKind::ReadClock, "d".to_string(), Map::new(), true);
        let b = EventRecord::new(CommandKind::ReadClock, "d".to_string(), Map::new(), true);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_serialized_shape() {
        let mut fields = Map::new();
        fields.insert("duration".to_string(), json!(120));
        let record = EventRecord::new(
            CommandKind::StartLoadShed,
            "dev-2".to_string(),
            fields,
            false,
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event_type"], "START_LOAD_SHED");
        assert_eq!(value["event_data"]["device_id"], "dev-2");
        assert_eq!(value["event_data"]["duration"], 120);
        assert_eq!(value["event_data"]["event_sent"], false);
        assert_eq!(value["event_ack"], false);
        assert_eq!(value.as_object().unwrap().len(), 4);

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_acknowledged_view() {
        let record = EventRecord::new(CommandKind::SetClock, "d".to_string(), Map::new(), true);
        let view = record.acknowledged_view();
        assert!(view.event_ack);
        assert_eq!(view.event_id, record.event_id);
        assert!(!record.event_ack);
    }
}
