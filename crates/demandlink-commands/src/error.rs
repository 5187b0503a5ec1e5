//! Error types for command encoding, dispatch and persistence.

use thiserror::Error;

use crate::events::{EventId, EventRecord};

/// Payload encoding error. Raised before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Timestamp falls outside the range of the 32-bit GPS epoch counter, or
    /// lands on the reserved "no time" value.
    #[error("time out of range: {seconds}s from GPS epoch is outside 1..=u32::MAX")]
    TimeOutOfRange { seconds: i64 },

    /// A field value exceeds the range of its declared wire type.
    #[error("field overflow: {field} = {value} does not fit its wire type")]
    FieldOverflow { field: &'static str, value: i64 },

    /// An encoder wrote fields that disagree with the kind's declared layout.
    #[error("layout mismatch for {kind}: {reason}")]
    LayoutMismatch { kind: &'static str, reason: String },
}

/// Payload decoding error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("invalid length for {kind}: expected {expected} bytes, found {found}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{kind} payload carries no time")]
    MissingTime { kind: &'static str },
}

/// Unrecoverable transport fault.
///
/// A send that merely was not accepted is reported as `Ok(false)`, not as this error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid gateway endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Request could not be built: {0}")]
    Request(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Event log persistence error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The event id is already stored with different content.
    #[error("Event {0} already stored with different content")]
    Duplicate(EventId),

    /// Acknowledgment for an event the log has never seen.
    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

/// Dispatch error, one variant per failing step.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Encoding failed; nothing was sent or recorded.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    /// Transport fault; the device-side effect is indeterminate.
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The send step completed but the record could not be persisted.
    /// Carries the record so persistence can be retried without resending.
    #[error("Persisting event {} failed: {source}", .record.event_id)]
    Persistence {
        record: Box<EventRecord>,
        #[source]
        source: PersistenceError,
    },
}

impl DispatchError {
    /// Whether re-running the whole dispatch is safe.
    ///
    /// Transport faults are only safe to retry for idempotent kinds, and a
    /// persistence failure must be retried with `CommandDispatcher::persist`.
    pub fn is_retry_safe(&self, kind: crate::command::CommandKind) -> bool {
        match self {
            DispatchError::Encoding(_) => true,
            DispatchError::Transport(_) => kind.is_idempotent(),
            DispatchError::Persistence { .. } => false,
        }
    }

    /// The record that failed to persist, if any.
    pub fn unpersisted_record(&self) -> Option<&EventRecord> {
        match self {
            DispatchError::Persistence { record, .. } => Some(record),
            _ => None,
        }
    }
}
