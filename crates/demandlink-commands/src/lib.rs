//! Command/event protocol layer for demand-response devices.
//!
//! Provides:
//! - GPS epoch time codec
//! - Fixed-width binary command payloads
//! - Transport boundary and the HTTP gateway adapter
//! - Append-only event log boundary and an in-memory log
//! - Command dispatch (encode, send, record)
//! - Acknowledgment updates for recorded events

pub mod ack;
pub mod adapter;
pub mod codec;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod log;
pub mod time;

// Re-exports
pub use command::{Command, CommandKind, DeviceId, FieldSpec, FieldType, Layout, StartLoadShed};

pub use codec::decode;

pub use error::{DecodeError, DispatchError, EncodingError, PersistenceError, TransportError};

pub use events::{EventAck, EventData, EventId, EventRecord, EventType};

pub use adapter::{DeviceTransport, HttpGatewayConfig, HttpGatewayTransport};

pub use log::{EventLog, MemoryEventLog};

pub use dispatcher::CommandDispatcher;

pub use ack::AckHandler;
