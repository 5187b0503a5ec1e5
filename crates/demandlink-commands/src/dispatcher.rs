//! Command dispatch: encode, send, record.
//!
//! Every command kind flows through [`CommandDispatcher::dispatch`]:
//!
//! 1. encode the command (no I/O on failure)
//! 2. hand the payload to the transport
//! 3. build an [`EventRecord`] describing the outcome
//! 4. append it to the event log
//!
//! Nothing is retried internally. A persistence failure carries the built
//! record so the caller can retry [`CommandDispatcher::persist`] without
//! sending the command again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::adapter::DeviceTransport;
use crate::command::Command;
use crate::error::{DispatchError, PersistenceError};
use crate::events::EventRecord;
use crate::log::EventLog;

/// Orchestrates command dispatch against an injected transport and event log.
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn DeviceTransport>,
    log: Arc<dyn EventLog>,
}

impl CommandDispatcher {
    /// Create a new dispatcher.
    pub fn new(transport: Arc<dyn DeviceTransport>, log: Arc<dyn EventLog>) -> Self {
        Self { transport, log }
    }

    /// Dispatch a command to a device and record the outcome.
    pub async fn dispatch(
        &self,
        device_id: &str,
        command: Command,
    ) -> Result<EventRecord, DispatchError> {
        let kind = command.kind();

        let payload = command.encode()?;
        let fields = command.event_fields()?;
        debug!(
            device_id = %device_id,
            kind = %kind,
            payload_len = payload.len(),
            "Encoded command"
        );

        let sent = self.transport.send(device_id, payload).await.map_err(|e| {
            error!(device_id = %device_id, kind = %kind, "Transport fault: {}", e);
            e
        })?;
        if !sent {
            warn!(device_id = %device_id, kind = %kind, "Command not accepted for delivery");
        }

        let record = EventRecord::new(kind, device_id.to_string(), fields, sent);

        if let Err(source) = self.log.append(&record).await {
            error!(
                device_id = %device_id,
                event_id = %record.event_id,
                "Failed to persist event: {}", source
            );
            return Err(DispatchError::Persistence {
                record: Box::new(record),
                source,
            });
        }

        info!(
            device_id = %device_id,
            event_id = %record.event_id,
            kind = %kind,
            sent,
            "Command dispatched"
        );
        Ok(record)
    }

    /// Retry persistence of a record whose dispatch already sent the payload.
    pub async fn persist(&self, record: &EventRecord) -> Result<(), PersistenceError> {
        self.log.append(record).await
    }

    /// Ask a device for its current clock.
    pub async fn read_clock(&self, device_id: &str) -> Result<EventRecord, DispatchError> {
        self.dispatch(device_id, Command::ReadClock).await
    }

    /// Ask a device for connection diagnostics.
    pub async fn request_connection_info(
        &self,
        device_id: &str,
    ) -> Result<EventRecord, DispatchError> {
        self.dispatch(device_id, Command::RequestConnectionInfo).await
    }

    /// Schedule a load shed. `None` start time means "start now".
    pub async fn start_load_shed(
        &self,
        device_id: &str,
        start_time: Option<DateTime<Utc>>,
        duration: i32,
    ) -> Result<EventRecord, DispatchError> {
        self.dispatch(device_id, Command::start_load_shed(start_time, duration))
            .await
    }

    /// Cancel a running load shed.
    pub async fn end_load_shed(&self, device_id: &str) -> Result<EventRecord, DispatchError> {
        self.dispatch(device_id, Command::EndLoadShed).await
    }

    /// Set the device clock.
    pub async fn set_clock(
        &self,
        device_id: &str,
        time: DateTime<Utc>,
    ) -> Result<EventRecord, DispatchError> {
        self.dispatch(device_id, Command::SetClock { time }).await
    }
}
