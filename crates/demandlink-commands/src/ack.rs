//! Command acknowledgment handling.
//!
//! Device confirmations arrive after dispatch, through a separate inbound
//! path. They are recorded as [`EventAck`] updates against the original event
//! id; the dispatched record itself is never rewritten.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::events::EventAck;
use crate::log::EventLog;

/// Records acknowledgments for dispatched commands.
#[derive(Clone)]
pub struct AckHandler {
    log: Arc<dyn EventLog>,
}

impl AckHandler {
    /// Create a new acknowledgment handler.
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Record that the device executed the command behind `event_id`.
    pub async fn acknowledge(
        &self,
        event_id: &str,
        data: Option<serde_json::Value>,
    ) -> Result<EventAck, PersistenceError> {
        let ack = EventAck::new(event_id.to_string(), data);

        match self.log.append_ack(&ack).await {
            Ok(()) => {
                info!(event_id = %event_id, "Command acknowledged");
                Ok(ack)
            }
            Err(e) => {
                warn!(event_id = %event_id, "Failed to record acknowledgment: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::events::EventRecord;
    use crate::log::MemoryEventLog;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn test_acknowledge_recorded_event() {
        let log = Arc::new(MemoryEventLog::new());
        let record =
            EventRecord::new(CommandKind::ReadClock, "dev-1".to_string(), Map::new(), true);
        log.append(&record).await.unwrap();

        let handler = AckHandler::new(log.clone());
        let ack = handler
            .acknowledge(&record.event_id, Some(json!({"clock": 1388102418})))
            .await
            .unwrap();

        assert_eq!(ack.event_id, record.event_id);
        assert!(log.get(&record.event_id).await.unwrap().event_ack);
        assert_eq!(
            log.get_ack(&record.event_id).await.unwrap().data,
            Some(json!({"clock": 1388102418}))
        );
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_event() {
        let handler = AckHandler::new(Arc::new(MemoryEventLog::new()));
        assert!(matches!(
            handler.acknowledge("missing", None).await,
            Err(PersistenceError::UnknownEvent(_))
        ));
    }
}
