//! Command data structures.
//!
//! Defines the closed set of command kinds, their wire layouts and the
//! typed parameters callers supply for each kind.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::codec;
use crate::error::EncodingError;
use crate::time::to_gps_epoch;

/// Device identifier. Opaque, passed through unmodified.
pub type DeviceId = String;

/// Wire type of a payload field. Multi-byte integers are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U32,
    I16,
}

impl FieldType {
    /// Width in bytes.
    pub const fn width(&self) -> usize {
        match self {
            FieldType::U32 => 4,
            FieldType::I16 => 2,
        }
    }

    /// Inclusive value range.
    pub const fn range(&self) -> (i64, i64) {
        match self {
            FieldType::U32 => (0, u32::MAX as i64),
            FieldType::I16 => (i16::MIN as i64, i16::MAX as i64),
        }
    }
}

/// One declared payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

/// Wire layout of a command kind: opcode byte followed by fixed-width fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub opcode: u8,
    pub fields: &'static [FieldSpec],
}

impl Layout {
    /// Total payload width in bytes, opcode included.
    pub const fn width(&self) -> usize {
        let mut width = 1;
        let mut i = 0;
        while i < self.fields.len() {
            width += self.fields[i].ty.width();
            i += 1;
        }
        width
    }
}

const START_LOAD_SHED_LAYOUT: Layout = Layout {
    opcode: 0x01,
    fields: &[
        FieldSpec {
            name: "start_time",
            ty: FieldType::U32,
        },
        FieldSpec {
            name: "duration",
            ty: FieldType::I16,
        },
    ],
};

const END_LOAD_SHED_LAYOUT: Layout = Layout {
    opcode: 0x02,
    fields: &[],
};

const READ_CLOCK_LAYOUT: Layout = Layout {
    opcode: 0x03,
    fields: &[],
};

const SET_CLOCK_LAYOUT: Layout = Layout {
    opcode: 0x04,
    fields: &[FieldSpec {
        name: "time",
        ty: FieldType::U32,
    }],
};

const REQUEST_CONNECTION_INFO_LAYOUT: Layout = Layout {
    opcode: 0x05,
    fields: &[],
};

/// Supported command kinds. Serialized as the event type name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Schedule a load-shed event
    StartLoadShed,
    /// Cancel a running load-shed event
    EndLoadShed,
    /// Ask the device for its current clock
    ReadClock,
    /// Set the device clock
    SetClock,
    /// Ask the device for connection diagnostics
    RequestConnectionInfo,
}

impl CommandKind {
    /// Every kind, in opcode order.
    pub const ALL: [CommandKind; 5] = [
        CommandKind::StartLoadShed,
        CommandKind::EndLoadShed,
        CommandKind::ReadClock,
        CommandKind::SetClock,
        CommandKind::RequestConnectionInfo,
    ];

    /// Get the wire layout.
    pub const fn layout(&self) -> &'static Layout {
        match self {
            CommandKind::StartLoadShed => &START_LOAD_SHED_LAYOUT,
            CommandKind::EndLoadShed => &END_LOAD_SHED_LAYOUT,
            CommandKind::ReadClock => &READ_CLOCK_LAYOUT,
            CommandKind::SetClock => &SET_CLOCK_LAYOUT,
            CommandKind::RequestConnectionInfo => &REQUEST_CONNECTION_INFO_LAYOUT,
        }
    }

    pub const fn opcode(&self) -> u8 {
        self.layout().opcode
    }

    /// Fixed payload width in bytes.
    pub const fn width(&self) -> usize {
        self.layout().width()
    }

    /// Get kind from its opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.opcode() == opcode)
    }

    /// Get the event type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            CommandKind::StartLoadShed => "START_LOAD_SHED",
            CommandKind::EndLoadShed => "END_LOAD_SHED",
            CommandKind::ReadClock => "READ_CLOCK",
            CommandKind::SetClock => "SET_CLOCK",
            CommandKind::RequestConnectionInfo => "REQUEST_CONNECTION_INFO",
        }
    }

    /// Whether sending the command twice has the same device-side effect as once.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            CommandKind::ReadClock | CommandKind::RequestConnectionInfo
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl FromStr for CommandKind {
    type Err = String;

    /// Accepts the event type name or its kebab-case form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == normalized)
            .ok_or_else(|| format!("unknown command kind: {}", s))
    }
}

/// Parameters of a start-load-shed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartLoadShed {
    /// When the shed begins (None = immediately)
    pub start_time: Option<DateTime<Utc>>,
    /// Shed duration, as understood by the device firmware
    pub duration: i32,
}

/// A typed command intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartLoadShed(StartLoadShed),
    EndLoadShed,
    ReadClock,
    SetClock { time: DateTime<Utc> },
    RequestConnectionInfo,
}

impl Command {
    /// Start-load-shed command.
    pub fn start_load_shed(start_time: Option<DateTime<Utc>>, duration: i32) -> Self {
        Command::StartLoadShed(StartLoadShed {
            start_time,
            duration,
        })
    }

    /// Get the command kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StartLoadShed(_) => CommandKind::StartLoadShed,
            Command::EndLoadShed => CommandKind::EndLoadShed,
            Command::ReadClock => CommandKind::ReadClock,
            Command::SetClock { .. } => CommandKind::SetClock,
            Command::RequestConnectionInfo => CommandKind::RequestConnectionInfo,
        }
    }

    /// Encode into the fixed-width wire payload.
    pub fn encode(&self) -> Result<Bytes, EncodingError> {
        codec::encode(self)
    }

    /// Kind-specific fields recorded in the event data.
    pub fn event_fields(&self) -> Result<Map<String, Value>, EncodingError> {
        let mut fields = Map::new();
        match self {
            Command::StartLoadShed(params) => {
                fields.insert(
                    "start_time".to_string(),
                    params.start_time.map(rfc3339).map_or(Value::Null, Value::from),
                );
                fields.insert(
                    "start_time_epoch".to_string(),
                    json!(to_gps_epoch(params.start_time)?),
                );
                fields.insert("duration".to_string(), json!(params.duration));
            }
            Command::SetClock { time } => {
                fields.insert("time".to_string(), json!(rfc3339(*time)));
                fields.insert("time_epoch".to_string(), json!(to_gps_epoch(Some(*time))?));
            }
            Command::EndLoadShed | Command::ReadClock | Command::RequestConnectionInfo => {}
        }
        Ok(fields)
    }
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
