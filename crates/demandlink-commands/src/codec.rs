//! Fixed-width payload codec.
//!
//! Every payload is the kind's opcode byte followed by the fields of its
//! [`Layout`] in declared order, big-endian, with no padding, length prefix or
//! checksum.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{Command, CommandKind, FieldType, Layout, StartLoadShed};
use crate::error::{DecodeError, EncodingError};
use crate::time::{from_gps_epoch, to_gps_epoch};

/// Encode a command into its wire payload.
pub fn encode(command: &Command) -> Result<Bytes, EncodingError> {
    match command {
        Command::StartLoadShed(params) => encode_start_load_shed(params),
        Command::EndLoadShed => encode_opcode_only(CommandKind::EndLoadShed),
        Command::ReadClock => encode_opcode_only(CommandKind::ReadClock),
        Command::SetClock { time } => {
            let mut writer = PayloadWriter::new(CommandKind::SetClock);
            writer.put(i64::from(to_gps_epoch(Some(*time))?))?;
            writer.finish()
        }
        Command::RequestConnectionInfo => encode_opcode_only(CommandKind::RequestConnectionInfo),
    }
}

fn encode_opcode_only(kind: CommandKind) -> Result<Bytes, EncodingError> {
    PayloadWriter::new(kind).finish()
}

fn encode_start_load_shed(params: &StartLoadShed) -> Result<Bytes, EncodingError> {
    let mut writer = PayloadWriter::new(CommandKind::StartLoadShed);
    writer.put(i64::from(to_gps_epoch(params.start_time)?))?;
    writer.put(i64::from(params.duration))?;
    writer.finish()
}

/// Writes fields in layout order, range-checking each against its wire type.
struct PayloadWriter {
    kind: CommandKind,
    layout: &'static Layout,
    next_field: usize,
    buf: BytesMut,
}

impl PayloadWriter {
    fn new(kind: CommandKind) -> Self {
        let layout = kind.layout();
        let mut buf = BytesMut::with_capacity(layout.width());
        buf.put_u8(layout.opcode);
        Self {
            kind,
            layout,
            next_field: 0,
            buf,
        }
    }

    fn put(&mut self, value: i64) -> Result<(), EncodingError> {
        let Some(field) = self.layout.fields.get(self.next_field) else {
            return Err(EncodingError::LayoutMismatch {
                kind: self.kind.type_name(),
                reason: format!("more than {} fields written", self.layout.fields.len()),
            });
        };

        let (min, max) = field.ty.range();
        if value < min || value > max {
            return Err(EncodingError::FieldOverflow {
                field: field.name,
                value,
            });
        }

        match field.ty {
            FieldType::U32 => self.buf.put_u32(value as u32),
            FieldType::I16 => self.buf.put_i16(value as i16),
        }
        self.next_field += 1;
        Ok(())
    }

    fn finish(self) -> Result<Bytes, EncodingError> {
        if self.next_field != self.layout.fields.len() {
            return Err(EncodingError::LayoutMismatch {
                kind: self.kind.type_name(),
                reason: format!(
                    "{} of {} fields written",
                    self.next_field,
                    self.layout.fields.len()
                ),
            });
        }
        Ok(self.buf.freeze())
    }
}

/// Decode a wire payload back into a command.
///
/// A zero start time decodes as "no start time".
pub fn decode(payload: &[u8]) -> Result<Command, DecodeError> {
    let Some(&opcode) = payload.first() else {
        return Err(DecodeError::Empty);
    };
    let kind = CommandKind::from_opcode(opcode).ok_or(DecodeError::UnknownOpcode(opcode))?;
    if payload.len() != kind.width() {
        return Err(DecodeError::InvalidLength {
            kind: kind.type_name(),
            expected: kind.width(),
            found: payload.len(),
        });
    }

    let mut fields = &payload[1..];
    let command = match kind {
        CommandKind::StartLoadShed => {
            let start_time = from_gps_epoch(fields.get_u32());
            let duration = i32::from(fields.get_i16());
            Command::StartLoadShed(StartLoadShed {
                start_time,
                duration,
            })
        }
        CommandKind::EndLoadShed => Command::EndLoadShed,
        CommandKind::ReadClock => Command::ReadClock,
        CommandKind::SetClock => match from_gps_epoch(fields.get_u32()) {
            Some(time) => Command::SetClock { time },
            None => {
                return Err(DecodeError::MissingTime {
                    kind: kind.type_name(),
                });
            }
        },
        CommandKind::RequestConnectionInfo => Command::RequestConnectionInfo,
    };
    Ok(command)
}
