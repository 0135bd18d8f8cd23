//! TraCI wire encoding: big-endian primitives, typed values and command framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::infra::SimError;

/// A typed value as it appears in variable responses and subscription results.
#[derive(Debug, Clone, PartialEq)]
pub enum TraciValue {
    UByte(u8),
    Byte(i8),
    Int(i32),
    Double(f64),
    Str(String),
    StrList(Vec<String>),
    DoubleList(Vec<f64>),
    Position2D(f64, f64),
    Position3D(f64, f64, f64),
    RoadMapPosition { edge: String, pos: f64, lane: u8 },
    Color([u8; 4]),
    Compound(Vec<TraciValue>),
}

impl TraciValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraciValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraciValue::Double(v) => Some(*v),
            TraciValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Outgoing command content. Values written with `put_typed_*` carry their
/// type marker, the plain `put_*` methods write raw payload.
#[derive(Debug, Default)]
pub struct CommandWriter {
    buf: BytesMut,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64(value);
        self
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.buf.put_i32(value.len() as i32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    pub fn put_typed_byte(&mut self, value: i8) -> &mut Self {
        self.put_u8(TYPE_BYTE);
        self.buf.put_i8(value);
        self
    }

    pub fn put_typed_ubyte(&mut self, value: u8) -> &mut Self {
        self.put_u8(TYPE_UBYTE).put_u8(value)
    }

    pub fn put_typed_int(&mut self, value: i32) -> &mut Self {
        self.put_u8(TYPE_INTEGER).put_i32(value)
    }

    pub fn put_typed_str(&mut self, value: &str) -> &mut Self {
        self.put_u8(TYPE_STRING).put_str(value)
    }

    pub fn put_typed_str_list<S: AsRef<str>>(&mut self, values: &[S]) -> &mut Self {
        self.put_u8(TYPE_STRINGLIST).put_i32(values.len() as i32);
        for value in values {
            self.put_str(value.as_ref());
        }
        self
    }

    pub fn put_compound_header(&mut self, items: i32) -> &mut Self {
        self.put_u8(TYPE_COMPOUND).put_i32(items)
    }

    pub fn put_roadmap_position(&mut self, edge: &str, pos: f64, lane: u8) -> &mut Self {
        self.put_u8(POSITION_ROADMAP)
            .put_str(edge)
            .put_f64(pos)
            .put_u8(lane)
    }

    /// Append already encoded content, e.g. request parameters.
    pub fn append(mut self, other: CommandWriter) -> Self {
        self.buf.put_slice(&other.buf);
        self
    }

    /// Frame the content as a single command with the given id.
    pub fn into_command(self, command_id: u8) -> Bytes {
        let content = self.buf.freeze();
        let mut out = BytesMut::with_capacity(content.len() + 6);
        if content.len() + 2 <= 255 {
            out.put_u8((content.len() + 2) as u8);
        } else {
            out.put_u8(0);
            out.put_i32((content.len() + 6) as i32);
        }
        out.put_u8(command_id);
        out.put_slice(&content);
        out.freeze()
    }
}

/// Wrap one or more framed commands into a message with its length prefix.
pub fn frame_message(commands: &[Bytes]) -> Bytes {
    let body_len: usize = commands.iter().map(|c| c.len()).sum();
    let mut out = BytesMut::with_capacity(body_len + 4);
    out.put_u32((body_len + 4) as u32);
    for command in commands {
        out.put_slice(command);
    }
    out.freeze()
}

/// Checked reader over a response message.
#[derive(Debug, Clone)]
pub struct Storage {
    buf: Bytes,
}

impl Storage {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, len: usize, what: &str) -> Result<(), SimError> {
        if self.buf.remaining() < len {
            return Err(SimError::Protocol(format!(
                "truncated message reading {} ({} of {} bytes left)",
                what,
                self.buf.remaining(),
                len
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, SimError> {
        self.need(1, "ubyte")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, SimError> {
        self.need(1, "byte")?;
        Ok(self.buf.get_i8())
    }

    pub fn read_i32(&mut self) -> Result<i32, SimError> {
        self.need(4, "int")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_f64(&mut self) -> Result<f64, SimError> {
        self.need(8, "double")?;
        Ok(self.buf.get_f64())
    }

    fn read_len(&mut self, what: &str) -> Result<usize, SimError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| SimError::Protocol(format!("negative {} length", what)))
    }

    pub fn read_string(&mut self) -> Result<String, SimError> {
        let len = self.read_len("string")?;
        self.need(len, "string")?;
        let raw = self.buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| SimError::Protocol(format!("invalid utf-8 in string: {}", e)))
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>, SimError> {
        let count = self.read_len("string list")?;
        (0..count).map(|_| self.read_string()).collect()
    }

    /// Read a type marker followed by its value.
    pub fn read_typed(&mut self) -> Result<TraciValue, SimError> {
        let type_id = self.read_u8()?;
        self.read_value(type_id)
    }

    pub fn read_value(&mut self, type_id: u8) -> Result<TraciValue, SimError> {
        let value = match type_id {
            TYPE_UBYTE => TraciValue::UByte(self.read_u8()?),
            TYPE_BYTE => TraciValue::Byte(self.read_i8()?),
            TYPE_INTEGER => TraciValue::Int(self.read_i32()?),
            TYPE_DOUBLE => TraciValue::Double(self.read_f64()?),
            TYPE_STRING => TraciValue::Str(self.read_string()?),
            TYPE_STRINGLIST => TraciValue::StrList(self.read_string_list()?),
            TYPE_DOUBLELIST => {
                let count = self.read_len("double list")?;
                TraciValue::DoubleList((0..count).map(|_| self.read_f64()).collect::<Result<_, _>>()?)
            }
            POSITION_2D => TraciValue::Position2D(self.read_f64()?, self.read_f64()?),
            POSITION_3D => {
                TraciValue::Position3D(self.read_f64()?, self.read_f64()?, self.read_f64()?)
            }
            POSITION_ROADMAP => TraciValue::RoadMapPosition {
                edge: self.read_string()?,
                pos: self.read_f64()?,
                lane: self.read_u8()?,
            },
            TYPE_COLOR => TraciValue::Color([
                self.read_u8()?,
                self.read_u8()?,
                self.read_u8()?,
                self.read_u8()?,
            ]),
            TYPE_COMPOUND => {
                let count = self.read_len("compound")?;
                TraciValue::Compound((0..count).map(|_| self.read_typed()).collect::<Result<_, _>>()?)
            }
            other => {
                return Err(SimError::Protocol(format!("unsupported value type 0x{:02x}", other)));
            }
        };
        Ok(value)
    }

    /// Split off the next framed command. Returns its id and content.
    pub fn read_command(&mut self) -> Result<(u8, Storage), SimError> {
        let short_len = self.read_u8()?;
        let content_len = if short_len == 0 {
            let total = self.read_len("command")?;
            total
                .checked_sub(6)
                .ok_or_else(|| SimError::Protocol(format!("command length {} too small", total)))?
        } else {
            (short_len as usize)
                .checked_sub(2)
                .ok_or_else(|| SimError::Protocol(format!("command length {} too small", short_len)))?
        };
        let command_id = self.read_u8()?;
        self.need(content_len, "command content")?;
        Ok((command_id, Storage::new(self.buf.copy_to_bytes(content_len))))
    }
}

/// Status part of every answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub command_id: u8,
    pub result: u8,
    pub description: String,
}

impl Status {
    pub fn read(storage: &mut Storage) -> Result<Self, SimError> {
        let (command_id, mut content) = storage.read_command()?;
        Ok(Self {
            command_id,
            result: content.read_u8()?,
            description: content.read_string()?,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.result == RTYPE_OK
    }
}

/// One variable subscription block: object id plus the variables that
/// resolved successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionBlock {
    pub response_id: u8,
    pub object_id: String,
    pub values: Vec<(u8, TraciValue)>,
}

impl SubscriptionBlock {
    /// Parse a variable subscription response body. Variables reported with a
    /// non-OK status carry an error string and are dropped.
    pub fn read(response_id: u8, content: &mut Storage) -> Result<Self, SimError> {
        let object_id = content.read_string()?;
        let count = content.read_u8()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let var_id = content.read_u8()?;
            let status = content.read_u8()?;
            let value = content.read_typed()?;
            if status == RTYPE_OK {
                values.push((var_id, value));
            }
        }
        Ok(Self {
            response_id,
            object_id,
            values,
        })
    }
}

pub fn is_variable_subscription_response(response_id: u8) -> bool {
    (RESPONSE_SUBSCRIBE_FIRST_VARIABLE..=RESPONSE_SUBSCRIBE_LAST_VARIABLE).contains(&response_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_command_framing() {
        let mut writer = CommandWriter::new();
        writer.put_f64(0.0);
        let command = writer.into_command(CMD_SIMSTEP);

        assert_eq!(command.len(), 10);
        assert_eq!(command[0], 10);
        assert_eq!(command[1], CMD_SIMSTEP);

        let message = frame_message(&[command]);
        assert_eq!(&message[..4], &14u32.to_be_bytes());
    }

    #[test]
    fn test_long_command_uses_extended_length() {
        let mut writer = CommandWriter::new();
        let edges: Vec<String> = (0..40).map(|i| format!("edge_{}", i)).collect();
        writer.put_u8(VAR_ROUTE).put_str("EGO_0").put_typed_str_list(&edges);
        let command = writer.into_command(CMD_SET_VEHICLE_VARIABLE);

        assert_eq!(command[0], 0);
        let total = i32::from_be_bytes([command[1], command[2], command[3], command[4]]);
        assert_eq!(total as usize, command.len());

        let mut storage = Storage::new(command);
        let (id, content) = storage.read_command().unwrap();
        assert_eq!(id, CMD_SET_VEHICLE_VARIABLE);
        assert_eq!(content.remaining(), total as usize - 6);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_status_error_is_parsed() {
        let mut raw = BytesMut::new();
        let description = "Vehicle 'EGO_3' is not known";
        raw.put_u8((2 + 1 + 4 + description.len()) as u8);
        raw.put_u8(CMD_GET_VEHICLE_VARIABLE);
        raw.put_u8(RTYPE_ERR);
        raw.put_i32(description.len() as i32);
        raw.put_slice(description.as_bytes());

        let status = Status::read(&mut Storage::new(raw.freeze())).unwrap();
        assert_eq!(status.command_id, CMD_GET_VEHICLE_VARIABLE);
        assert!(!status.is_ok());
        assert_eq!(status.description, description);
    }

    #[test]
    fn test_subscription_block_drops_failed_variables() {
        let mut raw = BytesMut::new();
        raw.put_i32(5);
        raw.put_slice(b"EGO_0");
        raw.put_u8(2);
        // road id resolved
        raw.put_u8(VAR_ROAD_ID);
        raw.put_u8(RTYPE_OK);
        raw.put_u8(TYPE_STRING);
        raw.put_i32(2);
        raw.put_slice(b"E4");
        // speed failed, payload is an error string
        raw.put_u8(VAR_SPEED);
        raw.put_u8(RTYPE_ERR);
        raw.put_u8(TYPE_STRING);
        raw.put_i32(3);
        raw.put_slice(b"n/a");

        let block = SubscriptionBlock::read(
            RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE,
            &mut Storage::new(raw.freeze()),
        )
        .unwrap();

        assert_eq!(block.object_id, "EGO_0");
        assert_eq!(block.values, vec![(VAR_ROAD_ID, TraciValue::Str("E4".to_string()))]);
    }

    #[test]
    fn test_truncated_double_is_protocol_error() {
        let mut storage = Storage::new(Bytes::from_static(&[TYPE_DOUBLE, 0, 0, 0]));
        assert!(matches!(storage.read_typed(), Err(SimError::Protocol(_))));
    }

    #[test]
    fn test_compound_with_position() {
        let mut raw = BytesMut::new();
        raw.put_u8(TYPE_COMPOUND);
        raw.put_i32(2);
        raw.put_u8(POSITION_2D);
        raw.put_f64(1.5);
        raw.put_f64(-2.0);
        raw.put_u8(TYPE_INTEGER);
        raw.put_i32(7);

        let value = Storage::new(raw.freeze()).read_typed().unwrap();
        assert_eq!(
            value,
            TraciValue::Compound(vec![TraciValue::Position2D(1.5, -2.0), TraciValue::Int(7)])
        );
    }
}
