//! Scalar payloads.

use super::Decoder;
use crate::error::{ErrorKind, Result};
use crate::reader::ProtoReader;
use crate::schema::ItemKind;
use crate::value::Value;
use crate::varint;

impl Decoder<'_> {
    /// Reads the payload of a scalar item (header or packed run already open).
    pub(super) fn read_scalar(&self, r: &mut ProtoReader<'_>, kind: ItemKind) -> Result<Value> {
        Ok(match kind {
            ItemKind::Bool => Value::Bool(r.read_varint()? != 0),
            ItemKind::Int32 => Value::I32(r.read_int32()?),
            ItemKind::Int64 => Value::I64(r.read_varint()? as i64),
            ItemKind::UInt32 => Value::U32(r.read_varint()? as u32),
            ItemKind::UInt64 => Value::U64(r.read_varint()?),
            ItemKind::SInt32 => Value::I32(varint::zigzag_decode_32(r.read_varint()? as u32)),
            ItemKind::SInt64 => Value::I64(r.read_zigzag()?),
            ItemKind::Fixed32 => Value::U32(r.read_fixed32()?),
            ItemKind::Fixed64 => Value::U64(r.read_fixed64()?),
            ItemKind::SFixed32 => Value::I32(r.read_fixed32()? as i32),
            ItemKind::SFixed64 => Value::I64(r.read_fixed64()? as i64),
            ItemKind::Float => Value::F32(f32::from_bits(r.read_fixed32()?)),
            ItemKind::Double => Value::F64(f64::from_bits(r.read_fixed64()?)),
            ItemKind::String => Value::String(r.read_string()?.to_owned()),
            ItemKind::Bytes => Value::Bytes(r.read_bytes()?.to_vec()),
            ItemKind::Enum(index) => {
                let wire = r.read_varint()? as i64;
                let raw = self.model.enum_map(index)?.from_wire(wire).map_err(|k| r.fail(k))?;
                Value::Enum(raw)
            }
            ItemKind::Message(_) => {
                return Err(r.fail(ErrorKind::ValueKindMismatch { expected: "scalar", found: "Message" }));
            }
        })
    }
}
