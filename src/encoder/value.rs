//! Scalar payloads.

use std::io::Write;

use super::{Encoder, mismatch};
use crate::error::Result;
use crate::schema::ItemKind;
use crate::value::Value;
use crate::writer::ProtoWriter;

impl Encoder<'_> {
    /// Writes the payload of a scalar value (header already written).
    ///
    /// `int32` and `enum` use sign-extended varints, `sint*` zigzag, the
    /// fixed kinds little-endian.
    pub(super) fn write_scalar<W: Write>(&self, w: &mut ProtoWriter<W>, kind: ItemKind, value: &Value) -> Result<()> {
        match (kind, value) {
            (ItemKind::Bool, Value::Bool(b)) => w.write_varint(u64::from(*b)),
            (ItemKind::Int32, Value::I32(v)) => w.write_int32(*v),
            (ItemKind::Int64, Value::I64(v)) => w.write_varint(*v as u64),
            (ItemKind::UInt32, Value::U32(v)) => w.write_varint(u64::from(*v)),
            (ItemKind::UInt64, Value::U64(v)) => w.write_varint(*v),
            (ItemKind::SInt32, Value::I32(v)) => w.write_zigzag(i64::from(*v)),
            (ItemKind::SInt64, Value::I64(v)) => w.write_zigzag(*v),
            (ItemKind::Fixed32, Value::U32(v)) => w.write_fixed32(*v),
            (ItemKind::Fixed64, Value::U64(v)) => w.write_fixed64(*v),
            (ItemKind::SFixed32, Value::I32(v)) => w.write_fixed32(*v as u32),
            (ItemKind::SFixed64, Value::I64(v)) => w.write_fixed64(*v as u64),
            (ItemKind::Float, Value::F32(v)) => w.write_fixed32(v.to_bits()),
            (ItemKind::Double, Value::F64(v)) => w.write_fixed64(v.to_bits()),
            (ItemKind::String, Value::String(s)) => w.write_string(s),
            (ItemKind::Bytes, Value::Bytes(b)) => w.write_bytes(b),
            (ItemKind::Enum(index), Value::Enum(raw)) => {
                let wire = self.model.enum_map(index)?.to_wire(*raw).map_err(|k| w.fail(k))?;
                w.write_varint(wire as u64);
            }
            (kind, value) => return Err(mismatch(w, kind.name(), value)),
        }
        Ok(())
    }
}
