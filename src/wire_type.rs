//! Wire types and field headers.
//!
//! A field header is the varint `(field_number << 3) | wire_type`.

use core::fmt;

use crate::error::ErrorKind;

/// Largest field number representable in a 32-bit tag.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// 3-bit framing code of a field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// LEB128 varint (also zigzag-encoded signed values).
    Varint = 0,
    /// 8 bytes, little-endian.
    Fixed64 = 1,
    /// Varint length followed by that many bytes.
    LengthDelimited = 2,
    /// Opens a group; closed by an `EndGroup` tag with the same field number.
    StartGroup = 3,
    /// Closes a group.
    EndGroup = 4,
    /// 4 bytes, little-endian.
    Fixed32 = 5,
}

impl WireType {
    /// Decodes the low three bits of a tag.
    pub fn from_bits(bits: u8) -> Result<Self, ErrorKind> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            3 => Ok(Self::StartGroup),
            4 => Ok(Self::EndGroup),
            5 => Ok(Self::Fixed32),
            other => Err(ErrorKind::InvalidWireType(other)),
        }
    }

    /// Only scalar wire types may be packed into one length-delimited run.
    #[inline]
    pub fn is_packable(self) -> bool {
        matches!(self, Self::Varint | Self::Fixed32 | Self::Fixed64)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Varint => "Varint",
            Self::Fixed64 => "Fixed64",
            Self::LengthDelimited => "LengthDelimited",
            Self::StartGroup => "StartGroup",
            Self::EndGroup => "EndGroup",
            Self::Fixed32 => "Fixed32",
        };
        f.write_str(name)
    }
}

/// A decoded or to-be-written field header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHeader {
    pub field_number: u32,
    pub wire_type: WireType,
}

impl FieldHeader {
    /// Validates the field number range.
    pub fn new(field_number: u32, wire_type: WireType) -> Result<Self, ErrorKind> {
        if field_number == 0 || field_number > MAX_FIELD_NUMBER {
            return Err(ErrorKind::InvalidFieldNumber(u64::from(field_number)));
        }
        Ok(Self { field_number, wire_type })
    }

    /// Packs the header into its tag value.
    #[inline]
    pub fn to_tag(self) -> u32 {
        (self.field_number << 3) | self.wire_type as u32
    }

    /// Splits a tag value into field number and wire type.
    pub fn from_tag(tag: u64) -> Result<Self, ErrorKind> {
        if tag > u64::from(u32::MAX) {
            return Err(ErrorKind::InvalidFieldNumber(tag >> 3));
        }
        let wire_type = WireType::from_bits((tag & 0x7) as u8)?;
        let field_number = tag >> 3;
        if field_number == 0 {
            return Err(ErrorKind::InvalidFieldNumber(0));
        }
        Ok(Self { field_number: field_number as u32, wire_type })
    }
}
