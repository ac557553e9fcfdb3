//! Read side of the wire codec.
//!
//! [`ProtoReader`] turns a byte slice into (field header, payload) events.
//! `read_field_header` returns 0 at the end of the current region: the end of
//! a length-delimited frame, the matching end-group tag of a group, or the end
//! of the input at top level. Every malformed input aborts with a
//! `StreamCorruption` error carrying field, wire type, offset and depth.

use crate::error::{Error, ErrorContext, ErrorKind, Result};
use crate::options::CodecOptions;
use crate::varint;
use crate::wire_type::{FieldHeader, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadFrame {
    /// Limit of the enclosing region, restored on close.
    Length { outer_end: usize },
    /// `closed` wird gesetzt, sobald das passende End-Group-Tag gelesen wurde.
    Group { field_number: u32, closed: bool },
}

/// Handle for a region opened by [`ProtoReader::start_sub_item`].
#[must_use = "every sub-item must be closed with end_sub_item"]
#[derive(Debug, PartialEq, Eq)]
pub struct ReadToken {
    depth: u32,
}

/// Wire codec reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ProtoReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Ende der aktuellen Region (exklusiv).
    end: usize,
    frames: Vec<ReadFrame>,
    max_depth: u32,
    field_number: u32,
    wire_type: Option<WireType>,
}

impl<'a> ProtoReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8], options: &CodecOptions) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            frames: Vec::new(),
            max_depth: options.max_depth(),
            field_number: 0,
            wire_type: None,
        }
    }

    /// Absolute byte offset of the next read.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Number of open sub-items.
    pub fn depth(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Field number of the last header.
    pub fn field_number(&self) -> u32 {
        self.field_number
    }

    /// Wire type of the last header (or the item wire type inside a packed run).
    pub fn wire_type(&self) -> Option<WireType> {
        self.wire_type
    }

    /// Bytes left in the current region.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Current position for error reports.
    pub fn context(&self) -> ErrorContext {
        ErrorContext {
            field_number: self.field_number,
            wire_type: self.wire_type,
            position: self.position(),
            depth: self.depth(),
        }
    }

    pub(crate) fn fail(&self, kind: ErrorKind) -> Error {
        Error::at(kind, self.context())
    }

    /// Fails unless the last header carried `expected`.
    pub fn expect_wire_type(&self, expected: WireType) -> Result<()> {
        if self.wire_type == Some(expected) {
            Ok(())
        } else {
            Err(self.fail(ErrorKind::WireTypeMismatch { expected }))
        }
    }

    fn region_exhausted(&self) -> Result<bool> {
        match self.frames.last() {
            Some(ReadFrame::Group { closed: true, .. }) => Ok(true),
            Some(ReadFrame::Group { .. }) if self.pos >= self.end => {
                Err(self.fail(ErrorKind::TruncatedStream))
            }
            _ => Ok(self.pos >= self.end),
        }
    }

    fn decode_tag(&self) -> Result<(FieldHeader, usize)> {
        let (tag, len) = varint::decode(&self.data[self.pos..self.end]).map_err(|k| self.fail(k))?;
        let header = FieldHeader::from_tag(tag).map_err(|k| self.fail(k))?;
        Ok((header, len))
    }

    /// Reads the next field header and returns its field number, or 0 at the
    /// end of the current region.
    pub fn read_field_header(&mut self) -> Result<u32> {
        if self.region_exhausted()? {
            return Ok(0);
        }
        let (header, len) = self.decode_tag()?;
        self.pos += len;
        self.field_number = header.field_number;
        self.wire_type = Some(header.wire_type);
        if header.wire_type == WireType::EndGroup {
            return match self.frames.last_mut() {
                Some(ReadFrame::Group { field_number, closed }) if *field_number == header.field_number => {
                    *closed = true;
                    Ok(0)
                }
                Some(ReadFrame::Group { field_number, .. }) => {
                    let expected = *field_number;
                    Err(self.fail(ErrorKind::MismatchedEndGroup { expected, found: header.field_number }))
                }
                _ => Err(self.fail(ErrorKind::UnexpectedEndGroup)),
            };
        }
        Ok(header.field_number)
    }

    /// Consumes the next header only if it carries `field_number`.
    pub fn try_read_field_header(&mut self, field_number: u32) -> Result<bool> {
        if self.region_exhausted()? {
            return Ok(false);
        }
        let (header, len) = self.decode_tag()?;
        if header.field_number != field_number || header.wire_type == WireType::EndGroup {
            return Ok(false);
        }
        self.pos += len;
        self.field_number = header.field_number;
        self.wire_type = Some(header.wire_type);
        Ok(true)
    }

    /// Opens the region announced by the last header.
    pub fn start_sub_item(&mut self) -> Result<ReadToken> {
        if self.depth() >= self.max_depth {
            return Err(self.fail(ErrorKind::DepthExceeded { max: self.max_depth }));
        }
        match self.wire_type {
            Some(WireType::LengthDelimited) => {
                let len = self.read_length()?;
                self.frames.push(ReadFrame::Length { outer_end: self.end });
                self.end = self.pos + len;
            }
            Some(WireType::StartGroup) => {
                self.frames.push(ReadFrame::Group { field_number: self.field_number, closed: false });
            }
            _ => {
                return Err(self.fail(ErrorKind::WireTypeMismatch { expected: WireType::LengthDelimited }));
            }
        }
        Ok(ReadToken { depth: self.depth() })
    }

    /// Closes the innermost region. Length frames must be consumed exactly,
    /// groups must have seen their end-group tag.
    pub fn end_sub_item(&mut self, token: ReadToken) -> Result<()> {
        if token.depth != self.depth() {
            return Err(self.fail(ErrorKind::UnbalancedSubItem));
        }
        match self.frames.last().copied() {
            Some(ReadFrame::Length { outer_end }) => {
                if self.pos != self.end {
                    let remaining = (self.end - self.pos) as u64;
                    return Err(self.fail(ErrorKind::SubItemNotConsumed { remaining }));
                }
                self.end = outer_end;
            }
            Some(ReadFrame::Group { field_number, closed }) => {
                if !closed {
                    return Err(self.fail(ErrorKind::UnterminatedGroup(field_number)));
                }
            }
            None => return Err(self.fail(ErrorKind::UnbalancedSubItem)),
        }
        self.frames.pop();
        Ok(())
    }

    /// Inside a packed run: true while another item of `wire_type` remains.
    pub fn has_sub_value(&mut self, wire_type: WireType) -> bool {
        self.wire_type = Some(wire_type);
        self.pos < self.end
    }

    /// Discards the payload belonging to the last header.
    pub fn skip_field(&mut self) -> Result<()> {
        match self.wire_type {
            Some(WireType::Varint) => {
                self.read_varint()?;
            }
            Some(WireType::Fixed64) => self.advance(8)?,
            Some(WireType::Fixed32) => self.advance(4)?,
            Some(WireType::LengthDelimited) => {
                let len = self.read_length()?;
                self.advance(len)?;
            }
            Some(WireType::StartGroup) => {
                let token = self.start_sub_item()?;
                while self.read_field_header()? != 0 {
                    self.skip_field()?;
                }
                self.end_sub_item(token)?;
            }
            Some(WireType::EndGroup) | None => return Err(self.fail(ErrorKind::UnexpectedEndGroup)),
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        if n > self.end - self.pos {
            return Err(self.fail(ErrorKind::TruncatedStream));
        }
        self.pos += n;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        self.advance(n)?;
        Ok(&self.data[start..start + n])
    }

    fn read_length(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(self.fail(ErrorKind::TruncatedStream));
        }
        Ok(len as usize)
    }

    /// Reads an unsigned LEB128 varint.
    #[inline]
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = varint::decode(&self.data[self.pos..self.end]).map_err(|k| self.fail(k))?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a zigzag varint.
    pub fn read_zigzag(&mut self) -> Result<i64> {
        Ok(varint::zigzag_decode_64(self.read_varint()?))
    }

    /// Reads an `int32` varint (low 32 bits).
    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint()? as i32)
    }

    /// Reads 4 bytes little-endian.
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads 8 bytes little-endian.
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a length-prefixed byte payload.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_length()?;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 payload.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| self.fail(ErrorKind::InvalidUtf8))
    }
}
