//! Write side of the wire codec.
//!
//! [`ProtoWriter`] appends field headers and payloads to a byte buffer.
//! Nested regions are opened with [`ProtoWriter::start_sub_item`] and closed
//! with [`ProtoWriter::end_sub_item`]; tokens must be closed exactly once, in
//! LIFO order.
//!
//! In-memory writers are seekable: a length-delimited frame reserves one byte
//! for its length and is patched (and shifted, if the length needs more than
//! one byte) when it closes. Streaming writers keep content buffered while a
//! length-delimited frame is open and drain to their sink otherwise. Group
//! frames need no buffering at all, which is what forward-only mode relies on.

use std::io::{self, Write};

use log::warn;

use crate::error::{Error, ErrorContext, ErrorKind, Result};
use crate::options::CodecOptions;
use crate::varint;
use crate::wire_type::{FieldHeader, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Offset of the one-byte length placeholder in `buf`.
    Length { start: usize },
    /// Field number the end-group tag must repeat.
    Group { field_number: u32 },
}

/// Handle for an open sub-item. Consumed by [`ProtoWriter::end_sub_item`].
#[must_use = "every sub-item must be closed with end_sub_item"]
#[derive(Debug, PartialEq, Eq)]
pub struct SubItemToken {
    frame: Frame,
    depth: u32,
}

impl SubItemToken {
    /// True if the sub-item is group-delimited.
    pub fn is_group(&self) -> bool {
        matches!(self.frame, Frame::Group { .. })
    }

    /// Wire type the sub-item was opened with.
    pub fn wire_type(&self) -> WireType {
        match self.frame {
            Frame::Length { .. } => WireType::LengthDelimited,
            Frame::Group { .. } => WireType::StartGroup,
        }
    }
}

/// Wire codec writer.
pub struct ProtoWriter<W: Write = io::Sink> {
    buf: Vec<u8>,
    /// Bytes already handed to `sink`.
    flushed: u64,
    sink: W,
    seekable: bool,
    forward_only: bool,
    flush_threshold: usize,
    open: Vec<Frame>,
    /// Anzahl offener Length-Frames (nur dann darf nicht geflusht werden).
    open_lengths: usize,
    max_depth: u32,
    field_number: u32,
    wire_type: Option<WireType>,
    buffering_warned: bool,
}

impl ProtoWriter<io::Sink> {
    /// Creates a seekable in-memory writer.
    pub fn new(options: &CodecOptions) -> Self {
        Self::build(io::sink(), true, options)
    }

    /// Closes the writer and returns the encoded bytes.
    pub fn into_vec(self) -> Result<Vec<u8>> {
        if !self.open.is_empty() {
            return Err(self.fail(ErrorKind::UnbalancedSubItem));
        }
        Ok(self.buf)
    }
}

impl<W: Write> ProtoWriter<W> {
    /// Creates a writer for a non-seekable sink.
    ///
    /// With [`CodecOptions::forward_only`] set, opening a length-delimited
    /// sub-item fails with `BufferingRequired` instead of buffering.
    pub fn streaming(sink: W, options: &CodecOptions) -> Self {
        Self::build(sink, false, options)
    }

    fn build(sink: W, seekable: bool, options: &CodecOptions) -> Self {
        Self {
            buf: Vec::new(),
            flushed: 0,
            sink,
            seekable,
            forward_only: options.forward_only(),
            flush_threshold: options.flush_threshold(),
            open: Vec::new(),
            open_lengths: 0,
            max_depth: options.max_depth(),
            field_number: 0,
            wire_type: None,
            buffering_warned: false,
        }
    }

    /// Absolute byte offset of the next write.
    pub fn position(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    /// Number of open sub-items.
    pub fn depth(&self) -> u32 {
        self.open.len() as u32
    }

    /// Wire type of the last written header.
    pub fn wire_type(&self) -> Option<WireType> {
        self.wire_type
    }

    /// Field number of the last written header.
    pub fn field_number(&self) -> u32 {
        self.field_number
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

    /// Writes `(field_number << 3) | wire_type`.
    pub fn write_field_header(&mut self, field_number: u32, wire_type: WireType) -> Result<()> {
        let header = FieldHeader::new(field_number, wire_type).map_err(|kind| self.fail(kind))?;
        // Vorherige Felder sind vollständig, solange kein Length-Frame offen ist
        if self.open_lengths == 0 {
            self.maybe_flush()?;
        }
        self.field_number = field_number;
        self.wire_type = Some(wire_type);
        varint::encode(&mut self.buf, u64::from(header.to_tag()));
        Ok(())
    }

    /// Writes an unsigned LEB128 varint.
    #[inline]
    pub fn write_varint(&mut self, value: u64) {
        varint::encode(&mut self.buf, value);
    }

    /// Writes a signed value as a zigzag varint.
    #[inline]
    pub fn write_zigzag(&mut self, value: i64) {
        self.write_varint(varint::zigzag_encode_64(value));
    }

    /// Writes an `int32` varint; negative values are sign-extended to 10 bytes.
    #[inline]
    pub fn write_int32(&mut self, value: i32) {
        self.write_varint(i64::from(value) as u64);
    }

    /// Writes 4 bytes little-endian.
    #[inline]
    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes 8 bytes little-endian.
    #[inline]
    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed byte payload.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 payload.
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Opens a nested region framed by the wire type of the last header.
    ///
    /// `LengthDelimited` reserves a length slot, `StartGroup` records the field
    /// number its end-group tag has to repeat.
    pub fn start_sub_item(&mut self) -> Result<SubItemToken> {
        if self.depth() >= self.max_depth {
            return Err(self.fail(ErrorKind::DepthExceeded { max: self.max_depth }));
        }
        let frame = match self.wire_type {
            Some(WireType::LengthDelimited) => {
                if !self.seekable && self.forward_only {
                    return Err(self.fail(ErrorKind::BufferingRequired));
                }
                let start = self.buf.len();
                self.buf.push(0);
                self.open_lengths += 1;
                Frame::Length { start }
            }
            Some(WireType::StartGroup) => Frame::Group { field_number: self.field_number },
            _ => return Err(self.fail(ErrorKind::InvalidSubItemWireType)),
        };
        self.open.push(frame);
        Ok(SubItemToken { frame, depth: self.depth() })
    }

    /// Closes the innermost sub-item: patches its length or writes its end-group tag.
    pub fn end_sub_item(&mut self, token: SubItemToken) -> Result<()> {
        if token.depth != self.depth() || self.open.last() != Some(&token.frame) {
            return Err(self.fail(ErrorKind::UnbalancedSubItem));
        }
        self.open.pop();
        match token.frame {
            Frame::Length { start } => {
                self.open_lengths -= 1;
                let len = self.buf.len() - start - 1;
                if len < 0x80 {
                    self.buf[start] = len as u8;
                } else {
                    // Länge braucht mehr als ein Byte: Inhalt nach hinten schieben
                    let mut prefix = Vec::with_capacity(varint::MAX_VARINT_LEN);
                    varint::encode(&mut prefix, len as u64);
                    self.buf.splice(start..start + 1, prefix);
                }
                self.wire_type = Some(WireType::LengthDelimited);
            }
            Frame::Group { field_number } => {
                self.write_field_header(field_number, WireType::EndGroup)?;
            }
        }
        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.seekable || self.buf.len() < self.flush_threshold {
            return Ok(());
        }
        if self.open_lengths > 0 {
            if !self.buffering_warned {
                self.buffering_warned = true;
                warn!(
                    "[graphbuf] buffering {} bytes for an open length-prefixed frame on a non-seekable stream",
                    self.buf.len()
                );
            }
            return Ok(());
        }
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.sink.write_all(&self.buf).map_err(|e| self.fail(ErrorKind::Io(e.to_string())))?;
        self.flushed += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Drains everything to the sink and returns it.
    pub fn finish(mut self) -> Result<W> {
        if !self.open.is_empty() {
            return Err(self.fail(ErrorKind::UnbalancedSubItem));
        }
        self.drain()?;
        self.sink.flush().map_err(|e| self.fail(ErrorKind::Io(e.to_string())))?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn writer() -> ProtoWriter {
        ProtoWriter::new(&CodecOptions::default())
    }

    #[test]
    fn field_1_int32_150() {
        let mut w = writer();
        w.write_field_header(1, WireType::Varint).unwrap();
        w.write_int32(150);
        assert_eq!(w.into_vec().unwrap(), vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn nested_message_field_3() {
        let mut w = writer();
        w.write_field_header(3, WireType::LengthDelimited).unwrap();
        let tok = w.start_sub_item().unwrap();
        w.write_field_header(1, WireType::Varint).unwrap();
        w.write_int32(150);
        w.end_sub_item(tok).unwrap();
        assert_eq!(w.into_vec().unwrap(), vec![0x1A, 0x03, 0x08, 0x96, 0x01]);
    }

    #[test]
    fn group_field_3() {
        let mut w = writer();
        w.write_field_header(3, WireType::StartGroup).unwrap();
        let tok = w.start_sub_item().unwrap();
        assert!(tok.is_group());
        w.write_field_header(1, WireType::Varint).unwrap();
        w.write_int32(150);
        w.end_sub_item(tok).unwrap();
        assert_eq!(w.into_vec().unwrap(), vec![0x1B, 0x08, 0x96, 0x01, 0x1C]);
    }

    #[test]
    fn negative_int32_is_ten_bytes() {
        let mut w = writer();
        w.write_int32(-1);
        let data = w.into_vec().unwrap();
        assert_eq!(data.len(), 10);
        assert_eq!(data[9], 0x01);
    }

    #[test]
    fn fixed_values_are_little_endian() {
        let mut w = writer();
        w.write_fixed32(0x0102_0304);
        w.write_fixed64(0x0A0B_0C0D_0E0F_1011);
        assert_eq!(
            w.into_vec().unwrap(),
            vec![0x04, 0x03, 0x02, 0x01, 0x11, 0x10, 0x0F, 0x0E, 0x0D, 0x0C, 0x0B, 0x0A]
        );
    }

    #[test]
    fn zigzag_minus_one() {
        let mut w = writer();
        w.write_zigzag(-1);
        w.write_zigzag(1);
        assert_eq!(w.into_vec().unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn field_number_zero_fails() {
        let mut w = writer();
        let err = w.write_field_header(0, WireType::Varint).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidFieldNumber(0));
        assert_eq!(err.category(), ErrorCategory::StreamCorruption);
    }

    /// Länge >= 128 braucht zwei Bytes: Inhalt wird verschoben.
    #[test]
    fn long_sub_item_shifts_content() {
        let mut w = writer();
        w.write_field_header(2, WireType::LengthDelimited).unwrap();
        let tok = w.start_sub_item().unwrap();
        for _ in 0..200 {
            w.write_varint(1);
        }
        w.end_sub_item(tok).unwrap();
        let data = w.into_vec().unwrap();
        assert_eq!(&data[..3], &[0x12, 0xC8, 0x01]);
        assert_eq!(data.len(), 3 + 200);
        assert!(data[3..].iter().all(|&b| b == 1));
    }

    #[test]
    fn nested_length_prefixes_patch_inside_out() {
        let mut w = writer();
        w.write_field_header(1, WireType::LengthDelimited).unwrap();
        let outer = w.start_sub_item().unwrap();
        w.write_field_header(2, WireType::LengthDelimited).unwrap();
        let inner = w.start_sub_item().unwrap();
        w.write_bytes(&[0xAA; 130]);
        w.end_sub_item(inner).unwrap();
        w.end_sub_item(outer).unwrap();
        let data = w.into_vec().unwrap();
        // inner: 2 (len 130) + 130 bytes = 132 payload, tag + 2-byte len = 135
        assert_eq!(&data[..3], &[0x0A, 0x87, 0x01]);
        assert_eq!(&data[3..6], &[0x12, 0x84, 0x01]);
        assert_eq!(data.len(), 3 + 135);
    }

    #[test]
    fn sub_item_requires_framing_header() {
        let mut w = writer();
        w.write_field_header(1, WireType::Varint).unwrap();
        let err = w.start_sub_item().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidSubItemWireType);
    }

    #[test]
    fn out_of_order_close_is_a_nesting_violation() {
        let mut w = writer();
        w.write_field_header(1, WireType::LengthDelimited).unwrap();
        let outer = w.start_sub_item().unwrap();
        w.write_field_header(2, WireType::StartGroup).unwrap();
        let _inner = w.start_sub_item().unwrap();
        let err = w.end_sub_item(outer).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NestingViolation);
    }

    #[test]
    fn unclosed_sub_item_fails_into_vec() {
        let mut w = writer();
        w.write_field_header(1, WireType::LengthDelimited).unwrap();
        let _tok = w.start_sub_item().unwrap();
        let err = w.into_vec().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnbalancedSubItem);
    }

    #[test]
    fn depth_limit() {
        let mut w = ProtoWriter::new(&CodecOptions::default().with_max_depth(2));
        w.write_field_header(1, WireType::StartGroup).unwrap();
        let _a = w.start_sub_item().unwrap();
        w.write_field_header(1, WireType::StartGroup).unwrap();
        let _b = w.start_sub_item().unwrap();
        w.write_field_header(1, WireType::StartGroup).unwrap();
        let err = w.start_sub_item().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DepthExceeded { max: 2 });
        assert_eq!(err.context().depth, 2);
    }

    #[test]
    fn forward_only_rejects_length_prefix() {
        let opts = CodecOptions::default().with_forward_only();
        let mut w = ProtoWriter::streaming(Vec::new(), &opts);
        w.write_field_header(1, WireType::LengthDelimited).unwrap();
        let err = w.start_sub_item().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BufferingRequired);
        assert_eq!(err.category(), ErrorCategory::UnsupportedEncoding);
    }

    #[test]
    fn forward_only_accepts_groups() {
        let opts = CodecOptions::default().with_forward_only().with_flush_threshold(1);
        let mut w = ProtoWriter::streaming(Vec::new(), &opts);
        w.write_field_header(3, WireType::StartGroup).unwrap();
        let tok = w.start_sub_item().unwrap();
        w.write_field_header(1, WireType::Varint).unwrap();
        w.write_int32(150);
        w.end_sub_item(tok).unwrap();
        let sink = w.finish().unwrap();
        assert_eq!(sink, vec![0x1B, 0x08, 0x96, 0x01, 0x1C]);
    }

    #[test]
    fn streaming_buffers_open_length_frames() {
        let opts = CodecOptions::default().with_flush_threshold(2);
        let mut w = ProtoWriter::streaming(Vec::new(), &opts);
        w.write_field_header(1, WireType::LengthDelimited).unwrap();
        let outer = w.start_sub_item().unwrap();
        w.write_field_header(2, WireType::LengthDelimited).unwrap();
        let inner = w.start_sub_item().unwrap();
        w.write_bytes(b"abc");
        w.end_sub_item(inner).unwrap();
        // äußerer Frame noch offen: nichts darf geflusht sein
        assert_eq!(w.position(), 8);
        w.end_sub_item(outer).unwrap();
        let sink = w.finish().unwrap();
        assert_eq!(sink, vec![0x0A, 0x06, 0x12, 0x04, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn streaming_drains_between_top_level_fields() {
        let opts = CodecOptions::default().with_flush_threshold(4);
        let mut w = ProtoWriter::streaming(Vec::new(), &opts);
        for _ in 0..3 {
            w.write_field_header(1, WireType::Varint).unwrap();
            w.write_int32(150);
        }
        // zwei Felder (6 Bytes) sind schon beim Sink
        assert_eq!(w.flushed, 6);
        assert_eq!(w.buf.len(), 3);
        let sink = w.finish().unwrap();
        assert_eq!(sink, [0x08, 0x96, 0x01].repeat(3));
    }
}
