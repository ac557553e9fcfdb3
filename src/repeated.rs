//! Repeated values: sequences and multi-dimensional arrays.
//!
//! Compatible profile: packed sequences are one length-delimited run of
//! untagged items, unpacked sequences repeat the field header per item, empty
//! sequences are omitted. Extended profile: every sequence is wrapped in one
//! sub-item holding
//!
//! | Field | Content |
//! |---|---|
//! | 3 | declared length (one per rank for arrays, major to minor) |
//! | 2 | subtype discriminator, only when the concrete kind differs |
//! | 1 | the items, packed or tagged |
//!
//! Multi-dimensional arrays always use the extended frame.
//!
//! Items are encoded and decoded by closures, the codec only does framing.

use std::io::Write;

use crate::error::{ErrorKind, Result};
use crate::options::Profile;
use crate::reader::ProtoReader;
use crate::value::element_count;
use crate::wire_type::WireType;
use crate::writer::ProtoWriter;

pub const FIELD_ITEMS: u32 = 1;
pub const FIELD_SUBTYPE: u32 = 2;
pub const FIELD_DECLARED_LENGTH: u32 = 3;

/// Write-side layout of one repeated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceFrame {
    pub field_number: u32,
    /// Wire type of one unpacked item.
    pub item_wire_type: WireType,
    pub packed: bool,
    pub profile: Profile,
    /// Framing of the extended wrapper: `LengthDelimited` or `StartGroup`.
    pub wrapper_wire_type: WireType,
    /// Subtype discriminator, when the concrete collection differs from the
    /// declared one.
    pub subtype: Option<u64>,
}

impl SequenceFrame {
    /// Unpacked, compatible, length-delimited wrapper, no subtype.
    pub fn new(field_number: u32, item_wire_type: WireType) -> Self {
        Self {
            field_number,
            item_wire_type,
            packed: false,
            profile: Profile::Compatible,
            wrapper_wire_type: WireType::LengthDelimited,
            subtype: None,
        }
    }

    pub fn with_packed(mut self, packed: bool) -> Self { self.packed = packed; self }
    pub fn with_profile(mut self, profile: Profile) -> Self { self.profile = profile; self }
    pub fn with_wrapper(mut self, wire_type: WireType) -> Self { self.wrapper_wire_type = wire_type; self }
    pub fn with_subtype(mut self, subtype: Option<u64>) -> Self { self.subtype = subtype; self }
}

/// Writes a one-dimensional sequence.
///
/// `write_item` writes one item payload; the field header (if any) has
/// already been written when it is called.
pub fn write_sequence<W, T, F>(
    w: &mut ProtoWriter<W>,
    frame: &SequenceFrame,
    items: &[T],
    mut write_item: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(&mut ProtoWriter<W>, &T) -> Result<()>,
{
    if frame.packed && !frame.item_wire_type.is_packable() {
        return Err(w.fail(ErrorKind::NotPackable(frame.item_wire_type)));
    }
    match frame.profile {
        Profile::Compatible => {
            if items.is_empty() {
                return Ok(());
            }
            write_items(w, frame.field_number, frame, items, &mut write_item)
        }
        Profile::Extended => {
            w.write_field_header(frame.field_number, frame.wrapper_wire_type)?;
            let token = w.start_sub_item()?;
            w.write_field_header(FIELD_DECLARED_LENGTH, WireType::Varint)?;
            w.write_varint(items.len() as u64);
            if let Some(code) = frame.subtype {
                w.write_field_header(FIELD_SUBTYPE, WireType::Varint)?;
                w.write_varint(code);
            }
            if !items.is_empty() {
                write_items(w, FIELD_ITEMS, frame, items, &mut write_item)?;
            }
            w.end_sub_item(token)
        }
    }
}

/// Writes a rectangular array of `rank` dimensions, items flattened row-major.
pub fn write_array<W, T, F>(
    w: &mut ProtoWriter<W>,
    frame: &SequenceFrame,
    rank: u8,
    dims: &[u64],
    items: &[T],
    mut write_item: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(&mut ProtoWriter<W>, &T) -> Result<()>,
{
    if dims.len() != usize::from(rank) {
        return Err(w.fail(ErrorKind::WrongArrayRank { expected: rank, found: dims.len() }));
    }
    let found = items.len() as u64;
    match element_count(dims) {
        Some(expected) if expected == found => {}
        expected => {
            return Err(w.fail(ErrorKind::ArrayLengthMismatch { expected: expected.unwrap_or(u64::MAX), found }));
        }
    }
    if frame.packed && !frame.item_wire_type.is_packable() {
        return Err(w.fail(ErrorKind::NotPackable(frame.item_wire_type)));
    }
    w.write_field_header(frame.field_number, frame.wrapper_wire_type)?;
    let token = w.start_sub_item()?;
    for &len in dims {
        w.write_field_header(FIELD_DECLARED_LENGTH, WireType::Varint)?;
        w.write_varint(len);
    }
    if !items.is_empty() {
        write_items(w, FIELD_ITEMS, frame, items, &mut write_item)?;
    }
    w.end_sub_item(token)
}

fn write_items<W, T, F>(
    w: &mut ProtoWriter<W>,
    field_number: u32,
    frame: &SequenceFrame,
    items: &[T],
    write_item: &mut F,
) -> Result<()>
where
    W: Write,
    F: FnMut(&mut ProtoWriter<W>, &T) -> Result<()>,
{
    if frame.packed {
        w.write_field_header(field_number, WireType::LengthDelimited)?;
        let token = w.start_sub_item()?;
        for item in items {
            write_item(w, item)?;
        }
        w.end_sub_item(token)
    } else {
        for item in items {
            w.write_field_header(field_number, frame.item_wire_type)?;
            write_item(w, item)?;
        }
        Ok(())
    }
}

/// Read-side layout of one repeated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLayout {
    pub profile: Profile,
    /// Wire type of one unpacked item.
    pub item_wire_type: WireType,
    /// Items are sub-items and may be length- or group-delimited.
    pub sub_items: bool,
    /// Ceiling for declared and accumulated lengths.
    pub max_length: u64,
}

impl ReadLayout {
    fn accepts(&self, wire_type: Option<WireType>) -> bool {
        match wire_type {
            Some(wt) if wt == self.item_wire_type => true,
            Some(WireType::LengthDelimited | WireType::StartGroup) => self.sub_items,
            _ => false,
        }
    }
}

/// Metadata found in an extended frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMeta {
    /// Declared lengths in the order read.
    pub declared: Vec<u64>,
    pub subtype: Option<u64>,
}

/// Reads one occurrence of a repeated field whose header was just read,
/// appending to `out`.
///
/// Compatible profile: consumes every directly following occurrence of the
/// same field, packed or unpacked. Extended profile: reads one wrapper.
pub fn read_sequence<'a, T, F>(
    r: &mut ProtoReader<'a>,
    layout: &ReadLayout,
    out: &mut Vec<T>,
    mut read_item: F,
) -> Result<FrameMeta>
where
    F: FnMut(&mut ProtoReader<'a>) -> Result<T>,
{
    match layout.profile {
        Profile::Compatible => {
            let field_number = r.field_number();
            loop {
                read_occurrence(r, layout, layout.max_length, out, &mut read_item)?;
                if !r.try_read_field_header(field_number)? {
                    return Ok(FrameMeta::default());
                }
            }
        }
        Profile::Extended => {
            let token = r.start_sub_item()?;
            let mut meta = FrameMeta::default();
            loop {
                match r.read_field_header()? {
                    0 => break,
                    FIELD_DECLARED_LENGTH => {
                        r.expect_wire_type(WireType::Varint)?;
                        let len = read_length(r, layout.max_length)?;
                        if meta.declared.is_empty() {
                            // Vorab-Allokation, begrenzt durch die restlichen Bytes
                            out.reserve(len.min(r.remaining() as u64) as usize);
                        }
                        meta.declared.push(len);
                    }
                    FIELD_SUBTYPE => {
                        r.expect_wire_type(WireType::Varint)?;
                        meta.subtype = Some(r.read_varint()?);
                    }
                    FIELD_ITEMS => read_occurrence(r, layout, layout.max_length, out, &mut read_item)?,
                    other => {
                        log::trace!("skipping unknown sequence frame field {other}");
                        r.skip_field()?;
                    }
                }
            }
            r.end_sub_item(token)?;
            Ok(meta)
        }
    }
}

/// Reads a rectangular array of `rank` dimensions whose header was just read.
///
/// All dimension lengths must precede the items. Their product is checked
/// against the ceiling before anything is allocated.
pub fn read_array<'a, T, F>(
    r: &mut ProtoReader<'a>,
    layout: &ReadLayout,
    rank: u8,
    mut read_item: F,
) -> Result<(Vec<u64>, Vec<T>)>
where
    F: FnMut(&mut ProtoReader<'a>) -> Result<T>,
{
    let token = r.start_sub_item()?;
    let mut dims = Vec::with_capacity(usize::from(rank));
    let mut items = Vec::new();
    let mut total = None;
    loop {
        match r.read_field_header()? {
            0 => break,
            FIELD_DECLARED_LENGTH => {
                r.expect_wire_type(WireType::Varint)?;
                if total.is_some() || dims.len() == usize::from(rank) {
                    return Err(r.fail(ErrorKind::WrongArrayRank { expected: rank, found: dims.len() + 1 }));
                }
                // Nur das Produkt zählt gegen die Obergrenze
                dims.push(r.read_varint()?);
            }
            FIELD_ITEMS => {
                let expected = match total {
                    Some(t) => t,
                    None => {
                        let t = checked_total(r, rank, &dims, layout.max_length)?;
                        items.reserve(t.min(r.remaining() as u64) as usize);
                        total = Some(t);
                        t
                    }
                };
                read_occurrence(r, layout, expected, &mut items, &mut read_item)?;
            }
            other => {
                log::trace!("skipping unknown array frame field {other}");
                r.skip_field()?;
            }
        }
    }
    let expected = match total {
        Some(t) => t,
        None => checked_total(r, rank, &dims, layout.max_length)?,
    };
    if items.len() as u64 != expected {
        return Err(r.fail(ErrorKind::ArrayLengthMismatch { expected, found: items.len() as u64 }));
    }
    r.end_sub_item(token)?;
    Ok((dims, items))
}

fn checked_total(r: &ProtoReader<'_>, rank: u8, dims: &[u64], max: u64) -> Result<u64> {
    if dims.len() != usize::from(rank) {
        return Err(r.fail(ErrorKind::WrongArrayRank { expected: rank, found: dims.len() }));
    }
    match element_count(dims) {
        Some(total) if total <= max => Ok(total),
        total => Err(r.fail(ErrorKind::LengthCeilingExceeded { length: total.unwrap_or(u64::MAX), max })),
    }
}

fn read_length(r: &mut ProtoReader<'_>, max: u64) -> Result<u64> {
    let len = r.read_varint()?;
    if len > max {
        return Err(r.fail(ErrorKind::LengthCeilingExceeded { length: len, max }));
    }
    Ok(len)
}

fn read_occurrence<'a, T, F>(
    r: &mut ProtoReader<'a>,
    layout: &ReadLayout,
    max: u64,
    out: &mut Vec<T>,
    read_item: &mut F,
) -> Result<()>
where
    F: FnMut(&mut ProtoReader<'a>) -> Result<T>,
{
    if r.wire_type() == Some(WireType::LengthDelimited) && layout.item_wire_type.is_packable() {
        let token = r.start_sub_item()?;
        while r.has_sub_value(layout.item_wire_type) {
            check_room(r, out.len(), max)?;
            out.push(read_item(r)?);
        }
        return r.end_sub_item(token);
    }
    if !layout.accepts(r.wire_type()) {
        return Err(r.fail(ErrorKind::WireTypeMismatch { expected: layout.item_wire_type }));
    }
    check_room(r, out.len(), max)?;
    out.push(read_item(r)?);
    Ok(())
}

#[inline]
fn check_room(r: &ProtoReader<'_>, len: usize, max: u64) -> Result<()> {
    if len as u64 >= max {
        return Err(r.fail(ErrorKind::LengthCeilingExceeded { length: len as u64 + 1, max }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::options::CodecOptions;

    fn varint_item<W: Write>(w: &mut ProtoWriter<W>, v: &u64) -> Result<()> {
        w.write_varint(*v);
        Ok(())
    }

    fn write(frame: SequenceFrame, items: &[u64]) -> Vec<u8> {
        let mut w = ProtoWriter::new(&CodecOptions::default());
        write_sequence(&mut w, &frame, items, varint_item).unwrap();
        w.into_vec().unwrap()
    }

    fn layout(profile: Profile) -> ReadLayout {
        ReadLayout { profile, item_wire_type: WireType::Varint, sub_items: false, max_length: 1 << 24 }
    }

    fn read(data: &[u8], layout: ReadLayout) -> Result<(Vec<u64>, FrameMeta)> {
        let opts = CodecOptions::default();
        let mut r = ProtoReader::new(data, &opts);
        let mut out = Vec::new();
        let mut meta = FrameMeta::default();
        while r.read_field_header()? != 0 {
            meta = read_sequence(&mut r, &layout, &mut out, |r| r.read_varint())?;
        }
        Ok((out, meta))
    }

    #[test]
    fn packed_protobuf_example() {
        let frame = SequenceFrame::new(4, WireType::Varint).with_packed(true);
        let data = write(frame, &[3, 270, 86942]);
        assert_eq!(data, vec![0x22, 0x06, 0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05]);
        let (items, _) = read(&data, layout(Profile::Compatible)).unwrap();
        assert_eq!(items, vec![3, 270, 86942]);
    }

    #[test]
    fn unpacked_repeats_the_header() {
        let data = write(SequenceFrame::new(1, WireType::Varint), &[1, 2, 3]);
        assert_eq!(data, vec![0x08, 0x01, 0x08, 0x02, 0x08, 0x03]);
    }

    #[test]
    fn packed_and_unpacked_read_alike() {
        let items = [0u64, 1, 150, 1 << 40];
        let packed = write(SequenceFrame::new(7, WireType::Varint).with_packed(true), &items);
        let unpacked = write(SequenceFrame::new(7, WireType::Varint), &items);
        assert_ne!(packed, unpacked);
        let a = read(&packed, layout(Profile::Compatible)).unwrap().0;
        let b = read(&unpacked, layout(Profile::Compatible)).unwrap().0;
        assert_eq!(a, items);
        assert_eq!(a, b);
    }

    #[test]
    fn mixed_occurrences_accumulate() {
        // packed [1, 2], dann einzeln 3, dann wieder packed [4]
        let data = [0x0A, 0x02, 0x01, 0x02, 0x08, 0x03, 0x0A, 0x01, 0x04];
        let (items, _) = read(&data, layout(Profile::Compatible)).unwrap();
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_compatible_sequence_is_omitted() {
        let frame = SequenceFrame::new(3, WireType::Varint).with_packed(true);
        assert!(write(frame, &[]).is_empty());
    }

    #[test]
    fn extended_frame_layout() {
        let frame = SequenceFrame::new(5, WireType::Varint).with_packed(true).with_profile(Profile::Extended);
        assert_eq!(write(frame, &[1, 2]), vec![0x2A, 0x06, 0x18, 0x02, 0x0A, 0x02, 0x01, 0x02]);

        let frame = SequenceFrame::new(5, WireType::Varint).with_profile(Profile::Extended);
        assert_eq!(write(frame, &[1, 2]), vec![0x2A, 0x06, 0x18, 0x02, 0x08, 0x01, 0x08, 0x02]);

        // leer: nur die deklarierte Länge
        assert_eq!(write(frame, &[]), vec![0x2A, 0x02, 0x18, 0x00]);
    }

    #[test]
    fn extended_subtype_round_trip() {
        let frame = SequenceFrame::new(5, WireType::Varint).with_profile(Profile::Extended).with_subtype(Some(3));
        let data = write(frame, &[9]);
        assert_eq!(data, vec![0x2A, 0x06, 0x18, 0x01, 0x10, 0x03, 0x08, 0x09]);
        let (items, meta) = read(&data, layout(Profile::Extended)).unwrap();
        assert_eq!(items, vec![9]);
        assert_eq!(meta, FrameMeta { declared: vec![1], subtype: Some(3) });
    }

    #[test]
    fn extended_metadata_is_order_tolerant() {
        // items zuerst, dann Subtyp, dann Länge, plus unbekanntes Feld 9
        let data = [0x2A, 0x08, 0x08, 0x07, 0x10, 0x02, 0x48, 0x00, 0x18, 0x01];
        let (items, meta) = read(&data, layout(Profile::Extended)).unwrap();
        assert_eq!(items, vec![7]);
        assert_eq!(meta.subtype, Some(2));
        assert_eq!(meta.declared, vec![1]);
    }

    #[test]
    fn declared_length_above_ceiling() {
        let data = [0x2A, 0x03, 0x18, 0x80, 0x01];
        let mut l = layout(Profile::Extended);
        l.max_length = 100;
        let err = read(&data, l).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthCeilingExceeded { length: 128, max: 100 });
        assert_eq!(err.category(), ErrorCategory::CollectionViolation);
    }

    #[test]
    fn accumulated_length_above_ceiling() {
        let data = [0x0A, 0x04, 0x01, 0x02, 0x03, 0x04];
        let mut l = layout(Profile::Compatible);
        l.max_length = 3;
        let err = read(&data, l).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthCeilingExceeded { length: 4, max: 3 });
    }

    #[test]
    fn packed_string_is_rejected() {
        let mut w = ProtoWriter::new(&CodecOptions::default());
        let frame = SequenceFrame::new(1, WireType::LengthDelimited).with_packed(true);
        let err = write_sequence(&mut w, &frame, &["a"], |w, s| {
            w.write_string(s);
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotPackable(WireType::LengthDelimited));
    }

    #[test]
    fn wrong_item_wire_type() {
        // Feld 1 als fixed32 statt varint
        let data = [0x0D, 0x01, 0x00, 0x00, 0x00];
        let err = read(&data, layout(Profile::Compatible)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WireTypeMismatch { expected: WireType::Varint });
    }

    fn read_grid(data: &[u8], rank: u8, max: u64) -> Result<(Vec<u64>, Vec<u64>)> {
        let opts = CodecOptions::default();
        let mut r = ProtoReader::new(data, &opts);
        assert_eq!(r.read_field_header()?, 1);
        let mut l = layout(Profile::Extended);
        l.max_length = max;
        read_array(&mut r, &l, rank, |r| r.read_varint())
    }

    #[test]
    fn array_round_trip() {
        let mut w = ProtoWriter::new(&CodecOptions::default());
        let frame = SequenceFrame::new(1, WireType::Varint).with_packed(true);
        write_array(&mut w, &frame, 2, &[2, 3], &[1, 2, 3, 4, 5, 6], varint_item).unwrap();
        let data = w.into_vec().unwrap();
        assert_eq!(&data[..6], &[0x0A, 0x0C, 0x18, 0x02, 0x18, 0x03]);
        let (dims, items) = read_grid(&data, 2, 1 << 24).unwrap();
        assert_eq!(dims, vec![2, 3]);
        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty_array_keeps_its_shape() {
        let mut w = ProtoWriter::new(&CodecOptions::default());
        let frame = SequenceFrame::new(1, WireType::Varint);
        write_array::<_, u64, _>(&mut w, &frame, 2, &[0, 5], &[], varint_item).unwrap();
        let data = w.into_vec().unwrap();
        let (dims, items) = read_grid(&data, 2, 1 << 24).unwrap();
        assert_eq!(dims, vec![0, 5]);
        assert!(items.is_empty());
    }

    #[test]
    fn array_write_checks_shape() {
        let mut w = ProtoWriter::new(&CodecOptions::default());
        let frame = SequenceFrame::new(1, WireType::Varint);
        let err = write_array(&mut w, &frame, 2, &[2, 2], &[1u64, 2, 3], varint_item).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ArrayLengthMismatch { expected: 4, found: 3 });
        let err = write_array(&mut w, &frame, 3, &[2, 2], &[1u64, 2, 3, 4], varint_item).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WrongArrayRank { expected: 3, found: 2 });
    }

    #[test]
    fn malicious_dimensions_fail_before_allocation() {
        // 2^28 × 2^28, kein einziges Element
        let data = [0x0A, 0x0C, 0x18, 0x80, 0x80, 0x80, 0x80, 0x01, 0x18, 0x80, 0x80, 0x80, 0x80, 0x01];
        let err = read_grid(&data[..], 2, u64::MAX).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CollectionViolation);

        let err = read_grid(&data[..], 2, 1 << 24).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CollectionViolation);
    }

    #[test]
    fn product_above_ceiling() {
        // [4096, 8192] = 2^25 > 2^24
        let data = [0x0A, 0x07, 0x18, 0x80, 0x20, 0x18, 0x80, 0x40, 0x08];
        let err = read_grid(&data, 2, 1 << 24).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthCeilingExceeded { length: 1 << 25, max: 1 << 24 });
    }

    #[test]
    fn wrong_rank_on_read() {
        let data = [0x0A, 0x06, 0x18, 0x01, 0x18, 0x01, 0x08, 0x05];
        let err = read_grid(&data, 3, 1 << 24).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WrongArrayRank { expected: 3, found: 2 });

        let data = [0x0A, 0x06, 0x18, 0x01, 0x18, 0x01, 0x18, 0x01];
        let err = read_grid(&data, 2, 1 << 24).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WrongArrayRank { expected: 2, found: 3 });
    }

    #[test]
    fn array_items_must_fill_dimensions() {
        let data = [0x0A, 0x06, 0x18, 0x02, 0x18, 0x02, 0x08, 0x05];
        let err = read_grid(&data, 2, 1 << 24).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ArrayLengthMismatch { expected: 4, found: 1 });
    }
}
