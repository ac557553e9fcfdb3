//! LEB128 varints and zigzag mapping.
//!
//! Each octet carries 7 data bits and a continuation bit (MSB). The least
//! significant group comes first; a `u64` needs at most 10 octets.

use crate::error::ErrorKind;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` as a varint.
#[inline]
pub fn encode(buf: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        // Fast-Path: Single-Byte (häufigster Fall, Tags und kleine Längen)
        buf.push(value as u8);
        return;
    }
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(low7);
            break;
        }
        buf.push(0x80 | low7);
    }
}

/// Number of bytes `encode` produces for `value`.
#[inline]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decodes a varint from the front of `data`, returning the value and the
/// number of bytes consumed.
#[inline]
pub fn decode(data: &[u8]) -> Result<(u64, usize), ErrorKind> {
    let Some(&first) = data.first() else {
        return Err(ErrorKind::TruncatedStream);
    };
    if first & 0x80 == 0 {
        return Ok((u64::from(first), 1));
    }
    let mut result = u64::from(first & 0x7F);
    let mut shift: u32 = 7;
    for (i, &byte) in data.iter().enumerate().skip(1) {
        let low = u64::from(byte & 0x7F);
        // 10. Byte: nur Daten-Bit 0 gültig, keine weitere Continuation
        if shift == 63 && (low > 1 || byte & 0x80 != 0) {
            return Err(ErrorKind::MalformedVarint);
        }
        result |= low << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(ErrorKind::MalformedVarint)
    } else {
        Err(ErrorKind::TruncatedStream)
    }
}

/// Maps a signed 32-bit value onto an unsigned one: `(n << 1) ^ (n >> 31)`.
#[inline]
pub fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode_32`].
#[inline]
pub fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Maps a signed 64-bit value onto an unsigned one: `(n << 1) ^ (n >> 63)`.
#[inline]
pub fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode_64`].
#[inline]
pub fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
