//! NDN Type-Length-Value primitives.
//!
//! Types and lengths are NDN variable-length numbers:
//! - `0..=0xFC` encode as a single byte
//! - `..=0xFFFF` encode as `0xFD` followed by 2 bytes big-endian
//! - `..=0xFFFF_FFFF` encode as `0xFE` followed by 4 bytes big-endian
//! - anything larger encodes as `0xFF` followed by 8 bytes big-endian
//!
//! Every reader here is bounds-checked and reports [`CoreError::Truncated`]
//! instead of indexing past the end of the buffer.

use crate::error::{CoreError, Result};

/// TLV type numbers used by this crate.
pub mod types {
    pub const DATA: u64 = 0x06;
    pub const NAME: u64 = 0x07;
    pub const GENERIC_COMPONENT: u64 = 0x08;
    pub const META_INFO: u64 = 0x14;
    pub const CONTENT: u64 = 0x15;
    pub const SIGNATURE_INFO: u64 = 0x16;
    pub const SIGNATURE_VALUE: u64 = 0x17;
    pub const CONTENT_TYPE: u64 = 0x18;
    pub const FRESHNESS_PERIOD: u64 = 0x19;
    pub const SIGNATURE_TYPE: u64 = 0x1B;
    pub const SEQUENCE_NUM_COMPONENT: u64 = 0x3A;
    pub const STATE_VECTOR: u64 = 0xC9;
    pub const STATE_VECTOR_ENTRY: u64 = 0xCA;
    pub const ENTRY_SEQNO: u64 = 0xCC;
}

/// Number of bytes needed to encode `value` as a VarNumber.
pub const fn varnum_len(value: u64) -> usize {
    if value <= 0xFC {
        1
    } else if value <= 0xFFFF {
        3
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

/// Append `value` as a VarNumber.
pub fn write_varnum(buf: &mut Vec<u8>, value: u64) {
    if value <= 0xFC {
        buf.push(value as u8);
    } else if value <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

/// Read a VarNumber starting at `*pos`, advancing `pos` past it.
pub fn read_varnum(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let first = take(buf, pos, 1)?[0];
    let value = match first {
        0xFD => u16::from_be_bytes(fixed::<2>(take(buf, pos, 2)?)) as u64,
        0xFE => u32::from_be_bytes(fixed::<4>(take(buf, pos, 4)?)) as u64,
        0xFF => u64::from_be_bytes(fixed::<8>(take(buf, pos, 8)?)),
        small => small as u64,
    };
    Ok(value)
}

/// Number of bytes needed for a NonNegativeInteger value (1, 2, 4 or 8).
pub const fn nonneg_len(value: u64) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

/// Append `value` as a NonNegativeInteger using its shortest width.
pub fn write_nonneg(buf: &mut Vec<u8>, value: u64) {
    match nonneg_len(value) {
        1 => buf.push(value as u8),
        2 => buf.extend_from_slice(&(value as u16).to_be_bytes()),
        4 => buf.extend_from_slice(&(value as u32).to_be_bytes()),
        _ => buf.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Decode a NonNegativeInteger occupying the whole of `value`.
pub fn read_nonneg(value: &[u8]) -> Result<u64> {
    match value.len() {
        1 => Ok(value[0] as u64),
        2 => Ok(u16::from_be_bytes(fixed::<2>(value)) as u64),
        4 => Ok(u32::from_be_bytes(fixed::<4>(value)) as u64),
        8 => Ok(u64::from_be_bytes(fixed::<8>(value))),
        n => Err(CoreError::InvalidIntegerLength(n)),
    }
}

/// [`read_nonneg`] that also rejects encodings wider than [`nonneg_len`].
pub fn read_nonneg_minimal(value: &[u8]) -> Result<u64> {
    let n = read_nonneg(value)?;
    if nonneg_len(n) != value.len() {
        return Err(CoreError::InvalidIntegerLength(value.len()));
    }
    Ok(n)
}

/// Encoded size of a TLV element whose value is `value_len` bytes long.
pub const fn tlv_len(typ: u64, value_len: usize) -> usize {
    varnum_len(typ) + varnum_len(value_len as u64) + value_len
}

/// Append a TLV header (type and length) for a value of `value_len` bytes.
pub fn write_header(buf: &mut Vec<u8>, typ: u64, value_len: usize) {
    write_varnum(buf, typ);
    write_varnum(buf, value_len as u64);
}

/// Append a complete TLV element.
pub fn write_tlv(buf: &mut Vec<u8>, typ: u64, value: &[u8]) {
    write_header(buf, typ, value.len());
    buf.extend_from_slice(value);
}

/// Read one TLV element at `*pos`, returning its type and value slice.
pub fn read_tlv<'a>(buf: &'a [u8], pos: &mut usize) -> Result<(u64, &'a [u8])> {
    let typ = read_varnum(buf, pos)?;
    let len = read_varnum(buf, pos)?;
    let len = usize::try_from(len).map_err(|_| CoreError::Truncated {
        needed: usize::MAX,
        remaining: buf.len().saturating_sub(*pos),
    })?;
    let value = take(buf, pos, len)?;
    Ok((typ, value))
}

/// Read one TLV element and require it to have type `expected`.
pub fn expect_tlv<'a>(buf: &'a [u8], pos: &mut usize, expected: u64) -> Result<&'a [u8]> {
    let (found, value) = read_tlv(buf, pos)?;
    if found != expected {
        return Err(CoreError::UnexpectedType { expected, found });
    }
    Ok(value)
}

/// Iterator over consecutive TLV elements in a buffer.
///
/// Yields at most one error, after which iteration stops.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<(u64, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let item = read_tlv(self.buf, &mut self.pos);
        self.failed = item.is_err();
        Some(item)
    }
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let remaining = buf.len().saturating_sub(*pos);
    if len > remaining {
        return Err(CoreError::Truncated {
            needed: len,
            remaining,
        });
    }
    let slice = &buf[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut arr = [0u8; N];
    arr.copy_from_slice(&slice[..N]);
    arr
}
