//! Bit-field extraction and packing on integer containers.
//!
//! Offsets are counted from the least significant bit of the container. Callers that
//! work with MSB-first layouts (see [crate::scalar]) convert to this origin first.
use crate::prelude::*;

/// Width of the container all fields are extracted from.
pub const CONTAINER_BITS: u32 = u64::BITS;

fn mask(length: u32) -> u64 {
    if length >= CONTAINER_BITS {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

fn check(offset: u32, length: u32) -> Result<()> {
    if offset + length > CONTAINER_BITS {
        return Err(Error::Range {
            offset,
            length,
            container: CONTAINER_BITS,
        });
    }
    Ok(())
}

/// Extract `length` bits starting at bit `offset` of `value`, i.e.,
/// `(value >> offset) & ((1 << length) - 1)`.
///
/// # Errors
/// [Error::Range] if `offset + length` does not fit in 64 bits.
pub fn get_bits(value: u64, offset: u8, length: u8) -> Result<u64> {
    let (offset, length) = (u32::from(offset), u32::from(length));
    check(offset, length)?;
    if length == 0 {
        return Ok(0);
    }
    Ok(value.checked_shr(offset).unwrap_or(0) & mask(length))
}

/// Embed the low `length` bits of `field` into `container` at bit `offset`, leaving all
/// other bits untouched.
///
/// # Errors
/// [Error::Range] if `offset + length` does not fit in 64 bits.
pub fn set_bits(container: u64, field: u64, offset: u8, length: u8) -> Result<u64> {
    let (offset, length) = (u32::from(offset), u32::from(length));
    check(offset, length)?;
    if length == 0 {
        return Ok(container);
    }
    let m = mask(length) << offset;
    Ok((container & !m) | ((field << offset) & m))
}

/// Read a big-endian unsigned integer of `len` bytes (at most 8) from the start of `buf`.
///
/// # Errors
/// [Error::TruncatedBuffer] if `buf` holds fewer than `len` bytes, [Error::Range] for
/// `len > 8`.
pub fn read_be(buf: &[u8], len: usize) -> Result<u64> {
    if len > 8 {
        return Err(Error::Range {
            offset: 0,
            length: u32::try_from(len * 8).unwrap_or(u32::MAX),
            container: CONTAINER_BITS,
        });
    }
    let bytes = buf.get(..len).ok_or(Error::TruncatedBuffer {
        actual: buf.len(),
        minimum: len,
    })?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Inverse of [read_be]: the low `len` bytes of `value`, most significant first.
#[must_use]
pub fn write_be(value: u64, len: usize) -> Vec<u8> {
    let len = len.min(8);
    value.to_be_bytes()[8 - len..].to_vec()
}
