//! Scalar parameter extraction.
//!
//! A parameter occupies `bit_width` bits starting `bit_offset` bits into the byte at
//! `byte_offset`. The bytes covering the field are assembled big-endian and the field is
//! then cut out with its first bit counted from the most significant end of that
//! byte-aligned window.
use crate::bits::get_bits;
use crate::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a parameter's bits are interpreted.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Unsigned,
    Signed,
    /// 4-byte coarse seconds followed by 2-byte fine time in units of 2^-16 s.
    Timestamp,
    /// Small unsigned register values (up to 4 bytes) that are not described by the IDB.
    Context,
    /// IEEE-754 single or double precision.
    Real,
    /// Opaque byte string.
    Octets,
}

impl ParameterType {
    /// Map SCOS-2000 parameter type/format codes onto a [ParameterType].
    ///
    /// Unknown codes are treated as opaque octets.
    #[must_use]
    pub fn from_ptc_pfc(ptc: u8, pfc: u8) -> Self {
        match ptc {
            1..=3 | 6 | 11 => Self::Unsigned,
            4 => Self::Signed,
            5 => Self::Real,
            9 | 10 if pfc >= 1 => Self::Timestamp,
            _ => Self::Octets,
        }
    }
}

/// Raw decoded value of a parameter.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Unsigned(u64),
    Signed(i64),
    /// Never merged at this layer, see [crate::calibration] for the SCET conversion.
    Timestamp {
        coarse: u32,
        fine: u16,
    },
    Real(f64),
    Octets(Vec<u8>),
}

impl Raw {
    /// First raw value as a repetition count, if it can be one.
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        match self {
            Raw::Unsigned(v) => Some(*v),
            Raw::Signed(v) => u64::try_from(*v).ok(),
            Raw::Timestamp { coarse, .. } => Some(u64::from(*coarse)),
            Raw::Real(_) | Raw::Octets(_) => None,
        }
    }

    /// First raw value as a float, used as calibration input.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Raw::Unsigned(v) => Some(*v as f64),
            Raw::Signed(v) => Some(*v as f64),
            Raw::Timestamp { coarse, .. } => Some(f64::from(*coarse)),
            Raw::Real(v) => Some(*v),
            Raw::Octets(_) => None,
        }
    }
}

/// Number of bytes spanned by a field of `bit_width` bits starting `bit_offset` bits into
/// its first byte.
#[must_use]
pub fn num_bytes(bit_offset: u32, bit_width: u32) -> usize {
    (bit_offset + bit_width).div_ceil(8) as usize
}

fn unsupported(kind: &'static str, bit_offset: u32, bit_width: u32) -> Error {
    Error::UnsupportedWidth {
        kind,
        bit_width,
        bit_offset,
    }
}

/// Cut the field out of the assembled window value. The start bit is counted from the
/// LSB of the window: `nbytes * 8 - (bit_offset + bit_width)`.
fn extract(window: u64, nbytes: usize, bit_offset: u32, bit_width: u32) -> Result<u64> {
    let total = u32::try_from(nbytes * 8).unwrap_or(u32::MAX);
    if bit_width >= total {
        return Ok(window);
    }
    let start = total - (bit_offset + bit_width);
    // nbytes <= 8 so both fit in a u8
    get_bits(window, start as u8, bit_width as u8)
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Decode a single scalar.
///
/// # Errors
/// [Error::TruncatedBuffer] when `buf` does not hold all of the field's bytes,
/// [Error::UnsupportedWidth] when the type cannot be represented with the requested
/// width and offset.
pub fn decode_scalar(
    buf: &[u8],
    byte_offset: usize,
    bit_offset: u32,
    bit_width: u32,
    typ: ParameterType,
) -> Result<Raw> {
    let nbytes = num_bytes(bit_offset, bit_width);
    let end = byte_offset.checked_add(nbytes).unwrap_or(usize::MAX);
    let window = buf.get(byte_offset..end).ok_or(Error::TruncatedBuffer {
        actual: buf.len().saturating_sub(byte_offset),
        minimum: nbytes,
    })?;

    match typ {
        ParameterType::Unsigned | ParameterType::Signed | ParameterType::Context => {
            let max = if typ == ParameterType::Context { 4 } else { 6 };
            if nbytes == 0 || nbytes > max {
                return Err(unsupported(
                    if typ == ParameterType::Context {
                        "context"
                    } else {
                        "integer"
                    },
                    bit_offset,
                    bit_width,
                ));
            }
            let value = extract(read_window(window), nbytes, bit_offset, bit_width)?;
            if typ == ParameterType::Signed {
                // fields narrower than their window are masked out of it and stay positive
                let whole = bit_width as usize == nbytes * 8;
                let value = if whole {
                    sign_extend(value, bit_width)
                } else {
                    i64::try_from(value).unwrap_or(i64::MAX)
                };
                Ok(Raw::Signed(value))
            } else {
                Ok(Raw::Unsigned(value))
            }
        }
        ParameterType::Timestamp => {
            if nbytes != 6 || bit_offset != 0 {
                return Err(unsupported("timestamp", bit_offset, bit_width));
            }
            Ok(Raw::Timestamp {
                coarse: u32::from_be_bytes([window[0], window[1], window[2], window[3]]),
                fine: u16::from_be_bytes([window[4], window[5]]),
            })
        }
        ParameterType::Real => match (bit_offset, bit_width) {
            (0, 32) => Ok(Raw::Real(f64::from(f32::from_be_bytes([
                window[0], window[1], window[2], window[3],
            ])))),
            (0, 64) => {
                let mut b = [0u8; 8];
                b.copy_from_slice(window);
                Ok(Raw::Real(f64::from_be_bytes(b)))
            }
            _ => Err(unsupported("real", bit_offset, bit_width)),
        },
        ParameterType::Octets => {
            if bit_offset != 0 || bit_width % 8 != 0 {
                return Err(unsupported("octets", bit_offset, bit_width));
            }
            Ok(Raw::Octets(window.to_vec()))
        }
    }
}

// The 3-byte form is three independent bytes combined big-endian; all other forms are
// plain big-endian integers, so one fold covers every layout.
fn read_window(window: &[u8]) -> u64 {
    window
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}
