use crate::PacketKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A bit-field request that does not fit its container. With a valid schema this
    /// should never happen.
    #[error("bit range out of bounds: offset={offset} length={length} container={container}")]
    Range {
        offset: u32,
        length: u32,
        container: u32,
    },

    #[error("Not enough bytes")]
    TruncatedBuffer {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },

    #[error("unsupported width: {kind} of {bit_width} bits at bit offset {bit_offset}")]
    UnsupportedWidth {
        kind: &'static str,
        bit_width: u32,
        bit_offset: u32,
    },

    #[error("header field {field}={value} violates its constraint")]
    HeaderInvalid { field: String, value: u64 },

    #[error("no {kind} layout for service ({service_type}, {service_subtype}) ssid={ssid:?}")]
    UnresolvedLayout {
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
        ssid: Option<u32>,
    },

    #[error("no calibration for {0}")]
    CalibrationMiss(String),

    #[error("parameter limit of {limit} exceeded")]
    TooManyParameters { limit: usize },

    #[error("packet data field too short: need {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
