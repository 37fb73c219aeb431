//! Fixed-size TM/TC header decoding.
use std::collections::BTreeMap;
use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bits::{get_bits, read_be};
use crate::prelude::*;
use crate::schema::{HeaderConstraints, HeaderLayout};

/// Number of bytes of a CCSDS packet not covered by the packet length field, i.e., the
/// total packet size is `length + 7`.
pub const LENGTH_FIELD_OFFSET: usize = 7;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Telemetry,
    Telecommand,
}

impl Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketKind::Telemetry => write!(f, "TM"),
            PacketKind::Telecommand => write!(f, "TC"),
        }
    }
}

/// Header field values by name.
pub type HeaderFields = BTreeMap<String, u64>;

/// Decode the header fields described by `layout` from the start of `buf`.
///
/// # Errors
/// [Error::TruncatedBuffer] if `buf` is shorter than the header, [Error::Range] if the
/// layout describes a field that does not fit its word.
pub fn decode_header(layout: &HeaderLayout, buf: &[u8]) -> Result<HeaderFields> {
    if buf.len() < layout.len() {
        return Err(Error::TruncatedBuffer {
            actual: buf.len(),
            minimum: layout.len(),
        });
    }
    let mut fields = HeaderFields::new();
    let mut offset = 0;
    for word in &layout.words {
        let value = read_be(&buf[offset..], word.size)?;
        let word_bits = word.size * 8;
        for field in &word.fields {
            if usize::from(field.offset) + usize::from(field.width) > word_bits {
                return Err(Error::Range {
                    offset: u32::from(field.offset),
                    length: u32::from(field.width),
                    container: u32::try_from(word_bits).unwrap_or(u32::MAX),
                });
            }
            fields.insert(
                field.name.clone(),
                get_bits(value, field.offset, field.width)?,
            );
        }
        offset += word.size;
    }
    Ok(fields)
}

/// Check every constrained field against its allowed values.
///
/// # Errors
/// [Error::HeaderInvalid] for the first field out of range, or a constrained field the
/// header does not have.
pub fn validate(fields: &HeaderFields, constraints: &HeaderConstraints) -> Result<()> {
    for (name, allowed) in constraints {
        let Some(value) = fields.get(name) else {
            return Err(Error::HeaderInvalid {
                field: name.clone(),
                value: 0,
            });
        };
        if !allowed.contains(*value) {
            return Err(Error::HeaderInvalid {
                field: name.clone(),
                value: *value,
            });
        }
    }
    Ok(())
}

fn required(fields: &HeaderFields, name: &str) -> Result<u64> {
    fields.get(name).copied().ok_or_else(|| Error::HeaderInvalid {
        field: name.to_string(),
        value: 0,
    })
}

fn narrow<T: TryFrom<u64>>(fields: &HeaderFields, name: &str) -> Result<T> {
    let value = required(fields, name)?;
    T::try_from(value).map_err(|_| Error::HeaderInvalid {
        field: name.to_string(),
        value,
    })
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHeader {
    pub version: u8,
    pub packet_type: u8,
    pub header_flag: u8,
    pub process_id: u8,
    pub packet_category: u8,
    pub seg_flag: u8,
    pub seq_count: u16,
    pub length: u16,
    pub service_type: u8,
    pub service_subtype: u8,
    pub destination_id: u8,
    pub coarse_time: u32,
    pub fine_time: u16,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelecommandHeader {
    pub version: u8,
    pub packet_type: u8,
    pub header_flag: u8,
    pub process_id: u8,
    pub packet_category: u8,
    pub seg_flag: u8,
    pub seq_count: u16,
    pub length: u16,
    pub ack: u8,
    pub service_type: u8,
    pub service_subtype: u8,
    pub source_id: u8,
}

/// Decoded primary and data field header of a TM or TC packet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Telemetry(TelemetryHeader),
    Telecommand(TelecommandHeader),
}

impl Header {
    /// Build the typed header from decoded fields.
    ///
    /// # Errors
    /// [Error::HeaderInvalid] if a required field is missing or too wide.
    pub fn from_fields(kind: PacketKind, f: &HeaderFields) -> Result<Self> {
        Ok(match kind {
            PacketKind::Telemetry => Header::Telemetry(TelemetryHeader {
                version: narrow(f, "version")?,
                packet_type: narrow(f, "packet_type")?,
                header_flag: narrow(f, "header_flag")?,
                process_id: narrow(f, "process_id")?,
                packet_category: narrow(f, "packet_category")?,
                seg_flag: narrow(f, "seg_flag")?,
                seq_count: narrow(f, "seq_count")?,
                length: narrow(f, "length")?,
                service_type: narrow(f, "service_type")?,
                service_subtype: narrow(f, "service_subtype")?,
                destination_id: narrow(f, "destination_id")?,
                coarse_time: narrow(f, "coarse_time")?,
                fine_time: narrow(f, "fine_time")?,
            }),
            PacketKind::Telecommand => Header::Telecommand(TelecommandHeader {
                version: narrow(f, "version")?,
                packet_type: narrow(f, "packet_type")?,
                header_flag: narrow(f, "header_flag")?,
                process_id: narrow(f, "process_id")?,
                packet_category: narrow(f, "packet_category")?,
                seg_flag: narrow(f, "seg_flag")?,
                seq_count: narrow(f, "seq_count")?,
                length: narrow(f, "length")?,
                ack: narrow(f, "ack")?,
                service_type: narrow(f, "service_type")?,
                service_subtype: narrow(f, "service_subtype")?,
                source_id: narrow(f, "source_id")?,
            }),
        })
    }

    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self {
            Header::Telemetry(_) => PacketKind::Telemetry,
            Header::Telecommand(_) => PacketKind::Telecommand,
        }
    }

    #[must_use]
    pub fn service_type(&self) -> u8 {
        match self {
            Header::Telemetry(h) => h.service_type,
            Header::Telecommand(h) => h.service_type,
        }
    }

    #[must_use]
    pub fn service_subtype(&self) -> u8 {
        match self {
            Header::Telemetry(h) => h.service_subtype,
            Header::Telecommand(h) => h.service_subtype,
        }
    }

    #[must_use]
    pub fn length(&self) -> u16 {
        match self {
            Header::Telemetry(h) => h.length,
            Header::Telecommand(h) => h.length,
        }
    }

    /// Spacecraft elapsed time in seconds. Telecommands carry no time and yield 0.
    #[must_use]
    pub fn scet(&self) -> f64 {
        match self {
            Header::Telemetry(h) => f64::from(h.coarse_time) + f64::from(h.fine_time) / 65536.,
            Header::Telecommand(_) => 0.,
        }
    }

    /// Size of the data field following a header of `header_len` bytes, or `None` if the
    /// length field is too small to cover the header itself.
    #[must_use]
    pub fn data_field_len(&self, header_len: usize) -> Option<usize> {
        (usize::from(self.length()) + LENGTH_FIELD_OFFSET).checked_sub(header_len)
    }
}

/// Information resolved from the IDB for a packet's service and structure id.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFieldHeader {
    pub ssid: Option<u32>,
    pub spid: Option<u32>,
    pub name: String,
    pub description: String,
    pub is_variable: bool,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    pub primary: Header,
    pub data_field: DataFieldHeader,
    /// All fields decoded from the header, including spares.
    pub fields: HeaderFields,
}

/// Decode, validate and type a header.
///
/// # Errors
/// See [decode_header], [validate] and [Header::from_fields].
pub fn parse_header(
    layout: &HeaderLayout,
    constraints: Option<&HeaderConstraints>,
    buf: &[u8],
) -> Result<(Header, HeaderFields)> {
    let fields = decode_header(layout, buf)?;
    if let Some(constraints) = constraints {
        validate(&fields, constraints)?;
    }
    let header = Header::from_fields(layout.kind, &fields)?;
    Ok((header, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{stix, Allowed, HeaderWord};

    #[rustfmt::skip]
    const TM: [u8; 16] = [
        0x0d, 0xb1, 0xc0, 0x05, 0x00, 0x0b,
        0x10, 0x03, 0x19, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x80, 0x00,
    ];

    #[test]
    fn decode_telemetry_header() {
        let (header, fields) = parse_header(
            &stix::telemetry_header(),
            Some(&stix::telemetry_constraints()),
            &TM,
        )
        .unwrap();
        let Header::Telemetry(tm) = header else {
            panic!("expected telemetry header, got {header:?}");
        };
        assert_eq!(tm.version, 0);
        assert_eq!(tm.header_flag, 1);
        assert_eq!(tm.process_id, 91);
        assert_eq!(tm.packet_category, 1);
        assert_eq!(tm.seg_flag, 3);
        assert_eq!(tm.seq_count, 5);
        assert_eq!(tm.length, 11);
        assert_eq!(fields["pus_version"], 1);
        assert_eq!(tm.service_type, 3);
        assert_eq!(tm.service_subtype, 25);
        assert_eq!(tm.coarse_time, 256);
        assert_eq!(header.scet(), 256.5);
        assert_eq!(header.data_field_len(16), Some(2));
        assert_eq!(fields["spare2"], 0);
    }

    #[test]
    fn constraint_violation() {
        let mut dat = TM;
        dat[2] = 0x40; // seg_flag 1
        let zult = parse_header(
            &stix::telemetry_header(),
            Some(&stix::telemetry_constraints()),
            &dat,
        );
        assert_eq!(
            zult.unwrap_err(),
            Error::HeaderInvalid {
                field: "seg_flag".to_string(),
                value: 1
            }
        );
    }

    #[test]
    fn short_header() {
        let zult = decode_header(&stix::telemetry_header(), &TM[..10]);
        assert!(matches!(zult, Err(Error::TruncatedBuffer { .. })));
    }

    #[test]
    fn field_outside_word_is_range_error() {
        let layout = HeaderLayout {
            kind: PacketKind::Telemetry,
            markers: vec![],
            words: vec![HeaderWord::new(1, &[("too_wide", 4, 8)])],
        };
        assert!(matches!(
            decode_header(&layout, &[0xff]),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn missing_constrained_field() {
        let fields = HeaderFields::from([("a".to_string(), 1)]);
        let constraints = HeaderConstraints::from([("b".to_string(), Allowed::Values(vec![1]))]);
        assert!(validate(&fields, &constraints).is_err());
    }

    #[test]
    fn length_field_too_small() {
        let mut dat = TM;
        dat[5] = 0x02;
        let (header, _) = parse_header(&stix::telemetry_header(), None, &dat).unwrap();
        assert_eq!(header.data_field_len(16), None);
    }
}
