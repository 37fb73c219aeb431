//! Packet layout descriptions supplied by the instrument database (IDB).
//!
//! The decoder never owns layout knowledge itself. Everything it needs to know about
//! headers, packet bodies and calibration comes through the read-only [Schema] trait so
//! any backend (in-memory tables, a database backed cache, ...) can drive it.
mod memory;
pub mod stix;

use std::collections::BTreeMap;
use std::sync::Arc;

use typed_builder::TypedBuilder;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{PacketKind, ParameterType};

pub use memory::MemorySchema;

/// One field of a fixed-size packet header.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    /// Offset of the field's least significant bit within its word.
    pub offset: u8,
    pub width: u8,
}

impl HeaderField {
    pub fn new(name: &str, offset: u8, width: u8) -> Self {
        Self {
            name: name.to_string(),
            offset,
            width,
        }
    }
}

/// A big-endian integer of `size` bytes making up part of a header.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderWord {
    pub size: usize,
    pub fields: Vec<HeaderField>,
}

impl HeaderWord {
    pub fn new(size: usize, fields: &[(&str, u8, u8)]) -> Self {
        Self {
            size,
            fields: fields
                .iter()
                .map(|(name, offset, width)| HeaderField::new(name, *offset, *width))
                .collect(),
        }
    }
}

/// Bit layout of a TM or TC header.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    pub kind: PacketKind,
    /// Values the first header byte may take; used to find packet starts.
    pub markers: Vec<u8>,
    pub words: Vec<HeaderWord>,
}

impl HeaderLayout {
    /// Header size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.size).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_marker(&self, b: u8) -> bool {
        self.markers.contains(&b)
    }
}

/// Values a header field is allowed to have.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed {
    Values(Vec<u64>),
    /// Inclusive range.
    Range(u64, u64),
}

impl Allowed {
    #[must_use]
    pub fn contains(&self, value: u64) -> bool {
        match self {
            Allowed::Values(values) => values.contains(&value),
            Allowed::Range(lo, hi) => (*lo..=*hi).contains(&value),
        }
    }
}

pub type HeaderConstraints = BTreeMap<String, Allowed>;

/// Where a structure id (SSID) sits for a service type/subtype, relative to the start
/// of the packet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsidLocation {
    /// Byte offset from the first header byte.
    pub offset: usize,
    /// Width in bits, 8 or 16.
    pub width: u32,
}

/// A single parameter row of a packet body layout.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ParameterDefinition {
    #[builder(setter(into))]
    pub name: String,
    /// Byte offset into the data field. Only used by fixed layouts.
    #[builder(default)]
    pub byte_offset: usize,
    /// Bit offset. For fixed layouts the offset within the byte at `byte_offset`; for
    /// variable telemetry layouts the offset relative to the previous parameter, which
    /// may be negative.
    #[builder(default)]
    pub bit_offset: i32,
    pub width: u32,
    #[builder(default = ParameterType::Unsigned)]
    pub parameter_type: ParameterType,
    /// Calibration reference name.
    #[builder(default, setter(into, strip_option))]
    pub calibration: Option<String>,
    /// Number of following definitions forming a repeat group headed by this one.
    #[builder(default)]
    pub group_size: usize,
}

/// Layout of a packet body for a (service type, subtype, SSID) combination.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct BodyLayout {
    /// Telemetry structure id; telecommands have none.
    #[builder(default, setter(strip_option))]
    pub spid: Option<u32>,
    /// Telecommand or packet name.
    #[builder(default, setter(into))]
    pub name: String,
    #[builder(default, setter(into))]
    pub description: String,
    /// Variable length bodies contain repeat groups.
    #[builder(default)]
    pub is_variable: bool,
    #[builder(default)]
    pub parameters: Vec<ParameterDefinition>,
}

/// Raw-to-engineering conversion data for a calibration reference.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationCurve {
    /// Curve points to interpolate with a cubic spline.
    Spline { x: Vec<f64>, y: Vec<f64> },
    /// Polynomial coefficients, lowest power first.
    Polynomial(Vec<f64>),
    /// Raw value to text mapping.
    Textual(Vec<(i64, String)>),
}

/// Read-only access to the instrument database.
///
/// Implementations must be cheap to query; they are consulted once per packet and once
/// per calibrated parameter.
pub trait Schema {
    fn header_layout(&self, kind: PacketKind) -> Option<Arc<HeaderLayout>>;

    /// `None` means the header is not validated.
    fn header_constraints(&self, kind: PacketKind) -> Option<Arc<HeaderConstraints>>;

    /// Location of the SSID, if packets of this service carry one.
    fn ssid_location(
        &self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
    ) -> Option<SsidLocation>;

    fn body_layout(
        &self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
        ssid: Option<u32>,
    ) -> Option<Arc<BodyLayout>>;

    fn calibration_curve(&self, reference: &str) -> Option<Arc<CalibrationCurve>>;
}

macro_rules! forward_schema {
    ($ty:ty) => {
        impl<T: Schema + ?Sized> Schema for $ty {
            fn header_layout(&self, kind: PacketKind) -> Option<Arc<HeaderLayout>> {
                (**self).header_layout(kind)
            }

            fn header_constraints(&self, kind: PacketKind) -> Option<Arc<HeaderConstraints>> {
                (**self).header_constraints(kind)
            }

            fn ssid_location(
                &self,
                kind: PacketKind,
                service_type: u8,
                service_subtype: u8,
            ) -> Option<SsidLocation> {
                (**self).ssid_location(kind, service_type, service_subtype)
            }

            fn body_layout(
                &self,
                kind: PacketKind,
                service_type: u8,
                service_subtype: u8,
                ssid: Option<u32>,
            ) -> Option<Arc<BodyLayout>> {
                (**self).body_layout(kind, service_type, service_subtype, ssid)
            }

            fn calibration_curve(&self, reference: &str) -> Option<Arc<CalibrationCurve>> {
                (**self).calibration_curve(reference)
            }
        }
    };
}

forward_schema!(&T);
forward_schema!(Arc<T>);
forward_schema!(Box<T>);
