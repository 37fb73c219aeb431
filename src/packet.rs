use std::fmt::Display;

use hifitime::Epoch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calibration::EngValue;
use crate::header::PacketHeader;
use crate::Raw;

/// A decoded parameter and, for repeat group heads, the parameters of every repetition.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub raw: Raw,
    pub eng: EngValue,
    pub children: Vec<ParameterNode>,
}

impl ParameterNode {
    pub fn new<N: Into<String>>(name: N, raw: Raw, eng: EngValue) -> Self {
        Self {
            name: name.into(),
            raw,
            eng,
            children: Vec::new(),
        }
    }

    pub fn push_child(&mut self, child: ParameterNode) {
        self.children.push(child);
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        1 + self.children.iter().map(ParameterNode::num_nodes).sum::<usize>()
    }

    /// Depth-first search for the first node named `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ParameterNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Outcome of decoding a packet's body.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecodeStatus {
    #[default]
    Complete,
    /// The data field ended before every declared parameter was decoded.
    Incomplete,
    /// The data field is shorter than its mandatory parameters; nothing was decoded.
    LengthMismatch,
    Failed(String),
}

/// A decoded TM or TC packet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub parameters: Vec<ParameterNode>,
    /// All packet bytes, when binary storage is enabled.
    pub raw_bytes: Option<Vec<u8>>,
    /// Spacecraft elapsed time in seconds.
    pub scet: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub utc: Option<Epoch>,
    pub status: DecodeStatus,
    /// Result of the packet error control check, for packets that carry one.
    pub crc_ok: Option<bool>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let primary = &self.header.primary;
        write!(
            f,
            "Packet{{kind: {}, service: ({}, {}), spid: {:?}, parameters: {}, status: {:?}}}",
            primary.kind(),
            primary.service_type(),
            primary.service_subtype(),
            self.header.data_field.spid,
            self.parameters.len(),
            self.status,
        )
    }
}

impl Packet {
    /// First top level parameter named `name`, searching depth-first.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterNode> {
        self.parameters.iter().find_map(|p| p.find(name))
    }

    /// Total number of decoded parameters.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.parameters.iter().map(ParameterNode::num_nodes).sum()
    }
}

/// Receives packets as they are decoded.
pub trait PacketSink {
    fn write(&mut self, packet: &Packet);
}

impl PacketSink for Vec<Packet> {
    fn write(&mut self, packet: &Packet) {
        self.push(packet.clone());
    }
}
