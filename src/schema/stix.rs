//! STIX packet header layouts.
//!
//! Reference: STIX ICD-0812-ESC, telecommand and telemetry packet headers.
use super::{Allowed, HeaderConstraints, HeaderLayout, HeaderWord, MemorySchema, SsidLocation};
use crate::PacketKind;

/// First byte of a STIX telemetry packet (version 0, TM, secondary header, STIX APID).
pub const TM_MARKER: u8 = 0x0d;
/// First byte of a STIX telecommand packet.
pub const TC_MARKER: u8 = 0x1d;

/// STIX process id.
pub const PROCESS_IDS: [u64; 2] = [90, 91];

fn primary_words() -> Vec<HeaderWord> {
    vec![
        HeaderWord::new(
            2,
            &[
                ("version", 13, 3),
                ("packet_type", 12, 1),
                ("header_flag", 11, 1),
                ("process_id", 4, 7),
                ("packet_category", 0, 4),
            ],
        ),
        HeaderWord::new(2, &[("seg_flag", 14, 2), ("seq_count", 0, 14)]),
        HeaderWord::new(2, &[("length", 0, 16)]),
    ]
}

/// 16 byte telemetry header: primary header, data field header and on-board time.
#[must_use]
pub fn telemetry_header() -> HeaderLayout {
    let mut words = primary_words();
    words.extend([
        HeaderWord::new(1, &[("spare1", 7, 1), ("pus_version", 4, 3), ("spare2", 0, 4)]),
        HeaderWord::new(1, &[("service_type", 0, 8)]),
        HeaderWord::new(1, &[("service_subtype", 0, 8)]),
        HeaderWord::new(1, &[("destination_id", 0, 8)]),
        HeaderWord::new(4, &[("coarse_time", 0, 32)]),
        HeaderWord::new(2, &[("fine_time", 0, 16)]),
    ]);
    HeaderLayout {
        kind: PacketKind::Telemetry,
        markers: vec![TM_MARKER],
        words,
    }
}

/// 10 byte telecommand header.
#[must_use]
pub fn telecommand_header() -> HeaderLayout {
    let mut words = primary_words();
    words.extend([
        HeaderWord::new(1, &[("ccsds_flag", 7, 1), ("pus_version", 4, 3), ("ack", 0, 4)]),
        HeaderWord::new(1, &[("service_type", 0, 8)]),
        HeaderWord::new(1, &[("service_subtype", 0, 8)]),
        HeaderWord::new(1, &[("source_id", 0, 8)]),
    ]);
    HeaderLayout {
        kind: PacketKind::Telecommand,
        markers: vec![TC_MARKER],
        words,
    }
}

fn constraints(packet_type: u64) -> HeaderConstraints {
    HeaderConstraints::from([
        ("version".to_string(), Allowed::Values(vec![0])),
        ("packet_type".to_string(), Allowed::Values(vec![packet_type])),
        ("header_flag".to_string(), Allowed::Values(vec![1])),
        (
            "process_id".to_string(),
            Allowed::Values(PROCESS_IDS.to_vec()),
        ),
        ("seg_flag".to_string(), Allowed::Values(vec![3])),
    ])
}

#[must_use]
pub fn telemetry_constraints() -> HeaderConstraints {
    constraints(0)
}

#[must_use]
pub fn telecommand_constraints() -> HeaderConstraints {
    let mut c = constraints(1);
    c.insert("ack".to_string(), Allowed::Range(0, 15));
    c
}

impl MemorySchema {
    /// Schema preloaded with the STIX headers and the telecommand services whose
    /// first data byte selects the command structure.
    #[must_use]
    pub fn stix() -> Self {
        let subtype_byte = SsidLocation {
            offset: 10,
            width: 8,
        };
        MemorySchema::new()
            .with_header(telemetry_header(), telemetry_constraints())
            .with_header(telecommand_header(), telecommand_constraints())
            .with_ssid_location(PacketKind::Telecommand, 237, 7, subtype_byte)
            .with_ssid_location(PacketKind::Telecommand, 236, 6, subtype_byte)
    }
}
