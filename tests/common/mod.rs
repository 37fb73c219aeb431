#![allow(dead_code)]

use stix::scanner::{PACKET_ERROR_CONTROL, PEC_LEN};
use stix::schema::{BodyLayout, MemorySchema, ParameterDefinition};
use stix::PacketKind;

/// Telemetry packet with a STIX header, on-board time 256.5 s.
pub fn tm_packet(service_type: u8, service_subtype: u8, data: &[u8]) -> Vec<u8> {
    let length = u16::try_from(16 + data.len() - 7)
        .expect("data too long")
        .to_be_bytes();
    let mut dat = hex::decode("0db1c005").unwrap();
    dat.extend_from_slice(&length);
    dat.extend_from_slice(&[0x10, service_type, service_subtype, 0x00]);
    dat.extend(hex::decode("000001008000").unwrap());
    dat.extend_from_slice(data);
    dat
}

/// Telecommand packet with a STIX header and a valid packet error control.
pub fn tc_packet(service_type: u8, service_subtype: u8, data: &[u8]) -> Vec<u8> {
    let length = u16::try_from(10 + data.len() + PEC_LEN - 7)
        .expect("data too long")
        .to_be_bytes();
    let mut dat = hex::decode("1db1c001").unwrap();
    dat.extend_from_slice(&length);
    dat.extend_from_slice(&[0x1f, service_type, service_subtype, 0x90]);
    dat.extend_from_slice(data);
    dat.extend_from_slice(&PACKET_ERROR_CONTROL.checksum(&dat).to_be_bytes());
    dat
}

pub fn param(name: &str, width: u32) -> ParameterDefinition {
    ParameterDefinition::builder().name(name).width(width).build()
}

/// STIX headers plus:
/// * TM (3, 25): fixed body `X` at byte 0 and `Y` at byte 1
/// * TM (21, 6): variable body `N` followed by `N` repetitions of `Item`
/// * TC (237, 7) subtype 2: variable body of an 8 and a 16 bit argument
pub fn schema() -> MemorySchema {
    MemorySchema::stix()
        .with_body(
            PacketKind::Telemetry,
            3,
            25,
            None,
            BodyLayout::builder()
                .spid(54101)
                .name("NIX00001")
                .parameters(vec![
                    param("X", 8),
                    ParameterDefinition::builder()
                        .name("Y")
                        .byte_offset(1)
                        .width(8)
                        .build(),
                ])
                .build(),
        )
        .with_body(
            PacketKind::Telemetry,
            21,
            6,
            None,
            BodyLayout::builder()
                .spid(54110)
                .is_variable(true)
                .parameters(vec![
                    ParameterDefinition::builder()
                        .name("N")
                        .width(8)
                        .group_size(1)
                        .build(),
                    param("Item", 8),
                ])
                .build(),
        )
        .with_body(
            PacketKind::Telecommand,
            237,
            7,
            Some(2),
            BodyLayout::builder()
                .name("ZIX37007")
                .is_variable(true)
                .parameters(vec![param("PIX00076", 8), param("PIX00077", 16)])
                .build(),
        )
}
