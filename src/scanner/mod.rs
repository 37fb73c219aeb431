//! Packet stream scanning.
//!
//! A [Scanner] walks a byte buffer looking for TM and TC packet starts, decodes and
//! validates each header, resolves the body layout from the [Schema] and decodes the
//! body into a parameter tree. Corrupt input never fails a scan; it is accounted for in
//! the [Summary].
mod summary;

use std::sync::Arc;

use crc::{Crc, CRC_16_IBM_3740};
use hifitime::{Duration, Epoch};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::bits::read_be;
use crate::calibration::Calibrator;
use crate::header::{parse_header, DataFieldHeader, Header, HeaderFields, PacketHeader};
use crate::prelude::*;
use crate::schema::{BodyLayout, HeaderLayout, Schema};
use crate::tree::{CursorRule, Decompressor, ParseTree, TreeWalker, DEFAULT_MAX_NODES};
use crate::{DecodeStatus, Packet, PacketKind, PacketSink, ParameterNode};

pub use summary::Summary;

/// Telecommand packet error control, CRC-16/CCITT with an initial value of 0xFFFF.
pub const PACKET_ERROR_CONTROL: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
/// Size of the telecommand packet error control field.
pub const PEC_LEN: usize = 2;

/// Epoch spacecraft elapsed times are counted from unless configured otherwise.
#[must_use]
pub fn default_scet_epoch() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2000, 1, 1)
}

/// Options for a [Scanner].
///
/// # Example
/// ```
/// use stix::ScannerConfig;
///
/// let config = ScannerConfig::builder()
///     .services(vec![3, 21])
///     .store_binary(false)
///     .max_packets(100)
///     .build();
/// assert!(config.store_packets);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ScannerConfig {
    /// Service types to decode. Empty decodes all services.
    #[builder(default)]
    pub services: Vec<u8>,
    /// Telemetry SPIDs to decode. Empty decodes all.
    #[builder(default)]
    pub spids: Vec<u32>,
    /// Keep the raw bytes of each packet.
    #[builder(default = true)]
    pub store_binary: bool,
    /// Return decoded packets from [Scanner::scan]. Disable when a sink consumes them.
    #[builder(default = true)]
    pub store_packets: bool,
    /// Compute engineering values for variable length telemetry.
    #[builder(default = false)]
    pub calibrate_variable: bool,
    /// Parameters calibrated in variable length telemetry when `calibrate_variable` is off.
    #[builder(default = vec!["NIX00101".into(), "NIX00102".into()])]
    pub calibrated_parameters: Vec<String>,
    /// Upper bound on parameters decoded from one packet.
    #[builder(default = DEFAULT_MAX_NODES)]
    pub max_nodes: usize,
    /// Stop after this many bytes.
    #[builder(default, setter(strip_option))]
    pub max_bytes: Option<usize>,
    /// Stop after this many packets have been decoded.
    #[builder(default, setter(strip_option))]
    pub max_packets: Option<usize>,
    /// Timestamp every packet with this time instead of its on-board time.
    #[builder(default, setter(strip_option))]
    pub reception_time: Option<Epoch>,
    #[builder(default = default_scet_epoch())]
    pub scet_epoch: Epoch,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Decodes TM/TC packets from byte buffers.
///
/// # Example
/// ```
/// use stix::schema::{BodyLayout, MemorySchema, ParameterDefinition};
/// use stix::{PacketKind, Scanner, ScannerConfig};
///
/// let schema = MemorySchema::stix().with_body(
///     PacketKind::Telemetry,
///     3,
///     25,
///     None,
///     BodyLayout::builder()
///         .spid(54101)
///         .parameters(vec![
///             ParameterDefinition::builder().name("X").width(8).build(),
///             ParameterDefinition::builder().name("Y").byte_offset(1).width(8).build(),
///         ])
///         .build(),
/// );
/// let dat: &[u8] = &[
///     0x0d, 0xb1, 0xc0, 0x05, 0x00, 0x0b, 0x10, 0x03, 0x19, 0x00,
///     0x00, 0x00, 0x01, 0x00, 0x80, 0x00,
///     0x05, 0x0a,
/// ];
/// let mut scanner = Scanner::new(&schema, ScannerConfig::default());
/// let packets = scanner.scan(dat);
///
/// assert_eq!(packets.len(), 1);
/// assert_eq!(packets[0].parameters[1].name, "Y");
/// assert_eq!(scanner.summary().num_tm_decoded, 1);
/// ```
pub struct Scanner<S> {
    schema: S,
    config: ScannerConfig,
    calibrator: Arc<Calibrator>,
    decompressor: Option<Box<dyn Decompressor>>,
    sink: Option<Box<dyn PacketSink>>,
    summary: Summary,
}

impl<S: Schema> Scanner<S> {
    pub fn new(schema: S, config: ScannerConfig) -> Self {
        Self {
            schema,
            config,
            calibrator: Arc::new(Calibrator::new()),
            decompressor: None,
            sink: None,
            summary: Summary::default(),
        }
    }

    /// Share a calibrator, and its fitted curves, with other scanners.
    #[must_use]
    pub fn with_calibrator(mut self, calibrator: Arc<Calibrator>) -> Self {
        self.calibrator = calibrator;
        self
    }

    #[must_use]
    pub fn with_decompressor(mut self, decompressor: Box<dyn Decompressor>) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    /// Hand every decoded packet to `sink`, regardless of `store_packets`.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn PacketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Counts accumulated over every [Scanner::scan] since creation or [Scanner::reset].
    #[must_use]
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn reset(&mut self) {
        self.summary = Summary::default();
    }

    /// Decode all packets in `buf`.
    ///
    /// Returns the decoded packets when `store_packets` is enabled, otherwise an empty
    /// list. Malformed input is skipped and counted in the [Summary].
    pub fn scan(&mut self, buf: &[u8]) -> Vec<Packet> {
        let buf = match self.config.max_bytes {
            Some(max) if max < buf.len() => &buf[..max],
            _ => buf,
        };
        let before = self.summary;
        self.summary.total_bytes += buf.len();

        let layouts: Vec<Arc<HeaderLayout>> = [PacketKind::Telemetry, PacketKind::Telecommand]
            .into_iter()
            .filter_map(|kind| self.schema.header_layout(kind))
            .collect();
        if layouts.is_empty() {
            warn!("schema has no header layouts; nothing to scan");
            self.summary.num_bad_bytes += buf.len();
            return Vec::new();
        }
        let is_marker = |b: u8| layouts.iter().any(|l| l.is_marker(b));

        let mut packets = Vec::new();
        let mut emitted = 0;
        let mut offset = 0;
        while offset < buf.len() {
            if self.config.max_packets.is_some_and(|max| emitted >= max) {
                debug!(offset, emitted, "packet limit reached");
                break;
            }

            let Some(layout) = layouts.iter().find(|l| l.is_marker(buf[offset])) else {
                let skipped = buf[offset..]
                    .iter()
                    .position(|b| is_marker(*b))
                    .unwrap_or(buf.len() - offset);
                warn!(offset, skipped, "skipping bytes without a packet start");
                self.summary.num_bad_bytes += skipped;
                offset += skipped;
                continue;
            };

            let remaining = buf.len() - offset;
            let header_len = layout.len();
            if remaining < header_len {
                debug!(offset, remaining, "not enough bytes left for a header");
                self.summary.num_trailing_bytes += remaining;
                break;
            }

            let constraints = self.schema.header_constraints(layout.kind);
            let (header, fields) =
                match parse_header(layout, constraints.as_deref(), &buf[offset..]) {
                    Ok(zult) => zult,
                    Err(err) => {
                        warn!(offset, kind = %layout.kind, %err, "invalid header");
                        self.summary.num_bad_headers += 1;
                        offset += 1;
                        continue;
                    }
                };
            let Some(data_len) = header.data_field_len(header_len) else {
                warn!(offset, length = header.length(), "length field shorter than header");
                self.summary.num_bad_headers += 1;
                offset += 1;
                continue;
            };
            self.summary.found(header.kind());

            let total = header_len + data_len;
            if remaining < total {
                warn!(offset, remaining, expected = total, "packet extends past end of data");
                self.summary.num_trailing_bytes += remaining;
                break;
            }
            let raw = &buf[offset..offset + total];
            trace!(offset, kind = %header.kind(), total, "packet found");
            offset += total;

            let Some(packet) = self.decode_packet(header, fields, header_len, raw) else {
                continue;
            };
            if let Some(sink) = self.sink.as_mut() {
                sink.write(&packet);
            }
            emitted += 1;
            if self.config.store_packets {
                packets.push(packet);
            }
        }

        let s = &self.summary;
        info!(
            total_bytes = s.total_bytes - before.total_bytes,
            num_tm = s.num_tm - before.num_tm,
            num_tc = s.num_tc - before.num_tc,
            num_tm_decoded = s.num_tm_decoded - before.num_tm_decoded,
            num_tc_decoded = s.num_tc_decoded - before.num_tc_decoded,
            num_filtered = s.num_filtered - before.num_filtered,
            num_bad_bytes = s.num_bad_bytes - before.num_bad_bytes,
            num_bad_headers = s.num_bad_headers - before.num_bad_headers,
            num_trailing_bytes = s.num_trailing_bytes - before.num_trailing_bytes,
            "scan complete"
        );
        packets
    }

    /// SSID of a packet whose service has one. Fails when the SSID lies outside the data field.
    fn ssid(&self, header: &Header, header_len: usize, data: &[u8]) -> Result<Option<u32>> {
        let Some(loc) = self.schema.ssid_location(
            header.kind(),
            header.service_type(),
            header.service_subtype(),
        ) else {
            return Ok(None);
        };
        let nbytes = loc.width.div_ceil(8) as usize;
        let value = loc
            .offset
            .checked_sub(header_len)
            .and_then(|start| data.get(start..))
            .and_then(|d| read_be(d, nbytes).ok())
            .ok_or(Error::TruncatedBuffer {
                actual: header_len + data.len(),
                minimum: loc.offset + nbytes,
            })?;
        Ok(u32::try_from(value).ok())
    }

    fn filtered(&self, header: &Header, layout: &BodyLayout) -> bool {
        let services = &self.config.services;
        if !services.is_empty() && !services.contains(&header.service_type()) {
            return true;
        }
        let spids = &self.config.spids;
        header.kind() == PacketKind::Telemetry
            && !spids.is_empty()
            && !layout.spid.is_some_and(|s| spids.contains(&s))
    }

    fn decode_packet(
        &mut self,
        header: Header,
        fields: HeaderFields,
        header_len: usize,
        raw: &[u8],
    ) -> Option<Packet> {
        let kind = header.kind();
        let data = &raw[header_len..];
        let ssid = match self.ssid(&header, header_len, data) {
            Ok(ssid) => ssid,
            Err(err) => {
                debug!(%err, service_type = header.service_type(), "ssid outside data field");
                self.summary.num_filtered += 1;
                return None;
            }
        };

        let Some(layout) = self.schema.body_layout(
            kind,
            header.service_type(),
            header.service_subtype(),
            ssid,
        ) else {
            let err = Error::UnresolvedLayout {
                kind,
                service_type: header.service_type(),
                service_subtype: header.service_subtype(),
                ssid,
            };
            debug!(%err, "packet filtered");
            self.summary.num_filtered += 1;
            return None;
        };
        if self.filtered(&header, &layout) {
            trace!(spid = ?layout.spid, service_type = header.service_type(), "packet filtered");
            self.summary.num_filtered += 1;
            return None;
        }

        let (body, crc_ok) = match kind {
            PacketKind::Telecommand if data.len() >= PEC_LEN => {
                let split = raw.len() - PEC_LEN;
                let expected = u16::from_be_bytes([raw[split], raw[split + 1]]);
                let ok = PACKET_ERROR_CONTROL.checksum(&raw[..split]) == expected;
                if !ok {
                    warn!(name = %layout.name, "telecommand packet error control mismatch");
                }
                (&data[..data.len() - PEC_LEN], Some(ok))
            }
            _ => (data, None),
        };

        let rule = match (layout.is_variable, kind) {
            (false, _) => CursorRule::Absolute,
            (true, PacketKind::Telemetry) => CursorRule::Accumulate,
            (true, PacketKind::Telecommand) => CursorRule::Sequential,
        };
        let calibrate =
            !(layout.is_variable && kind == PacketKind::Telemetry) || self.config.calibrate_variable;
        let tree = ParseTree::build(&layout.parameters, rule);
        let walker = TreeWalker {
            schema: &self.schema,
            calibrator: &self.calibrator,
            decompressor: self.decompressor.as_deref(),
            kind,
            spid: layout.spid,
            calibrate,
            calibrated: &self.config.calibrated_parameters,
            max_nodes: self.config.max_nodes,
        };

        let (parameters, status): (Vec<ParameterNode>, DecodeStatus) =
            match tree.walk(body, &walker) {
                Ok(zult) => {
                    if zult.consumed_bytes != body.len() && rule != CursorRule::Absolute {
                        debug!(
                            spid = ?layout.spid,
                            consumed = zult.consumed_bytes,
                            declared = body.len(),
                            "body size differs from declared length"
                        );
                    }
                    let status = if zult.incomplete {
                        warn!(spid = ?layout.spid, name = %layout.name, "incomplete packet body");
                        DecodeStatus::Incomplete
                    } else {
                        DecodeStatus::Complete
                    };
                    (zult.parameters, status)
                }
                Err(Error::LengthMismatch { expected, actual }) => {
                    warn!(spid = ?layout.spid, expected, actual, "packet body too short");
                    (Vec::new(), DecodeStatus::LengthMismatch)
                }
                Err(err) => {
                    warn!(spid = ?layout.spid, %err, "failed to decode packet body");
                    (Vec::new(), DecodeStatus::Failed(err.to_string()))
                }
            };
        if matches!(status, DecodeStatus::Complete | DecodeStatus::Incomplete) {
            self.summary.decoded(kind);
        }

        let scet = header.scet();
        let utc = match (self.config.reception_time, kind) {
            (Some(t), _) => Some(t),
            (None, PacketKind::Telemetry) => {
                Some(self.config.scet_epoch + Duration::from_seconds(scet))
            }
            (None, PacketKind::Telecommand) => None,
        };

        Some(Packet {
            header: PacketHeader {
                primary: header,
                data_field: DataFieldHeader {
                    ssid,
                    spid: layout.spid,
                    name: layout.name.clone(),
                    description: layout.description.clone(),
                    is_variable: layout.is_variable,
                },
                fields,
            },
            parameters,
            raw_bytes: self.config.store_binary.then(|| raw.to_vec()),
            scet,
            utc,
            status,
            crc_ok,
        })
    }
}

/// Decode independent buffers in parallel, one [Scanner] per segment.
///
/// Segments must each start at a packet boundary; packets spanning two segments are
/// reported as trailing bytes. Packets are returned in segment order along with the
/// combined [Summary].
pub fn decode_parallel<S, B>(schema: &S, config: &ScannerConfig, segments: &[B]) -> (Vec<Packet>, Summary)
where
    S: Schema + Sync,
    B: AsRef<[u8]> + Sync,
{
    let calibrator = Arc::new(Calibrator::new());
    let zults: Vec<(Vec<Packet>, Summary)> = segments
        .par_iter()
        .map(|segment| {
            let mut scanner =
                Scanner::new(schema, config.clone()).with_calibrator(calibrator.clone());
            let packets = scanner.scan(segment.as_ref());
            (packets, *scanner.summary())
        })
        .collect();

    let mut summary = Summary::default();
    let mut packets = Vec::new();
    for (segment_packets, segment_summary) in zults {
        summary.merge(&segment_summary);
        packets.extend(segment_packets);
    }
    (packets, summary)
}
