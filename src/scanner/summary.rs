use std::ops::AddAssign;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::PacketKind;

/// Tracks stats on a scan.
///
/// # Example
/// ```
/// use stix::Summary;
///
/// let mut total = Summary::default();
/// let segment = Summary { total_bytes: 10, num_bad_bytes: 1, ..Default::default() };
/// total.merge(&segment);
/// total.merge(&segment);
/// assert_eq!(total.num_bad_bytes, 2);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Bytes examined.
    pub total_bytes: usize,
    /// Telemetry packets with a valid header.
    pub num_tm: usize,
    /// Telecommand packets with a valid header.
    pub num_tc: usize,
    pub num_tm_decoded: usize,
    pub num_tc_decoded: usize,
    /// Packets skipped by a filter or with no known layout.
    pub num_filtered: usize,
    /// Bytes skipped looking for a packet start.
    pub num_bad_bytes: usize,
    pub num_bad_headers: usize,
    /// Bytes left at the end of the buffer that do not form a whole packet.
    pub num_trailing_bytes: usize,
}

impl Summary {
    pub(crate) fn found(&mut self, kind: PacketKind) {
        match kind {
            PacketKind::Telemetry => self.num_tm += 1,
            PacketKind::Telecommand => self.num_tc += 1,
        }
    }

    pub(crate) fn decoded(&mut self, kind: PacketKind) {
        match kind {
            PacketKind::Telemetry => self.num_tm_decoded += 1,
            PacketKind::Telecommand => self.num_tc_decoded += 1,
        }
    }

    /// Total packets decoded.
    #[must_use]
    pub fn num_decoded(&self) -> usize {
        self.num_tm_decoded + self.num_tc_decoded
    }

    /// Add the counts of `other` to these.
    pub fn merge(&mut self, other: &Summary) {
        self.total_bytes += other.total_bytes;
        self.num_tm += other.num_tm;
        self.num_tc += other.num_tc;
        self.num_tm_decoded += other.num_tm_decoded;
        self.num_tc_decoded += other.num_tc_decoded;
        self.num_filtered += other.num_filtered;
        self.num_bad_bytes += other.num_bad_bytes;
        self.num_bad_headers += other.num_bad_headers;
        self.num_trailing_bytes += other.num_trailing_bytes;
    }
}

impl AddAssign<&Summary> for Summary {
    fn add_assign(&mut self, rhs: &Summary) {
        self.merge(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut summary = Summary::default();
        summary.found(PacketKind::Telemetry);
        summary.found(PacketKind::Telecommand);
        summary.found(PacketKind::Telecommand);
        summary.decoded(PacketKind::Telecommand);

        assert_eq!(summary.num_tm, 1);
        assert_eq!(summary.num_tc, 2);
        assert_eq!(summary.num_tc_decoded, 1);
        assert_eq!(summary.num_decoded(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes() {
        let summary = Summary {
            num_bad_bytes: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["num_bad_bytes"], 3);
        assert_eq!(json["num_tm"], 0);
    }

    #[test]
    fn merge_adds_every_counter() {
        let one = Summary {
            total_bytes: 1,
            num_tm: 2,
            num_tc: 3,
            num_tm_decoded: 4,
            num_tc_decoded: 5,
            num_filtered: 6,
            num_bad_bytes: 7,
            num_bad_headers: 8,
            num_trailing_bytes: 9,
        };
        let mut total = one;
        total += &one;

        assert_eq!(
            total,
            Summary {
                total_bytes: 2,
                num_tm: 4,
                num_tc: 6,
                num_tm_decoded: 8,
                num_tc_decoded: 10,
                num_filtered: 12,
                num_bad_bytes: 14,
                num_bad_headers: 16,
                num_trailing_bytes: 18,
            }
        );
    }
}
