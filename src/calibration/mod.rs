//! Raw to engineering value conversion.
//!
//! The conversion method is selected by the prefix of the calibration reference name,
//! following the IDB naming convention:
//!
//! |Prefix|Method|
//! |---|---|
//! |`CIXTS`, `CIXT`, `CAAT`|textual lookup|
//! |`CIXP`|cubic spline over a curve|
//! |`CIX`|polynomial|
//! |`NIX`|not interpreted|
//!
//! Calibration never fails a packet. Anything that cannot be resolved produces
//! [EngValue::Empty] and a warning; the raw value is always kept.
mod spline;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use derive_more::From;
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::schema::{CalibrationCurve, Schema};
use crate::{PacketKind, ParameterType, Raw};

pub use spline::Spline;

/// Maximum number of polynomial coefficients used.
pub const MAX_POLY_COEFFS: usize = 5;

/// Engineering value of a parameter.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, From)]
pub enum EngValue {
    #[default]
    #[from(ignore)]
    Empty,
    Number(f64),
    Text(String),
}

impl From<&str> for EngValue {
    fn from(value: &str) -> Self {
        EngValue::Text(value.to_string())
    }
}

impl EngValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, EngValue::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Textual,
    Spline,
    Polynomial,
    Uninterpreted,
    Unknown,
}

impl Method {
    fn of(reference: &str) -> Self {
        let prefix = reference
            .split(|c: char| c.is_ascii_digit())
            .next()
            .unwrap_or_default();
        match prefix {
            "CIXTS" | "CIXT" | "CAAT" => Method::Textual,
            "CIXP" => Method::Spline,
            "CIX" => Method::Polynomial,
            "NIX" => Method::Uninterpreted,
            _ => Method::Unknown,
        }
    }
}

/// Round to 3 decimals using the exact decimal value of `v`, ties to even.
fn round3(v: f64) -> f64 {
    format!("{v:.3}").parse().unwrap_or(v)
}

fn finite(v: f64, reference: &str) -> EngValue {
    if v.is_finite() {
        EngValue::Number(round3(v))
    } else {
        warn!(reference, value = v, "calibration produced a non-finite value");
        EngValue::Empty
    }
}

/// Look up the curve for `reference`.
///
/// # Errors
/// [Error::CalibrationMiss] if the schema has no curve for `reference`.
pub fn lookup<S: Schema + ?Sized>(schema: &S, reference: &str) -> Result<Arc<CalibrationCurve>> {
    schema
        .calibration_curve(reference)
        .ok_or_else(|| Error::CalibrationMiss(reference.to_string()))
}

/// Converts raw values using curves from a [Schema].
///
/// Fitted splines are cached per calibration reference; the cache is shared safely when
/// the calibrator is used from several threads.
#[derive(Debug, Default)]
pub struct Calibrator {
    splines: RwLock<HashMap<String, Arc<Spline>>>,
}

impl Calibrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `raw` of parameter `name` to its engineering value.
    pub fn calibrate<S: Schema + ?Sized>(
        &self,
        schema: &S,
        name: &str,
        reference: Option<&str>,
        typ: ParameterType,
        raw: &Raw,
        kind: PacketKind,
    ) -> EngValue {
        let reference = reference.filter(|r| !r.is_empty());

        if kind == PacketKind::Telecommand {
            return match reference {
                Some(reference) => self.textual(schema, reference, raw),
                None => EngValue::Empty,
            };
        }

        let Some(reference) = reference else {
            return match (typ, raw) {
                (ParameterType::Timestamp, Raw::Timestamp { coarse, fine }) => {
                    EngValue::Number(round3(f64::from(*coarse) + f64::from(*fine) / 65536.))
                }
                _ => EngValue::Empty,
            };
        };

        match Method::of(reference) {
            Method::Textual => self.textual(schema, reference, raw),
            Method::Spline => self.spline(schema, reference, raw),
            Method::Polynomial => self.polynomial(schema, reference, raw),
            Method::Uninterpreted => {
                warn!(parameter = name, reference, "calibration not interpreted");
                EngValue::Empty
            }
            Method::Unknown => {
                warn!(parameter = name, reference, "unknown calibration reference");
                EngValue::Empty
            }
        }
    }

    fn textual<S: Schema + ?Sized>(&self, schema: &S, reference: &str, raw: &Raw) -> EngValue {
        let key = match raw {
            Raw::Unsigned(v) => i64::try_from(*v).ok(),
            Raw::Signed(v) => Some(*v),
            _ => None,
        };
        if let (Some(CalibrationCurve::Textual(rows)), Some(key)) =
            (schema.calibration_curve(reference).as_deref(), key)
        {
            if let Some((_, text)) = rows.iter().find(|(r, _)| *r == key) {
                return EngValue::Text(text.clone());
            }
        }
        warn!(reference, ?raw, "missing textual calibration");
        EngValue::Empty
    }

    fn spline<S: Schema + ?Sized>(&self, schema: &S, reference: &str, raw: &Raw) -> EngValue {
        let Some(at) = raw.as_f64() else {
            warn!(reference, ?raw, "raw value cannot be interpolated");
            return EngValue::Empty;
        };
        match self.fitted(schema, reference) {
            Some(spline) => finite(spline.eval(at), reference),
            None => EngValue::Empty,
        }
    }

    fn fitted<S: Schema + ?Sized>(&self, schema: &S, reference: &str) -> Option<Arc<Spline>> {
        if let Some(spline) = self
            .splines
            .read()
            .ok()
            .and_then(|cache| cache.get(reference).cloned())
        {
            return Some(spline);
        }
        let curve = match lookup(schema, reference) {
            Ok(curve) => curve,
            Err(err) => {
                warn!(%err, "no calibration curve");
                return None;
            }
        };
        let CalibrationCurve::Spline { x, y } = curve.as_ref() else {
            warn!(reference, "calibration is not a curve");
            return None;
        };
        let Some(spline) = Spline::fit(x, y).map(Arc::new) else {
            warn!(reference, points = x.len(), "cannot fit calibration curve");
            return None;
        };
        if let Ok(mut cache) = self.splines.write() {
            cache.insert(reference.to_string(), spline.clone());
        }
        Some(spline)
    }

    fn polynomial<S: Schema + ?Sized>(&self, schema: &S, reference: &str, raw: &Raw) -> EngValue {
        let curve = match lookup(schema, reference) {
            Ok(curve) => curve,
            Err(err) => {
                warn!(%err, "missing calibration factors");
                return EngValue::Empty;
            }
        };
        let CalibrationCurve::Polynomial(coeffs) = curve.as_ref() else {
            warn!(reference, "calibration is not a polynomial");
            return EngValue::Empty;
        };
        let Some(x) = raw.as_f64() else {
            warn!(reference, ?raw, "raw value cannot be calibrated");
            return EngValue::Empty;
        };
        let value = coeffs
            .iter()
            .take(MAX_POLY_COEFFS)
            .rev()
            .fold(0., |acc, c| acc * x + c);
        finite(value, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemorySchema;
    use test_case::test_case;

    fn schema() -> MemorySchema {
        MemorySchema::new()
            .with_calibration(
                "CIXTS0001",
                CalibrationCurve::Textual(vec![(0, "Off".into()), (1, "On".into())]),
            )
            .with_calibration(
                "CIXP0002",
                CalibrationCurve::Spline {
                    x: vec![0., 1., 2., 3., 4.],
                    y: vec![0., 2., 4., 6., 8.],
                },
            )
            .with_calibration(
                "CIX0003",
                CalibrationCurve::Polynomial(vec![1., 0.5, 0.25, 0., 0., 99.]),
            )
            .with_calibration("CIXP0004", CalibrationCurve::Polynomial(vec![1.]))
    }

    fn tm(cal: &Calibrator, reference: Option<&str>, raw: Raw) -> EngValue {
        cal.calibrate(
            &schema(),
            "NIX00001",
            reference,
            ParameterType::Unsigned,
            &raw,
            PacketKind::Telemetry,
        )
    }

    #[test]
    fn textual_lookup() {
        let cal = Calibrator::new();
        assert_eq!(
            tm(&cal, Some("CIXTS0001"), Raw::Unsigned(1)),
            EngValue::Text("On".into())
        );
        assert_eq!(tm(&cal, Some("CIXTS0001"), Raw::Unsigned(7)), EngValue::Empty);
    }

    #[test]
    fn spline_interpolates_and_extrapolates() {
        let cal = Calibrator::new();
        assert_eq!(
            tm(&cal, Some("CIXP0002"), Raw::Unsigned(3)),
            EngValue::Number(6.)
        );
        // beyond the curve domain
        assert_eq!(
            tm(&cal, Some("CIXP0002"), Raw::Unsigned(10)),
            EngValue::Number(20.)
        );
        assert_eq!(cal.splines.read().unwrap().len(), 1, "spline should be cached");
    }

    #[test]
    fn polynomial_uses_five_coefficients() {
        let cal = Calibrator::new();
        // 1 + 0.5*2 + 0.25*4, the 6th coefficient is ignored
        assert_eq!(
            tm(&cal, Some("CIX0003"), Raw::Unsigned(2)),
            EngValue::Number(3.)
        );
    }

    #[test]
    fn unresolved_references_degrade() {
        let cal = Calibrator::new();
        for reference in ["CIX9999", "CIXP9999", "CIXP0004", "NIX00001", "XYZ1"] {
            assert_eq!(
                tm(&cal, Some(reference), Raw::Unsigned(2)),
                EngValue::Empty,
                "{reference}"
            );
        }
        assert_eq!(tm(&cal, None, Raw::Unsigned(2)), EngValue::Empty);
    }

    #[test]
    fn timestamp_without_reference() {
        let cal = Calibrator::new();
        let eng = cal.calibrate(
            &schema(),
            "NIX00445",
            None,
            ParameterType::Timestamp,
            &Raw::Timestamp {
                coarse: 10,
                fine: 0x4000,
            },
            PacketKind::Telemetry,
        );
        assert_eq!(eng, EngValue::Number(10.25));
    }

    #[test]
    fn timestamp_ties_round_to_even() {
        let cal = Calibrator::new();
        let eng = cal.calibrate(
            &schema(),
            "NIX00445",
            None,
            ParameterType::Timestamp,
            &Raw::Timestamp {
                coarse: 10,
                fine: 0x1000,
            },
            PacketKind::Telemetry,
        );
        assert_eq!(eng, EngValue::Number(10.062));
    }

    #[test_case(10.0625, 10.062 ; "exact tie")]
    #[test_case(10.1875, 10.188 ; "exact tie to even up")]
    #[test_case(1.0005, 1.0 ; "float just below half")]
    #[test_case(-2.0625, -2.062 ; "negative tie")]
    fn rounds_like_decimal(value: f64, expected: f64) {
        assert_eq!(round3(value), expected);
    }

    #[test]
    fn polynomial_rounding_uses_decimal_value() {
        let schema = schema().with_calibration("CIX0009", CalibrationCurve::Polynomial(vec![1.0005]));
        let eng = Calibrator::new().calibrate(
            &schema,
            "NIX00009",
            Some("CIX0009"),
            ParameterType::Unsigned,
            &Raw::Unsigned(0),
            PacketKind::Telemetry,
        );
        assert_eq!(eng, EngValue::Number(1.0));
    }

    #[test]
    fn telecommands_only_use_textual_tables() {
        let cal = Calibrator::new();
        let eng = |reference| {
            cal.calibrate(
                &schema(),
                "PIX00001",
                reference,
                ParameterType::Unsigned,
                &Raw::Unsigned(0),
                PacketKind::Telecommand,
            )
        };
        assert_eq!(eng(Some("CIXTS0001")), EngValue::Text("Off".into()));
        assert_eq!(eng(Some("CIX0003")), EngValue::Empty);
        assert_eq!(eng(None), EngValue::Empty);
    }

    #[test]
    fn lookup_miss() {
        assert_eq!(
            lookup(&schema(), "CIX9999").unwrap_err(),
            Error::CalibrationMiss("CIX9999".to_string())
        );
        assert!(lookup(&schema(), "CIX0003").is_ok());
    }

    #[test]
    fn reference_prefixes() {
        assert_eq!(Method::of("CIXTS20010"), Method::Textual);
        assert_eq!(Method::of("CAAT0005TM"), Method::Textual);
        assert_eq!(Method::of("CIXP0024TM"), Method::Spline);
        assert_eq!(Method::of("CIX00036TM"), Method::Polynomial);
        assert_eq!(Method::of("NIX00123"), Method::Uninterpreted);
        assert_eq!(Method::of("ABC"), Method::Unknown);
    }
}
