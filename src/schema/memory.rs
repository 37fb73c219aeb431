use std::collections::HashMap;
use std::sync::Arc;

use super::{
    BodyLayout, CalibrationCurve, HeaderConstraints, HeaderLayout, Schema, SsidLocation,
};
use crate::PacketKind;

type ServiceKey = (PacketKind, u8, u8);

/// [Schema] backed by in-memory tables.
///
/// # Example
/// ```
/// use stix::schema::{BodyLayout, MemorySchema, ParameterDefinition, Schema};
/// use stix::PacketKind;
///
/// let schema = MemorySchema::stix().with_body(
///     PacketKind::Telemetry,
///     3,
///     25,
///     None,
///     BodyLayout::builder()
///         .spid(54101)
///         .parameters(vec![ParameterDefinition::builder().name("NIXD0001").width(8).build()])
///         .build(),
/// );
/// assert!(schema.body_layout(PacketKind::Telemetry, 3, 25, None).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySchema {
    headers: HashMap<PacketKind, Arc<HeaderLayout>>,
    constraints: HashMap<PacketKind, Arc<HeaderConstraints>>,
    ssids: HashMap<ServiceKey, SsidLocation>,
    bodies: HashMap<(ServiceKey, Option<u32>), Arc<BodyLayout>>,
    curves: HashMap<String, Arc<CalibrationCurve>>,
}

impl MemorySchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, layout: HeaderLayout, constraints: HeaderConstraints) -> Self {
        self.constraints.insert(layout.kind, Arc::new(constraints));
        self.headers.insert(layout.kind, Arc::new(layout));
        self
    }

    #[must_use]
    pub fn with_ssid_location(
        mut self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
        location: SsidLocation,
    ) -> Self {
        self.ssids
            .insert((kind, service_type, service_subtype), location);
        self
    }

    #[must_use]
    pub fn with_body(
        mut self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
        ssid: Option<u32>,
        layout: BodyLayout,
    ) -> Self {
        self.bodies.insert(
            ((kind, service_type, service_subtype), ssid),
            Arc::new(layout),
        );
        self
    }

    #[must_use]
    pub fn with_calibration(mut self, reference: &str, curve: CalibrationCurve) -> Self {
        self.curves.insert(reference.to_string(), Arc::new(curve));
        self
    }
}

impl Schema for MemorySchema {
    fn header_layout(&self, kind: PacketKind) -> Option<Arc<HeaderLayout>> {
        self.headers.get(&kind).cloned()
    }

    fn header_constraints(&self, kind: PacketKind) -> Option<Arc<HeaderConstraints>> {
        self.constraints.get(&kind).cloned()
    }

    fn ssid_location(
        &self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
    ) -> Option<SsidLocation> {
        self.ssids
            .get(&(kind, service_type, service_subtype))
            .copied()
    }

    fn body_layout(
        &self,
        kind: PacketKind,
        service_type: u8,
        service_subtype: u8,
        ssid: Option<u32>,
    ) -> Option<Arc<BodyLayout>> {
        self.bodies
            .get(&((kind, service_type, service_subtype), ssid))
            .cloned()
    }

    fn calibration_curve(&self, reference: &str) -> Option<Arc<CalibrationCurve>> {
        self.curves.get(reference).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParameterDefinition;

    #[test]
    fn body_lookup_is_keyed_by_ssid() {
        let layout = BodyLayout::builder()
            .spid(54102)
            .parameters(vec![ParameterDefinition::builder()
                .name("NIX00020")
                .width(8)
                .build()])
            .build();
        let schema = MemorySchema::new().with_body(PacketKind::Telemetry, 3, 25, Some(2), layout);

        assert!(schema
            .body_layout(PacketKind::Telemetry, 3, 25, Some(2))
            .is_some());
        assert!(schema
            .body_layout(PacketKind::Telemetry, 3, 25, None)
            .is_none());
        assert!(schema
            .body_layout(PacketKind::Telecommand, 3, 25, Some(2))
            .is_none());
    }

    #[test]
    fn schema_through_references() {
        fn spid_of<S: Schema>(schema: S) -> Option<u32> {
            schema
                .body_layout(PacketKind::Telemetry, 21, 6, None)
                .and_then(|b| b.spid)
        }
        let schema = MemorySchema::new().with_body(
            PacketKind::Telemetry,
            21,
            6,
            None,
            BodyLayout::builder().spid(54110).build(),
        );
        assert_eq!(spid_of(&schema), Some(54110));
        assert_eq!(spid_of(Arc::new(schema)), Some(54110));
    }
}
