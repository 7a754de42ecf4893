use crate::util::GeoPoint;

/// The currently commanded objective.
///
/// Each axis is optional and animated independently; a missing axis is simply not driven.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetSpec {
    pub altitude: Option<f64>,
    pub position: Option<GeoPoint>,
    /// Reaching the altitude target completes a landing.
    pub is_landing: bool,
    /// Reaching the position target starts the final landing of a return-to-launch.
    pub is_rtl: bool,
}

impl TargetSpec {
    /// Vertical-only objective, as issued by a takeoff.
    pub fn climb_to(altitude: f64) -> Self { Self { altitude: Some(altitude), ..Self::default() } }

    /// Descend to the ground and disarm on touchdown.
    pub fn land() -> Self { Self { altitude: Some(0.0), is_landing: true, ..Self::default() } }

    /// Fly to `home` at `altitude`, then land.
    pub fn return_home(home: GeoPoint, altitude: f64) -> Self {
        Self { altitude: Some(altitude), position: Some(home), is_rtl: true, ..Self::default() }
    }

    /// Same objective with the horizontal axis dropped.
    #[must_use]
    pub fn without_position(self) -> Self { Self { position: None, ..self } }

    pub fn is_empty(&self) -> bool { self.altitude.is_none() && self.position.is_none() }

    /// Collapses an objective without any driven axis to `None`.
    pub fn into_active(self) -> Option<Self> { if self.is_empty() { None } else { Some(self) } }
}
