use crate::flight_control::{FlightMode, TelemetryState, VehicleHealth};
use crate::util::{GeoPoint, geo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum displacement (m) between two frames before the heading is inferred from them.
const HEADING_INFERENCE_MIN_DIST: f64 = 0.1;

/// The telemetry shape shared by simulated output and live input.
///
/// Every field is optional on the way in, a missing field keeps its previous value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_alt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_satellites: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_hdop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix_type: Option<u8>,
}

impl From<&TelemetryState> for TelemetryFrame {
    fn from(state: &TelemetryState) -> Self {
        Self {
            lat: Some(state.position.lat()),
            lon: Some(state.position.lon()),
            relative_alt: Some(state.altitude),
            ground_speed: Some(state.ground_speed),
            vertical_speed: Some(state.vertical_speed),
            airspeed: Some(state.airspeed),
            roll: Some(state.roll),
            pitch: Some(state.pitch),
            yaw: Some(state.heading),
            armed: Some(state.armed),
            mode: Some(state.mode.to_string()),
            battery_voltage: Some(state.health.battery_voltage),
            battery_current: Some(state.health.battery_current),
            battery_percentage: Some(state.health.battery_percentage),
            gps_satellites: Some(state.health.gps_satellites),
            gps_hdop: Some(state.health.gps_hdop),
            gps_fix: Some(state.health.gps_fix),
            gps_fix_type: Some(state.health.gps_fix_type),
        }
    }
}

impl TelemetryFrame {
    /// Merges this frame into the previous snapshot.
    ///
    /// A frame without `yaw` gets its heading from the bearing between the previous and the new
    /// position, as long as the vehicle moved far enough for that to be meaningful.
    ///
    /// # Arguments
    /// * `prev` – The last known snapshot.
    ///
    /// # Returns
    /// * `TelemetryState` – The merged snapshot.
    pub fn apply_to(&self, prev: &TelemetryState) -> TelemetryState {
        let position = GeoPoint::new(
            self.lat.unwrap_or(prev.position.lat()),
            self.lon.unwrap_or(prev.position.lon()),
        );
        let heading = match self.yaw {
            Some(yaw) => geo::wrap_360(yaw),
            None if prev.position.distance_to(position) > HEADING_INFERENCE_MIN_DIST => {
                prev.position.bearing_to(position)
            }
            None => prev.heading,
        };
        let armed = self.armed.unwrap_or(prev.armed);
        TelemetryState {
            position,
            altitude: self.relative_alt.map_or(prev.altitude, |alt| alt.max(0.0)),
            heading,
            ground_speed: self.ground_speed.unwrap_or(prev.ground_speed),
            airspeed: self.airspeed.unwrap_or(prev.airspeed),
            vertical_speed: self.vertical_speed.unwrap_or(prev.vertical_speed),
            roll: self.roll.unwrap_or(prev.roll),
            pitch: self.pitch.unwrap_or(prev.pitch),
            armed,
            mode: self.mode.as_deref().map_or(prev.mode, |m| FlightMode::from_live(m, armed)),
            health: self.merge_health(&prev.health),
        }
    }

    fn merge_health(&self, prev: &VehicleHealth) -> VehicleHealth {
        VehicleHealth {
            battery_voltage: self.battery_voltage.unwrap_or(prev.battery_voltage),
            battery_current: self.battery_current.unwrap_or(prev.battery_current),
            battery_percentage: self.battery_percentage.unwrap_or(prev.battery_percentage),
            gps_satellites: self.gps_satellites.unwrap_or(prev.gps_satellites),
            gps_hdop: self.gps_hdop.unwrap_or(prev.gps_hdop),
            gps_fix: self.gps_fix.unwrap_or(prev.gps_fix),
            gps_fix_type: self.gps_fix_type.unwrap_or(prev.gps_fix_type),
        }
    }
}

/// A decoded line received from the live bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Telemetry(TelemetryFrame),
    /// `{"type":"status","message":..}` from the bridge.
    Status(String),
    /// Any other frame type, ignored apart from logging.
    Other(String),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame type is not a string")]
    BadFrameType,
    #[error("connect timed out")]
    ConnectTimeout,
}

/// Decodes one JSON text message from the bridge.
///
/// Frames without a `type` are read as telemetry.
pub fn decode_inbound(line: &str) -> Result<Inbound, LinkError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(LinkError::NotAnObject);
    }
    let kind = match value.get("type") {
        None => None,
        Some(serde_json::Value::String(kind)) => Some(kind.clone()),
        Some(_) => return Err(LinkError::BadFrameType),
    };
    match kind.as_deref() {
        None | Some("telemetry") => Ok(Inbound::Telemetry(serde_json::from_value(value)?)),
        Some("status") => {
            let message = value.get("message").and_then(|m| m.as_str()).unwrap_or_default();
            Ok(Inbound::Status(message.to_string()))
        }
        Some(other) => Ok(Inbound::Other(other.to_string())),
    }
}
