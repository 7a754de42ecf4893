use crate::flight_control::{AutopilotMode, RouteUpdate, TelemetryState};
use crate::mode_control::{Command, ValidationError};
use crate::telemetry_link::TelemetryFrame;
use crate::util::GeoPoint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// A command as sent by an operator: `{"command": "..", "params": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub command: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl UpstreamMessage {
    /// Reads a numeric parameter. Numbers sent as strings are accepted.
    fn number(&self, field: &'static str) -> Result<f64, ValidationError> {
        let parsed = match self.params.get(field) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let value = parsed.ok_or(ValidationError::NotNumeric { field })?;
        if value.is_finite() { Ok(value) } else { Err(ValidationError::NotFinite { field }) }
    }

    /// Reads the `mode` parameter of `set_mode`, `GUIDED` if it is absent.
    fn autopilot_mode(&self) -> Result<AutopilotMode, ValidationError> {
        match self.params.get("mode") {
            None | Some(Value::Null) => Ok(AutopilotMode::Guided),
            Some(Value::String(name)) => AutopilotMode::from_str(name.trim())
                .map_err(|_| ValidationError::UnknownMode(name.clone())),
            Some(other) => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

impl TryFrom<UpstreamMessage> for Command {
    type Error = ValidationError;

    fn try_from(msg: UpstreamMessage) -> Result<Self, Self::Error> {
        let cmd = match msg.command.trim().to_ascii_lowercase().as_str() {
            "arm" => Command::Arm,
            "disarm" => Command::Disarm,
            "takeoff" => Command::Takeoff { altitude: msg.number("altitude")? },
            "goto_position" | "goto" => Command::Goto {
                position: GeoPoint::new(msg.number("lat")?, msg.number("lon")?),
            },
            "land" => Command::Land,
            "return" | "rtl" => Command::ReturnToLaunch,
            "connect" => Command::SetConnected(true),
            "disconnect" => Command::SetConnected(false),
            "set_mode" => Command::SetMode { mode: msg.autopilot_mode()? },
            _ => return Err(ValidationError::UnknownCommand(msg.command)),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

/// Frames streamed to operators, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownstreamFrame {
    Telemetry(TelemetryFrame),
    /// The whole route, replacing whatever the operator shows.
    Path { points: Vec<[f64; 2]> },
    /// Points appended to the last route sent.
    PathAppend { points: Vec<[f64; 2]> },
    Status { message: String },
}

impl DownstreamFrame {
    pub fn telemetry(state: &TelemetryState) -> Self { Self::Telemetry(TelemetryFrame::from(state)) }

    pub fn route_update(update: &RouteUpdate) -> Self {
        let encode = |points: &[GeoPoint]| points.iter().copied().map(<[f64; 2]>::from).collect();
        match update {
            RouteUpdate::Replace(points) => Self::Path { points: encode(points) },
            RouteUpdate::Extend(points) => Self::PathAppend { points: encode(points) },
        }
    }

    pub fn status(message: impl Into<String>) -> Self { Self::Status { message: message.into() } }

    /// Encodes the frame as a single newline terminated line.
    pub fn encode_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
