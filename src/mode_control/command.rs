use crate::flight_control::{AutopilotMode, FlightMode};
use crate::util::GeoPoint;
use std::fmt::{Display, Formatter};
use strum_macros::Display as StrumDisplay;
use thiserror::Error;

/// Operator commands with already parsed, typed arguments.
#[derive(Debug, Clone, Copy, PartialEq, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Arm,
    Disarm,
    Takeoff { altitude: f64 },
    #[strum(serialize = "goto_position")]
    Goto { position: GeoPoint },
    Land,
    #[strum(serialize = "return")]
    ReturnToLaunch,
    #[strum(serialize = "set_connected")]
    SetConnected(bool),
    /// Raw mode switch of a live autopilot.
    #[strum(serialize = "set_mode")]
    SetMode { mode: AutopilotMode },
}

impl Command {
    /// Checks the arguments alone, independent of any vehicle state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Command::Takeoff { altitude } => {
                if !altitude.is_finite() {
                    return Err(ValidationError::NotFinite { field: "altitude" });
                }
                if altitude <= 0.0 {
                    return Err(ValidationError::NonPositiveAltitude(altitude));
                }
                Ok(())
            }
            Command::Goto { position } => {
                let (lat, lon) = (position.lat(), position.lon());
                if !lat.is_finite() {
                    return Err(ValidationError::NotFinite { field: "lat" });
                }
                if !lon.is_finite() {
                    return Err(ValidationError::NotFinite { field: "lon" });
                }
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ValidationError::LatitudeOutOfRange(lat));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(ValidationError::LongitudeOutOfRange(lon));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Whether an accepted command of this kind starts a new traced maneuver.
    pub fn starts_maneuver(&self) -> bool {
        matches!(self, Command::Takeoff { .. } | Command::Goto { .. } | Command::ReturnToLaunch)
    }
}

/// Malformed command input. Rejected before any state is inspected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} is missing or not numeric")]
    NotNumeric { field: &'static str },
    #[error("takeoff altitude must be positive, got {0}")]
    NonPositiveAltitude(f64),
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown autopilot mode '{0}'")]
    UnknownMode(String),
}

/// A well formed command that is illegal in the current vehicle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("not connected")]
    NotConnected,
    #[error("vehicle is airborne")]
    Airborne,
    #[error("vehicle is not airborne")]
    NotAirborne,
    #[error("vehicle must be armed")]
    NotArmed,
    #[error("vehicle is already armed")]
    AlreadyArmed,
    #[error("vehicle is already disarmed")]
    AlreadyDisarmed,
    #[error("mode changes need a live autopilot")]
    NoAutopilot,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),
    #[error("command rejected: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("the simulation scheduler has stopped")]
    SchedulerStopped,
    #[error("the live link is not available")]
    LinkUnavailable,
}

/// Outcome of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub mode: FlightMode,
    pub armed: bool,
    /// A new maneuver began and the path trace was reset.
    pub maneuver_started: bool,
}

impl Display for CommandAck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let armed = if self.armed { "armed" } else { "disarmed" };
        write!(f, "{} ({armed})", self.mode)?;
        if self.maneuver_started {
            write!(f, ", new maneuver")?;
        }
        Ok(())
    }
}

/// A mode change caused by an arrival event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: FlightMode,
    pub to: FlightMode,
}

impl Display for ModeTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
