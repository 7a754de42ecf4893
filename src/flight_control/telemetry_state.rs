use crate::util::GeoPoint;
use strum_macros::{Display, EnumString};

/// Flight modes of the vehicle, driven by the mode state machine.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum FlightMode {
    /// Disarmed, or armed but still on the ground.
    #[default]
    Grounded,
    Takeoff,
    /// Free flight towards (or holding at) a commanded target.
    Guided,
    /// Return-to-launch: fly home at the return altitude.
    Rtl,
    Land,
}

impl FlightMode {
    /// Maps a mode string reported by a live flight controller onto the simulator modes.
    ///
    /// Known names are matched case-insensitively. Anything else (e.g. `STABILIZE`, `LOITER`)
    /// is read as `Guided` while armed and `Grounded` otherwise.
    pub fn from_live(value: &str, armed: bool) -> Self {
        value.trim().parse().unwrap_or(if armed { FlightMode::Guided } else { FlightMode::Grounded })
    }
}

/// Flight modes a live autopilot can be switched to directly. Names follow ArduCopter.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AutopilotMode {
    Stabilize,
    Acro,
    AltHold,
    Auto,
    Guided,
    Loiter,
    Rtl,
    Circle,
    Land,
    #[strum(serialize = "POSHOLD")]
    PosHold,
    Brake,
    SmartRtl,
}

/// Battery and GPS health as reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleHealth {
    /// Volts.
    pub battery_voltage: f64,
    /// Amperes.
    pub battery_current: f64,
    /// Remaining charge in percent.
    pub battery_percentage: f64,
    pub gps_satellites: u32,
    pub gps_hdop: f64,
    pub gps_fix: bool,
    /// MAVLink `GPS_FIX_TYPE`, 3 is a 3D fix.
    pub gps_fix_type: u8,
}

impl VehicleHealth {
    /// What the simulated vehicle reports: a full battery and a solid 3D fix.
    pub const SIMULATED: Self = Self {
        battery_voltage: 12.6,
        battery_current: 0.0,
        battery_percentage: 100.0,
        gps_satellites: 15,
        gps_hdop: 0.8,
        gps_fix: true,
        gps_fix_type: 3,
    };
}

/// The simulated vehicle record. Replaced wholesale on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryState {
    pub position: GeoPoint,
    /// Meters above launch, never negative.
    pub altitude: f64,
    /// Degrees in `[0, 360)`.
    pub heading: f64,
    pub ground_speed: f64,
    pub airspeed: f64,
    /// Signed, positive while climbing.
    pub vertical_speed: f64,
    /// Cosmetic only.
    pub roll: f64,
    /// Cosmetic only.
    pub pitch: f64,
    pub armed: bool,
    pub mode: FlightMode,
    pub health: VehicleHealth,
}

impl TelemetryState {
    /// Vehicle resting disarmed at `home`.
    pub fn initial(home: GeoPoint) -> Self {
        Self {
            position: home,
            altitude: 0.0,
            heading: 0.0,
            ground_speed: 0.0,
            airspeed: 0.0,
            vertical_speed: 0.0,
            roll: 0.0,
            pitch: 0.0,
            armed: false,
            mode: FlightMode::Grounded,
            health: VehicleHealth::default(),
        }
    }

    pub fn is_airborne(&self, threshold: f64) -> bool { self.altitude > threshold }
}
