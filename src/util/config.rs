use super::GeoPoint;
use crate::warn;
use std::{env, str::FromStr, time::Duration};
use strum_macros::{Display, EnumString};

/// Precondition applied to `goto` while the vehicle is still on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GotoPolicy {
    /// `goto` is accepted on the ground so the vehicle can be staged before takeoff.
    AllowGroundStaging,
    /// `goto` is only accepted once the vehicle is airborne.
    RequireAirborne,
}

/// Where the telemetry snapshots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum RunMode {
    #[strum(serialize = "sim", serialize = "simulated")]
    Simulated,
    #[strum(serialize = "live")]
    Live,
}

/// Kinematic constants, tolerances and the home position of the simulated vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Fixed tick interval of the simulation loop.
    pub tick: Duration,
    /// Climb and descent rate in m/s.
    pub vertical_rate: f64,
    /// Horizontal cruise speed in m/s.
    pub horizontal_speed: f64,
    /// Maximum yaw rate in deg/s.
    pub yaw_rate: f64,
    /// Maximum heading error (deg) at which horizontal translation is allowed.
    pub heading_tolerance: f64,
    /// Altitude snap tolerance in meters.
    pub altitude_tolerance: f64,
    /// Horizontal arrival radius in meters.
    pub arrival_radius: f64,
    /// Constant wind component added to the reported airspeed in m/s.
    pub wind_offset: f64,
    /// Altitude flown on the way home during return-to-launch.
    pub rtl_altitude: f64,
    /// Altitudes above this threshold count as airborne.
    pub airborne_threshold: f64,
    /// Delay before a new maneuver starts recording its path trace.
    pub trace_delay: Duration,
    /// Initial home position, restored on every disconnect.
    pub home: GeoPoint,
    pub goto_policy: GotoPolicy,
}

impl SimConfig {
    /// Tick interval in seconds.
    pub fn dt(&self) -> f64 { self.tick.as_secs_f64() }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            vertical_rate: 2.0,
            horizontal_speed: 15.0,
            yaw_rate: 30.0,
            heading_tolerance: 10.0,
            altitude_tolerance: 0.1,
            arrival_radius: 2.0,
            wind_offset: 2.0,
            rtl_altitude: 30.0,
            airborne_threshold: 0.5,
            trace_delay: Duration::from_secs(10),
            home: AppConfig::DEF_HOME,
            goto_policy: GotoPolicy::AllowGroundStaging,
        }
    }
}

/// Process level configuration, read from `SKYTRACE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub run_mode: RunMode,
    /// Listen address of the operator endpoint.
    pub operator_addr: String,
    /// WebSocket URL of the live telemetry bridge.
    pub live_url: String,
    /// Connect to the vehicle (simulated or live) right after start-up.
    pub autoconnect: bool,
    pub sim: SimConfig,
}

impl AppConfig {
    const DEF_OPERATOR_ADDR: &'static str = "0.0.0.0:8766";
    const DEF_LIVE_URL: &'static str = "ws://localhost:8765";
    const DEF_HOME: GeoPoint = GeoPoint::new(28.3639, 75.5880);

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self { Self::from_lookup(|key| env::var(key).ok()) }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unparsable values are reported and replaced by their default.
    ///
    /// # Arguments
    /// * `lookup` – Returns the raw value for a variable name, if set.
    ///
    /// # Returns
    /// * `AppConfig` – The resulting configuration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let run_mode = parse_or(&lookup, "SKYTRACE_MODE", RunMode::Simulated);
        let home = GeoPoint::new(
            parse_or(&lookup, "SKYTRACE_HOME_LAT", Self::DEF_HOME.lat()),
            parse_or(&lookup, "SKYTRACE_HOME_LON", Self::DEF_HOME.lon()),
        );
        let goto_policy = match run_mode {
            RunMode::Simulated => GotoPolicy::AllowGroundStaging,
            RunMode::Live => GotoPolicy::RequireAirborne,
        };
        Self {
            run_mode,
            operator_addr: lookup("SKYTRACE_OPERATOR_ADDR")
                .unwrap_or_else(|| Self::DEF_OPERATOR_ADDR.to_string()),
            live_url: lookup("SKYTRACE_LIVE_URL")
                .unwrap_or_else(|| Self::DEF_LIVE_URL.to_string()),
            autoconnect: parse_or(&lookup, "SKYTRACE_AUTOCONNECT", true),
            sim: SimConfig {
                home,
                goto_policy: parse_or(&lookup, "SKYTRACE_GOTO_POLICY", goto_policy),
                ..SimConfig::default()
            },
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where T: FromStr {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value '{raw}' for {key}, using default.");
            default
        }),
        None => default,
    }
}
