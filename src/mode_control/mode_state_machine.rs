use super::command::{Command, CommandAck, CommandError, ModeTransition, PreconditionError};
use crate::flight_control::{ArrivalEvents, FlightMode, TargetSpec, TelemetryState};
use crate::util::{GeoPoint, GotoPolicy, SimConfig};

/// Gates operator commands against the vehicle state and owns the active [`TargetSpec`].
///
/// The machine only ever writes `armed` and `mode` of the telemetry it is handed, apart from
/// the full reset on disconnect.
#[derive(Debug, Clone)]
pub struct ModeStateMachine {
    target: Option<TargetSpec>,
    /// Current home, re-anchored by a takeoff from the ground.
    home: GeoPoint,
    /// Configured home, restored on disconnect.
    initial_home: GeoPoint,
    connected: bool,
    rtl_altitude: f64,
    airborne_threshold: f64,
    goto_policy: GotoPolicy,
}

impl ModeStateMachine {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            target: None,
            home: config.home,
            initial_home: config.home,
            connected: false,
            rtl_altitude: config.rtl_altitude,
            airborne_threshold: config.airborne_threshold,
            goto_policy: config.goto_policy,
        }
    }

    pub fn target(&self) -> Option<&TargetSpec> { self.target.as_ref() }
    pub fn home(&self) -> GeoPoint { self.home }
    pub fn is_connected(&self) -> bool { self.connected }

    /// Decides whether `cmd` would be accepted, without changing anything.
    ///
    /// # Arguments
    /// * `cmd` – The command to check.
    /// * `state` – The vehicle state the command would be applied to.
    ///
    /// # Returns
    /// * `Result<(), CommandError>` – A validation or precondition error on rejection.
    pub fn check(&self, cmd: &Command, state: &TelemetryState) -> Result<(), CommandError> {
        cmd.validate()?;
        if matches!(cmd, Command::SetConnected(_)) {
            return Ok(());
        }
        if !self.connected {
            return Err(PreconditionError::NotConnected.into());
        }
        let airborne = state.is_airborne(self.airborne_threshold);
        let violation = match cmd {
            Command::Arm | Command::Disarm if airborne => Some(PreconditionError::Airborne),
            Command::Arm if state.armed => Some(PreconditionError::AlreadyArmed),
            Command::Disarm if !state.armed => Some(PreconditionError::AlreadyDisarmed),
            Command::Takeoff { .. } if !state.armed => Some(PreconditionError::NotArmed),
            Command::Goto { .. }
                if !airborne && self.goto_policy == GotoPolicy::RequireAirborne =>
            {
                Some(PreconditionError::NotAirborne)
            }
            Command::Land | Command::ReturnToLaunch if !airborne => {
                Some(PreconditionError::NotAirborne)
            }
            _ => None,
        };
        match violation {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Applies `cmd` atomically: either everything changes or nothing does.
    ///
    /// A [`Command::SetMode`] passes [`ModeStateMachine::check`] but has no local effect, so
    /// applying it is rejected with [`PreconditionError::NoAutopilot`].
    pub fn apply(
        &mut self,
        cmd: Command,
        state: &mut TelemetryState,
    ) -> Result<CommandAck, CommandError> {
        self.check(&cmd, state)?;
        match cmd {
            Command::Arm => state.armed = true,
            Command::Disarm => state.armed = false,
            Command::Takeoff { altitude } => {
                if !state.is_airborne(self.airborne_threshold) {
                    self.home = state.position;
                }
                self.target = Some(TargetSpec::climb_to(altitude));
                state.mode = FlightMode::Takeoff;
            }
            Command::Goto { position } => {
                let altitude = self.target.filter(|t| !t.is_landing).and_then(|t| t.altitude);
                self.target = Some(TargetSpec {
                    altitude,
                    position: Some(position),
                    ..TargetSpec::default()
                });
                state.mode = FlightMode::Guided;
            }
            Command::Land => {
                self.target = Some(TargetSpec::land());
                state.mode = FlightMode::Land;
            }
            Command::ReturnToLaunch => {
                self.target = Some(TargetSpec::return_home(self.home, self.rtl_altitude));
                state.mode = FlightMode::Rtl;
            }
            Command::SetConnected(connected) => {
                self.connected = connected;
                if !connected {
                    self.target = None;
                    self.home = self.initial_home;
                    *state = TelemetryState::initial(self.initial_home);
                }
            }
            Command::SetMode { .. } => return Err(PreconditionError::NoAutopilot.into()),
        }
        Ok(CommandAck { mode: state.mode, armed: state.armed, maneuver_started: cmd.starts_maneuver() })
    }

    /// Reacts to the arrival events of one kinematics step.
    ///
    /// Both events are judged against the target that was active during the step, so a
    /// same-tick altitude and position arrival is handled consistently.
    ///
    /// # Returns
    /// * `Option<ModeTransition>` – The mode change, if any.
    pub fn on_arrival(
        &mut self,
        events: ArrivalEvents,
        state: &mut TelemetryState,
    ) -> Option<ModeTransition> {
        let target = self.target?;
        let from = state.mode;

        if events.altitude_arrived {
            if target.is_landing {
                state.armed = false;
                state.mode = FlightMode::Grounded;
                self.target = None;
                return Self::transition(from, state.mode);
            }
            if target.is_rtl && target.position.is_none() {
                self.target = Some(TargetSpec::land());
                state.mode = FlightMode::Land;
            } else if state.mode == FlightMode::Takeoff && target.position.is_none() {
                state.mode = FlightMode::Guided;
            }
        }

        if events.position_arrived {
            if target.is_rtl {
                self.target = Some(TargetSpec::land());
                state.mode = FlightMode::Land;
            } else {
                self.target = target.without_position().into_active();
                if self.target.is_none() && !state.is_airborne(self.airborne_threshold) {
                    // a ground-staged goto ends where it started: on the ground
                    state.mode = FlightMode::Grounded;
                }
            }
        }

        Self::transition(from, state.mode)
    }

    fn transition(from: FlightMode, to: FlightMode) -> Option<ModeTransition> {
        (from != to).then_some(ModeTransition { from, to })
    }
}
