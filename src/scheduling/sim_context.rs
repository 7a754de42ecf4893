use crate::flight_control::{
    ArrivalEvents, FlightMode, KinematicsUpdater, PathTracer, RouteView, TelemetryState,
    VehicleHealth,
};
use crate::mode_control::{Command, CommandAck, CommandError, ModeStateMachine, ModeTransition};
use crate::util::{GeoPoint, SimConfig};

/// What happened during a single simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub events: ArrivalEvents,
    pub transition: Option<ModeTransition>,
}

/// The whole mutable state of one simulated vehicle.
///
/// Every component is owned here and only reachable through `&mut self`, so a command is
/// always applied completely between two ticks.
#[derive(Debug)]
pub struct SimContext {
    config: SimConfig,
    telemetry: TelemetryState,
    machine: ModeStateMachine,
    tracer: PathTracer,
    kinematics: KinematicsUpdater,
}

impl SimContext {
    pub fn new(config: SimConfig) -> Self {
        Self {
            telemetry: Self::initial_telemetry(config.home),
            machine: ModeStateMachine::new(&config),
            tracer: PathTracer::new(config.trace_delay),
            kinematics: KinematicsUpdater::new(&config),
            config,
        }
    }

    fn initial_telemetry(home: GeoPoint) -> TelemetryState {
        TelemetryState { health: VehicleHealth::SIMULATED, ..TelemetryState::initial(home) }
    }

    /// Validates and applies `cmd`, then resets or halts the path trace accordingly.
    pub fn apply(&mut self, cmd: Command) -> Result<CommandAck, CommandError> {
        let ack = self.machine.apply(cmd, &mut self.telemetry)?;
        if ack.maneuver_started {
            self.tracer.reset(self.telemetry.position);
        }
        match cmd {
            Command::Land => self.tracer.halt(),
            Command::SetConnected(false) => {
                self.tracer.halt();
                self.telemetry = Self::initial_telemetry(self.machine.home());
            }
            _ => {}
        }
        Ok(ack)
    }

    /// Runs one kinematics step, the arrival handling and the path trace in that order.
    ///
    /// # Returns
    /// * `Option<TickReport>` – `None` while disconnected, the vehicle is frozen then.
    pub fn tick(&mut self) -> Option<TickReport> {
        if !self.machine.is_connected() {
            return None;
        }
        let (next, events) = self.kinematics.step(&self.telemetry, self.machine.target());
        self.telemetry = next;
        let transition = self.machine.on_arrival(events, &mut self.telemetry);
        if transition.is_some_and(|t| t.to == FlightMode::Grounded) {
            self.tracer.halt();
        }
        self.tracer.record(self.telemetry.position);
        Some(TickReport { events, transition })
    }

    /// Stops recording the path trace and cancels a pending delay.
    pub fn halt_trace(&mut self) { self.tracer.halt(); }

    pub fn telemetry(&self) -> &TelemetryState { &self.telemetry }
    #[cfg(test)]
    pub fn target(&self) -> Option<&crate::flight_control::TargetSpec> { self.machine.target() }
    pub fn route(&self) -> RouteView { self.tracer.view() }
    pub fn home(&self) -> GeoPoint { self.machine.home() }
    pub fn is_connected(&self) -> bool { self.machine.is_connected() }
    #[cfg(test)]
    pub fn is_trace_pending(&self) -> bool { self.tracer.is_pending() }
    pub fn config(&self) -> &SimConfig { &self.config }
}
