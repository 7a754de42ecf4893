mod kinematics;
mod path_tracer;
mod target_spec;
mod telemetry_state;
mod trace_gate;


pub use kinematics::{ArrivalEvents, KinematicsUpdater};
pub use path_tracer::{PathTracer, RouteCursor, RouteUpdate, RouteView};
pub use target_spec::TargetSpec;
pub use telemetry_state::{AutopilotMode, FlightMode, TelemetryState, VehicleHealth};
