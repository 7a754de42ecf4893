//! Telemetry sources and the wire shape shared by simulated and live telemetry.

mod live_link;
mod telemetry_frame;
mod telemetry_source;

#[cfg(test)]
mod tests;

pub use live_link::LiveLink;
pub use telemetry_frame::TelemetryFrame;
#[cfg(test)]
pub use telemetry_frame::{Inbound, decode_inbound};
pub use telemetry_source::{RouteFeed, SnapshotPublisher, TelemetrySource};
