//! Operator-facing TCP endpoint: streams telemetry and route frames to operator consoles and
//! relays their commands to the active telemetry source.

mod operator_endpoint;
mod operator_messages;
mod operator_relay;


pub use operator_endpoint::OperatorEndpoint;
pub use operator_relay::OperatorRelay;
