#![allow(clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod flight_control;
mod mode_control;
mod operator;
mod scheduling;
mod telemetry_link;
mod util;

use crate::mode_control::Command;
use crate::operator::{OperatorEndpoint, OperatorRelay};
use crate::scheduling::SimulationScheduler;
use crate::telemetry_link::{LiveLink, TelemetrySource};
use crate::util::{AppConfig, RunMode};
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
    let config = AppConfig::from_env();
    info!(
        "Starting skytrace in {:?} mode, home {}, goto policy {}.",
        config.run_mode, config.sim.home, config.sim.goto_policy
    );

    let source: Box<dyn TelemetrySource> = match config.run_mode {
        RunMode::Simulated => Box::new(SimulationScheduler::new(config.sim.clone()).start()),
        RunMode::Live => Box::new(LiveLink::start(config.live_url.clone(), &config.sim)),
    };
    if config.autoconnect {
        if let Err(e) = source.submit(Command::SetConnected(true)).await {
            warn!("Autoconnect of the {} failed: {e}", source.source_name());
        }
    }

    let endpoint = match OperatorEndpoint::start(config.operator_addr.as_str()).await {
        Ok(endpoint) => Arc::new(endpoint),
        Err(e) => fatal!("Cannot bind operator endpoint to {}: {e}", config.operator_addr),
    };
    info!("Operator endpoint listening on {}.", endpoint.local_addr());
    let relay = OperatorRelay::start(Arc::clone(&endpoint), source);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for ctrl-c: {e}");
    }
    info!("Shutting down.");
    relay.stop().await;
    drop(endpoint);
}
