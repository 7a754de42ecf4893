//! Fixed-rate simulation of the vehicle.

mod sim_context;
mod sim_scheduler;

#[cfg(test)]
mod tests;

pub use sim_scheduler::SimulationScheduler;
