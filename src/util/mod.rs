//! Shared helpers: configuration, geodesy and the logging macros.

mod config;
pub mod geo;
pub mod logger;


pub use config::{AppConfig, GotoPolicy, RunMode, SimConfig};
pub use geo::GeoPoint;
