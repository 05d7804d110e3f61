#![allow(clippy::must_use_candidate)]

pub mod cors;
mod env;
pub mod gateway;
pub mod health;
mod loader;
pub mod protocol;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use cors::*;
pub use gateway::*;
pub use health::*;
pub use protocol::*;
pub use server::*;
pub use telemetry::*;

/// Top-level gateway configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Translation routes and upstream settings
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
