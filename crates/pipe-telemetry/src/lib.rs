//! # Pipe Telemetry
//!
//! Structured logging for processes that host routers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pipe_telemetry::{init_tracing, TelemetryConfig};
//!
//! fn main() {
//!     init_tracing(&TelemetryConfig::from_env()).expect("Failed to init tracing");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PIPE_SERVICE_NAME` | `pipe-router` | Service name attached to logs |
//! | `PIPE_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honored) |
//! | `PIPE_JSON_LOGS` | `false` | Emit JSON instead of pretty output |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}
