//! Process bootstrap: settings, tracing and dependency assembly.

pub mod config;
pub mod tracing;
pub mod wiring;

pub use config::load_settings;
pub use tracing::init_tracing_subscriber;
pub use wiring::{wire_dependencies, ExternalPorts, WiringError, WiringResult};
