//! Shared vocabulary for the virtual fingerprint sensor.
//!
//! This crate holds the types every other `fpsim` crate speaks: the error
//! taxonomy, operation and outcome types, sensor geometry, constants, and the
//! configuration store that drives simulated outcomes.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{Config, ConfigKind, ConfigValue};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
