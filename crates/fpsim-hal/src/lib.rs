//! Legacy fingerprint module probing for the virtual sensor.
//!
//! At startup the service walks an ordered list of vendor module class names
//! and tries to open each one through a [`ModuleLoader`]. The first module
//! that opens wins. When none opens, the service keeps running in degraded
//! mode: the simulated engine is still fully usable and the probe result
//! folds into [`fpsim_core::Error::HardwareUnavailable`] instead of a null
//! device.
//!
//! ```
//! use fpsim_hal::{KNOWN_MODULES, NullModuleLoader, probe_modules};
//!
//! let report = probe_modules(&NullModuleLoader, KNOWN_MODULES);
//! assert!(report.device().is_none());
//! assert_eq!(report.attempts().len(), KNOWN_MODULES.len());
//! assert!(report.into_result().is_err());
//! ```

pub mod error;
pub mod mock;
pub mod probe;
pub mod traits;

pub use error::{ProbeError, Result};
pub use mock::{MockModuleLoader, NullModuleLoader};
pub use probe::{KNOWN_MODULES, ProbeAttempt, ProbeReport, probe_modules};
pub use traits::{LegacyDevice, LegacyModule, ModuleLoader};
