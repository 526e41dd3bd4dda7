//! Loader implementations that need no vendor libraries.

use std::collections::HashMap;

use crate::error::{ProbeError, Result};
use crate::traits::{LegacyDevice, LegacyModule, ModuleLoader};

/// Loader that never finds a module.
///
/// This is what the simulator runs with by default: every probe fails with
/// `ModuleNotFound` and the service continues in degraded mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModuleLoader;

impl ModuleLoader for NullModuleLoader {
    fn open(&self, module: &LegacyModule) -> Result<LegacyDevice> {
        Err(ProbeError::not_found(module.class_name))
    }
}

/// Scriptable loader for tests.
///
/// Modules registered with [`with_module`](Self::with_module) open
/// successfully, failures registered with [`with_failure`](Self::with_failure)
/// are returned as-is, and every other class is `ModuleNotFound`.
///
/// # Examples
///
/// ```
/// use fpsim_hal::{KNOWN_MODULES, MockModuleLoader, probe_modules};
///
/// let loader = MockModuleLoader::new().with_module("syna");
/// let report = probe_modules(&loader, KNOWN_MODULES);
///
/// assert_eq!(report.device().unwrap().class_name, "syna");
/// assert!(report.is_udfps());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockModuleLoader {
    outcomes: HashMap<String, std::result::Result<Option<String>, ProbeError>>,
}

impl MockModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module class open successfully.
    pub fn with_module(mut self, class_name: impl Into<String>) -> Self {
        self.outcomes.insert(class_name.into(), Ok(None));
        self
    }

    /// Make a module class open successfully and report a version.
    pub fn with_versioned_module(
        mut self,
        class_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.outcomes
            .insert(class_name.into(), Ok(Some(version.into())));
        self
    }

    /// Make the module named by the error fail with that error.
    pub fn with_failure(mut self, error: ProbeError) -> Self {
        self.outcomes.insert(error.class_name().to_string(), Err(error));
        self
    }
}

impl ModuleLoader for MockModuleLoader {
    fn open(&self, module: &LegacyModule) -> Result<LegacyDevice> {
        match self.outcomes.get(module.class_name) {
            Some(Ok(None)) => Ok(LegacyDevice::new(module)),
            Some(Ok(Some(version))) => Ok(LegacyDevice::new(module).with_version(version.clone())),
            Some(Err(error)) => Err(error.clone()),
            None => Err(ProbeError::not_found(module.class_name)),
        }
    }
}
