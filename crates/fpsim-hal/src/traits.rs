//! Module loader abstraction.
//!
//! The loader is the seam between the service and whatever actually opens
//! vendor fingerprint libraries. The simulator ships a loader that finds
//! nothing ([`NullModuleLoader`](crate::mock::NullModuleLoader)) and a
//! scriptable one for tests ([`MockModuleLoader`](crate::mock::MockModuleLoader)).

use crate::error::Result;

/// A vendor module candidate: its class name and whether it drives an
/// under-display sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyModule {
    pub class_name: &'static str,
    pub is_udfps: bool,
}

impl LegacyModule {
    pub const fn new(class_name: &'static str, is_udfps: bool) -> Self {
        Self {
            class_name,
            is_udfps,
        }
    }
}

/// Handle to an opened legacy module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDevice {
    /// Class name the device was opened under.
    pub class_name: String,

    /// Whether the module drives an under-display sensor.
    pub is_udfps: bool,

    /// Module version reported by the loader, if any.
    pub version: Option<String>,
}

impl LegacyDevice {
    pub fn new(module: &LegacyModule) -> Self {
        Self {
            class_name: module.class_name.to_string(),
            is_udfps: module.is_udfps,
            version: None,
        }
    }

    /// Set the module version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Opens legacy fingerprint modules by class name.
///
/// Opening is synchronous and happens once at service start, so the trait
/// stays object-safe and the service can hold a `&dyn ModuleLoader`.
pub trait ModuleLoader: Send + Sync {
    /// Try to open one module.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`](crate::ProbeError) naming the step that failed.
    fn open(&self, module: &LegacyModule) -> Result<LegacyDevice>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for &L {
    fn open(&self, module: &LegacyModule) -> Result<LegacyDevice> {
        (**self).open(module)
    }
}
