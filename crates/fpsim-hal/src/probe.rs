//! Ordered probing of legacy modules.

use tracing::{debug, error, info};

use crate::error::ProbeError;
use crate::traits::{LegacyDevice, LegacyModule, ModuleLoader};

/// Vendor modules tried at startup, in order.
pub const KNOWN_MODULES: &[LegacyModule] = &[
    LegacyModule::new("fpc", false),
    LegacyModule::new("fpc_fod", true),
    LegacyModule::new("goodix", false),
    LegacyModule::new("goodix_fod", true),
    LegacyModule::new("goodix_fod6", true),
    LegacyModule::new("silead", false),
    LegacyModule::new("syna", true),
];

/// Outcome of trying one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub class_name: &'static str,
    pub result: Result<(), ProbeError>,
}

/// Result of a full probe pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    attempts: Vec<ProbeAttempt>,
    device: Option<LegacyDevice>,
}

impl ProbeReport {
    /// Every attempt made, in probe order. Probing stops at the first success.
    pub fn attempts(&self) -> &[ProbeAttempt] {
        &self.attempts
    }

    /// The opened device, if any module opened.
    pub fn device(&self) -> Option<&LegacyDevice> {
        self.device.as_ref()
    }

    /// Whether the opened module drives an under-display sensor.
    ///
    /// `false` when no module opened.
    pub fn is_udfps(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_udfps)
    }

    /// Fold the report into a result, `HardwareUnavailable` when nothing opened.
    pub fn into_result(self) -> fpsim_core::Result<LegacyDevice> {
        match self.device {
            Some(device) => Ok(device),
            None => {
                let reasons: Vec<String> = self
                    .attempts
                    .iter()
                    .filter_map(|a| a.result.as_ref().err().map(ToString::to_string))
                    .collect();
                Err(fpsim_core::Error::hardware_unavailable(if reasons.is_empty() {
                    "no modules to probe".to_string()
                } else {
                    reasons.join("; ")
                }))
            }
        }
    }
}

/// Try each module in order until one opens.
pub fn probe_modules<L>(loader: &L, modules: &[LegacyModule]) -> ProbeReport
where
    L: ModuleLoader + ?Sized,
{
    let mut attempts = Vec::with_capacity(modules.len());
    let mut device = None;

    for module in modules {
        debug!("Opening fingerprint module, class {}", module.class_name);
        match loader.open(module) {
            Ok(opened) => {
                info!("Opened fingerprint module, class {}", module.class_name);
                attempts.push(ProbeAttempt {
                    class_name: module.class_name,
                    result: Ok(()),
                });
                device = Some(opened);
                break;
            }
            Err(e) => {
                error!("Can't open fingerprint module, class {}: {}", module.class_name, e);
                attempts.push(ProbeAttempt {
                    class_name: module.class_name,
                    result: Err(e),
                });
            }
        }
    }

    if device.is_none() {
        error!("Can't open any fingerprint module, running without hardware");
    }

    ProbeReport { attempts, device }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModuleLoader, NullModuleLoader};

    #[test]
    fn test_probe_without_modules_is_degraded() {
        let report = probe_modules(&NullModuleLoader, KNOWN_MODULES);

        assert!(report.device().is_none());
        assert!(!report.is_udfps());
        assert_eq!(report.attempts().len(), KNOWN_MODULES.len());
        assert!(report.attempts().iter().all(|a| a.result.is_err()));

        let error = report.into_result().unwrap_err();
        assert!(matches!(error, fpsim_core::Error::HardwareUnavailable(_)));
    }

    #[test]
    fn test_probe_stops_at_first_success() {
        let loader = MockModuleLoader::new()
            .with_failure(ProbeError::open_failed("fpc", -5))
            .with_module("goodix_fod")
            .with_module("silead");

        let report = probe_modules(&loader, KNOWN_MODULES);

        let device = report.device().unwrap();
        assert_eq!(device.class_name, "goodix_fod");
        assert!(report.is_udfps());

        let tried: Vec<&str> = report.attempts().iter().map(|a| a.class_name).collect();
        assert_eq!(tried, vec!["fpc", "fpc_fod", "goodix", "goodix_fod"]);
        assert_eq!(
            report.attempts()[0].result,
            Err(ProbeError::open_failed("fpc", -5))
        );
    }

    #[test]
    fn test_probe_empty_list() {
        let report = probe_modules(&NullModuleLoader, &[]);
        assert!(report.attempts().is_empty());
        let error = report.into_result().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Hardware unavailable: no modules to probe"
        );
    }

    #[test]
    fn test_probe_through_trait_object() {
        let loader = MockModuleLoader::new().with_module("silead");
        let dyn_loader: &dyn ModuleLoader = &loader;

        let report = probe_modules(dyn_loader, KNOWN_MODULES);
        assert_eq!(report.into_result().unwrap().class_name, "silead");
    }
}
