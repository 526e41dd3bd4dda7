//! Error types for legacy module probing.
//!
//! Each variant names the step of opening a vendor module that failed, so a
//! probe report can say why every candidate was skipped.

/// Result type alias for module loader operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Reasons a single legacy module could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// No module is registered under this class name.
    #[error("Module not found: {class_name}")]
    ModuleNotFound { class_name: String },

    /// The module exists but its descriptor is unusable.
    #[error("Invalid module {class_name}: {message}")]
    InvalidModule { class_name: String, message: String },

    /// The module exposes no open entry point.
    #[error("Module {class_name} has no open method")]
    NoOpenMethod { class_name: String },

    /// The open entry point returned a non-zero status.
    #[error("Opening module {class_name} failed with status {status}")]
    OpenFailed { class_name: String, status: i32 },

    /// The device opened but refused the notification callback.
    #[error("Module {class_name} rejected callback registration")]
    CallbackRegistration { class_name: String },
}

impl ProbeError {
    /// Create a new module not found error.
    pub fn not_found(class_name: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            class_name: class_name.into(),
        }
    }

    /// Create a new invalid module error.
    pub fn invalid_module(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModule {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Create a new open failed error.
    pub fn open_failed(class_name: impl Into<String>, status: i32) -> Self {
        Self::OpenFailed {
            class_name: class_name.into(),
            status,
        }
    }

    /// The class name of the module that failed.
    pub fn class_name(&self) -> &str {
        match self {
            Self::ModuleNotFound { class_name }
            | Self::InvalidModule { class_name, .. }
            | Self::NoOpenMethod { class_name }
            | Self::OpenFailed { class_name, .. }
            | Self::CallbackRegistration { class_name } => class_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = ProbeError::not_found("fpc");
        assert!(matches!(error, ProbeError::ModuleNotFound { .. }));
        assert_eq!(error.to_string(), "Module not found: fpc");
        assert_eq!(error.class_name(), "fpc");
    }

    #[test]
    fn test_open_failed_error() {
        let error = ProbeError::open_failed("goodix", -19);
        assert_eq!(
            error.to_string(),
            "Opening module goodix failed with status -19"
        );
        assert_eq!(error.class_name(), "goodix");
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            ProbeError::invalid_module("syna", "bad tag"),
            ProbeError::NoOpenMethod {
                class_name: "silead".to_string(),
            },
            ProbeError::CallbackRegistration {
                class_name: "fpc_fod".to_string(),
            },
        ];

        for error in errors {
            let _ = format!("{}", error);
            let _ = format!("{:?}", error);
        }
    }
}
