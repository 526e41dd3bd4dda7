use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    constants::{
        FW_VERSION, HW_COMPONENT_ID, HW_VERSION, SERIAL_NUMBER, SW_COMPONENT_ID, SW_VERSION,
        VENDOR_CODE_BASE,
    },
    error::Error,
};

/// Caller-supplied correlation token for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub i64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

impl From<i64> for OperationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Proof of a recent credential check, attached to enroll and lockout reset.
///
/// Only the challenge is checked by the simulator; the other fields are
/// carried through to the authentication payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareAuthToken {
    pub challenge: i64,
    pub user_id: i64,
    pub authenticator_id: i64,
    pub timestamp_ms: i64,
}

impl HardwareAuthToken {
    /// Create a token answering the given challenge.
    pub fn for_challenge(challenge: i64) -> Self {
        Self {
            challenge,
            ..Self::default()
        }
    }
}

/// The request half of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationKind {
    Enroll { token: HardwareAuthToken },
    Authenticate,
    DetectInteraction,
    GenerateChallenge,
    RevokeChallenge { challenge: i64 },
    GetAuthenticatorId,
    InvalidateAuthenticatorId,
    EnumerateEnrollments,
    RemoveEnrollments { enrollment_ids: Vec<i32> },
    ResetLockout { token: HardwareAuthToken },
}

impl OperationKind {
    /// Stable lowercase name, used in logs and the shell.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enroll { .. } => "enroll",
            Self::Authenticate => "authenticate",
            Self::DetectInteraction => "detect_interaction",
            Self::GenerateChallenge => "generate_challenge",
            Self::RevokeChallenge { .. } => "revoke_challenge",
            Self::GetAuthenticatorId => "get_authenticator_id",
            Self::InvalidateAuthenticatorId => "invalidate_authenticator_id",
            Self::EnumerateEnrollments => "enumerate_enrollments",
            Self::RemoveEnrollments { .. } => "remove_enrollments",
            Self::ResetLockout { .. } => "reset_lockout",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One biometric request submitted to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub user_id: i32,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(id: impl Into<OperationId>, user_id: i32, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            user_id,
            kind,
        }
    }
}

/// Current lockout gate of the authenticate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutMode {
    None,
    Timed,
    Permanent,
}

impl fmt::Display for LockoutMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match self {
            Self::None => "None",
            Self::Timed => "Timed",
            Self::Permanent => "Permanent",
        };
        f.write_str(mode)
    }
}

/// Terminal error codes delivered to the session callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    HwUnavailable,
    UnableToProcess,
    Timeout,
    NoSpace,
    UnableToRemove,
    BadCalibration,
    /// Vendor-specific code.
    Vendor(i32),
    /// Presented finger did not match an enrollment.
    AuthFailed,
    /// Authentication refused; `remaining` is zero for permanent lockout.
    Lockout { mode: LockoutMode, remaining: Duration },
    /// Configured code outside the known range.
    Other(i32),
}

impl ErrorCode {
    /// Map an `operation_*_error` configuration value to an error code.
    ///
    /// Returns `None` for zero, meaning no error is configured.
    pub fn from_config(code: i32) -> Option<Self> {
        let error = match code {
            0 => return None,
            1 => Self::HwUnavailable,
            2 => Self::UnableToProcess,
            3 => Self::Timeout,
            4 => Self::NoSpace,
            6 => Self::UnableToRemove,
            8 => Self::BadCalibration,
            c if c >= VENDOR_CODE_BASE => Self::Vendor(c - VENDOR_CODE_BASE),
            c => Self::Other(c),
        };
        Some(error)
    }
}

/// Successful result payload, one shape per operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Enrolled { enrollment_id: i32 },
    Authenticated { enrollment_id: i32, token: HardwareAuthToken },
    InteractionDetected,
    ChallengeGenerated(i64),
    ChallengeRevoked(i64),
    AuthenticatorId(i64),
    AuthenticatorIdInvalidated(i64),
    EnrollmentsEnumerated(Vec<i32>),
    EnrollmentsRemoved(Vec<i32>),
    LockoutCleared,
}

/// Terminal result of one operation. Exactly one is delivered per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Success(Payload),
    Error(ErrorCode),
    Canceled,
    TimedOut,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Remaining lockout time when the outcome is a lockout refusal.
    pub fn lockout_remaining(&self) -> Option<Duration> {
        match self {
            Self::Error(ErrorCode::Lockout { remaining, .. }) => Some(*remaining),
            _ => None,
        }
    }
}

/// Acquisition quality feedback emitted while a finger is on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquiredInfo {
    Good,
    Partial,
    Insufficient,
    SensorDirty,
    TooSlow,
    TooFast,
    Start,
    TooDark,
    TooBright,
    Vendor(i32),
    Unknown(i32),
}

impl AcquiredInfo {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Good,
            2 => Self::Partial,
            3 => Self::Insufficient,
            4 => Self::SensorDirty,
            5 => Self::TooSlow,
            6 => Self::TooFast,
            8 => Self::Start,
            9 => Self::TooDark,
            10 => Self::TooBright,
            c if c >= VENDOR_CODE_BASE => Self::Vendor(c - VENDOR_CODE_BASE),
            c => Self::Unknown(c),
        }
    }

    /// Parse a comma separated list of acquired codes such as `"1,2,1001"`.
    ///
    /// Entries that are not integers are skipped.
    pub fn parse_list(text: &str) -> Vec<Self> {
        text.split(',')
            .filter_map(|code| code.trim().parse::<i32>().ok())
            .map(Self::from_code)
            .collect()
    }
}

/// Non-terminal event emitted while an operation is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Acquired(AcquiredInfo),
    EnrollmentProgress { enrollment_id: i32, remaining: u32 },
}

/// Everything a session reports back to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    Progress {
        operation_id: OperationId,
        progress: ProgressEvent,
    },
    Terminal {
        operation_id: OperationId,
        outcome: OperationOutcome,
    },
}

impl SessionEvent {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Progress { operation_id, .. } | Self::Terminal { operation_id, .. } => {
                *operation_id
            }
        }
    }

    /// The outcome, if this is the terminal event of its operation.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match self {
            Self::Terminal { outcome, .. } => Some(outcome),
            Self::Progress { .. } => None,
        }
    }
}

/// Physical placement of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Unknown,
    Rear,
    UnderDisplayOptical,
    PowerButton,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Rear => "REAR",
            Self::UnderDisplayOptical => "UNDER_DISPLAY_OPTICAL",
            Self::PowerButton => "POWER_BUTTON",
        };
        f.write_str(name)
    }
}

/// Sensor security class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStrength {
    Convenience,
    Weak,
    Strong,
}

impl SensorStrength {
    /// Map the `sensor_strength` configuration value; out of range falls back to strong.
    pub fn from_config(value: i32) -> Self {
        match value {
            0 => Self::Convenience,
            1 => Self::Weak,
            _ => Self::Strong,
        }
    }
}

/// Sensor position on the device, in display pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorLocation {
    pub x: i32,
    pub y: i32,
    pub radius: i32,
    pub display: String,
}

impl SensorLocation {
    pub fn new(x: i32, y: i32, radius: i32) -> Self {
        Self {
            x,
            y,
            radius,
            display: String::new(),
        }
    }
}

impl From<(i32, i32, i32)> for SensorLocation {
    fn from((x, y, radius): (i32, i32, i32)) -> Self {
        Self::new(x, y, radius)
    }
}

impl fmt::Display for SensorLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "x={} y={} radius={}", self.x, self.y, self.radius)?;
        if !self.display.is_empty() {
            write!(f, " display={}", self.display)?;
        }
        Ok(())
    }
}

impl FromStr for SensorLocation {
    type Err = Error;

    /// Parse `"x:y:radius"` or `"x:y:radius:display"`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(Error::invalid_config(
                "sensor_location",
                format!("expected x:y:radius[:display], got {s:?}"),
            ));
        }

        let number = |text: &str| {
            text.trim()
                .parse::<i32>()
                .map_err(|e| Error::invalid_config("sensor_location", e.to_string()))
        };

        Ok(Self {
            x: number(parts[0])?,
            y: number(parts[1])?,
            radius: number(parts[2])?,
            display: parts.get(3).map(|d| d.to_string()).unwrap_or_default(),
        })
    }
}

/// Hardware or software component reported in sensor props.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub component_id: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub software_version: String,
}

impl ComponentInfo {
    /// The fixed component list of the virtual sensor.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                component_id: HW_COMPONENT_ID.to_string(),
                hardware_version: HW_VERSION.to_string(),
                firmware_version: FW_VERSION.to_string(),
                serial_number: SERIAL_NUMBER.to_string(),
                software_version: String::new(),
            },
            Self {
                component_id: SW_COMPONENT_ID.to_string(),
                hardware_version: String::new(),
                firmware_version: String::new(),
                serial_number: String::new(),
                software_version: SW_VERSION.to_string(),
            },
        ]
    }
}

/// Static description of the sensor returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorProps {
    pub sensor_id: i32,
    pub strength: SensorStrength,
    pub max_enrollments_per_user: i32,
    pub component_info: Vec<ComponentInfo>,
    pub sensor_type: SensorType,
    pub locations: Vec<SensorLocation>,
    pub supports_navigation_gestures: bool,
    pub supports_detect_interaction: bool,
    pub half_controls_illumination: bool,
    pub display_touch: bool,
}
