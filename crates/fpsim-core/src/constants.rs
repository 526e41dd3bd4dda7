//! Fixed constants of the virtual sensor.
//!
//! Values here are not configurable at runtime. Anything a test or a user may
//! want to change lives in [`Config`](crate::config::Config) instead.

use std::time::Duration;

// ============================================================================
// Work queue
// ============================================================================

/// Default number of outstanding operations (queued plus executing) a
/// session's work queue accepts before rejecting with `Busy`.
pub const MAX_WORKER_QUEUE_SIZE: usize = 5;

/// How often a simulated latency wait checks its cancellation signal.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound on how long closing a session waits for the executing
/// operation to reach a terminal outcome.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

// ============================================================================
// Simulation
// ============================================================================

/// Latency used when an `operation_*_latency` list is empty.
pub const DEFAULT_LATENCY_MS: i32 = 400;

/// Maximum time between pointer-down and UI-ready on an under-display sensor.
pub const UI_READY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Error codes at or above this value are vendor codes (`code - VENDOR_CODE_BASE`).
pub const VENDOR_CODE_BASE: i32 = 1000;

// ============================================================================
// Sensor geometry (x, y, radius in pixels)
// ============================================================================

pub const REAR_SENSOR_LOCATION: (i32, i32, i32) = (0, 0, 0);
pub const SIDE_SENSOR_LOCATION: (i32, i32, i32) = (0, 600, 150);
pub const UNDER_DISPLAY_SENSOR_LOCATION: (i32, i32, i32) = (400, 1600, 150);

// ============================================================================
// Component info reported in sensor props
// ============================================================================

pub const HW_COMPONENT_ID: &str = "fingerprintSensor";
pub const HW_VERSION: &str = "vendor/model/revision";
pub const FW_VERSION: &str = "1.01";
pub const SERIAL_NUMBER: &str = "00000001";
pub const SW_COMPONENT_ID: &str = "matchingAlgorithm";
pub const SW_VERSION: &str = "vendor/version/revision";
