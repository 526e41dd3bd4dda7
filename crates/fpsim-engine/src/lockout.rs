//! Failed-attempt counting and the lockout gate.
//!
//! The tracker is a small state machine over consecutive failed
//! authentications:
//!
//! ```text
//!            count >= timed                    time left reaches 0
//!   None ─────────────────────► Timed ─────────────────────────► None
//!     │                           │                 (count kept)
//!     │      count >= permanent   │
//!     └───────────────────────────┴──────────────────► Permanent
//!                                                    (until reset)
//! ```
//!
//! Thresholds are read from [`Config`] at each decision point through a
//! [`LockoutPolicy`], so changing them takes effect on the next attempt.

use std::fmt;
use std::time::Duration;

use fpsim_core::config::keys;
use fpsim_core::{Config, ConfigValue, LockoutMode};
use tokio::time::Instant;

/// Lockout thresholds in effect for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub enabled: bool,
    pub timed_threshold: u32,
    pub timed_duration: Duration,
    pub permanent_threshold: u32,
}

impl LockoutPolicy {
    /// Read the policy from configuration.
    ///
    /// Non-positive thresholds or durations are treated as malformed and fall
    /// back to their defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.get_bool(keys::LOCKOUT_ENABLE),
            timed_threshold: positive_or_default(config, keys::LOCKOUT_TIMED_THRESHOLD) as u32,
            timed_duration: Duration::from_millis(
                positive_or_default(config, keys::LOCKOUT_TIMED_DURATION) as u64,
            ),
            permanent_threshold: positive_or_default(config, keys::LOCKOUT_PERMANENT_THRESHOLD)
                as u32,
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_config(&Config::new())
    }
}

fn positive_or_default(config: &Config, key: &str) -> i32 {
    let value = config.get_i32(key);
    if value > 0 {
        return value;
    }
    match Config::default_of(key) {
        Some(ConfigValue::Int32(default)) => default,
        _ => 1,
    }
}

/// Tracks consecutive failed authentications and derives the lockout mode.
#[derive(Debug)]
pub struct LockoutTracker {
    failed_count: u32,
    mode: LockoutMode,
    timed_start: Option<Instant>,
}

impl LockoutTracker {
    pub fn new() -> Self {
        Self {
            failed_count: 0,
            mode: LockoutMode::None,
            timed_start: None,
        }
    }

    /// Record one failed authentication and return the resulting mode.
    ///
    /// With lockout disabled the tracker is reset instead and the mode is
    /// always `None`.
    pub fn add_failed_attempt(&mut self, policy: &LockoutPolicy) -> LockoutMode {
        if !policy.enabled {
            self.reset();
            return LockoutMode::None;
        }

        // Expire a finished timed window before counting.
        self.mode(policy);

        self.failed_count = self.failed_count.saturating_add(1);

        if self.failed_count >= policy.permanent_threshold {
            self.mode = LockoutMode::Permanent;
            self.timed_start = None;
        } else if self.failed_count >= policy.timed_threshold && self.mode == LockoutMode::None {
            self.mode = LockoutMode::Timed;
            self.timed_start = Some(Instant::now());
        }

        self.mode
    }

    /// Current mode.
    ///
    /// A timed lockout whose window has elapsed reverts to `None` here; the
    /// failed count is kept, so the next failure locks out again.
    pub fn mode(&mut self, policy: &LockoutPolicy) -> LockoutMode {
        if self.mode == LockoutMode::Timed && self.time_left(policy).is_zero() {
            self.mode = LockoutMode::None;
            self.timed_start = None;
        }
        self.mode
    }

    /// Remaining timed-lockout duration, zero outside `Timed`.
    pub fn time_left(&self, policy: &LockoutPolicy) -> Duration {
        match (self.mode, self.timed_start) {
            (LockoutMode::Timed, Some(start)) => {
                policy.timed_duration.saturating_sub(start.elapsed())
            }
            _ => Duration::ZERO,
        }
    }

    /// Clear the count and return to `None` from any mode.
    pub fn reset(&mut self) {
        self.failed_count = 0;
        self.mode = LockoutMode::None;
        self.timed_start = None;
    }

    pub fn failed_count(&self) -> u32 {
        self.failed_count
    }
}

impl Default for LockoutTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockoutTracker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "----- LockoutTracker -----")?;
        writeln!(f, "  failed attempts: {}", self.failed_count)?;
        writeln!(f, "  mode: {}", self.mode)?;
        if let Some(start) = self.timed_start {
            writeln!(f, "  timed since: {}ms", start.elapsed().as_millis())?;
        }
        Ok(())
    }
}
