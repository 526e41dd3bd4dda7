//! Pointer and UI-ready sequencing for under-display sensors.
//!
//! An under-display sensor only captures once the display has lit the sensor
//! area. The sequencer pairs a pointer-down with the UI-ready signal that
//! follows it and decides when the finger-down action fires:
//!
//! - With `control_illumination` set the HAL drives the light itself and a
//!   pointer-down fires immediately.
//! - Otherwise finger-down fires on UI-ready, provided it arrives within the
//!   timeout of the pointer-down. Exactly at the timeout counts as late.

use std::fmt;
use std::time::Duration;

use fpsim_core::constants::UI_READY_TIMEOUT;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Observable state of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchState {
    Idle,
    Down,
}

/// What a pointer-down asks of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDown {
    /// Fire the finger-down action now.
    FingerDown,
    /// Wait for UI-ready.
    AwaitUiReady,
}

/// How a UI-ready signal was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiReady {
    /// Arrived in time; the finger-down action fires.
    Accepted,
    /// Arrived at or after the timeout.
    Late { elapsed: Duration },
    /// No pointer was down, nothing to illuminate.
    Ignored,
}

#[derive(Debug)]
pub struct TouchSequencer {
    pointer_down_at: Option<Instant>,
    ui_ready_at: Option<Instant>,
    timeout: Duration,
}

impl TouchSequencer {
    pub fn new() -> Self {
        Self::with_timeout(UI_READY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pointer_down_at: None,
            ui_ready_at: None,
            timeout,
        }
    }

    pub fn state(&self) -> TouchState {
        if self.pointer_down_at.is_some() {
            TouchState::Down
        } else {
            TouchState::Idle
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a pointer-down.
    pub fn on_pointer_down(&mut self, controls_illumination: bool) -> PointerDown {
        self.pointer_down_at = Some(Instant::now());
        if controls_illumination {
            debug!("Pointer down with HAL-controlled illumination");
            PointerDown::FingerDown
        } else {
            PointerDown::AwaitUiReady
        }
    }

    /// Forget any pointer-down. Safe to call in any state.
    pub fn on_pointer_up(&mut self) {
        self.clear();
    }

    /// Resolve a UI-ready signal against the recorded pointer-down.
    pub fn on_ui_ready(&mut self) -> UiReady {
        let Some(down_at) = self.pointer_down_at else {
            warn!("UI ready without a pointer down, ignoring");
            return UiReady::Ignored;
        };

        let elapsed = down_at.elapsed();
        if elapsed >= self.timeout {
            warn!(
                "UI ready after {}ms, limit {}ms",
                elapsed.as_millis(),
                self.timeout.as_millis()
            );
            return UiReady::Late { elapsed };
        }

        self.ui_ready_at = Some(Instant::now());
        UiReady::Accepted
    }

    /// Reset both timestamps.
    pub fn clear(&mut self) {
        self.pointer_down_at = None;
        self.ui_ready_at = None;
    }
}

impl Default for TouchSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TouchSequencer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "----- TouchSequencer -----")?;
        match self.pointer_down_at {
            Some(at) => writeln!(f, "  pointer down: {}ms ago", at.elapsed().as_millis())?,
            None => writeln!(f, "  pointer down: none")?,
        }
        match self.ui_ready_at {
            Some(at) => writeln!(f, "  ui ready: {}ms ago", at.elapsed().as_millis())?,
            None => writeln!(f, "  ui ready: none")?,
        }
        writeln!(f, "  timeout: {}ms", self.timeout.as_millis())
    }
}
