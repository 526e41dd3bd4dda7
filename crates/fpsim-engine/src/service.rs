//! The virtual fingerprint service.
//!
//! [`VirtualFingerprint`] is what a host registers as the sensor. It owns the
//! one [`Engine`] for the configured sensor type, hands out at most one open
//! [`Session`] at a time, and answers the operator surface: sensor props,
//! configuration reset, the diagnostic dump, and shell commands.
//!
//! ```text
//!  Config (Arc) ──► VirtualFingerprint ──► Engine (process lifetime)
//!                        │                     ▲
//!  ModuleLoader ──probe──┘                     │
//!                        └──► Session ──► WorkQueue
//! ```
//!
//! A failed module probe is not fatal: the service runs without hardware and
//! reports it in the dump.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fpsim_core::config::keys;
use fpsim_core::constants::MAX_WORKER_QUEUE_SIZE;
use fpsim_core::{ComponentInfo, Config, Error, Result, SensorProps, SensorStrength, SensorType};
use fpsim_hal::{KNOWN_MODULES, LegacyDevice, ModuleLoader, probe_modules};
use tracing::{info, warn};

use crate::callback::SessionCallback;
use crate::engine::{Engine, SensorGeometry, SensorKind};
use crate::session::Session;

const SHELL_HELP: &str = "\
Virtual fingerprint HAL commands:
  help                 show this text
  resetconfig          restore every configuration key to its default
  clearconfig          same as resetconfig
  dump                 print engine, lockout and touch state
  fingerdown           simulate a finger on the sensor
  set <key>=<value>    change one configuration key
  get <key>            print one configuration key
  config               print every configuration key
";

/// The simulated sensor service.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fpsim_core::{Config, SensorType};
/// use fpsim_engine::VirtualFingerprint;
/// use fpsim_hal::NullModuleLoader;
///
/// let config = Arc::new(Config::new());
/// config.set_str("type", "udfps").unwrap();
///
/// let service = VirtualFingerprint::new(config, &NullModuleLoader);
/// let props = service.sensor_props();
///
/// assert_eq!(props.sensor_type, SensorType::UnderDisplayOptical);
/// assert_eq!(props.locations[0].y, 1600);
/// assert!(service.hardware().is_none());
/// ```
#[derive(Debug)]
pub struct VirtualFingerprint {
    config: Arc<Config>,
    engine: Arc<Engine>,
    sensor_type: SensorType,
    hardware: Option<LegacyDevice>,
    session: Mutex<Option<Arc<Session>>>,
    queue_capacity: usize,
}

impl VirtualFingerprint {
    /// Select the sensor variant from `type` and probe the legacy modules.
    pub fn new<L: ModuleLoader + ?Sized>(config: Arc<Config>, loader: &L) -> Self {
        let type_name = config.get_string(keys::TYPE);
        let (kind, sensor_type) = match SensorKind::from_type_name(&type_name) {
            Some(kind) => (kind, kind.sensor_type()),
            None => {
                warn!("Unknown sensor type {:?}, defaulting to rear", type_name);
                (SensorKind::Rear, SensorType::Unknown)
            }
        };
        info!("Virtual fingerprint sensor type {}", sensor_type);

        let hardware = probe_modules(loader, KNOWN_MODULES).into_result().ok();

        Self {
            engine: Arc::new(Engine::new(kind, Arc::clone(&config))),
            config,
            sensor_type,
            hardware,
            session: Mutex::new(None),
            queue_capacity: MAX_WORKER_QUEUE_SIZE,
        }
    }

    /// Set the work queue capacity of sessions created from now on.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The opened legacy module, `None` in degraded mode.
    pub fn hardware(&self) -> Option<&LegacyDevice> {
        self.hardware.as_ref()
    }

    pub fn is_udfps(&self) -> bool {
        self.hardware.as_ref().is_some_and(|device| device.is_udfps)
    }

    pub fn sensor_props(&self) -> SensorProps {
        let kind = self.engine.kind();
        SensorProps {
            sensor_id: self.config.get_i32(keys::SENSOR_ID),
            strength: SensorStrength::from_config(self.config.get_i32(keys::SENSOR_STRENGTH)),
            max_enrollments_per_user: self.config.get_non_negative_i32(keys::MAX_ENROLLMENTS),
            component_info: ComponentInfo::defaults(),
            sensor_type: self.sensor_type,
            locations: vec![kind.sensor_location(&self.config)],
            supports_navigation_gestures: self.config.get_bool(keys::NAVIGATION_GUESTURE),
            supports_detect_interaction: self.config.get_bool(keys::DETECT_INTERACTION),
            half_controls_illumination: self.config.get_bool(keys::CONTROL_ILLUMINATION),
            display_touch: self.config.get_bool(keys::DISPLAY_TOUCH),
        }
    }

    /// Open the session for a client.
    ///
    /// Must be called inside a Tokio runtime; the session spawns its worker.
    ///
    /// # Errors
    ///
    /// `AlreadyOpen` while a previous session has not been closed.
    pub fn create_session(
        &self,
        sensor_id: i32,
        user_id: i32,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Arc<Session>> {
        let mut slot = self.session_slot();
        if let Some(existing) = slot.as_ref() {
            if !existing.is_closed() {
                warn!("Session already open for sensor {}", existing.sensor_id());
                return Err(Error::AlreadyOpen {
                    sensor_id: existing.sensor_id(),
                });
            }
        }

        let session = Arc::new(Session::open(
            sensor_id,
            user_id,
            Arc::clone(&self.engine),
            callback,
            self.queue_capacity,
        ));
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The most recently created session, open or closed.
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.session_slot().clone()
    }

    /// Restore every configuration key to its default and clear lockout.
    ///
    /// The open session's queue is held idle for the duration, so no
    /// operation is admitted against a half-reset configuration.
    ///
    /// # Errors
    ///
    /// `Busy` while the open session has queued or executing operations.
    pub fn reset_config_to_default(&self) -> Result<()> {
        let slot = self.session_slot();
        let _quiesced = match slot.as_ref().filter(|session| !session.is_closed()) {
            Some(session) => match session.quiesce() {
                Some(quiesced) => Some(quiesced),
                None => {
                    warn!("Refusing config reset with operations in flight");
                    return Err(Error::busy(self.queue_capacity));
                }
            },
            None => None,
        };

        self.config.reset_to_default();
        self.engine.reset_lockout_state();
        info!("Configuration reset to defaults");
        Ok(())
    }

    /// Simulate a finger touching the sensor.
    pub fn sim_finger_down(&self) {
        self.engine.finger_down_action();
    }

    /// Human-readable service state.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "----- VirtualFingerprint -----");
        let _ = writeln!(out, "  sensor type: {}", self.sensor_type);
        match &self.hardware {
            Some(device) => {
                let _ = writeln!(
                    out,
                    "  hardware: {} (udfps: {}, version: {})",
                    device.class_name,
                    device.is_udfps,
                    device.version.as_deref().unwrap_or("unknown")
                );
            }
            None => {
                let _ = writeln!(out, "  hardware: none");
            }
        }
        match self.session_slot().as_ref() {
            Some(session) => {
                let _ = writeln!(
                    out,
                    "  session: sensor {} user {} opened {} closed {} outstanding {}",
                    session.sensor_id(),
                    session.user_id(),
                    session.opened_at().to_rfc3339(),
                    session.is_closed(),
                    session.outstanding()
                );
            }
            None => {
                let _ = writeln!(out, "  session: none");
            }
        }
        out.push_str(&self.engine.dump());
        out
    }

    /// Run one operator shell command and return its output.
    ///
    /// # Errors
    ///
    /// Configuration errors from `set`/`get`, and `Busy` from a reset with
    /// work in flight. Unknown commands return the help text.
    pub fn handle_shell_command(&self, args: &[&str]) -> Result<String> {
        match args {
            [] | ["help"] => Ok(SHELL_HELP.to_string()),
            ["resetconfig"] | ["clearconfig"] => {
                self.reset_config_to_default()?;
                Ok("Configuration reset to defaults\n".to_string())
            }
            ["dump"] => Ok(self.dump()),
            ["fingerdown"] => {
                self.sim_finger_down();
                Ok("Finger down\n".to_string())
            }
            ["set", assignment] => {
                let (key, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| Error::invalid_config(*assignment, "expected key=value"))?;
                self.config.set_str(key.trim(), value.trim())?;
                Ok(format!("{} = {}\n", key.trim(), value.trim()))
            }
            ["get", key] => {
                let value = self
                    .config
                    .get(key)
                    .ok_or_else(|| Error::UnknownConfigKey(key.to_string()))?;
                Ok(format!("{} = {}\n", key, value))
            }
            ["config"] => {
                let mut out = String::new();
                for (key, value) in self.config.snapshot() {
                    let _ = writeln!(out, "{} = {}", key, value);
                }
                Ok(out)
            }
            _ => {
                warn!("Unknown shell command {:?}", args);
                Ok(SHELL_HELP.to_string())
            }
        }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
