//! Execution of simulated biometric operations.
//!
//! The [`Engine`] resolves each [`Operation`] to an [`OperationOutcome`] from
//! the shared [`Config`]. Timed operations simulate their configured latency
//! while polling the operation's [`CancellationSignal`]; synchronous
//! operations complete immediately with no cancellation window.
//!
//! One engine exists per sensor and outlives every session, so lockout state
//! carries over from one session to the next.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fpsim_core::config::keys;
use fpsim_core::constants::{
    CANCEL_POLL_INTERVAL, DEFAULT_LATENCY_MS, REAR_SENSOR_LOCATION, SIDE_SENSOR_LOCATION,
    UNDER_DISPLAY_SENSOR_LOCATION,
};
use fpsim_core::{
    AcquiredInfo, Config, ConfigValue, ErrorCode, HardwareAuthToken, LockoutMode, Operation,
    OperationId, OperationKind, OperationOutcome, Payload, ProgressEvent, SensorLocation,
    SensorType,
};
use rand::Rng;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::callback::{Reporter, SessionCallback};
use crate::cancellation::CancellationSignal;
use crate::enrollment::EnrollmentScript;
use crate::lockout::{LockoutPolicy, LockoutTracker};
use crate::touch::{PointerDown, TouchSequencer, UiReady};

/// Geometry capability every sensor variant provides.
pub trait SensorGeometry {
    fn sensor_type(&self) -> SensorType;

    /// Placement used when `sensor_location` is not configured.
    fn default_sensor_location(&self) -> SensorLocation;

    /// Configured placement, or the default when unset or malformed.
    fn sensor_location(&self, config: &Config) -> SensorLocation {
        let text = config.get_string(keys::SENSOR_LOCATION);
        if text.is_empty() {
            return self.default_sensor_location();
        }
        match text.parse() {
            Ok(location) => location,
            Err(e) => {
                warn!("Ignoring sensor_location: {}", e);
                self.default_sensor_location()
            }
        }
    }
}

/// Physical placement of the simulated sensor, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Rear,
    Side,
    UnderDisplay,
}

impl SensorKind {
    /// Map a `type` configuration value, `None` if unrecognized.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "" | "default" | "rear" => Some(Self::Rear),
            "side" => Some(Self::Side),
            "udfps" => Some(Self::UnderDisplay),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rear => "rear",
            Self::Side => "side",
            Self::UnderDisplay => "udfps",
        }
    }
}

impl SensorGeometry for SensorKind {
    fn sensor_type(&self) -> SensorType {
        match self {
            Self::Rear => SensorType::Rear,
            Self::Side => SensorType::PowerButton,
            Self::UnderDisplay => SensorType::UnderDisplayOptical,
        }
    }

    fn default_sensor_location(&self) -> SensorLocation {
        match self {
            Self::Rear => REAR_SENSOR_LOCATION.into(),
            Self::Side => SIDE_SENSOR_LOCATION.into(),
            Self::UnderDisplay => UNDER_DISPLAY_SENSOR_LOCATION.into(),
        }
    }
}

/// Variant-specific state; only the under-display sensor sequences touches.
#[derive(Debug)]
enum SensorVariant {
    Rear,
    Side,
    UnderDisplay(TouchSequencer),
}

impl SensorVariant {
    fn new(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Rear => Self::Rear,
            SensorKind::Side => Self::Side,
            SensorKind::UnderDisplay => Self::UnderDisplay(TouchSequencer::new()),
        }
    }

    fn touch(&mut self) -> Option<&mut TouchSequencer> {
        match self {
            Self::UnderDisplay(touch) => Some(touch),
            Self::Rear | Self::Side => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WorkMode {
    #[default]
    Idle,
    Enroll,
    Authenticate,
    DetectInteraction,
}

/// What the engine is currently working on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct OperationContext {
    mode: WorkMode,
    operation_id: Option<OperationId>,
    token: Option<HardwareAuthToken>,
}

#[derive(Debug)]
struct EngineState {
    variant: SensorVariant,
    lockout: LockoutTracker,
    context: OperationContext,
    finger_down: bool,
}

/// Executes operations for one sensor.
///
/// At most one operation executes at a time. The work queue guarantees this;
/// the engine asserts it and panics on violation.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fpsim_core::{Config, Operation, OperationId, OperationKind, OperationOutcome, Payload};
/// use fpsim_engine::{CancellationSignal, Engine, SensorKind};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::new(SensorKind::Rear, Arc::new(Config::new()));
/// let (tx, _rx) = mpsc::unbounded_channel();
///
/// let operation = Operation::new(OperationId(1), 0, OperationKind::EnumerateEnrollments);
/// let outcome = engine.execute(&operation, &CancellationSignal::new(), &tx).await;
///
/// assert_eq!(outcome, OperationOutcome::Success(Payload::EnrollmentsEnumerated(vec![])));
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    kind: SensorKind,
    config: Arc<Config>,
    state: Mutex<EngineState>,
    finger_down: Notify,
    executing: AtomicBool,
}

impl Engine {
    pub fn new(kind: SensorKind, config: Arc<Config>) -> Self {
        Self {
            kind,
            config,
            state: Mutex::new(EngineState {
                variant: SensorVariant::new(kind),
                lockout: LockoutTracker::new(),
                context: OperationContext::default(),
                finger_down: false,
            }),
            finger_down: Notify::new(),
            executing: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Whether timed operations wait for a finger-down before capturing.
    pub fn requires_finger_down(&self) -> bool {
        self.kind == SensorKind::UnderDisplay
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Execute one operation to its terminal outcome.
    ///
    /// Progress events go to `callback`; the terminal outcome is returned and
    /// left to the caller to deliver.
    ///
    /// # Panics
    ///
    /// Panics if another operation is already executing on this engine.
    pub async fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        callback: &dyn SessionCallback,
    ) -> OperationOutcome {
        let _guard = self.begin_execution(operation);
        let reporter = Reporter::new(operation.id, callback);
        debug!("Executing {} {}", operation.kind, operation.id);

        let outcome = match &operation.kind {
            OperationKind::Enroll { token } => {
                self.enroll(operation, token, cancel, &reporter).await
            }
            OperationKind::Authenticate => self.authenticate(operation, cancel, &reporter).await,
            OperationKind::DetectInteraction => {
                self.detect_interaction(operation, cancel, &reporter).await
            }
            OperationKind::GenerateChallenge => self.generate_challenge(),
            OperationKind::RevokeChallenge { challenge } => self.revoke_challenge(*challenge),
            OperationKind::GetAuthenticatorId => self.get_authenticator_id(),
            OperationKind::InvalidateAuthenticatorId => self.invalidate_authenticator_id(),
            OperationKind::EnumerateEnrollments => self.enumerate_enrollments(),
            OperationKind::RemoveEnrollments { enrollment_ids } => {
                self.remove_enrollments(enrollment_ids)
            }
            OperationKind::ResetLockout { .. } => self.reset_lockout(),
        };

        self.update_context(WorkMode::Idle, None, None);
        info!("{} {} finished: {:?}", operation.kind, operation.id, outcome);
        outcome
    }

    // ------------------------------------------------------------------
    // Timed operations
    // ------------------------------------------------------------------

    async fn authenticate(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        reporter: &Reporter<'_>,
    ) -> OperationOutcome {
        self.update_context(WorkMode::Authenticate, Some(operation.id), None);

        if let Some(refusal) = self.lockout_refusal() {
            return refusal;
        }

        let duration = self.duration_of(keys::OPERATION_AUTHENTICATE_DURATION);
        if let Err(outcome) = self.await_finger_down(cancel, Some(duration)).await {
            return outcome;
        }

        self.report_acquired(keys::OPERATION_AUTHENTICATE_ACQUIRED, reporter);
        let latency = self.latency_of(keys::OPERATION_AUTHENTICATE_LATENCY);
        if !simulate_latency(latency, cancel).await {
            return OperationOutcome::Canceled;
        }

        if let Some(code) = self.configured_error(keys::OPERATION_AUTHENTICATE_ERROR) {
            return OperationOutcome::Error(code);
        }

        let hit = self.config.get_i32(keys::ENROLLMENT_HIT);
        let enrolled = self.config.get_int_list(keys::ENROLLMENTS);
        let fails = self.config.get_bool(keys::OPERATION_AUTHENTICATE_FAILS);

        if fails || hit == 0 || !enrolled.contains(&hit) {
            self.record_failed_attempt();
            return OperationOutcome::Error(ErrorCode::AuthFailed);
        }

        self.record_successful_attempt();
        OperationOutcome::Success(Payload::Authenticated {
            enrollment_id: hit,
            token: HardwareAuthToken {
                challenge: operation.id.0,
                user_id: i64::from(operation.user_id),
                authenticator_id: self.config.get_i64(keys::AUTHENTICATOR_ID),
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            },
        })
    }

    async fn enroll(
        &self,
        operation: &Operation,
        token: &HardwareAuthToken,
        cancel: &CancellationSignal,
        reporter: &Reporter<'_>,
    ) -> OperationOutcome {
        self.update_context(WorkMode::Enroll, Some(operation.id), Some(token.clone()));

        let challenge = self.config.get_i64(keys::CHALLENGE);
        if token.challenge != challenge {
            warn!(
                "Enroll token challenge {} does not match stored challenge {}",
                token.challenge, challenge
            );
            return OperationOutcome::Error(ErrorCode::UnableToProcess);
        }

        let enrolled = self.config.get_int_list(keys::ENROLLMENTS);
        let limit = self.config.get_non_negative_i32(keys::MAX_ENROLLMENTS);
        if enrolled.len() >= limit as usize {
            warn!("Enrollment limit {} reached", limit);
            return OperationOutcome::Error(ErrorCode::NoSpace);
        }

        if let Err(outcome) = self.await_finger_down(cancel, None).await {
            return outcome;
        }

        if let Some(code) = self.configured_error(keys::OPERATION_ENROLL_ERROR) {
            return OperationOutcome::Error(code);
        }

        let script = self.enrollment_script(&enrolled);
        let total = script.steps.len();
        for (step, delay) in script.steps.iter().enumerate() {
            if !simulate_latency(*delay, cancel).await {
                return OperationOutcome::Canceled;
            }
            reporter.progress(ProgressEvent::Acquired(AcquiredInfo::Good));
            reporter.progress(ProgressEvent::EnrollmentProgress {
                enrollment_id: script.enrollment_id,
                remaining: (total - step - 1) as u32,
            });
        }

        if !script.succeeds {
            return OperationOutcome::Error(ErrorCode::UnableToProcess);
        }

        let mut updated = enrolled;
        if !updated.contains(&script.enrollment_id) {
            updated.push(script.enrollment_id);
        }
        self.store(keys::ENROLLMENTS, ConfigValue::IntList(updated));
        self.store(keys::NEXT_ENROLLMENT, ConfigValue::Str(String::new()));

        OperationOutcome::Success(Payload::Enrolled {
            enrollment_id: script.enrollment_id,
        })
    }

    async fn detect_interaction(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        reporter: &Reporter<'_>,
    ) -> OperationOutcome {
        self.update_context(WorkMode::DetectInteraction, Some(operation.id), None);

        if !self.config.get_bool(keys::DETECT_INTERACTION) {
            warn!("Detect interaction is not supported");
            return OperationOutcome::Error(ErrorCode::UnableToProcess);
        }

        let duration = self.duration_of(keys::OPERATION_DETECT_INTERACTION_DURATION);
        if let Err(outcome) = self.await_finger_down(cancel, Some(duration)).await {
            return outcome;
        }

        self.report_acquired(keys::OPERATION_DETECT_INTERACTION_ACQUIRED, reporter);
        let latency = self.latency_of(keys::OPERATION_DETECT_INTERACTION_LATENCY);
        if !simulate_latency(latency, cancel).await {
            return OperationOutcome::Canceled;
        }

        match self.configured_error(keys::OPERATION_DETECT_INTERACTION_ERROR) {
            Some(code) => OperationOutcome::Error(code),
            None => OperationOutcome::Success(Payload::InteractionDetected),
        }
    }

    // ------------------------------------------------------------------
    // Synchronous operations
    // ------------------------------------------------------------------

    fn generate_challenge(&self) -> OperationOutcome {
        let challenge = rand::thread_rng().gen_range(1..i64::MAX);
        self.store(keys::CHALLENGE, ConfigValue::Int64(challenge));
        OperationOutcome::Success(Payload::ChallengeGenerated(challenge))
    }

    fn revoke_challenge(&self, challenge: i64) -> OperationOutcome {
        if self.config.get_i64(keys::CHALLENGE) == challenge {
            self.store(keys::CHALLENGE, ConfigValue::Int64(0));
        } else {
            debug!("Revoked challenge {} was not the stored one", challenge);
        }
        OperationOutcome::Success(Payload::ChallengeRevoked(challenge))
    }

    fn get_authenticator_id(&self) -> OperationOutcome {
        if self.config.get_int_list(keys::ENROLLMENTS).is_empty() {
            return OperationOutcome::Success(Payload::AuthenticatorId(0));
        }
        let mut id = self.config.get_i64(keys::AUTHENTICATOR_ID);
        if id == 0 {
            id = rand::thread_rng().gen_range(1..i64::MAX);
            self.store(keys::AUTHENTICATOR_ID, ConfigValue::Int64(id));
        }
        OperationOutcome::Success(Payload::AuthenticatorId(id))
    }

    fn invalidate_authenticator_id(&self) -> OperationOutcome {
        let id = rand::thread_rng().gen_range(1..i64::MAX);
        self.store(keys::AUTHENTICATOR_ID, ConfigValue::Int64(id));
        OperationOutcome::Success(Payload::AuthenticatorIdInvalidated(id))
    }

    fn enumerate_enrollments(&self) -> OperationOutcome {
        OperationOutcome::Success(Payload::EnrollmentsEnumerated(
            self.config.get_int_list(keys::ENROLLMENTS),
        ))
    }

    fn remove_enrollments(&self, ids: &[i32]) -> OperationOutcome {
        let mut enrolled = self.config.get_int_list(keys::ENROLLMENTS);
        enrolled.retain(|id| !ids.contains(id));
        self.store(keys::ENROLLMENTS, ConfigValue::IntList(enrolled));
        OperationOutcome::Success(Payload::EnrollmentsRemoved(ids.to_vec()))
    }

    fn reset_lockout(&self) -> OperationOutcome {
        self.reset_lockout_state();
        OperationOutcome::Success(Payload::LockoutCleared)
    }

    // ------------------------------------------------------------------
    // Lockout
    // ------------------------------------------------------------------

    /// Current lockout mode, counting an externally set `lockout` flag as
    /// permanent.
    pub fn lockout_mode(&self) -> LockoutMode {
        if self.config.get_bool(keys::LOCKOUT) {
            return LockoutMode::Permanent;
        }
        let policy = LockoutPolicy::from_config(&self.config);
        self.state().lockout.mode(&policy)
    }

    pub fn lockout_time_left(&self) -> Duration {
        let policy = LockoutPolicy::from_config(&self.config);
        self.state().lockout.time_left(&policy)
    }

    pub fn failed_attempts(&self) -> u32 {
        self.state().lockout.failed_count()
    }

    /// Clear the tracker and the `lockout` flag.
    pub fn reset_lockout_state(&self) {
        self.state().lockout.reset();
        self.store(keys::LOCKOUT, ConfigValue::Bool(false));
        info!("Lockout reset");
    }

    fn lockout_refusal(&self) -> Option<OperationOutcome> {
        let mode = self.lockout_mode();
        let remaining = match mode {
            LockoutMode::None => return None,
            LockoutMode::Timed => self.lockout_time_left(),
            LockoutMode::Permanent => Duration::ZERO,
        };
        info!("Authentication refused, lockout {} ({}ms left)", mode, remaining.as_millis());
        Some(OperationOutcome::Error(ErrorCode::Lockout { mode, remaining }))
    }

    fn record_failed_attempt(&self) {
        let policy = LockoutPolicy::from_config(&self.config);
        let (before, after) = {
            let mut state = self.state();
            let before = state.lockout.mode(&policy);
            (before, state.lockout.add_failed_attempt(&policy))
        };
        if before != after {
            info!("Lockout mode {} -> {}", before, after);
        }
        if after == LockoutMode::Permanent {
            self.store(keys::LOCKOUT, ConfigValue::Bool(true));
        }
    }

    fn record_successful_attempt(&self) {
        let policy = LockoutPolicy::from_config(&self.config);
        let mut state = self.state();
        if state.lockout.mode(&policy) != LockoutMode::Permanent {
            state.lockout.reset();
        }
    }

    // ------------------------------------------------------------------
    // Touch
    // ------------------------------------------------------------------

    /// Pointer-down from the touch layer. Ignored by sensors without touch
    /// sequencing.
    pub fn on_pointer_down(&self) {
        let illumination = self.config.get_bool(keys::CONTROL_ILLUMINATION);
        let mut state = self.state();
        let Some(touch) = state.variant.touch() else {
            debug!("Pointer down ignored by {} sensor", self.kind.name());
            return;
        };
        if touch.on_pointer_down(illumination) == PointerDown::FingerDown {
            self.finger_down_locked(&mut state);
        }
    }

    pub fn on_pointer_up(&self) {
        if let Some(touch) = self.state().variant.touch() {
            touch.on_pointer_up();
        }
    }

    /// UI-ready from the display. Fires the finger-down action when it
    /// arrives in time after a pointer-down.
    pub fn on_ui_ready(&self) -> UiReady {
        let mut state = self.state();
        let Some(touch) = state.variant.touch() else {
            debug!("UI ready ignored by {} sensor", self.kind.name());
            return UiReady::Ignored;
        };
        let result = touch.on_ui_ready();
        if result == UiReady::Accepted {
            self.finger_down_locked(&mut state);
        }
        result
    }

    /// Timeout applied between pointer-down and UI-ready, if this sensor
    /// sequences touches.
    pub fn ui_ready_timeout(&self) -> Option<Duration> {
        self.state().variant.touch().map(|touch| touch.timeout())
    }

    /// Advance the pending operation as if a finger touched the sensor.
    pub fn finger_down_action(&self) {
        let mut state = self.state();
        self.finger_down_locked(&mut state);
    }

    fn finger_down_locked(&self, state: &mut EngineState) {
        if state.context.mode == WorkMode::Idle {
            warn!("Finger down with no pending operation");
        } else {
            debug!("Finger down for {:?}", state.context.operation_id);
            state.finger_down = true;
            self.finger_down.notify_waiters();
        }
        if let Some(touch) = state.variant.touch() {
            touch.clear();
        }
    }

    async fn await_finger_down(
        &self,
        cancel: &CancellationSignal,
        timeout: Option<Duration>,
    ) -> Result<(), OperationOutcome> {
        if !self.requires_finger_down() {
            return Ok(());
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let notified = self.finger_down.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.take_finger_down() {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(OperationOutcome::Canceled);
            }

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(OperationOutcome::Canceled),
                _ = expired => {
                    warn!("No finger down before the operation deadline");
                    return Err(OperationOutcome::TimedOut);
                }
            }
        }
    }

    fn take_finger_down(&self) -> bool {
        std::mem::take(&mut self.state().finger_down)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Switch the operation context, clearing touch state when it changes.
    fn update_context(
        &self,
        mode: WorkMode,
        operation_id: Option<OperationId>,
        token: Option<HardwareAuthToken>,
    ) {
        let context = OperationContext {
            mode,
            operation_id,
            token,
        };
        let mut state = self.state();
        if state.context == context {
            return;
        }
        state.context = context;
        state.finger_down = false;
        if let Some(touch) = state.variant.touch() {
            touch.clear();
        }
    }

    fn begin_execution(&self, operation: &Operation) -> ExecutionGuard<'_> {
        let already = self.executing.swap(true, Ordering::AcqRel);
        assert!(
            !already,
            "{} admitted while another operation is executing",
            operation.id
        );
        ExecutionGuard(&self.executing)
    }

    fn enrollment_script(&self, enrolled: &[i32]) -> EnrollmentScript {
        let text = self.config.get_string(keys::NEXT_ENROLLMENT);
        if !text.is_empty() {
            match text.parse() {
                Ok(script) => return script,
                Err(e) => warn!("Ignoring next_enrollment: {}", e),
            }
        }
        let next_id = enrolled.iter().copied().max().unwrap_or(0).saturating_add(1);
        EnrollmentScript::single(next_id, self.latency_of(keys::OPERATION_ENROLL_LATENCY))
    }

    fn report_acquired(&self, key: &str, reporter: &Reporter<'_>) {
        for info in AcquiredInfo::parse_list(&self.config.get_string(key)) {
            reporter.progress(ProgressEvent::Acquired(info));
        }
    }

    /// First entry of a latency list, the default when empty or negative.
    fn latency_of(&self, key: &str) -> Duration {
        let latencies = self.config.get_int_list(key);
        let ms = match latencies.first() {
            Some(&ms) if ms >= 0 => ms,
            Some(&ms) => {
                warn!("Negative latency {} for {}, using default", ms, key);
                DEFAULT_LATENCY_MS
            }
            None => DEFAULT_LATENCY_MS,
        };
        Duration::from_millis(ms as u64)
    }

    fn duration_of(&self, key: &str) -> Duration {
        let ms = self.config.get_i32(key);
        if ms > 0 {
            return Duration::from_millis(ms as u64);
        }
        match Config::default_of(key) {
            Some(ConfigValue::Int32(default)) => Duration::from_millis(default.max(0) as u64),
            _ => Duration::ZERO,
        }
    }

    fn configured_error(&self, key: &str) -> Option<ErrorCode> {
        let code = ErrorCode::from_config(self.config.get_i32(key))?;
        info!("Injecting configured error {:?} from {}", code, key);
        Some(code)
    }

    fn store(&self, key: &str, value: ConfigValue) {
        if let Err(e) = self.config.set(key, value) {
            warn!("Failed to store {}: {}", key, e);
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Human-readable state for diagnostics.
    pub fn dump(&self) -> String {
        let policy = LockoutPolicy::from_config(&self.config);
        let location = self.kind.sensor_location(&self.config);
        let mut state = self.state();
        let mode = state.lockout.mode(&policy);
        let time_left = state.lockout.time_left(&policy);

        let mut out = String::new();
        let _ = writeln!(out, "----- Engine ({}) -----", self.kind.name());
        let _ = writeln!(out, "  sensor type: {}", self.kind.sensor_type());
        let _ = writeln!(out, "  location: {}", location);
        let _ = writeln!(
            out,
            "  context: {:?} {:?}",
            state.context.mode, state.context.operation_id
        );
        let _ = writeln!(out, "  executing: {}", self.is_executing());
        let _ = write!(out, "{}", state.lockout);
        let _ = writeln!(out, "  time left: {}ms ({})", time_left.as_millis(), mode);
        if let Some(touch) = state.variant.touch() {
            let _ = write!(out, "{}", touch);
        }
        out
    }
}

struct ExecutionGuard<'a>(&'a AtomicBool);

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sleep for `latency`, checking `cancel` every [`CANCEL_POLL_INTERVAL`].
///
/// Returns `false` if cancellation was observed first. A cancel that lands
/// after the final check is not seen, and the operation completes normally.
async fn simulate_latency(latency: Duration, cancel: &CancellationSignal) -> bool {
    let deadline = Instant::now() + latency;
    loop {
        if cancel.is_cancelled() {
            debug!("Canceled during simulated latency");
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(CANCEL_POLL_INTERVAL)).await;
    }
}
