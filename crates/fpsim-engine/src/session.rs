//! Per-client sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use fpsim_core::{Error, HardwareAuthToken, Operation, OperationId, OperationKind, Result};
use tracing::{debug, info, warn};

use crate::callback::SessionCallback;
use crate::cancellation::CancellationSignal;
use crate::engine::Engine;
use crate::touch::UiReady;
use crate::work_queue::{Quiesced, Ticket, WorkQueue};

/// Handle to an accepted operation.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub operation_id: OperationId,
    pub ticket: Ticket,
    signal: CancellationSignal,
}

impl OperationHandle {
    /// Whether cancellation has been requested for this operation.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }
}

/// One client's binding to a sensor.
///
/// A session shares the sensor's [`Engine`] and owns a [`WorkQueue`] that
/// runs its operations in order. Requests return as soon as the operation is
/// queued; outcomes arrive through the session callback. Only protocol
/// errors (`Busy`, `SessionClosed`) are returned directly.
///
/// Sessions are created by
/// [`VirtualFingerprint::create_session`](crate::VirtualFingerprint::create_session).
pub struct Session {
    sensor_id: i32,
    user_id: i32,
    engine: Arc<Engine>,
    queue: WorkQueue,
    callback: Arc<dyn SessionCallback>,
    closed: AtomicBool,
    tickets: Mutex<HashMap<OperationId, Ticket>>,
    opened_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn open(
        sensor_id: i32,
        user_id: i32,
        engine: Arc<Engine>,
        callback: Arc<dyn SessionCallback>,
        capacity: usize,
    ) -> Self {
        info!("Opening session for sensor {} user {}", sensor_id, user_id);
        Self {
            sensor_id,
            user_id,
            queue: WorkQueue::new(Arc::clone(&engine), capacity),
            engine,
            callback,
            closed: AtomicBool::new(false),
            tickets: Mutex::new(HashMap::new()),
            opened_at: Utc::now(),
        }
    }

    pub fn sensor_id(&self) -> i32 {
        self.sensor_id
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queued plus executing operations.
    pub fn outstanding(&self) -> usize {
        self.queue.outstanding()
    }

    /// Queue an operation for this session's user.
    ///
    /// # Errors
    ///
    /// `SessionClosed` after [`close`](Self::close), `Busy` when the queue is
    /// full.
    pub fn submit(
        &self,
        operation_id: OperationId,
        kind: OperationKind,
    ) -> Result<OperationHandle> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let operation = Operation::new(operation_id, self.user_id, kind);
        let (ticket, signal) = self.queue.enqueue(operation, Arc::clone(&self.callback))?;

        let mut tickets = self.tickets();
        tickets.retain(|_, t| self.queue.is_pending(*t));
        tickets.insert(operation_id, ticket);

        Ok(OperationHandle {
            operation_id,
            ticket,
            signal,
        })
    }

    pub fn enroll(
        &self,
        operation_id: OperationId,
        token: HardwareAuthToken,
    ) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::Enroll { token })
    }

    pub fn authenticate(&self, operation_id: OperationId) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::Authenticate)
    }

    pub fn detect_interaction(&self, operation_id: OperationId) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::DetectInteraction)
    }

    pub fn generate_challenge(&self, operation_id: OperationId) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::GenerateChallenge)
    }

    pub fn revoke_challenge(
        &self,
        operation_id: OperationId,
        challenge: i64,
    ) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::RevokeChallenge { challenge })
    }

    pub fn get_authenticator_id(&self, operation_id: OperationId) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::GetAuthenticatorId)
    }

    pub fn invalidate_authenticator_id(
        &self,
        operation_id: OperationId,
    ) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::InvalidateAuthenticatorId)
    }

    pub fn enumerate_enrollments(&self, operation_id: OperationId) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::EnumerateEnrollments)
    }

    pub fn remove_enrollments(
        &self,
        operation_id: OperationId,
        enrollment_ids: Vec<i32>,
    ) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::RemoveEnrollments { enrollment_ids })
    }

    pub fn reset_lockout(
        &self,
        operation_id: OperationId,
        token: HardwareAuthToken,
    ) -> Result<OperationHandle> {
        self.submit(operation_id, OperationKind::ResetLockout { token })
    }

    /// Hold the session's queue idle, `None` while work is outstanding.
    pub(crate) fn quiesce(&self) -> Option<Quiesced<'_>> {
        self.queue.quiesce()
    }

    /// Cancel an operation by id.
    ///
    /// Unknown or already finished operations are ignored.
    pub fn cancel(&self, operation_id: OperationId) {
        let ticket = self.tickets().remove(&operation_id);
        match ticket {
            Some(ticket) if self.queue.cancel(ticket) => {
                debug!("Cancel requested for {}", operation_id);
            }
            _ => debug!("Cancel of {} ignored, not pending", operation_id),
        }
    }

    /// Close the session.
    ///
    /// Cancels the executing operation and everything queued, then waits a
    /// bounded time for the executing one to finish. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing session for sensor {} user {}", self.sensor_id, self.user_id);
        self.queue.cancel_active();
        self.queue.shutdown().await;
        self.tickets().clear();
    }

    // ------------------------------------------------------------------
    // Touch events
    // ------------------------------------------------------------------

    pub fn on_pointer_down(
        &self,
        pointer_id: i32,
        x: i32,
        y: i32,
        minor: f32,
        major: f32,
    ) -> Result<()> {
        self.ensure_open()?;
        debug!(
            "Pointer {} down at ({}, {}) minor {} major {}",
            pointer_id, x, y, minor, major
        );
        self.engine.on_pointer_down();
        Ok(())
    }

    pub fn on_pointer_up(&self, pointer_id: i32) -> Result<()> {
        self.ensure_open()?;
        debug!("Pointer {} up", pointer_id);
        self.engine.on_pointer_up();
        Ok(())
    }

    /// Report that the display is lit over the sensor.
    ///
    /// # Errors
    ///
    /// `TimedOut` when the signal arrives at or after the UI-ready timeout
    /// of the last pointer-down. The pending operation is unaffected.
    pub fn on_ui_ready(&self) -> Result<()> {
        self.ensure_open()?;
        match self.engine.on_ui_ready() {
            UiReady::Accepted | UiReady::Ignored => Ok(()),
            UiReady::Late { elapsed } => {
                let timeout = self.engine.ui_ready_timeout().unwrap_or_default();
                warn!("Late UI ready, finger down not triggered");
                Err(Error::timed_out(elapsed, timeout))
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn tickets(&self) -> MutexGuard<'_, HashMap<OperationId, Ticket>> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sensor_id", &self.sensor_id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .field("queue", &self.queue)
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_core::config::keys;
    use fpsim_core::constants::MAX_WORKER_QUEUE_SIZE;
    use fpsim_core::{Config, OperationOutcome, SessionEvent};
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::engine::SensorKind;

    fn session(
        kind: SensorKind,
    ) -> (Session, Arc<Config>, mpsc::UnboundedReceiver<SessionEvent>) {
        let config = Arc::new(Config::new());
        let engine = Arc::new(Engine::new(kind, Arc::clone(&config)));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::open(5, 0, engine, Arc::new(tx), MAX_WORKER_QUEUE_SIZE);
        (session, config, rx)
    }

    async fn terminal(
        rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    ) -> (OperationId, OperationOutcome) {
        loop {
            if let Some(SessionEvent::Terminal {
                operation_id,
                outcome,
            }) = rx.recv().await
            {
                return (operation_id, outcome);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_operation_id() {
        let (session, config, mut rx) = session(SensorKind::Rear);
        config.set_str(keys::OPERATION_AUTHENTICATE_LATENCY, "5000").unwrap();

        session.authenticate(OperationId(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.cancel(OperationId(1));

        assert_eq!(
            terminal(&mut rx).await,
            (OperationId(1), OperationOutcome::Canceled)
        );

        // Already finished: ignored.
        session.cancel(OperationId(1));
        session.cancel(OperationId(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_rejects() {
        let (session, config, mut rx) = session(SensorKind::Rear);
        config.set_str(keys::OPERATION_AUTHENTICATE_LATENCY, "5000").unwrap();

        session.authenticate(OperationId(1)).unwrap();
        session.authenticate(OperationId(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.close().await;
        session.close().await;
        assert!(session.is_closed());

        let mut outcomes = vec![terminal(&mut rx).await, terminal(&mut rx).await];
        outcomes.sort_by_key(|(id, _)| *id);
        assert_eq!(
            outcomes,
            vec![
                (OperationId(1), OperationOutcome::Canceled),
                (OperationId(2), OperationOutcome::Canceled),
            ]
        );

        assert!(matches!(
            session.authenticate(OperationId(3)),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(session.on_pointer_up(0), Err(Error::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ui_ready_is_timed_out() {
        let (session, _config, _rx) = session(SensorKind::UnderDisplay);
        session.on_pointer_down(0, 400, 1600, 1.0, 1.0).unwrap();
        tokio::time::advance(Duration::from_millis(5_000)).await;

        let error = session.on_ui_ready().unwrap_err();
        assert!(matches!(
            error,
            Error::TimedOut {
                elapsed_ms: 5_000,
                timeout_ms: 5_000
            }
        ));
    }

    #[tokio::test]
    async fn test_touch_ignored_on_rear() {
        let (session, _config, _rx) = session(SensorKind::Rear);
        session.on_pointer_down(0, 0, 0, 0.0, 0.0).unwrap();
        session.on_ui_ready().unwrap();
        session.on_pointer_up(0).unwrap();
    }
}
