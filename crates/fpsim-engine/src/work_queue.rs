//! Bounded single-worker execution queue.
//!
//! Operations run one at a time in arrival order on a dedicated Tokio task.
//! The queue counts the executing item toward its capacity; enqueueing at
//! capacity fails with `Busy` instead of waiting.
//!
//! Every enqueued item gets exactly one terminal event: from the worker when
//! it runs (or is skipped because it was already canceled), or from
//! [`WorkQueue::cancel`] / [`WorkQueue::shutdown`] when it is removed before
//! starting.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fpsim_core::constants::SHUTDOWN_GRACE_PERIOD;
use fpsim_core::{Error, Operation, OperationOutcome, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::callback::{Reporter, SessionCallback};
use crate::cancellation::CancellationSignal;
use crate::engine::Engine;

/// Runs a dequeued operation to its terminal outcome.
pub trait Executor: Send + Sync + 'static {
    fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        callback: &dyn SessionCallback,
    ) -> impl Future<Output = OperationOutcome> + Send;
}

impl Executor for Engine {
    fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        callback: &dyn SessionCallback,
    ) -> impl Future<Output = OperationOutcome> + Send {
        Engine::execute(self, operation, cancel, callback)
    }
}

impl<E: Executor> Executor for Arc<E> {
    fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
        callback: &dyn SessionCallback,
    ) -> impl Future<Output = OperationOutcome> + Send {
        (**self).execute(operation, cancel, callback)
    }
}

/// Identifies one enqueued item within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ticket#{}", self.0)
    }
}

struct WorkItem {
    ticket: Ticket,
    operation: Operation,
    cancel: CancellationSignal,
    callback: Arc<dyn SessionCallback>,
}

impl WorkItem {
    fn finish(&self, outcome: OperationOutcome) {
        Reporter::new(self.operation.id, self.callback.as_ref()).terminal(outcome);
    }
}

struct QueueState {
    pending: VecDeque<WorkItem>,
    active: Option<(Ticket, CancellationSignal)>,
    next_ticket: u64,
    accepting: bool,
    quiesced: bool,
}

impl QueueState {
    fn outstanding(&self) -> usize {
        self.pending.len() + usize::from(self.active.is_some())
    }
}

struct Shared {
    state: Mutex<QueueState>,
    work_ready: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Next {
    Run(WorkItem),
    Wait,
    Stop,
}

/// A bounded FIFO of operations drained by one worker task.
///
/// Must be created inside a Tokio runtime.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fpsim_core::{Config, Operation, OperationId, OperationKind};
/// use fpsim_engine::{Engine, SensorKind, WorkQueue};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fpsim_core::Result<()> {
/// let engine = Arc::new(Engine::new(SensorKind::Rear, Arc::new(Config::new())));
/// let queue = WorkQueue::new(engine, 5);
/// let (tx, mut rx) = mpsc::unbounded_channel();
///
/// let operation = Operation::new(OperationId(1), 0, OperationKind::GenerateChallenge);
/// queue.enqueue(operation, Arc::new(tx))?;
/// let event = rx.recv().await.unwrap();
/// assert!(event.outcome().unwrap().is_success());
///
/// queue.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct WorkQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Create a queue of `capacity` outstanding items and spawn its worker.
    pub fn new<E: Executor>(executor: E, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                pending: VecDeque::with_capacity(capacity),
                active: None,
                next_ticket: 1,
                accepting: true,
                quiesced: false,
            }),
            work_ready: Notify::new(),
            capacity,
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), executor));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Queued plus executing items.
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding()
    }

    /// Whether the item is still queued or executing.
    pub fn is_pending(&self, ticket: Ticket) -> bool {
        let state = self.shared.lock();
        state.active.as_ref().is_some_and(|(t, _)| *t == ticket)
            || state.pending.iter().any(|item| item.ticket == ticket)
    }

    /// Append an operation.
    ///
    /// # Errors
    ///
    /// `Busy` when `capacity` items are outstanding, `SessionClosed` after
    /// shutdown began.
    pub fn enqueue(
        &self,
        operation: Operation,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<(Ticket, CancellationSignal)> {
        let (ticket, cancel) = {
            let mut state = self.shared.lock();
            if !state.accepting {
                return Err(Error::SessionClosed);
            }
            if state.quiesced || state.outstanding() >= self.shared.capacity {
                warn!("Rejecting {} {}, queue full", operation.kind, operation.id);
                return Err(Error::busy(self.shared.capacity));
            }

            let ticket = Ticket(state.next_ticket);
            state.next_ticket += 1;
            let cancel = CancellationSignal::new();
            debug!("Enqueued {} {} as {}", operation.kind, operation.id, ticket);
            state.pending.push_back(WorkItem {
                ticket,
                operation,
                cancel: cancel.clone(),
                callback,
            });
            (ticket, cancel)
        };

        self.shared.work_ready.notify_one();
        Ok((ticket, cancel))
    }

    /// Cancel an item.
    ///
    /// A queued item is removed and reported `Canceled` without reaching the
    /// executor. An executing item is only signalled. Returns `false` if the
    /// ticket is no longer queued or executing.
    pub fn cancel(&self, ticket: Ticket) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            if let Some((active, signal)) = &state.active {
                if *active == ticket {
                    debug!("Signalling cancel of executing {}", ticket);
                    signal.cancel();
                    return true;
                }
            }
            let Some(position) = state.pending.iter().position(|item| item.ticket == ticket)
            else {
                return false;
            };
            state.pending.remove(position)
        };

        if let Some(item) = removed {
            debug!("Canceled queued {}", ticket);
            item.cancel.cancel();
            item.finish(OperationOutcome::Canceled);
        }
        true
    }

    /// Hold the queue idle.
    ///
    /// Succeeds only when nothing is queued or executing. While the returned
    /// guard lives, `enqueue` fails with `Busy`.
    pub fn quiesce(&self) -> Option<Quiesced<'_>> {
        let mut state = self.shared.lock();
        if state.quiesced || state.outstanding() > 0 {
            return None;
        }
        state.quiesced = true;
        Some(Quiesced(&self.shared))
    }

    /// Signal the executing item, if any.
    pub fn cancel_active(&self) -> bool {
        match &self.shared.lock().active {
            Some((_, signal)) => signal.cancel(),
            None => false,
        }
    }

    /// Stop accepting, cancel queued items, and wait for the executing item.
    ///
    /// The wait is bounded by [`SHUTDOWN_GRACE_PERIOD`]; a worker still busy
    /// after that is left to finish on its own.
    pub async fn shutdown(&self) {
        self.stop_accepting();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, worker).await {
            Ok(Ok(())) => debug!("Work queue drained"),
            Ok(Err(e)) => error!("Work queue worker failed: {}", e),
            Err(_) => warn!(
                "Operation still executing after {}ms, not waiting",
                SHUTDOWN_GRACE_PERIOD.as_millis()
            ),
        }
    }

    fn stop_accepting(&self) {
        let drained: Vec<WorkItem> = {
            let mut state = self.shared.lock();
            state.accepting = false;
            state.pending.drain(..).collect()
        };

        for item in drained {
            debug!("Canceled queued {} on shutdown", item.ticket);
            item.cancel.cancel();
            item.finish(OperationOutcome::Canceled);
        }
        self.shared.work_ready.notify_one();
    }
}

/// Keeps a [`WorkQueue`] from admitting work until dropped.
pub struct Quiesced<'a>(&'a Shared);

impl Drop for Quiesced<'_> {
    fn drop(&mut self) {
        self.0.lock().quiesced = false;
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.stop_accepting();
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("WorkQueue")
            .field("capacity", &self.shared.capacity)
            .field("pending", &state.pending.len())
            .field("active", &state.active.as_ref().map(|(t, _)| *t))
            .field("accepting", &state.accepting)
            .field("quiesced", &state.quiesced)
            .finish()
    }
}

async fn run_worker<E: Executor>(shared: Arc<Shared>, executor: E) {
    loop {
        let notified = shared.work_ready.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(item) => {
                    state.active = Some((item.ticket, item.cancel.clone()));
                    Next::Run(item)
                }
                None if state.accepting => Next::Wait,
                None => Next::Stop,
            }
        };

        let item = match next {
            Next::Run(item) => item,
            Next::Wait => {
                notified.await;
                continue;
            }
            Next::Stop => break,
        };

        let outcome = if item.cancel.is_cancelled() {
            debug!("Skipping canceled {}", item.ticket);
            OperationOutcome::Canceled
        } else {
            executor
                .execute(&item.operation, &item.cancel, item.callback.as_ref())
                .await
        };

        // Free the slot first: callbacks may enqueue on the terminal event.
        shared.lock().active = None;
        item.finish(outcome);
    }
    debug!("Work queue worker stopped");
}
