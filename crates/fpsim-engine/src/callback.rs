//! Delivery of session events to the client.

use fpsim_core::{OperationId, OperationOutcome, ProgressEvent, SessionEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Receives every event a session produces.
///
/// Implementations are called from the worker task and from the thread that
/// cancels a queued operation, so they must not block.
pub trait SessionCallback: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

impl SessionCallback for mpsc::UnboundedSender<SessionEvent> {
    fn on_event(&self, event: SessionEvent) {
        if let Err(e) = self.send(event) {
            debug!("Session event dropped, receiver gone: {:?}", e.0);
        }
    }
}

/// Reports events for one operation.
pub struct Reporter<'a> {
    operation_id: OperationId,
    callback: &'a dyn SessionCallback,
}

impl<'a> Reporter<'a> {
    pub fn new(operation_id: OperationId, callback: &'a dyn SessionCallback) -> Self {
        Self {
            operation_id,
            callback,
        }
    }

    pub fn progress(&self, progress: ProgressEvent) {
        self.callback.on_event(SessionEvent::Progress {
            operation_id: self.operation_id,
            progress,
        });
    }

    pub fn terminal(&self, outcome: OperationOutcome) {
        self.callback.on_event(SessionEvent::Terminal {
            operation_id: self.operation_id,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_core::AcquiredInfo;

    #[test]
    fn test_reporter_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = Reporter::new(OperationId(9), &tx);

        reporter.progress(ProgressEvent::Acquired(AcquiredInfo::Good));
        reporter.terminal(OperationOutcome::Canceled);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.operation_id(), OperationId(9));
        assert!(first.outcome().is_none());

        let second = rx.try_recv().unwrap();
        assert_eq!(second.outcome(), Some(&OperationOutcome::Canceled));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.on_event(SessionEvent::Terminal {
            operation_id: OperationId(1),
            outcome: OperationOutcome::TimedOut,
        });
    }
}
