//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fpsim_core::{Config, OperationId, OperationOutcome, SessionEvent};
use fpsim_engine::{Session, SessionCallback, VirtualFingerprint};
use fpsim_hal::NullModuleLoader;
use tokio::sync::mpsc;

pub struct Harness {
    pub service: VirtualFingerprint,
    pub session: Arc<Session>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    /// Service with the given overrides and one open session.
    pub fn new(overrides: &[(&str, &str)]) -> Self {
        let config = Arc::new(Config::new());
        for (key, value) in overrides {
            config.set_str(key, value).unwrap();
        }
        let service = VirtualFingerprint::new(config, &NullModuleLoader);
        let (session, events) = open_session(&service, 0);
        Self {
            service,
            session,
            events,
        }
    }

    /// Close the current session and open a fresh one.
    pub async fn reopen(&mut self) {
        self.session.close().await;
        let (session, events) = open_session(&self.service, 0);
        self.session = session;
        self.events = events;
    }

    pub async fn next_terminal(&mut self) -> (OperationId, OperationOutcome) {
        next_terminal(&mut self.events).await
    }

    /// Every event received so far.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn open_session(
    service: &VirtualFingerprint,
    user_id: i32,
) -> (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Arc<dyn SessionCallback> = Arc::new(tx);
    let session = service.create_session(5, user_id, callback).unwrap();
    (session, rx)
}

pub async fn next_terminal(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> (OperationId, OperationOutcome) {
    loop {
        let event = rx.recv().await.expect("session callback dropped");
        if let SessionEvent::Terminal {
            operation_id,
            outcome,
        } = event
        {
            return (operation_id, outcome);
        }
    }
}

/// Let the worker pick up queued work. Advances paused time by 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
