//! Simulated-operation core of the virtual fingerprint sensor.
//!
//! The crate executes biometric operations against configured outcomes while
//! honoring the timing, lockout and cancellation contracts of a real driver.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Session ──► WorkQueue ──► Engine ──► SessionCallback
//!              │          (bounded,     │  ├─ LockoutTracker
//!              │           FIFO, one    │  └─ TouchSequencer (under-display)
//!              │           worker)      │
//!              └── pointer / UI-ready ──┘
//! ```
//!
//! - [`Session`] binds one client to the shared [`Engine`] and owns a
//!   [`WorkQueue`]; it rejects requests after close.
//! - [`WorkQueue`] runs operations one at a time in arrival order on a
//!   dedicated Tokio task and hands each item a [`CancellationSignal`].
//! - [`Engine`] resolves an operation from [`Config`](fpsim_core::Config),
//!   simulating latency while polling for cancellation.
//! - [`VirtualFingerprint`] is the service: sensor props, the session slot,
//!   configuration reset and the diagnostic dump.
//!
//! Every operation produces exactly one terminal
//! [`SessionEvent`](fpsim_core::SessionEvent) through its callback.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fpsim_core::{Config, OperationId, OperationOutcome, Payload, SessionEvent};
//! use fpsim_engine::VirtualFingerprint;
//! use fpsim_hal::NullModuleLoader;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> fpsim_core::Result<()> {
//!     let service = VirtualFingerprint::new(Arc::new(Config::new()), &NullModuleLoader);
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let session = service.create_session(5, 0, Arc::new(tx))?;
//!
//!     session.generate_challenge(OperationId(1))?;
//!     match rx.recv().await {
//!         Some(SessionEvent::Terminal { outcome, .. }) => {
//!             assert!(matches!(outcome, OperationOutcome::Success(Payload::ChallengeGenerated(_))));
//!         }
//!         other => panic!("unexpected event {other:?}"),
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod callback;
pub mod cancellation;
pub mod engine;
pub mod enrollment;
pub mod lockout;
pub mod service;
pub mod session;
pub mod touch;
pub mod work_queue;

pub use callback::{Reporter, SessionCallback};
pub use cancellation::CancellationSignal;
pub use engine::{Engine, SensorGeometry, SensorKind};
pub use enrollment::EnrollmentScript;
pub use lockout::{LockoutPolicy, LockoutTracker};
pub use service::VirtualFingerprint;
pub use session::{OperationHandle, Session};
pub use touch::{PointerDown, TouchSequencer, TouchState, UiReady};
pub use work_queue::{Executor, Quiesced, Ticket, WorkQueue};
