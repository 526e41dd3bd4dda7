//! Pointer and UI-ready handling on an under-display sensor.

mod common;

use std::time::Duration;

use common::{Harness, settle};
use fpsim_core::config::keys;
use fpsim_core::{Error, OperationId, OperationOutcome};

fn udfps(extra: &[(&'static str, &'static str)]) -> Harness {
    let mut overrides = vec![
        (keys::TYPE, "udfps"),
        (keys::ENROLLMENTS, "1"),
        (keys::ENROLLMENT_HIT, "1"),
    ];
    overrides.extend_from_slice(extra);
    Harness::new(&overrides)
}

#[tokio::test(start_paused = true)]
async fn test_ui_ready_at_timeout_is_late() {
    let mut h = udfps(&[]);
    h.session.authenticate(OperationId(1)).unwrap();
    settle().await;

    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    tokio::time::advance(Duration::from_millis(5_000)).await;

    let error = h.session.on_ui_ready().unwrap_err();
    assert!(matches!(error, Error::TimedOut { timeout_ms: 5_000, .. }));
    // Late arrival does not trigger the capture.
    assert!(h.drain().is_empty());

    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    tokio::time::advance(Duration::from_millis(4_000)).await;
    h.session.on_ui_ready().unwrap();

    let (_, outcome) = h.next_terminal().await;
    assert!(outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_ui_ready_just_before_timeout_triggers() {
    let mut h = udfps(&[]);
    h.session.authenticate(OperationId(1)).unwrap();
    settle().await;

    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    tokio::time::advance(Duration::from_millis(4_999)).await;
    h.session.on_ui_ready().unwrap();

    assert!(h.next_terminal().await.1.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_illumination_control_skips_ui_ready() {
    let mut h = udfps(&[(keys::CONTROL_ILLUMINATION, "true")]);
    h.session.authenticate(OperationId(1)).unwrap();
    settle().await;

    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    assert!(h.next_terminal().await.1.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_pointer_up_clears_touch() {
    let mut h = udfps(&[]);
    h.session.on_pointer_up(0).unwrap();

    h.session.authenticate(OperationId(1)).unwrap();
    settle().await;
    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    h.session.on_pointer_up(0).unwrap();
    h.session.on_pointer_up(0).unwrap();

    // Nothing to illuminate any more.
    h.session.on_ui_ready().unwrap();
    settle().await;
    assert!(h.drain().is_empty());

    h.session.cancel(OperationId(1));
    assert_eq!(h.next_terminal().await.1, OperationOutcome::Canceled);
}

#[tokio::test(start_paused = true)]
async fn test_no_finger_times_out() {
    let mut h = udfps(&[(keys::OPERATION_AUTHENTICATE_DURATION, "3000")]);
    h.session.authenticate(OperationId(1)).unwrap();
    assert_eq!(h.next_terminal().await.1, OperationOutcome::TimedOut);
    assert_eq!(h.service.engine().failed_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_touch_does_not_leak_into_next_operation() {
    let mut h = udfps(&[(keys::DETECT_INTERACTION, "true")]);
    h.session.authenticate(OperationId(1)).unwrap();
    settle().await;

    h.session.on_pointer_down(0, 400, 1600, 2.0, 3.0).unwrap();
    h.session.cancel(OperationId(1));
    assert_eq!(h.next_terminal().await.1, OperationOutcome::Canceled);

    h.session.detect_interaction(OperationId(2)).unwrap();
    settle().await;
    // The pointer-down belonged to the canceled operation.
    h.session.on_ui_ready().unwrap();
    settle().await;
    assert!(h.drain().is_empty());

    h.service.sim_finger_down();
    assert!(h.next_terminal().await.1.is_success());
}
