//! Failed authentications, timed and permanent lockout, and reset.

mod common;

use std::time::Duration;

use common::Harness;
use fpsim_core::config::keys;
use fpsim_core::{ErrorCode, HardwareAuthToken, LockoutMode, OperationId, OperationOutcome};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_three_failures_then_timed_lockout() {
    let mut h = Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_TIMED_THRESHOLD, "3"),
    ]);

    for id in 1..=3 {
        h.session.authenticate(OperationId(id)).unwrap();
        assert_eq!(
            h.next_terminal().await,
            (OperationId(id), OperationOutcome::Error(ErrorCode::AuthFailed))
        );
    }
    assert_eq!(h.service.engine().lockout_mode(), LockoutMode::Timed);

    let start = Instant::now();
    h.session.authenticate(OperationId(4)).unwrap();
    let (id, outcome) = h.next_terminal().await;

    assert_eq!(id, OperationId(4));
    assert!(matches!(
        outcome,
        OperationOutcome::Error(ErrorCode::Lockout {
            mode: LockoutMode::Timed,
            ..
        })
    ));
    assert!(outcome.lockout_remaining().unwrap() > Duration::ZERO);
    // Refused without simulating latency.
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(h.service.engine().failed_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timed_lockout_expires_and_relocks() {
    let mut h = Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_TIMED_THRESHOLD, "3"),
        (keys::LOCKOUT_TIMED_DURATION, "2000"),
    ]);
    for id in 1..=3 {
        h.session.authenticate(OperationId(id)).unwrap();
        h.next_terminal().await;
    }

    tokio::time::advance(Duration::from_millis(2_000)).await;
    assert_eq!(h.service.engine().lockout_mode(), LockoutMode::None);

    // The count was kept, so one more failure locks out again.
    h.session.authenticate(OperationId(4)).unwrap();
    assert_eq!(
        h.next_terminal().await.1,
        OperationOutcome::Error(ErrorCode::AuthFailed)
    );
    assert_eq!(h.service.engine().lockout_mode(), LockoutMode::Timed);
    assert_eq!(h.service.engine().failed_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_lockout_survives_session_close() {
    let mut h = Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_TIMED_THRESHOLD, "2"),
    ]);
    for id in 1..=2 {
        h.session.authenticate(OperationId(id)).unwrap();
        h.next_terminal().await;
    }

    h.reopen().await;

    h.session.authenticate(OperationId(3)).unwrap();
    let (_, outcome) = h.next_terminal().await;
    assert!(outcome.lockout_remaining().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_lockout_until_reset() {
    let mut h = Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_TIMED_THRESHOLD, "10"),
        (keys::LOCKOUT_PERMANENT_THRESHOLD, "3"),
    ]);
    for id in 1..=3 {
        h.session.authenticate(OperationId(id)).unwrap();
        h.next_terminal().await;
    }
    assert!(h.service.config().get_bool(keys::LOCKOUT));

    tokio::time::advance(Duration::from_secs(3_600)).await;
    h.session.authenticate(OperationId(4)).unwrap();
    assert_eq!(
        h.next_terminal().await.1,
        OperationOutcome::Error(ErrorCode::Lockout {
            mode: LockoutMode::Permanent,
            remaining: Duration::ZERO,
        })
    );

    h.session
        .reset_lockout(OperationId(5), HardwareAuthToken::default())
        .unwrap();
    assert!(h.next_terminal().await.1.is_success());
    assert_eq!(h.service.engine().lockout_mode(), LockoutMode::None);
    assert_eq!(h.service.engine().failed_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_externally_set_lockout_flag_refuses() {
    let mut h = Harness::new(&[(keys::LOCKOUT, "true")]);
    h.session.authenticate(OperationId(1)).unwrap();
    assert_eq!(
        h.next_terminal().await.1,
        OperationOutcome::Error(ErrorCode::Lockout {
            mode: LockoutMode::Permanent,
            remaining: Duration::ZERO,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_detect_interaction_ignores_lockout() {
    let mut h = Harness::new(&[
        (keys::LOCKOUT, "true"),
        (keys::DETECT_INTERACTION, "true"),
    ]);
    h.session.detect_interaction(OperationId(1)).unwrap();
    assert!(h.next_terminal().await.1.is_success());
}
