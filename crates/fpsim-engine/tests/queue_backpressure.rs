//! Capacity, FIFO order and cancellation through a session's work queue.

mod common;

use common::{Harness, settle};
use fpsim_core::config::keys;
use fpsim_core::constants::MAX_WORKER_QUEUE_SIZE;
use fpsim_core::{Error, OperationId, OperationOutcome};

fn slow_harness() -> Harness {
    Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_LATENCY, "10000"),
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_ENABLE, "false"),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_sixth_enqueue_is_busy_until_queued_item_canceled() {
    let mut h = slow_harness();
    for id in 1..=5 {
        h.session.authenticate(OperationId(id)).unwrap();
    }
    assert_eq!(h.session.outstanding(), MAX_WORKER_QUEUE_SIZE);

    let error = h.session.authenticate(OperationId(6)).unwrap_err();
    assert!(matches!(error, Error::Busy { capacity: 5 }));
    assert!(error.is_retryable());

    h.session.cancel(OperationId(2));
    assert_eq!(
        h.next_terminal().await,
        (OperationId(2), OperationOutcome::Canceled)
    );

    h.session.authenticate(OperationId(6)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_canceling_executing_item_frees_capacity() {
    let mut h = slow_harness();
    for id in 1..=5 {
        h.session.authenticate(OperationId(id)).unwrap();
    }
    settle().await;

    h.session.cancel(OperationId(1));
    assert_eq!(
        h.next_terminal().await,
        (OperationId(1), OperationOutcome::Canceled)
    );

    h.session.authenticate(OperationId(6)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_canceled_queued_item_never_reaches_engine() {
    let mut h = Harness::new(&[
        (keys::OPERATION_AUTHENTICATE_FAILS, "true"),
        (keys::LOCKOUT_TIMED_THRESHOLD, "10"),
    ]);
    h.session.authenticate(OperationId(1)).unwrap();
    h.session.authenticate(OperationId(2)).unwrap();
    h.session.cancel(OperationId(2));

    let mut outcomes = vec![h.next_terminal().await, h.next_terminal().await];
    outcomes.sort_by_key(|(id, _)| *id);
    assert_eq!(outcomes[1], (OperationId(2), OperationOutcome::Canceled));

    // Only the first authentication was counted.
    assert_eq!(h.service.engine().failed_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_operations_complete_in_enqueue_order() {
    let mut h = Harness::new(&[]);
    h.session.generate_challenge(OperationId(10)).unwrap();
    h.session.enumerate_enrollments(OperationId(11)).unwrap();
    h.session.authenticate(OperationId(12)).unwrap();
    h.session.get_authenticator_id(OperationId(13)).unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(h.next_terminal().await.0);
    }
    assert_eq!(
        order,
        vec![OperationId(10), OperationId(11), OperationId(12), OperationId(13)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_every_operation_gets_exactly_one_terminal() {
    let mut h = slow_harness();
    for id in 1..=5 {
        h.session.authenticate(OperationId(id)).unwrap();
    }
    settle().await;
    h.session.cancel(OperationId(3));
    h.session.cancel(OperationId(3));
    h.session.close().await;

    let mut terminals: Vec<OperationId> = h
        .drain()
        .iter()
        .filter(|event| event.outcome().is_some())
        .map(|event| event.operation_id())
        .collect();
    terminals.sort();
    assert_eq!(terminals, (1..=5).map(OperationId).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_rejects_and_new_one_opens() {
    let mut h = Harness::new(&[]);
    let stale = std::sync::Arc::clone(&h.session);

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let error = h
        .service
        .create_session(5, 1, std::sync::Arc::new(tx))
        .unwrap_err();
    assert!(matches!(error, Error::AlreadyOpen { sensor_id: 5 }));

    h.reopen().await;
    assert!(matches!(
        stale.authenticate(OperationId(1)),
        Err(Error::SessionClosed)
    ));
    h.session.authenticate(OperationId(1)).unwrap();
}
