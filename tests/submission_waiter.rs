// CLASSIFICATION: COMMUNITY
// Filename: submission_waiter.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-08-14

use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;

use cohesix_iif::{Fence, SubmissionWaiter};

#[test]
fn event_fires_once_after_last_submission() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fences: Vec<Arc<Fence>> = (0..3).map(|_| Fence::create(1, 0).unwrap()).collect();
    let waiter = SubmissionWaiter::new();
    let (tx, rx) = mpsc::sync_channel(2);
    let mut remaining = [u32::MAX; 3];
    waiter
        .wait(&fences, Some(Box::new(tx)), &mut remaining)
        .unwrap();
    assert_eq!(remaining, [1, 1, 1]);

    fences[0].submit_signaler().unwrap();
    fences[1].submit_signaler().unwrap();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    fences[2].submit_signaler().unwrap();
    assert_eq!(rx.try_recv(), Ok(()));
    assert!(rx.try_recv().is_err());
}

#[test]
fn already_complete_fences_report_zero() {
    let done = Fence::create(1, 0).unwrap();
    done.submit_signaler().unwrap();
    let open = Fence::create(2, 0).unwrap();
    let waiter = SubmissionWaiter::new();
    let (tx, rx) = mpsc::sync_channel(1);
    let mut remaining = [u32::MAX; 2];
    waiter
        .wait(
            &[Arc::clone(&done), Arc::clone(&open)],
            Some(Box::new(tx)),
            &mut remaining,
        )
        .unwrap();
    assert_eq!(remaining, [0, 2]);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    open.submit_signaler().unwrap();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    open.submit_signaler().unwrap();
    assert_eq!(rx.try_recv(), Ok(()));
}

#[test]
fn all_complete_fires_immediately() {
    let fences: Vec<Arc<Fence>> = (0..2)
        .map(|_| {
            let f = Fence::create(1, 0).unwrap();
            f.submit_signaler().unwrap();
            f
        })
        .collect();
    let waiter = SubmissionWaiter::new();
    let (tx, rx) = mpsc::sync_channel(1);
    let mut remaining = [u32::MAX; 2];
    waiter
        .wait(&fences, Some(Box::new(tx)), &mut remaining)
        .unwrap();
    assert_eq!(remaining, [0, 0]);
    assert_eq!(rx.try_recv(), Ok(()));
}

#[test]
fn cancelled_waiter_stays_silent() {
    let fences: Vec<Arc<Fence>> = (0..2).map(|_| Fence::create(1, 0).unwrap()).collect();
    let waiter = SubmissionWaiter::new();
    let (tx, rx) = mpsc::sync_channel(1);
    let mut remaining = [u32::MAX; 2];
    waiter
        .wait(&fences, Some(Box::new(tx)), &mut remaining)
        .unwrap();
    waiter.cancel().unwrap();
    for fence in &fences {
        fence.submit_signaler().unwrap();
    }
    // The event target was dropped on cancel, nothing was delivered.
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn destroyed_fence_still_completes_the_wait() {
    let kept = Fence::create(1, 0).unwrap();
    kept.submit_signaler().unwrap();
    let doomed = Fence::create(2, 0).unwrap();
    let waiter = SubmissionWaiter::new();
    let (tx, rx) = mpsc::sync_channel(1);
    let mut remaining = [u32::MAX; 2];
    waiter
        .wait(
            &[Arc::clone(&kept), Arc::clone(&doomed)],
            Some(Box::new(tx)),
            &mut remaining,
        )
        .unwrap();
    assert_eq!(remaining, [0, 2]);
    drop(doomed);
    // The waiter's registration still holds a fence reference, so the
    // fence is not torn down yet and no event is due.
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    // Cancel unregisters the callback and releases the reference; the
    // fence tears down with nothing pending and nothing is leaked.
    waiter.cancel().unwrap();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
}
