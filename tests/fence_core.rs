// CLASSIFICATION: COMMUNITY
// Filename: fence_core.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-08-13

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use serial_test::serial;

use cohesix_iif::{config, fence::id_pool, Fence, FenceError, SignalStatus};

#[test]
fn counters_are_monotonic_and_bounded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fence = Fence::create(3, 0).unwrap();
    for expected in 1..=3 {
        fence.submit_signaler().unwrap();
        assert_eq!(fence.submitted_signalers(), expected);
    }
    assert_eq!(
        fence.submit_signaler().err(),
        Some(FenceError::AlreadyComplete)
    );
    assert_eq!(fence.submitted_signalers(), 3);

    for expected in 1..=3 {
        fence.signal().unwrap();
        assert_eq!(fence.signaled_signalers(), expected);
    }
    // Signaling past the total logs and must not move the counter.
    fence.signal().unwrap();
    assert_eq!(fence.signaled_signalers(), 3);
}

#[test]
fn waiter_gate_requires_full_submission() {
    let fence = Fence::create(2, 0).unwrap();
    assert_eq!(fence.submit_waiter(0).unwrap(), 2);
    fence.submit_signaler().unwrap();
    assert_eq!(fence.submit_waiter(0).unwrap(), 1);
    assert_eq!(fence.outstanding_waiters(), 0);
    fence.submit_signaler().unwrap();
    assert_eq!(fence.submit_waiter(0).unwrap(), 0);
    assert_eq!(fence.outstanding_waiters(), 1);
    fence.waited(0).unwrap();
    assert_eq!(fence.outstanding_waiters(), 0);
    assert_eq!(fence.waited(0).err(), Some(FenceError::InvalidArgument));
}

#[test]
fn poll_callback_fires_at_most_once() {
    let fence = Fence::create(1, 0).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    fence
        .add_poll_callback(Box::new(move |_f, _status| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    fence.submit_signaler().unwrap();
    fence.signal().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // Re-signaling the complete fence must not re-deliver.
    fence.signal().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn removed_poll_callback_never_fires() {
    let fence = Fence::create(1, 0).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let token = fence
        .add_poll_callback(Box::new(move |_f, _status| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    fence.remove_poll_callback(token).unwrap();
    fence.submit_signaler().unwrap();
    fence.signal().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    // The list completed, so removal is no longer possible.
    assert_eq!(
        fence.remove_poll_callback(token).err(),
        Some(FenceError::AlreadyComplete)
    );
}

#[test]
fn destruction_forces_pending_poll_callbacks() {
    let fence = Fence::create(3, 0).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let status_seen = Arc::new(AtomicI32::new(i32::MAX));
    let h = Arc::clone(&hits);
    let s = Arc::clone(&status_seen);
    fence
        .add_poll_callback(Box::new(move |_f, status| {
            h.fetch_add(1, Ordering::SeqCst);
            s.store(status, Ordering::SeqCst);
        }))
        .unwrap();
    // Never signaled; dropping the last reference must still deliver.
    drop(fence);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(status_seen.load(Ordering::SeqCst) < 0);
}

#[test]
fn destruction_forces_pending_submission_callbacks() {
    let fence = Fence::create(2, 0).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let status_seen = Arc::new(AtomicI32::new(i32::MAX));
    let h = Arc::clone(&hits);
    let s = Arc::clone(&status_seen);
    fence
        .add_submitted_callback(Box::new(move |_f, status| {
            h.fetch_add(1, Ordering::SeqCst);
            s.store(status, Ordering::SeqCst);
        }))
        .unwrap();
    fence.submit_signaler().unwrap();
    drop(fence);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(status_seen.load(Ordering::SeqCst) < 0);
}

#[test]
fn submission_error_reaches_submission_callbacks() {
    let fence = Fence::create(2, 0).unwrap();
    fence.set_submission_error(-9).unwrap();
    let status_seen = Arc::new(AtomicI32::new(i32::MAX));
    let s = Arc::clone(&status_seen);
    fence
        .add_submitted_callback(Box::new(move |_f, status| {
            s.store(status, Ordering::SeqCst);
        }))
        .unwrap();
    fence.submit_signaler().unwrap();
    fence.submit_signaler().unwrap();
    assert_eq!(status_seen.load(Ordering::SeqCst), -9);
}

#[test]
fn signal_error_surfaces_in_status() {
    let fence = Fence::create(2, 0).unwrap();
    assert_eq!(fence.signal_status(), SignalStatus::Pending);
    assert_eq!(fence.signal_status().to_raw(), 0);
    fence.submit_signaler().unwrap();
    fence.submit_signaler().unwrap();
    fence.signal().unwrap();
    fence.set_signal_error(-5).unwrap();
    fence.signal().unwrap();
    assert_eq!(fence.signal_status(), SignalStatus::Error(-5));
    assert_eq!(fence.signal_status().to_raw(), -5);
}

#[test]
#[serial]
fn retirement_returns_id_for_reuse() {
    // Domain 5 is used by this test alone.
    let fence = Fence::create(1, 5).unwrap();
    let id = fence.id();
    let handle = cohesix_iif::handle::install(&fence).unwrap();
    drop(handle);
    // No outstanding waiter and the handle is gone: the ID is free again
    // even though the fence object itself is still alive.
    let next = Fence::create(1, 5).unwrap();
    assert_eq!(next.id(), id);
    drop(fence);
    drop(next);
}

#[test]
#[serial]
fn domain_range_exhaustion() {
    // Domain 7 is used by this test alone.
    let capacity = id_pool::available(7).unwrap();
    assert_eq!(capacity, config::get().ids_per_domain);
    let mut fences = Vec::with_capacity(capacity);
    for _ in 0..capacity {
        fences.push(Fence::create(1, 7).unwrap());
    }
    assert_eq!(Fence::create(1, 7).err(), Some(FenceError::OutOfIds));
    fences.clear();
    assert_eq!(id_pool::available(7).unwrap(), capacity);
}
