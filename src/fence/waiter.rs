// CLASSIFICATION: COMMUNITY
// Filename: waiter.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-08-11

//! Submission waiter: batches a wait for an arbitrary set of fences to
//! finish signaler submission, delivered through one external wakeup.
//!
//! A waiter registers a submission-complete callback on every fence that
//! is not yet fully submitted. The external event fires exactly once, when
//! the registration pass has finished (`pending_fences == 0`) and every
//! registered callback has been delivered. Delivery and explicit
//! cancellation race, which is why the waiter is reference counted and
//! every path re-checks the cancelled flag under the waiter lock.
//!
//! One `wait` sequence per waiter instance; cancellation must be
//! externally serialized against new `wait` calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FenceError, FenceResult};
use crate::fence::core::{CallbackToken, Fence};

/// External wakeup target fired when the batched wait completes.
pub trait SubmitEvent: Send + Sync {
    fn notify(&self);
}

/// Bounded channels make a convenient event target; `try_send` keeps the
/// callback path non-blocking.
impl SubmitEvent for std::sync::mpsc::SyncSender<()> {
    fn notify(&self) {
        let _ = self.try_send(());
    }
}

struct Registration {
    reg_id: u64,
    token: CallbackToken,
    fence: Arc<Fence>,
}

struct WaiterState {
    started: bool,
    cancelled: bool,
    pending_fences: usize,
    regs: Vec<Registration>,
    event: Option<Box<dyn SubmitEvent>>,
}

pub struct SubmissionWaiter {
    state: Mutex<WaiterState>,
    next_reg: AtomicU64,
}

impl SubmissionWaiter {
    pub fn new() -> Arc<Self> {
        Arc::new(SubmissionWaiter {
            state: Mutex::new(WaiterState {
                started: false,
                cancelled: false,
                pending_fences: 0,
                regs: Vec::new(),
                event: None,
            }),
            next_reg: AtomicU64::new(1),
        })
    }

    fn lock(&self) -> FenceResult<MutexGuard<'_, WaiterState>> {
        self.state.lock().map_err(|_| FenceError::LockPoisoned)
    }

    /// Batch-wait for `fences` to finish signaler submission.
    ///
    /// Without an event target this synchronously fills `remaining_out`
    /// with each fence's missing-signaler count and registers nothing.
    /// With one, a submission-complete callback is registered per fence:
    /// an already-complete fence reports `0` and is skipped; a successful
    /// registration reports the count at registration time; any other
    /// error unwinds every partial registration and aborts.
    pub fn wait(
        self: &Arc<Self>,
        fences: &[Arc<Fence>],
        event: Option<Box<dyn SubmitEvent>>,
        remaining_out: &mut [u32],
    ) -> FenceResult<()> {
        if remaining_out.len() < fences.len() {
            return Err(FenceError::InvalidArgument);
        }
        let Some(event) = event else {
            for (slot, fence) in remaining_out.iter_mut().zip(fences) {
                *slot = fence.signalers_remaining();
            }
            return Ok(());
        };

        {
            let mut state = self.lock()?;
            if state.started {
                return Err(FenceError::InvalidArgument);
            }
            state.started = true;
            state.pending_fences = fences.len();
            state.event = Some(event);
        }

        for (index, fence) in fences.iter().enumerate() {
            let reg_id = self.next_reg.fetch_add(1, Ordering::Relaxed);
            // Record the registration first, so a delivery racing the
            // registration call below already finds it.
            {
                let mut state = self.lock()?;
                state.regs.push(Registration {
                    reg_id,
                    token: 0,
                    fence: Arc::clone(fence),
                });
            }
            // The fence holds the callback; keep that edge weak so a fence
            // and a waiter never keep each other alive.
            let waiter = Arc::downgrade(self);
            let result = fence.add_submitted_callback(Box::new(move |_fence, _status| {
                if let Some(waiter) = waiter.upgrade() {
                    waiter.complete_registration(reg_id);
                }
            }));
            match result {
                Ok((token, remaining)) => {
                    remaining_out[index] = remaining;
                    let mut state = self.lock()?;
                    if let Some(reg) = state.regs.iter_mut().find(|r| r.reg_id == reg_id) {
                        reg.token = token;
                    }
                    state.pending_fences -= 1;
                }
                Err(FenceError::AlreadyComplete) => {
                    remaining_out[index] = 0;
                    let mut state = self.lock()?;
                    state.regs.retain(|r| r.reg_id != reg_id);
                    state.pending_fences -= 1;
                }
                Err(err) => {
                    self.cancel()?;
                    return Err(err);
                }
            }
        }
        self.try_fire()?;
        Ok(())
    }

    /// Abort the in-flight wait: unregister every outstanding callback and
    /// release the fence references. A delivery racing this call observes
    /// the flag under the waiter lock and becomes a no-op; the event will
    /// not fire.
    pub fn cancel(&self) -> FenceResult<()> {
        let regs = {
            let mut state = self.lock()?;
            if state.cancelled {
                return Ok(());
            }
            state.cancelled = true;
            state.event = None;
            std::mem::take(&mut state.regs)
        };
        for reg in regs {
            if reg.token != 0 {
                // Already-fired callbacks are gone from the fence list.
                let _ = reg.fence.remove_submitted_callback(reg.token);
            }
        }
        Ok(())
    }

    fn complete_registration(&self, reg_id: u64) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.cancelled {
            return;
        }
        state.regs.retain(|r| r.reg_id != reg_id);
        drop(state);
        let _ = self.try_fire();
    }

    fn try_fire(&self) -> FenceResult<()> {
        let event = {
            let mut state = self.lock()?;
            if state.cancelled || state.pending_fences != 0 || !state.regs.is_empty() {
                return Ok(());
            }
            state.event.take()
        };
        if let Some(event) = event {
            event.notify();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainId;
    use std::sync::mpsc;
    use std::sync::mpsc::TryRecvError;

    // Domain 2 is reserved for the unit tests in this module.
    const DOMAIN: DomainId = 2;

    #[test]
    fn no_event_reports_counts_synchronously() {
        let a = Fence::create(3, DOMAIN).unwrap();
        let b = Fence::create(1, DOMAIN).unwrap();
        a.submit_signaler().unwrap();
        b.submit_signaler().unwrap();
        let waiter = SubmissionWaiter::new();
        let mut remaining = [u32::MAX; 2];
        waiter
            .wait(&[Arc::clone(&a), Arc::clone(&b)], None, &mut remaining)
            .unwrap();
        assert_eq!(remaining, [2, 0]);
    }

    #[test]
    fn second_wait_rejected() {
        let fence = Fence::create(1, DOMAIN).unwrap();
        let waiter = SubmissionWaiter::new();
        let (tx, _rx) = mpsc::sync_channel(1);
        let mut remaining = [0u32; 1];
        waiter
            .wait(&[Arc::clone(&fence)], Some(Box::new(tx.clone())), &mut remaining)
            .unwrap();
        assert_eq!(
            waiter
                .wait(&[fence], Some(Box::new(tx)), &mut remaining)
                .err(),
            Some(FenceError::InvalidArgument)
        );
    }

    #[test]
    fn cancel_suppresses_event() {
        let fence = Fence::create(1, DOMAIN).unwrap();
        let waiter = SubmissionWaiter::new();
        let (tx, rx) = mpsc::sync_channel(1);
        let mut remaining = [0u32; 1];
        waiter
            .wait(&[Arc::clone(&fence)], Some(Box::new(tx)), &mut remaining)
            .unwrap();
        waiter.cancel().unwrap();
        fence.submit_signaler().unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}
