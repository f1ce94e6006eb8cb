// CLASSIFICATION: COMMUNITY
// Filename: core.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-08-02

//! The inter-IP fence: a countdown completion shared across signaler
//! domains.
//!
//! A fence is created for a fixed number of signalers. Signalers first
//! *submit* themselves (register with the fence, possibly long after
//! creation) and later *signal* (report completion). The two phases carry
//! independent callback lists: submission-complete callbacks gate waiter
//! admission, poll callbacks feed readiness notification. Waiters are only
//! accepted once every signaler has submitted.
//!
//! Locking: three independent mutexes, one per concern, so signal-path and
//! submission-path updates never contend:
//!   - submission side: submitted count, submission callbacks, submission
//!     error code;
//!   - signal side: signaled count, poll callbacks, signal error code;
//!   - lifecycle side: outstanding waiters and the handle/retirement stage.
//!
//! A callback runs while the lock whose state change triggered it is still
//! held, so it observes the just-updated counters atomically. Callbacks
//! must not block or re-enter that lock; they may touch other fences or
//! hand work elsewhere. Invocation order within one list is insertion
//! order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::config::{self, DomainId, FenceId};
use crate::error::{FenceError, FenceResult, SignalStatus, DEADLOCK_STATUS};
use crate::fence::id_pool;

/// Identifies a registered callback for later removal.
pub type CallbackToken = u64;

/// Callback invoked with the fence and a status code: `0` on normal
/// completion, negative when the side completed abnormally.
pub type FenceCallback = Box<dyn FnOnce(&Fence, i32) + Send>;

struct CallbackEntry {
    token: CallbackToken,
    cb: FenceCallback,
}

pub(crate) struct SubmissionSide {
    pub(crate) submitted: u32,
    callbacks: Vec<CallbackEntry>,
    error: i32,
}

struct SignalSide {
    signaled: u32,
    callbacks: Vec<CallbackEntry>,
    error: i32,
}

/// Handle/retirement stage of a fence.
///
/// At most one handle is ever installed, by a one-time race-checked
/// transition out of `Initialized`. A fence that never had a handle
/// installed keeps its ID until destruction, so installation can never
/// observe a retired ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifeStage {
    Initialized,
    FileCreated,
    FileReleased,
    Retired,
}

struct LifeSide {
    stage: LifeStage,
    waiters_total: u32,
    waiters_per_domain: Vec<u32>,
}

pub struct Fence {
    id: FenceId,
    domain: DomainId,
    total_signalers: u32,
    submission: Mutex<SubmissionSide>,
    signal: Mutex<SignalSide>,
    life: Mutex<LifeSide>,
    next_token: AtomicU64,
    release_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Fence {
    /// Allocate an ID from `domain`'s range and create a fence expecting
    /// `total_signalers` completions.
    pub fn create(total_signalers: u32, domain: DomainId) -> FenceResult<Arc<Fence>> {
        Self::build(total_signalers, domain, None)
    }

    /// Like [`Fence::create`], with a hook invoked exactly once after
    /// teardown, outside every internal lock. The hook may run from any
    /// execution context.
    pub fn create_with_release_hook(
        total_signalers: u32,
        domain: DomainId,
        hook: Box<dyn FnOnce() + Send>,
    ) -> FenceResult<Arc<Fence>> {
        Self::build(total_signalers, domain, Some(hook))
    }

    fn build(
        total_signalers: u32,
        domain: DomainId,
        hook: Option<Box<dyn FnOnce() + Send>>,
    ) -> FenceResult<Arc<Fence>> {
        if total_signalers == 0 {
            return Err(FenceError::InvalidArgument);
        }
        let id = id_pool::allocate(domain)?;
        debug!(
            "fence {} created in domain {} with {} signalers",
            id, domain, total_signalers
        );
        Ok(Arc::new(Fence {
            id,
            domain,
            total_signalers,
            submission: Mutex::new(SubmissionSide {
                submitted: 0,
                callbacks: Vec::new(),
                error: 0,
            }),
            signal: Mutex::new(SignalSide {
                signaled: 0,
                callbacks: Vec::new(),
                error: 0,
            }),
            life: Mutex::new(LifeSide {
                stage: LifeStage::Initialized,
                waiters_total: 0,
                waiters_per_domain: vec![0; config::get().domain_count],
            }),
            next_token: AtomicU64::new(1),
            release_hook: Mutex::new(hook),
        }))
    }

    pub fn id(&self) -> FenceId {
        self.id
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn total_signalers(&self) -> u32 {
        self.total_signalers
    }

    pub fn submitted_signalers(&self) -> u32 {
        match self.submission.lock() {
            Ok(side) => side.submitted,
            Err(poisoned) => poisoned.into_inner().submitted,
        }
    }

    pub fn signaled_signalers(&self) -> u32 {
        match self.signal.lock() {
            Ok(side) => side.signaled,
            Err(poisoned) => poisoned.into_inner().signaled,
        }
    }

    pub fn outstanding_waiters(&self) -> u32 {
        match self.life.lock() {
            Ok(side) => side.waiters_total,
            Err(poisoned) => poisoned.into_inner().waiters_total,
        }
    }

    /// Signalers that have not yet submitted.
    pub fn signalers_remaining(&self) -> u32 {
        self.total_signalers - self.submitted_signalers()
    }

    pub fn submission_complete(&self) -> bool {
        self.submitted_signalers() >= self.total_signalers
    }

    // ---- handle lifecycle -------------------------------------------------

    /// One-time transition backing handle installation. Only the first call
    /// on a fresh fence succeeds.
    pub fn install_handle(&self) -> FenceResult<()> {
        let mut life = self.life.lock().map_err(|_| FenceError::LockPoisoned)?;
        match life.stage {
            LifeStage::Initialized => {
                life.stage = LifeStage::FileCreated;
                Ok(())
            }
            LifeStage::FileCreated | LifeStage::FileReleased => Err(FenceError::AlreadyExposed),
            LifeStage::Retired => Err(FenceError::Retired),
        }
    }

    /// Called exactly once when the last reference to the exported handle
    /// drops. Retires the ID if no waiter is still outstanding.
    pub(crate) fn handle_released(&self) {
        let mut life = match self.life.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if life.stage != LifeStage::FileCreated {
            warn!("fence {}: handle released in stage {:?}", self.id, life.stage);
            return;
        }
        life.stage = LifeStage::FileReleased;
        if life.waiters_total == 0 {
            self.retire_locked(&mut life);
        }
    }

    fn retire_locked(&self, life: &mut LifeSide) {
        if life.stage == LifeStage::Retired {
            return;
        }
        id_pool::release(self.domain, self.id);
        life.stage = LifeStage::Retired;
        debug!("fence {} retired, ID back to domain {}", self.id, self.domain);
    }

    // ---- submission side --------------------------------------------------

    /// Register one signaler. When the final signaler submits, every
    /// pending submission-complete callback is drained and invoked, in
    /// insertion order, under the submission lock.
    pub fn submit_signaler(&self) -> FenceResult<()> {
        let mut side = self.submission.lock().map_err(|_| FenceError::LockPoisoned)?;
        self.submit_signaler_locked(&mut side)
    }

    /// Submission-lock-held form, used by the fence array's two-phase
    /// commit where all output locks are taken up front.
    pub(crate) fn submit_signaler_locked(&self, side: &mut SubmissionSide) -> FenceResult<()> {
        if side.submitted >= self.total_signalers {
            warn!("fence {}: signaler submitted past total", self.id);
            return Err(FenceError::AlreadyComplete);
        }
        side.submitted += 1;
        if side.submitted == self.total_signalers {
            let status = side.error;
            let pending: Vec<CallbackEntry> = side.callbacks.drain(..).collect();
            for entry in pending {
                (entry.cb)(self, status);
            }
        }
        Ok(())
    }

    pub(crate) fn lock_submission(&self) -> FenceResult<MutexGuard<'_, SubmissionSide>> {
        self.submission.lock().map_err(|_| FenceError::LockPoisoned)
    }

    /// Try to admit a waiter from `domain`. Returns `Ok(0)` when accepted
    /// (submission is complete, the outstanding-waiter count was bumped) or
    /// `Ok(n)` with the number of signalers still missing; the caller
    /// should retry from a submission-complete callback rather than poll.
    pub fn submit_waiter(&self, domain: DomainId) -> FenceResult<u32> {
        if !config::get().valid_domain(domain) {
            return Err(FenceError::InvalidArgument);
        }
        let remaining = {
            let side = self.submission.lock().map_err(|_| FenceError::LockPoisoned)?;
            self.total_signalers - side.submitted
        };
        if remaining > 0 {
            return Ok(remaining);
        }
        // Submission completeness is stable once true, so the waiter count
        // can be taken on the lifecycle lock alone.
        let mut life = self.life.lock().map_err(|_| FenceError::LockPoisoned)?;
        life.waiters_total += 1;
        life.waiters_per_domain[domain as usize] += 1;
        Ok(0)
    }

    /// A previously admitted waiter from `domain` is done. Dropping the
    /// count to zero enables retirement once the handle is gone.
    pub fn waited(&self, domain: DomainId) -> FenceResult<()> {
        if !config::get().valid_domain(domain) {
            return Err(FenceError::InvalidArgument);
        }
        let mut life = self.life.lock().map_err(|_| FenceError::LockPoisoned)?;
        if life.waiters_per_domain[domain as usize] == 0 {
            warn!("fence {}: waited() without outstanding waiter in domain {}", self.id, domain);
            return Err(FenceError::InvalidArgument);
        }
        life.waiters_per_domain[domain as usize] -= 1;
        life.waiters_total -= 1;
        if life.waiters_total == 0 && life.stage == LifeStage::FileReleased {
            self.retire_locked(&mut life);
        }
        Ok(())
    }

    /// Register a callback for submission completion. Returns the removal
    /// token and the number of signalers still missing at registration
    /// time. Fails `AlreadyComplete` once every signaler has submitted; the
    /// caller re-checks state instead of waiting for a callback that will
    /// never fire.
    pub fn add_submitted_callback(
        &self,
        cb: FenceCallback,
    ) -> FenceResult<(CallbackToken, u32)> {
        let mut side = self.submission.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.submitted >= self.total_signalers {
            return Err(FenceError::AlreadyComplete);
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let remaining = self.total_signalers - side.submitted;
        side.callbacks.push(CallbackEntry { token, cb });
        Ok((token, remaining))
    }

    /// Unregister a submission-complete callback. After `Ok`, the callback
    /// will never run.
    pub fn remove_submitted_callback(&self, token: CallbackToken) -> FenceResult<()> {
        let mut side = self.submission.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.submitted >= self.total_signalers {
            return Err(FenceError::AlreadyComplete);
        }
        remove_entry(&mut side.callbacks, token)
    }

    /// Record an abnormal submission status, delivered to submission
    /// callbacks when the final signaler submits.
    pub fn set_submission_error(&self, error: i32) -> FenceResult<()> {
        if error >= 0 {
            return Err(FenceError::InvalidArgument);
        }
        let mut side = self.submission.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.submitted >= self.total_signalers {
            warn!("fence {}: submission error {} recorded after completion", self.id, error);
        }
        side.error = error;
        Ok(())
    }

    // ---- signal side ------------------------------------------------------

    /// Report one signaler's completion. The final signal drains and
    /// invokes every poll callback under the signal lock. Signaling an
    /// already-complete fence logs and is a no-op.
    pub fn signal(&self) -> FenceResult<()> {
        let mut side = self.signal.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.signaled >= self.total_signalers {
            warn!("fence {}: signal past total, ignored", self.id);
            return Ok(());
        }
        side.signaled += 1;
        if side.signaled == self.total_signalers {
            let status = side.error;
            let pending: Vec<CallbackEntry> = side.callbacks.drain(..).collect();
            for entry in pending {
                (entry.cb)(self, status);
            }
        }
        Ok(())
    }

    /// Record an abnormal signal status. Intended to precede the final
    /// [`Fence::signal`]; a late call still records the value.
    pub fn set_signal_error(&self, error: i32) -> FenceResult<()> {
        if error >= 0 {
            return Err(FenceError::InvalidArgument);
        }
        let mut side = self.signal.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.signaled >= self.total_signalers {
            warn!("fence {}: signal error {} recorded after completion", self.id, error);
        }
        side.error = error;
        Ok(())
    }

    pub fn signal_status(&self) -> SignalStatus {
        let side = match self.signal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if side.signaled < self.total_signalers {
            SignalStatus::Pending
        } else if side.error < 0 {
            SignalStatus::Error(side.error)
        } else {
            SignalStatus::Signaled
        }
    }

    /// Register a poll callback, fired once when the fence becomes fully
    /// signaled. Fails `AlreadyComplete` on an already-signaled fence.
    pub fn add_poll_callback(&self, cb: FenceCallback) -> FenceResult<CallbackToken> {
        let mut side = self.signal.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.signaled >= self.total_signalers {
            return Err(FenceError::AlreadyComplete);
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        side.callbacks.push(CallbackEntry { token, cb });
        Ok(token)
    }

    /// Unregister a poll callback. After `Ok`, the callback will never run.
    pub fn remove_poll_callback(&self, token: CallbackToken) -> FenceResult<()> {
        let mut side = self.signal.lock().map_err(|_| FenceError::LockPoisoned)?;
        if side.signaled >= self.total_signalers {
            return Err(FenceError::AlreadyComplete);
        }
        remove_entry(&mut side.callbacks, token)
    }
}

fn remove_entry(callbacks: &mut Vec<CallbackEntry>, token: CallbackToken) -> FenceResult<()> {
    let before = callbacks.len();
    callbacks.retain(|entry| entry.token != token);
    if callbacks.len() == before {
        return Err(FenceError::InvalidArgument);
    }
    Ok(())
}

impl Drop for Fence {
    /// Teardown runs synchronously from the last-reference path, exactly
    /// once, before memory is reclaimed. Any caller still pending on either
    /// callback list receives a manufactured completion with
    /// [`DEADLOCK_STATUS`] rather than being leaked.
    fn drop(&mut self) {
        let signal_pending = {
            let side = match self.signal.get_mut() {
                Ok(side) => side,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !side.callbacks.is_empty() && side.signaled < self.total_signalers {
                warn!("fence {}: destroyed with poll callbacks pending", self.id);
                side.error = DEADLOCK_STATUS;
                side.signaled = self.total_signalers;
                std::mem::take(&mut side.callbacks)
            } else {
                Vec::new()
            }
        };
        for entry in signal_pending {
            (entry.cb)(self, DEADLOCK_STATUS);
        }

        let submission_pending = {
            let side = match self.submission.get_mut() {
                Ok(side) => side,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !side.callbacks.is_empty() && side.submitted < self.total_signalers {
                warn!("fence {}: destroyed with submission callbacks pending", self.id);
                side.error = DEADLOCK_STATUS;
                side.submitted = self.total_signalers;
                std::mem::take(&mut side.callbacks)
            } else {
                Vec::new()
            }
        };
        for entry in submission_pending {
            (entry.cb)(self, DEADLOCK_STATUS);
        }

        {
            let life = match self.life.get_mut() {
                Ok(life) => life,
                Err(poisoned) => poisoned.into_inner(),
            };
            if life.stage != LifeStage::Retired {
                id_pool::release(self.domain, self.id);
                life.stage = LifeStage::Retired;
            }
        }

        let hook = match self.release_hook.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}
