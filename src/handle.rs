// CLASSIFICATION: COMMUNITY
// Filename: handle.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-08-12

//! Cross-process handle layer, realized as an in-process token registry.
//!
//! A handle is an opaque token unrelated workloads can exchange to reach a
//! fence they do not otherwise share memory with. The registry tracks one
//! entry per exported object with its own reference count: `install` and
//! every successful `lookup` take a reference, dropping the last [`Handle`]
//! removes the entry and fires the fence's handle-released path exactly
//! once, which attempts ID retirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::completion::GenericCompletion;
use crate::error::{FenceError, FenceResult, SignalStatus};
use crate::fence::core::Fence;
use crate::fence::general::GeneralizedFence;

/// Opaque token naming a registry entry.
pub type HandleToken = u64;

struct Entry {
    target: Arc<GeneralizedFence>,
    refs: u32,
}

static REGISTRY: Lazy<Mutex<HashMap<HandleToken, Entry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A counted reference to an exported fence or completion.
pub struct Handle {
    token: HandleToken,
    target: Arc<GeneralizedFence>,
}

/// Export `fence` through the registry. Allowed once per fence; the
/// one-time lifecycle transition is race-checked by the fence itself.
pub fn install(fence: &Arc<Fence>) -> FenceResult<Handle> {
    fence.install_handle()?;
    let handle = insert(GeneralizedFence::from_fence(Arc::clone(fence)))?;
    debug!("fence {} exported as handle {}", fence.id(), handle.token);
    Ok(handle)
}

/// Export a completion (for example a merge result) through the registry.
pub fn install_completion(completion: &Arc<GenericCompletion>) -> FenceResult<Handle> {
    insert(GeneralizedFence::from_completion(Arc::clone(completion)))
}

fn insert(target: Arc<GeneralizedFence>) -> FenceResult<Handle> {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    let mut registry = REGISTRY.lock().map_err(|_| FenceError::LockPoisoned)?;
    registry.insert(
        token,
        Entry {
            target: Arc::clone(&target),
            refs: 1,
        },
    );
    Ok(Handle { token, target })
}

/// Take a counted reference to the entry behind `token`.
pub fn lookup(token: HandleToken) -> FenceResult<Handle> {
    let mut registry = REGISTRY.lock().map_err(|_| FenceError::LockPoisoned)?;
    let entry = registry.get_mut(&token).ok_or(FenceError::BadHandle)?;
    entry.refs += 1;
    Ok(Handle {
        token,
        target: Arc::clone(&entry.target),
    })
}

/// Resolve `token` to a fence reference without taking a handle reference.
/// Used by aggregate construction, where the reference's lifetime is tied
/// to the aggregate rather than to the handle.
pub(crate) fn resolve(token: HandleToken) -> FenceResult<Arc<GeneralizedFence>> {
    let registry = REGISTRY.lock().map_err(|_| FenceError::LockPoisoned)?;
    registry
        .get(&token)
        .map(|entry| Arc::clone(&entry.target))
        .ok_or(FenceError::BadHandle)
}

fn release(token: HandleToken) {
    let removed = {
        let mut registry = match REGISTRY.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match registry.get_mut(&token) {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    registry.remove(&token)
                } else {
                    None
                }
            }
            None => {
                warn!("release of unknown handle {}", token);
                None
            }
        }
    };
    if let Some(entry) = removed {
        if let Some(fence) = entry.target.as_inter_ip() {
            fence.handle_released();
        }
    }
}

impl Handle {
    pub fn token(&self) -> HandleToken {
        self.token
    }

    pub fn target(&self) -> &Arc<GeneralizedFence> {
        &self.target
    }

    /// True once the backing object is fully signaled.
    pub fn ready(&self) -> bool {
        self.target.signal_status().is_complete()
    }

    pub fn status(&self) -> SignalStatus {
        self.target.signal_status()
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        match lookup(self.token) {
            Ok(handle) => handle,
            // The entry cannot be gone while `self` still holds a ref.
            Err(_) => Handle {
                token: self.token,
                target: Arc::clone(&self.target),
            },
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        release(self.token);
    }
}

/// Drop every registry entry without firing release paths. Only used in
/// tests.
pub fn reset() -> FenceResult<()> {
    REGISTRY
        .lock()
        .map_err(|_| FenceError::LockPoisoned)?
        .clear();
    Ok(())
}

pub struct TestHandleGuard;

impl TestHandleGuard {
    pub fn new() -> Self {
        let _ = reset();
        TestHandleGuard
    }
}

impl Drop for TestHandleGuard {
    fn drop(&mut self) {
        let _ = reset();
    }
}
