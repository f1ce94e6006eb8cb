// CLASSIFICATION: COMMUNITY
// Filename: completion.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-07-21

//! Single-producer/multi-consumer completion used by the non-inter-IP
//! generalized fence variant.
//!
//! A completion is signaled exactly once with a status code (`0` or a
//! negative error); consumers attach callbacks and `merge` builds the N-way
//! AND of a set of completions, propagating the first error observed.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::SignalStatus;

type CompletionCallback = Box<dyn FnOnce(i32) + Send>;

struct CompletionState {
    done: bool,
    error: i32,
    callbacks: Vec<CompletionCallback>,
}

pub struct GenericCompletion {
    state: Mutex<CompletionState>,
}

impl GenericCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(GenericCompletion {
            state: Mutex::new(CompletionState {
                done: false,
                error: 0,
                callbacks: Vec::new(),
            }),
        })
    }

    /// A completion that is already signaled with `error` (`0` for success).
    pub fn completed(error: i32) -> Arc<Self> {
        Arc::new(GenericCompletion {
            state: Mutex::new(CompletionState {
                done: true,
                error,
                callbacks: Vec::new(),
            }),
        })
    }

    /// Signal the completion. The first call wins; a repeat logs and does
    /// not mutate the recorded status.
    pub fn signal(&self, error: i32) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.done {
            warn!("completion signaled twice (status {})", error);
            return;
        }
        state.done = true;
        state.error = error;
        let pending: Vec<CompletionCallback> = state.callbacks.drain(..).collect();
        let status = state.error;
        // Callbacks run with the state lock held; they must not re-enter it.
        for cb in pending {
            cb(status);
        }
    }

    pub fn status(&self) -> SignalStatus {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.done {
            SignalStatus::Pending
        } else if state.error < 0 {
            SignalStatus::Error(state.error)
        } else {
            SignalStatus::Signaled
        }
    }

    /// Attach a callback; runs immediately in the caller's context when the
    /// completion is already signaled.
    pub fn on_complete(&self, cb: CompletionCallback) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.done {
            let status = state.error;
            drop(state);
            cb(status);
        } else {
            state.callbacks.push(cb);
        }
    }

    /// N-way AND combination: the result signals once every input has, with
    /// the first negative status seen among the inputs (or `0`). An empty
    /// list merges to an already-successful completion.
    pub fn merge(list: &[Arc<GenericCompletion>]) -> Arc<GenericCompletion> {
        let merged = GenericCompletion::new();
        if list.is_empty() {
            merged.signal(0);
            return merged;
        }
        struct MergeGate {
            remaining: usize,
            error: i32,
        }
        let gate = Arc::new(Mutex::new(MergeGate {
            remaining: list.len(),
            error: 0,
        }));
        for input in list {
            let gate = Arc::clone(&gate);
            let merged = Arc::clone(&merged);
            input.on_complete(Box::new(move |status| {
                let mut gate = match gate.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if gate.error == 0 && status < 0 {
                    gate.error = status;
                }
                gate.remaining -= 1;
                let fire = gate.remaining == 0;
                let error = gate.error;
                drop(gate);
                if fire {
                    merged.signal(error);
                }
            }));
        }
        merged
    }
}
