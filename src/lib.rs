// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-08-12

//! Inter-IP fence synchronization core.
//!
//! Orders work across independent hardware execution domains without a
//! central scheduler polling every step. A fence aggregates N independent
//! signaler completions; waiters proceed only once all N have reported.
//! Signalers register (submit) and complete (signal) in two independent
//! phases, each with its own notification list, and fences travel between
//! unrelated workloads as opaque handles.
//!
//! Everything here is synchronous and non-blocking; nothing sleeps.
//! Callers bring their own wakeup primitive through
//! [`fence::SubmitEvent`] and their own timers for timeouts.

/// Static fence-ID partition configuration.
pub mod config;

/// Error taxonomy and the signal-status surface.
pub mod error;

/// In-process completion wrapped by the non-inter-IP fence variant.
pub mod completion;

/// Fence core, ID allocator, generalized union, array and waiter.
pub mod fence;

/// Cross-process handle registry.
pub mod handle;

pub use crate::completion::GenericCompletion;
pub use crate::config::{DomainId, FenceId};
pub use crate::error::{FenceError, FenceResult, SignalStatus, DEADLOCK_STATUS};
pub use crate::fence::{
    CallbackToken, Fence, FenceArray, FenceVariant, GeneralizedFence, SubmissionWaiter,
    SubmitEvent,
};
pub use crate::handle::{Handle, HandleToken};
