// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-08-11

//! Fence subsystem: the countdown fence itself, its ID allocator, the
//! generalized tagged union, the broadcast array and the batched
//! submission waiter.

pub mod array;
pub mod core;
pub mod general;
pub mod id_pool;
pub mod waiter;

pub use self::array::FenceArray;
pub use self::core::{CallbackToken, Fence, FenceCallback};
pub use self::general::{FenceVariant, GeneralizedFence};
pub use self::waiter::{SubmissionWaiter, SubmitEvent};
