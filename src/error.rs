// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-07-19

//! Error and status surface of the inter-IP fence core.
//!
//! Every error carries an errno-style negative raw code because the fence
//! contract is expressed in negative status values at the boundary: a poll
//! or submission callback receives `0` on normal completion and a negative
//! code (usually [`DEADLOCK_STATUS`]) on a forced one.

use thiserror::Error;

/// Status delivered to pending callers when a fence is torn down before its
/// signalers ever completed.
pub const DEADLOCK_STATUS: i32 = -35;

/// Errors returned by fence, array, waiter and handle operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FenceError {
    #[error("fence ID range for the domain is exhausted")]
    OutOfIds,
    #[error("fence is already exposed through a handle")]
    AlreadyExposed,
    #[error("fence ID has been retired")]
    Retired,
    #[error("fence side is already complete")]
    AlreadyComplete,
    #[error("input fences have not finished signaler submission, retry")]
    Retry,
    #[error("output fence can no longer accept a signaler")]
    PermissionDenied,
    #[error("fence variants differ within the array")]
    VariantMismatch,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("operation not supported by this fence variant")]
    Unsupported,
    #[error("completion forced to avoid a deadlocked waiter")]
    Deadlock,
    #[error("unknown fence handle")]
    BadHandle,
    #[error("fence lock poisoned")]
    LockPoisoned,
}

impl FenceError {
    /// Errno-style negative code for this error.
    pub fn code(&self) -> i32 {
        match self {
            FenceError::OutOfIds => -28,
            FenceError::AlreadyExposed => -17,
            FenceError::Retired => -19,
            FenceError::AlreadyComplete => -1,
            FenceError::Retry => -11,
            FenceError::PermissionDenied => -13,
            FenceError::VariantMismatch => -22,
            FenceError::InvalidArgument => -22,
            FenceError::Unsupported => -95,
            FenceError::Deadlock => DEADLOCK_STATUS,
            FenceError::BadHandle => -9,
            FenceError::LockPoisoned => -5,
        }
    }
}

pub type FenceResult<T> = Result<T, FenceError>;

/// Result of polling a fence or completion for its signal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    /// Not every signaler has reported yet.
    Pending,
    /// Fully signaled without error.
    Signaled,
    /// Fully signaled, but a signaler recorded the contained negative code.
    Error(i32),
}

impl SignalStatus {
    /// Raw representation: `0` pending, `1` signaled, negative on error.
    pub fn to_raw(self) -> i32 {
        match self {
            SignalStatus::Pending => 0,
            SignalStatus::Signaled => 1,
            SignalStatus::Error(code) => code,
        }
    }

    pub fn is_complete(self) -> bool {
        !matches!(self, SignalStatus::Pending)
    }
}
