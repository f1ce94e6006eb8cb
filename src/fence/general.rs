// CLASSIFICATION: COMMUNITY
// Filename: general.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-08-04

//! Generalized fence: a tagged union letting callers treat an inter-IP
//! fence and an in-process completion uniformly.
//!
//! The two variants share only the `{submit_signaler, submit_waiter,
//! signal, signal_status}` contract; there is no common implementation
//! underneath. A completion has no submission phase, so its waiters are
//! always accepted and signaler submission is unsupported.

use std::sync::Arc;

use crate::completion::GenericCompletion;
use crate::config::DomainId;
use crate::error::{FenceError, FenceResult, SignalStatus};
use crate::fence::core::Fence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceVariant {
    InterIp,
    Completion,
}

pub enum GeneralizedFence {
    InterIp(Arc<Fence>),
    Completion(Arc<GenericCompletion>),
}

impl GeneralizedFence {
    pub fn from_fence(fence: Arc<Fence>) -> Arc<Self> {
        Arc::new(GeneralizedFence::InterIp(fence))
    }

    pub fn from_completion(completion: Arc<GenericCompletion>) -> Arc<Self> {
        Arc::new(GeneralizedFence::Completion(completion))
    }

    pub fn variant(&self) -> FenceVariant {
        match self {
            GeneralizedFence::InterIp(_) => FenceVariant::InterIp,
            GeneralizedFence::Completion(_) => FenceVariant::Completion,
        }
    }

    pub fn as_inter_ip(&self) -> Option<&Arc<Fence>> {
        match self {
            GeneralizedFence::InterIp(fence) => Some(fence),
            GeneralizedFence::Completion(_) => None,
        }
    }

    pub fn submit_signaler(&self) -> FenceResult<()> {
        match self {
            GeneralizedFence::InterIp(fence) => fence.submit_signaler(),
            GeneralizedFence::Completion(_) => Err(FenceError::Unsupported),
        }
    }

    /// `Ok(0)` when the waiter is accepted, otherwise the number of
    /// signalers still missing. Completions carry no submission phase and
    /// always accept.
    pub fn submit_waiter(&self, domain: DomainId) -> FenceResult<u32> {
        match self {
            GeneralizedFence::InterIp(fence) => fence.submit_waiter(domain),
            GeneralizedFence::Completion(_) => Ok(0),
        }
    }

    /// Report completion with `error` (`0` for success).
    pub fn signal(&self, error: i32) -> FenceResult<()> {
        match self {
            GeneralizedFence::InterIp(fence) => {
                if error < 0 {
                    fence.set_signal_error(error)?;
                }
                fence.signal()
            }
            GeneralizedFence::Completion(completion) => {
                completion.signal(error);
                Ok(())
            }
        }
    }

    pub fn signal_status(&self) -> SignalStatus {
        match self {
            GeneralizedFence::InterIp(fence) => fence.signal_status(),
            GeneralizedFence::Completion(completion) => completion.status(),
        }
    }

    /// Bridge this fence to a completion that signals when the fence does.
    /// An already-signaled fence yields a pre-completed input carrying its
    /// status.
    pub fn as_completion_input(&self) -> FenceResult<Arc<GenericCompletion>> {
        match self {
            GeneralizedFence::Completion(completion) => Ok(Arc::clone(completion)),
            GeneralizedFence::InterIp(fence) => {
                let bridge = GenericCompletion::new();
                let target = Arc::clone(&bridge);
                match fence.add_poll_callback(Box::new(move |_fence, status| {
                    target.signal(status);
                })) {
                    Ok(_token) => Ok(bridge),
                    Err(FenceError::AlreadyComplete) => match fence.signal_status() {
                        SignalStatus::Error(code) => Ok(GenericCompletion::completed(code)),
                        _ => Ok(GenericCompletion::completed(0)),
                    },
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// N-way AND of `list`: the result is a completion-backed fence that
    /// signals once every input has, carrying the first error observed.
    pub fn merge(list: &[Arc<GeneralizedFence>]) -> FenceResult<Arc<GeneralizedFence>> {
        let mut inputs = Vec::with_capacity(list.len());
        for fence in list {
            inputs.push(fence.as_completion_input()?);
        }
        Ok(GeneralizedFence::from_completion(GenericCompletion::merge(
            &inputs,
        )))
    }
}
