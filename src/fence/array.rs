// CLASSIFICATION: COMMUNITY
// Filename: array.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-08-09

//! Fence array: an immutable ordered aggregate of generalized fences for
//! broadcast operations.
//!
//! Fan-out operations are best effort: every element is attempted, nothing
//! is rolled back on a per-element failure, and the first error is
//! reported after the full pass. The exception is
//! [`FenceArray::submit_waiter_and_signaler`], an atomic two-phase
//! check-then-commit used to wire a consumer between input and output
//! fences: inputs are validated before any output is touched, so a
//! consumer is never wired to outputs it cannot actually await.

use std::sync::Arc;

use log::warn;

use crate::config::DomainId;
use crate::error::{FenceError, FenceResult};
use crate::fence::core::Fence;
use crate::fence::general::{FenceVariant, GeneralizedFence};
use crate::handle::{self, HandleToken};

pub struct FenceArray {
    fences: Vec<Arc<GeneralizedFence>>,
    same_variant: Option<FenceVariant>,
}

impl FenceArray {
    /// Resolve every handle and aggregate the resulting references. Any
    /// failure drops all references acquired so far. With
    /// `enforce_same_type`, mixed variants fail `VariantMismatch`.
    pub fn create(
        handles: &[HandleToken],
        enforce_same_type: bool,
    ) -> FenceResult<Arc<FenceArray>> {
        let mut fences = Vec::with_capacity(handles.len());
        for token in handles {
            fences.push(handle::resolve(*token)?);
        }
        Self::from_fences(fences, enforce_same_type)
    }

    /// In-process construction from already-held references.
    pub fn from_fences(
        fences: Vec<Arc<GeneralizedFence>>,
        enforce_same_type: bool,
    ) -> FenceResult<Arc<FenceArray>> {
        let mut same_variant = fences.first().map(|f| f.variant());
        for fence in &fences {
            if same_variant != Some(fence.variant()) {
                same_variant = None;
                break;
            }
        }
        if enforce_same_type && same_variant.is_none() && !fences.is_empty() {
            return Err(FenceError::VariantMismatch);
        }
        Ok(Arc::new(FenceArray {
            fences,
            same_variant,
        }))
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    pub fn fences(&self) -> &[Arc<GeneralizedFence>] {
        &self.fences
    }

    /// `Some(variant)` when every element shares it, `None` for a mixed
    /// array.
    pub fn same_variant(&self) -> Option<FenceVariant> {
        self.same_variant
    }

    /// Signal every element with `error`. Best effort; first failure
    /// reported after all elements were attempted.
    pub fn signal(&self, error: i32) -> FenceResult<()> {
        let mut first_err = None;
        for fence in &self.fences {
            if let Err(err) = fence.signal(error) {
                warn!("fence array: element signal failed: {}", err);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Submit a signaler to every element. Best effort.
    pub fn submit_signaler(&self) -> FenceResult<()> {
        let mut first_err = None;
        for fence in &self.fences {
            if let Err(err) = fence.submit_signaler() {
                warn!("fence array: element signaler submission failed: {}", err);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Submit a waiter from `domain` to every element. Returns the
    /// per-element remaining counts (`0` = accepted), in array order.
    pub fn submit_waiter(&self, domain: DomainId) -> FenceResult<Vec<u32>> {
        let mut remaining = Vec::with_capacity(self.fences.len());
        for fence in &self.fences {
            remaining.push(fence.submit_waiter(domain)?);
        }
        Ok(remaining)
    }

    /// Release one waiter from `domain` on every element. Best effort;
    /// completion-variant elements carry no waiter bookkeeping.
    pub fn waited(&self, domain: DomainId) -> FenceResult<()> {
        let mut first_err = None;
        for fence in &self.fences {
            if let Some(inter_ip) = fence.as_inter_ip() {
                if let Err(err) = inter_ip.waited(domain) {
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn inter_ip_fences(&self) -> FenceResult<Vec<Arc<Fence>>> {
        self.fences
            .iter()
            .map(|fence| {
                fence
                    .as_inter_ip()
                    .cloned()
                    .ok_or(FenceError::Unsupported)
            })
            .collect()
    }

    /// Atomically wire a consumer between `inputs` and `outputs`: become a
    /// waiter on every input fence and a signaler on every output fence,
    /// or change nothing at all.
    ///
    /// Phase 1 takes every input submission lock in array order, verifies
    /// submission is complete on each (stable once true, so the locks are
    /// then released, in reverse order) and fails `Retry` otherwise
    /// without touching any output. Phase 2 takes every output submission
    /// lock in array order and verifies each output can still accept a
    /// signaler, failing `PermissionDenied` otherwise; the signalers are
    /// committed under the held locks. Only then are the input waiters
    /// submitted.
    ///
    /// Both arrays must be uniformly inter-IP and must not contain the
    /// same fence twice: the per-fence submission locks are acquired in
    /// array order and are not reentrant.
    pub fn submit_waiter_and_signaler(
        inputs: &FenceArray,
        outputs: &FenceArray,
        domain: DomainId,
    ) -> FenceResult<()> {
        let input_fences = inputs.inter_ip_fences()?;
        let output_fences = outputs.inter_ip_fences()?;

        {
            let mut guards = Vec::with_capacity(input_fences.len());
            for fence in &input_fences {
                guards.push(fence.lock_submission()?);
            }
            let all_submitted = guards
                .iter()
                .zip(&input_fences)
                .all(|(side, fence)| side.submitted >= fence.total_signalers());
            // Release in reverse acquisition order.
            while guards.pop().is_some() {}
            if !all_submitted {
                return Err(FenceError::Retry);
            }
        }

        {
            let mut guards = Vec::with_capacity(output_fences.len());
            for fence in &output_fences {
                guards.push(fence.lock_submission()?);
            }
            let all_open = guards
                .iter()
                .zip(&output_fences)
                .all(|(side, fence)| side.submitted < fence.total_signalers());
            if !all_open {
                while guards.pop().is_some() {}
                return Err(FenceError::PermissionDenied);
            }
            for (side, fence) in guards.iter_mut().zip(&output_fences) {
                fence.submit_signaler_locked(side)?;
            }
            while guards.pop().is_some() {}
        }

        for fence in &input_fences {
            // Input submission completeness was verified and is stable.
            let remaining = fence.submit_waiter(domain)?;
            if remaining != 0 {
                warn!(
                    "fence {}: waiter refused after verified submission ({} missing)",
                    fence.id(),
                    remaining
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::GenericCompletion;

    // Domain 3 is reserved for the unit tests in this module.
    const DOMAIN: DomainId = 3;

    #[test]
    fn variant_flag_derivation() {
        let fence = Fence::create(1, DOMAIN).unwrap();
        let mixed = FenceArray::from_fences(
            vec![
                GeneralizedFence::from_fence(fence),
                GeneralizedFence::from_completion(GenericCompletion::new()),
            ],
            false,
        )
        .unwrap();
        assert_eq!(mixed.same_variant(), None);

        let uniform = FenceArray::from_fences(
            vec![GeneralizedFence::from_completion(GenericCompletion::new())],
            true,
        )
        .unwrap();
        assert_eq!(uniform.same_variant(), Some(FenceVariant::Completion));
    }

    #[test]
    fn mixed_variants_rejected_when_enforced() {
        let fence = Fence::create(1, DOMAIN).unwrap();
        let result = FenceArray::from_fences(
            vec![
                GeneralizedFence::from_fence(fence),
                GeneralizedFence::from_completion(GenericCompletion::new()),
            ],
            true,
        );
        assert_eq!(result.err(), Some(FenceError::VariantMismatch));
    }

    #[test]
    fn fan_out_keeps_going_past_failures() {
        let done = Fence::create(1, DOMAIN).unwrap();
        done.submit_signaler().unwrap();
        let open = Fence::create(1, DOMAIN).unwrap();
        let array = FenceArray::from_fences(
            vec![
                GeneralizedFence::from_fence(done),
                GeneralizedFence::from_fence(Arc::clone(&open)),
            ],
            true,
        )
        .unwrap();
        // First element over-submits, second must still be reached.
        assert_eq!(
            array.submit_signaler().err(),
            Some(FenceError::AlreadyComplete)
        );
        assert_eq!(open.submitted_signalers(), 1);
    }
}
