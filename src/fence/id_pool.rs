// CLASSIFICATION: COMMUNITY
// Filename: id_pool.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-07-22

//! Per-domain fence-ID allocator.
//!
//! One bitmap per signaler domain covering that domain's contiguous
//! sub-range. Allocation takes the lowest free offset; release returns an
//! ID to its owning domain's pool at retirement time.

use std::sync::Mutex;

use log::warn;
use once_cell::sync::Lazy;

use crate::config::{self, DomainId, FenceId};
use crate::error::{FenceError, FenceResult};

struct IdPool {
    base: FenceId,
    used: Vec<bool>,
}

impl IdPool {
    fn new(domain: DomainId) -> Self {
        let cfg = config::get();
        IdPool {
            base: cfg.range_base(domain),
            used: vec![false; cfg.ids_per_domain],
        }
    }
}

static POOLS: Lazy<Vec<Mutex<IdPool>>> = Lazy::new(|| {
    (0..config::get().domain_count)
        .map(|d| Mutex::new(IdPool::new(d as DomainId)))
        .collect()
});

/// Allocate the lowest free ID in `domain`'s range.
pub fn allocate(domain: DomainId) -> FenceResult<FenceId> {
    if !config::get().valid_domain(domain) {
        return Err(FenceError::InvalidArgument);
    }
    let mut pool = POOLS[domain as usize]
        .lock()
        .map_err(|_| FenceError::LockPoisoned)?;
    match pool.used.iter().position(|slot| !slot) {
        Some(offset) => {
            pool.used[offset] = true;
            Ok(pool.base + offset as FenceId)
        }
        None => Err(FenceError::OutOfIds),
    }
}

/// Return `id` to `domain`'s pool. Releasing an ID that is not currently
/// allocated logs and is otherwise ignored.
pub fn release(domain: DomainId, id: FenceId) {
    if !config::get().valid_domain(domain) {
        warn!("release of fence ID {} for unknown domain {}", id, domain);
        return;
    }
    let mut pool = match POOLS[domain as usize].lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let offset = id.wrapping_sub(pool.base) as usize;
    if offset >= pool.used.len() {
        warn!("fence ID {} is outside domain {}'s range", id, domain);
        return;
    }
    if !pool.used[offset] {
        warn!("double release of fence ID {} in domain {}", id, domain);
        return;
    }
    pool.used[offset] = false;
}

/// Number of IDs still free in `domain`'s range.
pub fn available(domain: DomainId) -> FenceResult<usize> {
    if !config::get().valid_domain(domain) {
        return Err(FenceError::InvalidArgument);
    }
    let pool = POOLS[domain as usize]
        .lock()
        .map_err(|_| FenceError::LockPoisoned)?;
    Ok(pool.used.iter().filter(|slot| !**slot).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Domain 6 is reserved for these unit tests so parallel test threads
    // never race on the counts below.
    const DOMAIN: DomainId = 6;

    #[test]
    fn allocate_release_cycle() {
        let free = available(DOMAIN).unwrap();
        let id = allocate(DOMAIN).unwrap();
        assert_eq!(id, config::get().range_base(DOMAIN));
        assert_eq!(available(DOMAIN).unwrap(), free - 1);
        release(DOMAIN, id);
        assert_eq!(available(DOMAIN).unwrap(), free);
    }

    #[test]
    fn bad_domain_rejected() {
        let bad = config::get().domain_count as DomainId;
        assert_eq!(allocate(bad), Err(FenceError::InvalidArgument));
        assert_eq!(available(bad), Err(FenceError::InvalidArgument));
    }
}
