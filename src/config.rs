// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-07-19

//! Static fence-ID partition configuration.
//!
//! The fence-ID space is split into equal contiguous ranges, one per
//! signaler domain. A domain never allocates outside its range. Both knobs
//! can be overridden through the environment (`IIF_DOMAIN_COUNT`,
//! `IIF_IDS_PER_DOMAIN`) and are read exactly once.

use once_cell::sync::Lazy;

/// Index of a signaler domain.
pub type DomainId = u8;

/// Global fence identifier: `domain * ids_per_domain + offset`.
pub type FenceId = u32;

const DEFAULT_DOMAIN_COUNT: usize = 8;
const DEFAULT_IDS_PER_DOMAIN: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct FenceConfig {
    pub domain_count: usize,
    pub ids_per_domain: usize,
}

impl FenceConfig {
    /// First fence ID of `domain`'s range.
    pub fn range_base(&self, domain: DomainId) -> FenceId {
        domain as FenceId * self.ids_per_domain as FenceId
    }

    pub fn valid_domain(&self, domain: DomainId) -> bool {
        (domain as usize) < self.domain_count
    }
}

static CONFIG: Lazy<FenceConfig> = Lazy::new(|| FenceConfig {
    domain_count: env_usize("IIF_DOMAIN_COUNT", DEFAULT_DOMAIN_COUNT),
    ids_per_domain: env_usize("IIF_IDS_PER_DOMAIN", DEFAULT_IDS_PER_DOMAIN),
});

/// The fixed partition configuration for this process.
pub fn get() -> &'static FenceConfig {
    &CONFIG
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
