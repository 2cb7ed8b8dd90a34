//! Environment tunables for the QR search.
//!
//! Values are read once and cached; unset or unparsable variables fall back to
//! the defaults.

use std::sync::OnceLock;

fn parse_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

static QR_MAX_FAILURES: OnceLock<usize> = OnceLock::new();

/// Consecutive failed center triples before the QR search gives up.
pub(crate) fn qr_max_failures() -> usize {
    *QR_MAX_FAILURES
        .get_or_init(|| parse_env_usize("BARCODE_QR_MAX_FAILURES", 8192).clamp(16, 1 << 20))
}

static RANSAC_SEED: OnceLock<u64> = OnceLock::new();

/// Seed for the RANSAC line fits. Fixed so scans are reproducible.
pub(crate) fn ransac_seed() -> u64 {
    *RANSAC_SEED.get_or_init(|| parse_env_u64("BARCODE_RANSAC_SEED", 0x5155_5244_4543))
}

static CACHE_TIMEOUT_MS: OnceLock<u64> = OnceLock::new();

/// Milliseconds after which an unseen cache entry is forgotten.
pub(crate) fn cache_timeout_ms() -> u64 {
    *CACHE_TIMEOUT_MS.get_or_init(|| parse_env_u64("BARCODE_CACHE_TIMEOUT_MS", 4000).max(1))
}
