//! Inter-image result cache.
//!
//! Each entry counts consecutive sightings of one (type, data) pair across
//! scanned frames. A new entry starts at `-uncertainty` and is reported
//! once the count climbs to zero; afterwards the count keeps growing with
//! every sighting.

use tracing::debug;

use crate::models::SymbolType;

/// Sightings closer than this always count as consecutive.
pub(crate) const CACHE_PROXIMITY_MS: u64 = 1000;
/// Sightings further apart than this restart the confirmation.
pub(crate) const CACHE_HYSTERESIS_MS: u64 = 2000;

#[derive(Debug, Clone)]
struct CacheEntry {
    symbol_type: SymbolType,
    data: Vec<u8>,
    time: u64,
    count: i32,
}

/// Time stamped sighting counters keyed by symbol type and data.
#[derive(Debug, Clone)]
pub(crate) struct SymbolCache {
    entries: Vec<CacheEntry>,
    timeout: u64,
}

impl SymbolCache {
    pub(crate) fn new(timeout: u64) -> Self {
        Self {
            entries: Vec::new(),
            timeout,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry for a symbol, forgetting every entry not seen within the
    /// timeout along the way.
    fn lookup(&mut self, symbol_type: SymbolType, data: &[u8], now: u64) -> Option<usize> {
        let timeout = self.timeout;
        self.entries.retain(|e| {
            let keep = now.saturating_sub(e.time) <= timeout;
            if !keep {
                debug!(symbol = %e.symbol_type, "cache entry expired");
            }
            keep
        });
        self.entries
            .iter()
            .position(|e| e.symbol_type == symbol_type && e.data == data)
    }

    /// Record a sighting at `now` and return the updated count.
    ///
    /// Confirmed entries (count at least zero) keep counting across gaps
    /// shorter than the hysteresis window; unconfirmed ones only across
    /// gaps within the proximity window. Anything else restarts at
    /// `-uncertainty`.
    pub(crate) fn sighting(&mut self, symbol_type: SymbolType, data: &[u8], now: u64, uncertainty: i32) -> i32 {
        let Some(idx) = self.lookup(symbol_type, data, now) else {
            self.entries.push(CacheEntry {
                symbol_type,
                data: data.to_vec(),
                time: now,
                count: -uncertainty,
            });
            debug!(symbol = %symbol_type, count = -uncertainty, "cache entry added");
            return -uncertainty;
        };
        let entry = &mut self.entries[idx];
        let age = now.saturating_sub(entry.time);
        entry.time = now;
        let near = age < CACHE_PROXIMITY_MS;
        let far = age >= CACHE_HYSTERESIS_MS;
        let confirmed = entry.count >= 0;
        if far || (!confirmed && !near) {
            entry.count = -uncertainty;
            debug!(symbol = %symbol_type, count = entry.count, "cache entry (re)started");
        } else {
            entry.count += 1;
            if entry.count == 0 {
                debug!(symbol = %symbol_type, "cache entry confirmed");
            }
        }
        entry.count
    }

    /// Undo the last increment, for a sighting the caller dropped.
    pub(crate) fn revert(&mut self, symbol_type: SymbolType, data: &[u8]) {
        if let Some(e) = self
            .entries
            .iter_mut()
            .find(|e| e.symbol_type == symbol_type && e.data == data)
        {
            e.count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_after_uncertainty_frames() {
        let mut cache = SymbolCache::new(4000);
        let counts: Vec<i32> = (0..5)
            .map(|i| cache.sighting(SymbolType::Ean13, b"123", i * 100, 2))
            .collect();
        assert_eq!(counts, vec![-2, -1, 0, 1, 2]);
    }

    #[test]
    fn test_zero_uncertainty_reports_at_once() {
        let mut cache = SymbolCache::new(4000);
        assert_eq!(cache.sighting(SymbolType::QrCode, b"x", 50, 0), 0);
        assert_eq!(cache.sighting(SymbolType::QrCode, b"x", 80, 0), 1);
    }

    #[test]
    fn test_hysteresis_restarts_count() {
        let mut cache = SymbolCache::new(4000);
        cache.sighting(SymbolType::Code128, b"a", 0, 1);
        assert_eq!(cache.sighting(SymbolType::Code128, b"a", 100, 1), 0);
        // confirmed entries tolerate a gap between proximity and hysteresis
        assert_eq!(cache.sighting(SymbolType::Code128, b"a", 1600, 1), 1);
        // but not one past hysteresis
        assert_eq!(cache.sighting(SymbolType::Code128, b"a", 3700, 1), -1);
        // unconfirmed entries restart on any gap beyond proximity
        assert_eq!(cache.sighting(SymbolType::Code128, b"a", 5000, 1), -1);
    }

    #[test]
    fn test_timeout_evicts_and_keys_are_distinct() {
        let mut cache = SymbolCache::new(4000);
        cache.sighting(SymbolType::QrCode, b"x", 0, 0);
        cache.sighting(SymbolType::QrCode, b"y", 0, 0);
        cache.sighting(SymbolType::Code39, b"x", 0, 0);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.sighting(SymbolType::QrCode, b"x", 5000, 0), 0);
        assert_eq!(cache.len(), 1);
        cache.revert(SymbolType::QrCode, b"x");
        assert_eq!(cache.sighting(SymbolType::QrCode, b"x", 5100, 0), 0);
    }
}
