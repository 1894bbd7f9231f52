//! Counters for the tokenizer's degraded paths.
//!
//! Encoding and decoding never fail; instead they fall back to a defined
//! value. These counters make every fallback visible to the caller.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TokenizerStats {
    unknown_pieces: AtomicU64,
    dropped_ids: AtomicU64,
    invalid_utf8: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Point-in-time copy of [`TokenizerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Pieces with no vocabulary entry, encoded as the unknown id.
    pub unknown_pieces: u64,
    /// Ids with no vocabulary or special entry, dropped during decode.
    pub dropped_ids: u64,
    /// Decodes whose bytes were not valid UTF-8.
    pub invalid_utf8: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl TokenizerStats {
    /// Returns the count before this event.
    pub(crate) fn record_unknown_piece(&self) -> u64 {
        self.unknown_pieces.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_dropped_id(&self) -> u64 {
        self.dropped_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_invalid_utf8(&self) -> u64 {
        self.invalid_utf8.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_cache(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            unknown_pieces: self.unknown_pieces.load(Ordering::Relaxed),
            dropped_ids: self.dropped_ids.load(Ordering::Relaxed),
            invalid_utf8: self.invalid_utf8.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.unknown_pieces,
            &self.dropped_ids,
            &self.invalid_utf8,
            &self.cache_hits,
            &self.cache_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset() {
        let stats = TokenizerStats::default();
        assert_eq!(stats.record_unknown_piece(), 0);
        assert_eq!(stats.record_unknown_piece(), 1);
        stats.record_dropped_id();
        stats.record_cache(true);
        stats.record_cache(false);
        stats.record_cache(false);

        let snap = stats.snapshot();
        assert_eq!(snap.unknown_pieces, 2);
        assert_eq!(snap.dropped_ids, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 2);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
