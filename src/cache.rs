//! Query-window cache keys and the bounded payload cache.
//!
//! A [`CacheKey`] describes the time range and bucket size a piece of track
//! data was fetched for. Raw keys come straight from the viewport; before a
//! fetch they are normalized onto a canonical bucket ladder so that visually
//! similar zoom levels map to the same key, and so that the fetched window is
//! always a superset of what was asked for.

use std::collections::VecDeque;
use std::fmt;

use crate::time::{DurationNs, TimeNs};

/// Entries kept resident per track. Enough for a small back/forward buffer
/// of recently visited zoom levels.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

/// Normalized windows are rounded outward to a multiple of this many
/// buckets, so neighbouring pans at the same zoom level reuse one key.
const CHUNK_BUCKETS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub start: TimeNs,
    pub end: TimeNs,
    pub bucket_size: DurationNs,
}

impl CacheKey {
    /// Build a raw, un-normalized key for a window rendered at
    /// `window_size_px` pixels. The bucket is the duration covered by a
    /// single pixel, floored at 1ns.
    pub fn create(start: TimeNs, end: TimeNs, window_size_px: f32) -> CacheKey {
        let px = (window_size_px.max(1.0)).round() as i64;
        let bucket_size = (end.diff(start) / px).max(1);
        CacheKey {
            start,
            end,
            bucket_size,
        }
    }

    /// The sentinel for "nothing cached yet". Covers no non-degenerate
    /// window.
    pub fn zero() -> CacheKey {
        CacheKey {
            start: TimeNs::ZERO,
            end: TimeNs::ZERO,
            bucket_size: 1,
        }
    }

    /// Snap onto the canonical ladder: the bucket is rounded *down* to a
    /// power of two and the window outward to a chunk boundary. The result
    /// therefore always covers `self`; a normalized key that did not would
    /// be a fatal logic error, checked by callers.
    pub fn normalize(&self) -> CacheKey {
        let bucket_size = prev_power_of_two(self.bucket_size.max(1));
        let chunk = bucket_size.saturating_mul(CHUNK_BUCKETS);
        CacheKey {
            start: self.start.quant_floor(chunk),
            end: self.end.quant_ceil(chunk),
            bucket_size,
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.bucket_size > 0
            && self.bucket_size.count_ones() == 1
            && self.start == self.start.quant_floor(self.bucket_size)
            && self.end == self.end.quant_floor(self.bucket_size)
    }

    /// True when `other` holds data usable in place of `self`: a superset
    /// window fetched at a finer-or-equal bucket size.
    pub fn is_covered_by(&self, other: &CacheKey) -> bool {
        other.start <= self.start
            && self.end <= other.end
            && other.bucket_size <= self.bucket_size
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) @{}ns",
            self.start, self.end, self.bucket_size
        )
    }
}

fn prev_power_of_two(v: i64) -> i64 {
    debug_assert!(v > 0);
    1i64 << (63 - v.leading_zeros())
}

/// A small bounded store of fetched payloads keyed by the normalized window
/// they were fetched for. Oldest entries are evicted first.
///
/// Lookup is exact-match only. Whether an existing key still *covers* the
/// viewport is decided one layer up, against the currently displayed key,
/// not against cache contents.
#[derive(Debug)]
pub struct TimelineCache<T> {
    capacity: usize,
    entries: VecDeque<(CacheKey, T)>,
}

impl<T> TimelineCache<T> {
    pub fn new(capacity: usize) -> TimelineCache<T> {
        assert!(capacity > 0, "cache capacity must be non-zero");
        TimelineCache {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: CacheKey, data: T) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = data;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, data));
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, data)| data)
    }

    /// Drop everything. Used when upstream configuration changes make all
    /// resident payloads meaningless.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: i64) -> TimeNs {
        TimeNs::from_raw(raw)
    }

    #[test]
    fn coverage_is_reflexive() {
        let keys = [
            CacheKey::zero(),
            CacheKey::create(t(0), t(1_000_000), 500.0),
            CacheKey::create(t(123), t(456_789), 33.0).normalize(),
        ];
        for key in keys {
            assert!(key.is_covered_by(&key), "{key} must cover itself");
        }
    }

    #[test]
    fn normalization_covers_the_raw_request() {
        let windows = [
            (0i64, 2_000_000_000i64, 500.0f32),
            (1_000_000_000, 3_000_000_000, 500.0),
            (123_456, 789_012, 97.0),
            (5, 6, 1.0),
            (-2_000_000_000, 4_000_000_000, 1280.0),
        ];
        for (start, end, px) in windows {
            let raw = CacheKey::create(t(start), t(end), px);
            let normalized = raw.normalize();
            assert!(
                raw.is_covered_by(&normalized),
                "{normalized} must cover {raw}"
            );
            assert!(normalized.is_normalized());
        }
    }

    #[test]
    fn normalized_bucket_is_on_the_ladder() {
        let raw = CacheKey::create(t(0), t(10_000), 3.0);
        let normalized = raw.normalize();
        assert_eq!(normalized.bucket_size.count_ones(), 1);
        assert!(normalized.bucket_size <= raw.bucket_size);
    }

    #[test]
    fn similar_zoom_levels_share_a_key() {
        let a = CacheKey::create(t(1_000_000), t(2_000_000), 500.0).normalize();
        let b = CacheKey::create(t(1_010_000), t(2_010_000), 500.0).normalize();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_key_covers_nothing_real() {
        let raw = CacheKey::create(t(0), t(1_000), 10.0);
        assert!(!raw.is_covered_by(&CacheKey::zero()));
    }

    #[test]
    fn cache_evicts_oldest_first() {
        let mut cache: TimelineCache<u32> = TimelineCache::new(3);
        let keys: Vec<CacheKey> = (0..4)
            .map(|i| CacheKey::create(t(i * 1000), t((i + 1) * 1000), 10.0))
            .collect();

        for (i, key) in keys.iter().enumerate() {
            cache.insert(*key, i as u32);
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.lookup(&keys[0]).is_none());
        assert_eq!(cache.lookup(&keys[1]), Some(&1));
        assert_eq!(cache.lookup(&keys[3]), Some(&3));
    }

    #[test]
    fn cache_lookup_is_exact_match_only() {
        let mut cache: TimelineCache<u32> = TimelineCache::new(3);
        let stored = CacheKey::create(t(0), t(10_000), 100.0);
        cache.insert(stored, 7);

        // A narrower window is covered by the stored one, but lookup still
        // misses: coverage is not the cache's job.
        let narrower = CacheKey::create(t(1_000), t(9_000), 100.0);
        assert!(narrower.is_covered_by(&stored));
        assert!(cache.lookup(&narrower).is_none());
        assert_eq!(cache.lookup(&stored), Some(&7));
    }

    #[test]
    fn cache_insert_same_key_replaces() {
        let mut cache: TimelineCache<u32> = TimelineCache::new(2);
        let key = CacheKey::create(t(0), t(1000), 10.0);
        cache.insert(key, 1);
        cache.insert(key, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&key), Some(&2));
    }

    #[test]
    fn cache_invalidate_clears_everything() {
        let mut cache: TimelineCache<u32> = TimelineCache::new(2);
        cache.insert(CacheKey::create(t(0), t(1000), 10.0), 1);
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
