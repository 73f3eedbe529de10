//! Atomic monotonic counter with batch reservation.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter that only moves forward.
///
/// Values are handed out either one at a time or as contiguous ranges. Two
/// callers never receive overlapping values.
#[derive(Debug)]
pub struct MonotonicCounter {
    next: AtomicU64,
    limit: u64,
}

impl MonotonicCounter {
    /// Counter starting at `start` that never hands out values `>= limit`.
    #[must_use]
    pub const fn new(start: u64, limit: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            limit,
        }
    }

    /// Next value that has not been handed out
    #[must_use]
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Upper bound (exclusive) of the counter
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Take a single value, or `None` once the limit is reached.
    pub fn next(&self) -> Option<u64> {
        self.reserve(1).map(|range| range.start)
    }

    /// Reserve `count` contiguous values, or `None` if they do not fit below
    /// the limit. A failed reservation leaves the counter untouched.
    pub fn reserve(&self, count: u64) -> Option<Range<u64>> {
        let start = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(count)
                    .filter(|&end| end <= self.limit)
            })
            .ok()?;
        Some(start..start + count)
    }

    /// Move the counter forward to at least `value`. Never moves it back.
    pub fn advance_to(&self, value: u64) {
        self.next.fetch_max(value.min(self.limit), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_reserve_is_contiguous() {
        let counter = MonotonicCounter::new(10, 100);
        assert_eq!(counter.reserve(5), Some(10..15));
        assert_eq!(counter.next(), Some(15));
        assert_eq!(counter.current(), 16);
    }

    #[test]
    fn test_reserve_past_limit_fails_without_side_effect() {
        let counter = MonotonicCounter::new(0, 8);
        assert_eq!(counter.reserve(6), Some(0..6));
        assert_eq!(counter.reserve(3), None);
        assert_eq!(counter.reserve(2), Some(6..8));
        assert_eq!(counter.next(), None);
    }

    #[test]
    fn test_advance_never_moves_back() {
        let counter = MonotonicCounter::new(0, 1000);
        counter.advance_to(50);
        counter.advance_to(20);
        assert_eq!(counter.current(), 50);
    }

    #[test]
    fn test_concurrent_reservations_do_not_overlap() {
        let counter = Arc::new(MonotonicCounter::new(0, u64::MAX));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| counter.reserve(10).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for range in handle.join().unwrap() {
                for value in range {
                    assert!(seen.insert(value), "value {value} handed out twice");
                }
            }
        }
        assert_eq!(seen.len(), 8 * 100 * 10);
    }
}
