//! Pool occupancy and effectiveness counters
//!
//! Every counter is an independent atomic. Reading several of them is not a transactional
//! snapshot: a concurrent insertion may be visible in `items_added` but not yet in
//! `bytes_in_memory`.

use core::{
    fmt,
    sync::atomic::{
        AtomicU64,
        Ordering::{AcqRel, Relaxed},
    },
};
use serde::Serialize;

/// Point-in-time copy of a pool's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Distinct contents copied into the pool
    pub items_added: u64,
    /// Bytes currently owned by live entries
    pub bytes_in_memory: u64,
    /// Intern calls answered with an existing entry
    pub items_saved: u64,
    /// Bytes not allocated thanks to `items_saved`
    pub bytes_saved: u64,
    /// Entries evicted by release or flush
    pub items_removed: u64,
    /// Digest collisions between distinct contents
    pub collisions: u64,
    /// Pool occupancy when the first collision was seen, 0 if none yet
    pub first_collision_detected: u64,
    pub keep_alive_items_added: u64,
    pub keep_alive_items_removed: u64,
}

impl Statistics {
    /// Entries the pool currently tracks (`items_added - items_removed`)
    #[must_use]
    #[inline]
    pub const fn live_items(&self) -> u64 { self.items_added.saturating_sub(self.items_removed) }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added={} ({} bytes live) saved={} ({} bytes) removed={} collisions={}",
            self.items_added,
            self.bytes_in_memory,
            self.items_saved,
            self.bytes_saved,
            self.items_removed,
            self.collisions,
        )?;
        if self.first_collision_detected != 0 {
            write!(f, " (first at {})", self.first_collision_detected)?;
        }
        write!(
            f,
            " keepalive={}/{}",
            self.keep_alive_items_added, self.keep_alive_items_removed
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    items_added: AtomicU64,
    bytes_in_memory: AtomicU64,
    items_saved: AtomicU64,
    bytes_saved: AtomicU64,
    items_removed: AtomicU64,
    collisions: AtomicU64,
    first_collision_detected: AtomicU64,
    keep_alive_items_added: AtomicU64,
    keep_alive_items_removed: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn record_added(&self, len: usize) {
        self.items_added.fetch_add(1, Relaxed);
        self.bytes_in_memory.fetch_add(len as u64, Relaxed);
    }

    #[inline]
    pub(crate) fn record_saved(&self, len: usize) {
        self.items_saved.fetch_add(1, Relaxed);
        self.bytes_saved.fetch_add(len as u64, Relaxed);
    }

    #[inline]
    pub(crate) fn record_removed(&self, items: u64, bytes: u64) {
        self.items_removed.fetch_add(items, Relaxed);
        // Saturating: a flush may race with the insertion it undoes
        let _ = self
            .bytes_in_memory
            .fetch_update(AcqRel, Relaxed, |held| Some(held.saturating_sub(bytes)));
    }

    /// Counts a collision, returns `true` for the first one ever seen
    pub(crate) fn record_collision(&self, occupancy: u64) -> bool {
        self.collisions.fetch_add(1, Relaxed);
        // Occupancy is at least 1 when a collision happens, 0 stays reserved for "never".
        self.first_collision_detected
            .compare_exchange(0, occupancy.max(1), AcqRel, Relaxed)
            .is_ok()
    }

    #[inline]
    pub(crate) fn record_keep_alive_added(&self) {
        self.keep_alive_items_added.fetch_add(1, Relaxed);
    }

    #[inline]
    pub(crate) fn record_keep_alive_removed(&self, items: u64) {
        self.keep_alive_items_removed.fetch_add(items, Relaxed);
    }

    #[inline]
    pub(crate) fn live_items(&self) -> u64 {
        let removed = self.items_removed.load(Relaxed);
        self.items_added.load(Relaxed).saturating_sub(removed)
    }

    pub(crate) fn snapshot(&self) -> Statistics {
        Statistics {
            items_added: self.items_added.load(Relaxed),
            bytes_in_memory: self.bytes_in_memory.load(Relaxed),
            items_saved: self.items_saved.load(Relaxed),
            bytes_saved: self.bytes_saved.load(Relaxed),
            items_removed: self.items_removed.load(Relaxed),
            collisions: self.collisions.load(Relaxed),
            first_collision_detected: self.first_collision_detected.load(Relaxed),
            keep_alive_items_added: self.keep_alive_items_added.load(Relaxed),
            keep_alive_items_removed: self.keep_alive_items_removed.load(Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added_and_removed_balance() {
        let counters = Counters::default();
        counters.record_added(5);
        counters.record_added(7);
        counters.record_removed(1, 5);

        let stats = counters.snapshot();
        assert_eq!(stats.items_added, 2);
        assert_eq!(stats.items_removed, 1);
        assert_eq!(stats.bytes_in_memory, 7);
        assert_eq!(stats.live_items(), 1);
        assert_eq!(counters.live_items(), 1);
    }

    #[test]
    fn test_bytes_in_memory_never_wraps() {
        let counters = Counters::default();
        counters.record_added(3);
        counters.record_removed(1, 10);
        assert_eq!(counters.snapshot().bytes_in_memory, 0);
    }

    #[test]
    fn test_first_collision_recorded_once() {
        let counters = Counters::default();
        assert!(counters.record_collision(42));
        assert!(!counters.record_collision(99));

        let stats = counters.snapshot();
        assert_eq!(stats.collisions, 2);
        assert_eq!(stats.first_collision_detected, 42);
    }

    #[test]
    fn test_display_mentions_first_collision_only_when_set() {
        let mut stats = Statistics { items_added: 1, ..Statistics::default() };
        assert!(!stats.to_string().contains("first at"));

        stats.first_collision_detected = 3;
        assert!(stats.to_string().contains("first at 3"));
    }
}
