//! Time-bounded pinning of freshly interned content
//!
//! Every insertion into a pool with a non-zero keep-alive duration also lands here, holding one
//! extra strong reference until `now + duration`. A single background sweeper drops expired
//! references every `duration / 5` and goes dormant once the set is empty; the next insertion
//! re-arms it.

use crate::handle::Interned;
use ahash::RandomState;
use core::{
    sync::atomic::{AtomicU8, Ordering},
    time::Duration,
};
use std::{
    sync::{Arc, Weak},
    thread,
    time::Instant,
};
use tracing::{debug, trace, warn};

const SWEEPER_THREAD_NAME: &str = "stringdedup-keepalive";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Sweeper state machine
///
/// State transition paths:
/// 1. Arming: Dormant -> Scheduled (only the compare-exchange winner spawns a sweeper)
/// 2. Sweep cycle: Scheduled -> Running -> Scheduled
/// 3. Going idle: Running -> Dormant (-> Scheduled again if an insertion raced the shutdown)
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum SweepState {
    Dormant,
    Scheduled,
    Running,
}

struct AtomicSweepState(AtomicU8);

impl AtomicSweepState {
    const fn new(state: SweepState) -> Self { Self(AtomicU8::new(state as u8)) }

    fn load(&self) -> SweepState {
        match self.0.load(Ordering::SeqCst) {
            0 => SweepState::Dormant,
            1 => SweepState::Scheduled,
            _ => SweepState::Running,
        }
    }

    fn store(&self, state: SweepState) { self.0.store(state as u8, Ordering::SeqCst) }

    fn transition(&self, from: SweepState, to: SweepState) -> bool {
        self.0.compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }
}

/// One pinned reference
pub(crate) struct Pinned {
    _buffer: Arc<Interned>,
    expires: Instant,
}

/// Keep-alive set: buffer identity -> pinned reference
pub(crate) struct KeepAlive {
    duration: Duration,
    entries: scc::HashMap<usize, Pinned, RandomState>,
    state: AtomicSweepState,
}

/// Owner of a keep-alive set, reachable from the sweeper through a `Weak`
pub(crate) trait SweepOwner: Send + Sync + 'static {
    fn keep_alive(&self) -> Option<&KeepAlive>;

    /// Called after each sweep with the number of references released
    fn on_expired(&self, count: usize);
}

impl KeepAlive {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            duration,
            entries: scc::HashMap::with_hasher(RandomState::new()),
            state: AtomicSweepState::new(SweepState::Dormant),
        }
    }

    #[inline]
    pub(crate) fn interval(&self) -> Duration { (self.duration / 5).max(MIN_SWEEP_INTERVAL) }

    #[inline]
    pub(crate) fn len(&self) -> usize { self.entries.len() }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool { self.entries.is_empty() }

    #[inline]
    pub(crate) fn state(&self) -> SweepState { self.state.load() }

    /// Holds `buffer` until `now + duration`
    pub(crate) fn pin(&self, id: usize, buffer: Arc<Interned>, now: Instant) {
        let pinned = Pinned { _buffer: buffer, expires: now + self.duration };
        // An address is reused only after its previous owner was released, so a stale entry
        // here can only belong to a buffer already evicted; the replaced value drops out here.
        drop(self.entries.upsert(id, pinned));
    }

    /// Removes and returns every entry expired at `now`
    ///
    /// Dropping the returned references may run lifecycle hooks, callers must not hold pool
    /// locks while doing so.
    pub(crate) fn take_expired(&self, now: Instant) -> Vec<Pinned> {
        let mut candidates = Vec::new();
        self.entries.scan(|id, pinned| {
            if pinned.expires <= now {
                candidates.push(*id);
            }
        });

        candidates
            .into_iter()
            .filter_map(|id| self.entries.remove_if(&id, |pinned| pinned.expires <= now))
            .map(|(_, pinned)| pinned)
            .collect()
    }

    /// Removes and returns every entry regardless of expiry
    pub(crate) fn take_all(&self) -> Vec<Pinned> {
        let mut ids = Vec::with_capacity(self.entries.len());
        self.entries.scan(|id, _| ids.push(*id));

        ids.into_iter().filter_map(|id| self.entries.remove(&id)).map(|(_, pinned)| pinned).collect()
    }

    /// Tries to become the single scheduled sweeper
    #[inline]
    fn try_arm(&self) -> bool { self.state.transition(SweepState::Dormant, SweepState::Scheduled) }
}

/// Spawns a sweeper for `owner` unless one is already scheduled or running
pub(crate) fn arm<O: SweepOwner>(keep_alive: &KeepAlive, owner: &Weak<O>) {
    if !keep_alive.try_arm() {
        return;
    }

    let interval = keep_alive.interval();
    let owner = owner.clone();
    let spawned = thread::Builder::new()
        .name(SWEEPER_THREAD_NAME.to_owned())
        .spawn(move || run_sweeper(&owner, interval));

    match spawned {
        Ok(_) => debug!(?interval, "keep-alive sweeper armed"),
        Err(e) => {
            // Next insertion retries
            keep_alive.state.store(SweepState::Dormant);
            warn!(error = %e, "failed to spawn keep-alive sweeper");
        }
    }
}

fn run_sweeper<O: SweepOwner>(owner: &Weak<O>, interval: Duration) {
    loop {
        thread::sleep(interval);

        // The owner is only borrowed for one sweep, never across the sleep
        let Some(owner) = owner.upgrade() else {
            trace!("keep-alive owner dropped, sweeper exiting");
            return;
        };
        let Some(keep_alive) = owner.keep_alive() else {
            return;
        };

        keep_alive.state.store(SweepState::Running);
        let expired = keep_alive.take_expired(Instant::now());
        let count = expired.len();
        drop(expired);
        owner.on_expired(count);

        if !keep_alive.is_empty() {
            trace!(expired = count, remaining = keep_alive.len(), "keep-alive sweep");
            keep_alive.state.store(SweepState::Scheduled);
            continue;
        }

        keep_alive.state.store(SweepState::Dormant);
        // An insertion that pinned while we were Running saw a busy sweeper and did not arm;
        // pick its entry up instead of leaving it unswept.
        if keep_alive.is_empty() || !keep_alive.try_arm() {
            debug!(expired = count, "keep-alive sweeper dormant");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ReleaseHook;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    struct NoopHook;

    impl ReleaseHook for NoopHook {
        fn release(&self, _: usize, _: u64) {}
    }

    struct Owner {
        keep_alive: KeepAlive,
        expired: AtomicUsize,
    }

    impl SweepOwner for Owner {
        fn keep_alive(&self) -> Option<&KeepAlive> { Some(&self.keep_alive) }

        fn on_expired(&self, count: usize) { self.expired.fetch_add(count, SeqCst); }
    }

    fn buffer(hook: &Arc<NoopHook>, content: &str) -> Arc<Interned> {
        let weak: Weak<NoopHook> = Arc::downgrade(hook);
        Interned::new(content.as_bytes(), true, 0, weak)
    }

    #[test]
    fn test_interval_is_fifth_of_duration() {
        assert_eq!(KeepAlive::new(Duration::from_secs(1)).interval(), Duration::from_millis(200));
        assert_eq!(KeepAlive::new(Duration::from_micros(2)).interval(), MIN_SWEEP_INTERVAL);
    }

    #[test]
    fn test_pin_holds_strong_reference_until_expiry() {
        let hook = Arc::new(NoopHook);
        let keep_alive = KeepAlive::new(Duration::from_secs(10));
        let inner = buffer(&hook, "pinned");
        let id = Interned::id(&inner);
        let start = Instant::now();

        keep_alive.pin(id, inner.clone(), start);
        assert_eq!(Arc::strong_count(&inner), 2);

        assert!(keep_alive.take_expired(start + Duration::from_secs(9)).is_empty());
        assert_eq!(keep_alive.take_expired(start + Duration::from_secs(10)).len(), 1);
        assert_eq!(Arc::strong_count(&inner), 1);
        assert!(keep_alive.is_empty());
    }

    #[test]
    fn test_take_all_drains() {
        let hook = Arc::new(NoopHook);
        let keep_alive = KeepAlive::new(Duration::from_secs(10));
        let now = Instant::now();
        for content in ["a", "b", "c"] {
            let inner = buffer(&hook, content);
            keep_alive.pin(Interned::id(&inner), inner, now);
        }
        assert_eq!(keep_alive.len(), 3);
        assert_eq!(keep_alive.take_all().len(), 3);
        assert!(keep_alive.is_empty());
    }

    #[test]
    fn test_only_one_arm_wins() {
        let keep_alive = KeepAlive::new(Duration::from_secs(1));
        assert!(keep_alive.try_arm());
        assert!(!keep_alive.try_arm());
        assert_eq!(keep_alive.state(), SweepState::Scheduled);
    }

    #[test]
    fn test_sweeper_expires_and_goes_dormant() {
        let hook = Arc::new(NoopHook);
        let owner = Arc::new(Owner {
            keep_alive: KeepAlive::new(Duration::from_millis(50)),
            expired: AtomicUsize::new(0),
        });
        let inner = buffer(&hook, "short-lived");
        owner.keep_alive.pin(Interned::id(&inner), inner, Instant::now());

        let weak = Arc::downgrade(&owner);
        arm(&owner.keep_alive, &weak);
        // Second arm while scheduled is a no-op
        arm(&owner.keep_alive, &weak);

        let deadline = Instant::now() + Duration::from_secs(5);
        while owner.keep_alive.state() != SweepState::Dormant && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(owner.keep_alive.state(), SweepState::Dormant);
        assert!(owner.keep_alive.is_empty());
        assert_eq!(owner.expired.load(SeqCst), 1);
    }
}
