//! Deduplication engine: owned content store, ownership ledger and the intern operations
//!
//! # Concurrency Strategy
//!
//! ```text
//! intern(bytes)
//!   │ digest(bytes)
//!   ├─ Phase 1: store.read(digest)             shared bucket access, no allocation
//!   │     hit + live  ──► validate ──► shared handle / private copy on collision
//!   │
//!   └─ Phase 2: epoch.read() + store.entry(digest)   bucket lock held
//!         occupied + live ──► validate (another thread won the race)
//!         vacant / dead   ──► allocate, insert slot + ledger entry, pin for keep-alive
//! ```
//!
//! The second phase re-checks the slot under the bucket lock, so two threads interning the same
//! content for the first time end up sharing one buffer instead of leaving a transient
//! duplicate behind.
//!
//! Release goes the other way: the last strong reference drops its buffer, `Drop` calls
//! [`ReleaseHook::release`], which looks the identity up in the ledger and removes both entries.
//! `flush` bumps the epoch under the write side of the same lock, disarming every hook that
//! belongs to a buffer registered before it.

use crate::{
    config::PoolConfig,
    digest::{self, Digest, DigestFn},
    handle::{DedupBytes, DedupStr, Interned, ReleaseHook},
    keep_alive::{self, KeepAlive, SweepOwner},
    stats::{Counters, Statistics},
};
use ahash::RandomState;
use core::{fmt, str::Utf8Error};
use parking_lot::RwLock;
use scc::hash_map::Entry;
use std::{
    sync::{Arc, Weak},
    time::Instant,
};
use tracing::{debug, trace};

/// Concurrent content deduplication pool
///
/// Cheap to clone: clones address the same store. Handles returned by a pool stay valid after
/// the pool itself is dropped, they just stop being tracked.
///
/// ```rust
/// use stringdedup::{Pool, PoolConfig};
///
/// let pool = Pool::with_config(
///     |bytes: &[u8]| bytes.len() as u32, // deliberately weak digest
///     PoolConfig::default(),
/// );
///
/// let a = pool.intern_str("abc");
/// let b = pool.intern_str("xyz"); // same digest, different content
///
/// assert_eq!(b, "xyz");
/// assert!(!b.is_shared());
/// assert_eq!(pool.statistics().collisions, 1);
/// # drop(a);
/// ```
pub struct Pool<H: Digest> {
    core: Arc<Core<H>>,
}

impl<H: Digest> Clone for Pool<H> {
    #[inline]
    fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

/// Store entry: non-owning view of an interned buffer
struct Slot {
    id: usize,
    buffer: Weak<Interned>,
}

impl Slot {
    #[inline]
    fn new(buffer: &Arc<Interned>) -> Self {
        Self { id: Interned::id(buffer), buffer: Arc::downgrade(buffer) }
    }
}

/// Ledger entry, exists iff a store slot with the same identity exists
struct LedgerEntry<H> {
    digest: H,
    len: usize,
}

struct Core<H: Digest> {
    this: Weak<Core<H>>,
    digest: Box<DigestFn<H>>,
    config: PoolConfig,
    store: scc::HashMap<H, Slot, RandomState>,
    ledger: scc::HashMap<usize, LedgerEntry<H>, RandomState>,
    /// Flush epoch; insertions hold the read side, flush holds the write side
    epoch: RwLock<u64>,
    stats: Counters,
    keep_alive: Option<KeepAlive>,
}

/// Result of the locked insertion phase
enum Insertion {
    Existing(Arc<Interned>),
    Inserted(Arc<Interned>),
}

// ═══════════════════════════════════════════════════════════════════════════
//                          Layer 1: Public API
// ═══════════════════════════════════════════════════════════════════════════

impl<H: Digest> Pool<H> {
    /// Creates a pool with the default configuration
    pub fn new<F>(digest: F) -> Self
    where F: Fn(&[u8]) -> H + Send + Sync + 'static {
        Self::with_config(digest, PoolConfig::default())
    }

    pub fn with_config<F>(digest: F, config: PoolConfig) -> Self
    where F: Fn(&[u8]) -> H + Send + Sync + 'static {
        debug!(?config, "creating dedup pool");
        let core = Arc::new_cyclic(|this| Core {
            this: this.clone(),
            digest: Box::new(digest),
            config,
            store: scc::HashMap::with_hasher(RandomState::new()),
            ledger: scc::HashMap::with_hasher(RandomState::new()),
            epoch: RwLock::new(0),
            stats: Counters::default(),
            keep_alive: config.keep_alive_enabled().then(|| KeepAlive::new(config.keep_alive)),
        });
        Self { core }
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig { &self.core.config }

    /// Deduplicates text
    ///
    /// Returns the canonical shared copy of `s`, or a private copy if another content already
    /// owns the digest slot. Empty input returns empty text without touching the pool.
    pub fn intern_str(&self, s: &str) -> DedupStr {
        if s.is_empty() {
            return DedupStr::new();
        }
        match self.core.intern(s.as_bytes(), true) {
            // SAFETY: text interning only returns buffers flagged as UTF-8
            Some(inner) => unsafe { DedupStr::from_shared(inner) },
            None => DedupStr::private(s),
        }
    }

    /// Deduplicates bytes that are expected to be text
    ///
    /// The input is copied before it is shared, later changes to the caller's buffer do not
    /// reach the pool.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error if `bytes` is not valid text; the pool is not touched.
    pub fn intern_bytes_as_str(&self, bytes: &[u8]) -> Result<DedupStr, Utf8Error> {
        let s = core::str::from_utf8(bytes)?;
        Ok(self.intern_str(s))
    }

    /// Deduplicates raw bytes, handing out the shared buffer itself
    ///
    /// # Panics
    ///
    /// Unless the pool was built with [`PoolConfig::allow_unsafe_bytes`]. The returned buffer is
    /// shared with every other caller interning the same content; the acknowledgment documents
    /// that callers must treat it as strictly read-only, including through FFI or raw pointers.
    pub fn intern_bytes(&self, bytes: &[u8]) -> DedupBytes {
        if !self.core.config.allow_unsafe_bytes {
            panic!("intern_bytes requires PoolConfig::allow_unsafe_bytes");
        }
        if bytes.is_empty() {
            return DedupBytes::new();
        }
        match self.core.intern(bytes, false) {
            Some(inner) => DedupBytes::from_shared(inner),
            None => DedupBytes::private(bytes),
        }
    }

    /// Live entries (`items_added - items_removed`), eventually consistent
    #[inline]
    pub fn size(&self) -> u64 { self.core.stats.live_items() }

    /// Total bytes of live entries, scans the whole ledger
    pub fn byte_count(&self) -> u64 {
        let mut total = 0u64;
        self.core.ledger.scan(|_, entry| total += entry.len as u64);
        total
    }

    /// References currently pinned by keep-alive
    pub fn keep_alive_len(&self) -> usize {
        self.core.keep_alive.as_ref().map_or(0, KeepAlive::len)
    }

    /// Drops the whole index
    ///
    /// Every entry present when the call starts is gone when it returns, and its pending
    /// release hook is disarmed. Entries interned concurrently with the call may or may not
    /// survive it. Handles already given out stay valid.
    pub fn flush(&self) {
        let core = &*self.core;
        let mut cleared = 0u64;
        let mut bytes = 0u64;

        let pinned = {
            let mut epoch = core.epoch.write();
            *epoch = epoch.wrapping_add(1);

            core.ledger.retain(|_, entry| {
                cleared += 1;
                bytes += entry.len as u64;
                false
            });
            core.store.clear();
            core.keep_alive.as_ref().map(KeepAlive::take_all).unwrap_or_default()
        };

        core.stats.record_removed(cleared, bytes);
        core.stats.record_keep_alive_removed(pinned.len() as u64);
        debug!(cleared, bytes, pinned = pinned.len(), "dedup pool flushed");
        // Hooks of these buffers see a stale epoch and do nothing
        drop(pinned);
    }

    /// Counter snapshot, not atomic across fields
    #[inline]
    pub fn statistics(&self) -> Statistics { self.core.stats.snapshot() }
}

impl Pool<u32> {
    /// Pool keyed by [`digest::hash32`]
    pub fn new_hash32() -> Self { Self::new(digest::hash32) }
}

impl Pool<u64> {
    /// Pool keyed by [`digest::hash64`]
    pub fn new_hash64() -> Self { Self::new(digest::hash64) }
}

impl<H: Digest> fmt::Debug for Pool<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Pool");
        s.field("config", &self.core.config).field("statistics", &self.statistics());
        if let Some(keep_alive) = &self.core.keep_alive {
            s.field("keep_alive_len", &keep_alive.len()).field("sweeper", &keep_alive.state());
        }
        s.finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//                          Layer 2: Intern and release
// ═══════════════════════════════════════════════════════════════════════════

impl<H: Digest> Core<H> {
    /// Returns the shared buffer for `bytes`, or `None` when the caller must fall back to a
    /// private copy
    fn intern(&self, bytes: &[u8], text: bool) -> Option<Arc<Interned>> {
        let digest = (self.digest)(bytes);

        // Phase 1: lookup without allocation
        if let Some(existing) = self.store.read(&digest, |_, slot| slot.buffer.upgrade()).flatten()
        {
            return self.accept(existing, digest, bytes, text);
        }

        // Phase 2: locked check-and-insert
        match self.insert(digest, bytes, text) {
            Insertion::Existing(existing) => self.accept(existing, digest, bytes, text),
            Insertion::Inserted(buffer) => {
                self.stats.record_added(bytes.len());
                if let Some(keep_alive) = &self.keep_alive {
                    keep_alive.pin(Interned::id(&buffer), buffer.clone(), Instant::now());
                    self.stats.record_keep_alive_added();
                    keep_alive::arm(keep_alive, &self.this);
                }
                Some(buffer)
            }
        }
    }

    /// Validates a hit against the requested content
    fn accept(
        &self,
        existing: Arc<Interned>,
        digest: H,
        bytes: &[u8],
        text: bool,
    ) -> Option<Arc<Interned>> {
        // A text request must never receive non-UTF-8 bytes, even with validation disabled
        let mismatch = (text && !existing.is_utf8())
            || (!self.config.dont_validate_results && existing.as_bytes() != bytes);

        if mismatch {
            let occupancy = self.stats.live_items();
            if self.stats.record_collision(occupancy) {
                debug!(?digest, occupancy, "first digest collision");
            } else {
                trace!(?digest, "digest collision");
            }
            return None;
        }

        self.stats.record_saved(bytes.len());
        Some(existing)
    }

    fn insert(&self, digest: H, bytes: &[u8], text: bool) -> Insertion {
        let epoch = self.epoch.read();

        match self.store.entry(digest) {
            Entry::Occupied(mut occupied) => {
                if let Some(existing) = occupied.get().buffer.upgrade() {
                    return Insertion::Existing(existing);
                }
                // Last reference already gone, its hook is about to evict the slot. Take the
                // slot over; the hook only removes slots carrying its own identity.
                let buffer = self.allocate(bytes, text, *epoch);
                *occupied.get_mut() = Slot::new(&buffer);
                self.register(&buffer, digest, bytes.len());
                Insertion::Inserted(buffer)
            }
            Entry::Vacant(vacant) => {
                let buffer = self.allocate(bytes, text, *epoch);
                vacant.insert_entry(Slot::new(&buffer));
                self.register(&buffer, digest, bytes.len());
                Insertion::Inserted(buffer)
            }
        }
    }

    /// The UTF-8 flag follows the content, not the entry point that created the buffer
    #[inline]
    fn allocate(&self, bytes: &[u8], text: bool, epoch: u64) -> Arc<Interned> {
        let hook: Weak<dyn ReleaseHook> = self.this.clone();
        let utf8 = text || core::str::from_utf8(bytes).is_ok();
        Interned::new(bytes, utf8, epoch, hook)
    }

    #[inline]
    fn register(&self, buffer: &Arc<Interned>, digest: H, len: usize) {
        // Identities are unique among live buffers
        drop(self.ledger.upsert(Interned::id(buffer), LedgerEntry { digest, len }));
    }
}

impl<H: Digest> ReleaseHook for Core<H> {
    fn release(&self, id: usize, epoch: u64) {
        // Recursive: a hook may fire on a thread already holding the read side
        let current = self.epoch.read_recursive();
        if *current != epoch {
            // Registered before a flush, which already tore the entry down
            return;
        }

        let Some((_, entry)) = self.ledger.remove(&id) else {
            panic!("dedup ledger mismatch");
        };
        self.store.remove_if(&entry.digest, |slot| slot.id == id);
        drop(current);

        self.stats.record_removed(1, entry.len as u64);
        trace!(digest = ?entry.digest, len = entry.len, "interned buffer released");
    }
}

impl<H: Digest> SweepOwner for Core<H> {
    #[inline]
    fn keep_alive(&self) -> Option<&KeepAlive> { self.keep_alive.as_ref() }

    #[inline]
    fn on_expired(&self, count: usize) { self.stats.record_keep_alive_removed(count as u64) }
}
