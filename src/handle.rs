//! Handles to deduplicated content
//!
//! # Ownership Model
//!
//! ```text
//!   caller handles (strong)          pool bookkeeping (weak)
//!   DedupStr ─┐                      Store:  digest ──► Slot { id, Weak }
//!   DedupStr ─┼──► Arc<Interned> ◄── Ledger: id ─────► (digest, len)
//!   DedupBytes┘        │
//!                      └─ Drop ──► ReleaseHook::release(id, epoch)
//! ```
//!
//! Every handle returned by a pool is one unit of shared ownership over an `Interned` buffer.
//! The pool's store only keeps a `Weak` link, so it can hand out new handles but never keeps a
//! buffer alive on its own. When the last strong reference goes away, `Drop` of the buffer runs
//! the pool's lifecycle hook synchronously, which evicts the store and ledger entries.
//!
//! A handle is one of:
//!
//! | Variant | Allocation | Tracked by pool |
//! |---------|------------|-----------------|
//! | empty   | none       | no              |
//! | shared  | one per distinct content | yes |
//! | private | one per call (collision fallback) | no |

use core::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    ptr, str,
};
use serde::{Serialize, Serializer};
use std::sync::{Arc, Weak};

// ═══════════════════════════════════════════════════════════════════════════
//                          Layer 1: Interned buffer and lifecycle hook
// ═══════════════════════════════════════════════════════════════════════════

/// Receives the release event of an interned buffer
///
/// Implemented by the pool core. `id` is the buffer's identity (its address), `epoch` the flush
/// epoch the buffer was registered in.
pub(crate) trait ReleaseHook: Send + Sync {
    fn release(&self, id: usize, epoch: u64);
}

/// Heap-allocated immutable copy of interned content
///
/// # Invariants
/// - `bytes` never changes after construction
/// - `utf8` is `true` only if `bytes` is valid UTF-8
/// - identity (address inside the `Arc`) is stable for the whole lifetime
pub(crate) struct Interned {
    bytes: Box<[u8]>,
    utf8: bool,
    epoch: u64,
    hook: Weak<dyn ReleaseHook>,
}

impl Interned {
    pub(crate) fn new(bytes: &[u8], utf8: bool, epoch: u64, hook: Weak<dyn ReleaseHook>) -> Arc<Self> {
        debug_assert!(!utf8 || str::from_utf8(bytes).is_ok());
        Arc::new(Self { bytes: bytes.into(), utf8, epoch, hook })
    }

    /// Identity used as ledger key
    #[inline]
    pub(crate) fn id(this: &Arc<Self>) -> usize { Arc::as_ptr(this) as usize }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] { &self.bytes }

    #[inline]
    pub(crate) const fn is_utf8(&self) -> bool { self.utf8 }
}

impl Drop for Interned {
    fn drop(&mut self) {
        // Pool already gone: nothing left to evict from
        if let Some(hook) = self.hook.upgrade() {
            hook.release(ptr::from_ref(self) as usize, self.epoch);
        }
    }
}

#[derive(Clone)]
enum Repr {
    Empty,
    Shared(Arc<Interned>),
    Private(Arc<[u8]>),
}

impl Repr {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Shared(inner) => inner.as_bytes(),
            Self::Private(bytes) => bytes,
        }
    }

    #[inline]
    fn ref_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Shared(inner) => Arc::strong_count(inner),
            Self::Private(bytes) => Arc::strong_count(bytes),
        }
    }

    #[inline]
    fn same_allocation(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Shared(a), Self::Shared(b)) => Arc::ptr_eq(a, b),
            (Self::Private(a), Self::Private(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//                          Layer 2: Public handle types
// ═══════════════════════════════════════════════════════════════════════════

/// Deduplicated immutable text
///
/// # Usage Example
///
/// ```rust
/// use stringdedup::Pool;
///
/// let pool = Pool::new_hash64();
/// let s1 = pool.intern_str("hello");
/// let s2 = pool.intern_str("hello");
///
/// assert_eq!(s1, "hello");
/// assert_eq!(s1.as_ptr(), s2.as_ptr());
/// assert_eq!(s1.ref_count(), 2);
/// ```
///
/// Cloning only increments the reference count. Equality, ordering and hashing follow the text
/// content, so a handle can be looked up in a `HashMap<DedupStr, _>` by `&str`.
#[derive(Clone)]
pub struct DedupStr(Repr);

impl DedupStr {
    /// Empty text, no allocation and no pool interaction
    #[must_use]
    #[inline]
    pub const fn new() -> Self { Self(Repr::Empty) }

    /// # Safety
    ///
    /// `inner` must hold valid UTF-8.
    #[inline]
    pub(crate) unsafe fn from_shared(inner: Arc<Interned>) -> Self {
        debug_assert!(inner.is_utf8());
        Self(Repr::Shared(inner))
    }

    #[inline]
    pub(crate) fn private(s: &str) -> Self { Self(Repr::Private(Arc::from(s.as_bytes()))) }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: every constructor only accepts UTF-8 content (see `from_shared` and `private`)
        unsafe { str::from_utf8_unchecked(self.0.as_bytes()) }
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize { self.0.as_bytes().len() }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// `true` if the content is the pool's canonical copy
    #[must_use]
    #[inline]
    pub const fn is_shared(&self) -> bool { matches!(self.0, Repr::Shared(_)) }

    /// Current strong count of the underlying buffer, 0 for empty text
    ///
    /// Mainly for debugging and tests: under concurrency the value may be stale immediately.
    #[must_use]
    #[inline]
    pub fn ref_count(&self) -> usize { self.0.ref_count() }

    /// Address of the content, equal for handles sharing memory
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const u8 { self.0.as_bytes().as_ptr() }
}

/// Deduplicated immutable bytes
///
/// Returned by [`Pool::intern_bytes`](crate::Pool::intern_bytes). The buffer is shared with
/// every other caller that interned the same content. The type only gives read access.
#[derive(Clone)]
pub struct DedupBytes(Repr);

impl DedupBytes {
    #[must_use]
    #[inline]
    pub const fn new() -> Self { Self(Repr::Empty) }

    #[inline]
    pub(crate) fn from_shared(inner: Arc<Interned>) -> Self { Self(Repr::Shared(inner)) }

    #[inline]
    pub(crate) fn private(bytes: &[u8]) -> Self { Self(Repr::Private(Arc::from(bytes))) }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize { self.0.as_bytes().len() }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    #[must_use]
    #[inline]
    pub const fn is_shared(&self) -> bool { matches!(self.0, Repr::Shared(_)) }

    #[must_use]
    #[inline]
    pub fn ref_count(&self) -> usize { self.0.ref_count() }

    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const u8 { self.0.as_bytes().as_ptr() }
}

// ═══════════════════════════════════════════════════════════════════════════
//                          Layer 3: Standard Library Integration
// ═══════════════════════════════════════════════════════════════════════════

impl Default for DedupStr {
    #[inline]
    fn default() -> Self { Self::new() }
}

impl PartialEq for DedupStr {
    /// Pointer comparison first, content comparison otherwise
    ///
    /// Two handles to the same allocation are trivially equal; handles from different pools,
    /// private copies or a racing duplicate still compare by content.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.same_allocation(&other.0) || self.as_bytes() == other.as_bytes()
    }
}

impl Eq for DedupStr {}

impl PartialOrd for DedupStr {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for DedupStr {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering { self.as_str().cmp(other.as_str()) }
}

impl Hash for DedupStr {
    #[inline]
    fn hash<S: Hasher>(&self, state: &mut S) { self.as_str().hash(state) }
}

impl fmt::Display for DedupStr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Display::fmt(self.as_str(), f) }
}

impl fmt::Debug for DedupStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self.as_str(), f) }
}

impl AsRef<str> for DedupStr {
    #[inline]
    fn as_ref(&self) -> &str { self.as_str() }
}

impl AsRef<[u8]> for DedupStr {
    #[inline]
    fn as_ref(&self) -> &[u8] { self.as_bytes() }
}

impl Borrow<str> for DedupStr {
    #[inline]
    fn borrow(&self) -> &str { self.as_str() }
}

impl Deref for DedupStr {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target { self.as_str() }
}

impl PartialEq<str> for DedupStr {
    #[inline]
    fn eq(&self, other: &str) -> bool { self.as_str() == other }
}

impl PartialEq<&str> for DedupStr {
    #[inline]
    fn eq(&self, other: &&str) -> bool { self.as_str() == *other }
}

impl PartialEq<DedupStr> for str {
    #[inline]
    fn eq(&self, other: &DedupStr) -> bool { self == other.as_str() }
}

impl PartialEq<DedupStr> for &str {
    #[inline]
    fn eq(&self, other: &DedupStr) -> bool { *self == other.as_str() }
}

impl PartialEq<String> for DedupStr {
    #[inline]
    fn eq(&self, other: &String) -> bool { self.as_str() == other.as_str() }
}

impl PartialEq<DedupStr> for String {
    #[inline]
    fn eq(&self, other: &DedupStr) -> bool { self.as_str() == other.as_str() }
}

impl PartialOrd<str> for DedupStr {
    #[inline]
    fn partial_cmp(&self, other: &str) -> Option<Ordering> { Some(self.as_str().cmp(other)) }
}

impl PartialOrd<String> for DedupStr {
    #[inline]
    fn partial_cmp(&self, other: &String) -> Option<Ordering> {
        Some(self.as_str().cmp(other.as_str()))
    }
}

impl From<DedupStr> for String {
    #[inline]
    fn from(s: DedupStr) -> Self { s.as_str().to_owned() }
}

impl From<DedupStr> for Box<str> {
    #[inline]
    fn from(s: DedupStr) -> Self { s.as_str().into() }
}

/// Read-only byte view of the same buffer, no copy
///
/// Available on any pool: [`PoolConfig::allow_unsafe_bytes`](crate::PoolConfig::allow_unsafe_bytes)
/// only gates [`Pool::intern_bytes`](crate::Pool::intern_bytes), which can share buffers holding
/// arbitrary bytes. This view only exposes content already interned as text.
impl From<DedupStr> for DedupBytes {
    #[inline]
    fn from(s: DedupStr) -> Self { Self(s.0) }
}

impl Default for DedupBytes {
    #[inline]
    fn default() -> Self { Self::new() }
}

impl PartialEq for DedupBytes {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.same_allocation(&other.0) || self.as_bytes() == other.as_bytes()
    }
}

impl Eq for DedupBytes {}

impl PartialOrd for DedupBytes {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for DedupBytes {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering { self.as_bytes().cmp(other.as_bytes()) }
}

impl Hash for DedupBytes {
    #[inline]
    fn hash<S: Hasher>(&self, state: &mut S) { self.as_bytes().hash(state) }
}

impl fmt::Debug for DedupBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_bytes(), f)
    }
}

impl AsRef<[u8]> for DedupBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] { self.as_bytes() }
}

impl Borrow<[u8]> for DedupBytes {
    #[inline]
    fn borrow(&self) -> &[u8] { self.as_bytes() }
}

impl Deref for DedupBytes {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target { self.as_bytes() }
}

impl PartialEq<[u8]> for DedupBytes {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool { self.as_bytes() == other }
}

impl PartialEq<&[u8]> for DedupBytes {
    #[inline]
    fn eq(&self, other: &&[u8]) -> bool { self.as_bytes() == *other }
}

impl PartialEq<Vec<u8>> for DedupBytes {
    #[inline]
    fn eq(&self, other: &Vec<u8>) -> bool { self.as_bytes() == other.as_slice() }
}

impl PartialEq<DedupBytes> for [u8] {
    #[inline]
    fn eq(&self, other: &DedupBytes) -> bool { self == other.as_bytes() }
}

impl From<DedupBytes> for Vec<u8> {
    #[inline]
    fn from(b: DedupBytes) -> Self { b.as_bytes().to_vec() }
}

/// Serializes the content; deserializing needs a pool, use `Pool::intern_str` on the result
impl Serialize for DedupStr {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(self.as_str())
    }
}

impl Serialize for DedupBytes {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_bytes(self.as_bytes())
    }
}
