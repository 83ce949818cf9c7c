//! Process-wide pool
//!
//! Thin wrappers around one lazily built `Pool<u64>` keyed by [`digest::hash64`]. Prefer an
//! explicit [`Pool`] passed to call sites; this exists for code that wants a global API.
//!
//! ```rust
//! use stringdedup::global;
//!
//! let a = global::intern_str("etc");
//! let b = global::intern_str("etc");
//! assert_eq!(a.as_ptr(), b.as_ptr());
//! ```

use crate::{ConfigError, DedupBytes, DedupStr, Pool, PoolConfig, Statistics, digest};
use core::str::Utf8Error;
use once_cell::sync::OnceCell;

static GLOBAL_POOL: OnceCell<Pool<u64>> = OnceCell::new();

/// Configures the process-wide pool
///
/// # Errors
///
/// [`ConfigError::GlobalAlreadyInitialized`] if the pool was already configured or used.
pub fn init(config: PoolConfig) -> Result<(), ConfigError> {
    GLOBAL_POOL
        .set(Pool::with_config(digest::hash64, config))
        .map_err(|_| ConfigError::GlobalAlreadyInitialized)
}

/// The process-wide pool, built with the default configuration on first use
#[inline]
pub fn pool() -> &'static Pool<u64> { GLOBAL_POOL.get_or_init(Pool::new_hash64) }

#[inline]
pub fn intern_str(s: &str) -> DedupStr { pool().intern_str(s) }

/// # Errors
///
/// Returns the UTF-8 error if `bytes` is not valid text.
#[inline]
pub fn intern_bytes_as_str(bytes: &[u8]) -> Result<DedupStr, Utf8Error> {
    pool().intern_bytes_as_str(bytes)
}

/// # Panics
///
/// Unless [`init`] enabled [`PoolConfig::allow_unsafe_bytes`].
#[inline]
pub fn intern_bytes(bytes: &[u8]) -> DedupBytes { pool().intern_bytes(bytes) }

#[inline]
pub fn size() -> u64 { pool().size() }

#[inline]
pub fn byte_count() -> u64 { pool().byte_count() }

#[inline]
pub fn flush() { pool().flush() }

#[inline]
pub fn statistics() -> Statistics { pool().statistics() }
