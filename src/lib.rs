//! In-memory content deduplication pool
//!
//! # Core Design Philosophy
//!
//! Workloads that repeatedly produce equal strings (file-system path components, header names,
//! identifiers read from disk) pay for every copy. A [`Pool`] hands out one shared, canonical copy
//! of each distinct content and reclaims it on its own once the last handle referencing it is
//! dropped. Callers never manage cache lifetime.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        User API Layer                           │
//! │  intern_str() │ intern_bytes_as_str() │ intern_bytes() │ flush()│
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 Owned Content Store (digest -> weak slot)       │
//! │                 Ownership Ledger   (identity -> digest)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Arc<Interned> strong handles │ Drop = lifecycle hook          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Keep-alive set + self-scheduling sweeper (optional)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use stringdedup::Pool;
//!
//! let pool = Pool::new_hash64();
//!
//! let a = pool.intern_str("usr");
//! let b = pool.intern_str(&String::from("usr"));
//!
//! assert_eq!(a.as_ptr(), b.as_ptr());
//! assert_eq!(pool.size(), 1);
//!
//! drop((a, b));
//! assert_eq!(pool.size(), 0);
//! ```
//!
//! Digest functions are caller supplied. Correctness never depends on digest quality: two
//! distinct contents sharing a digest are detected and the later one is returned as a private
//! copy (see [`PoolConfig::dont_validate_results`] for the unchecked mode).

mod config;
pub mod digest;
pub mod global;
mod handle;
mod keep_alive;
mod pool;
mod stats;

pub use config::{ConfigError, ParseFromEnv, PoolConfig};
pub use digest::Digest;
pub use handle::{DedupBytes, DedupStr};
pub use pool::Pool;
pub use stats::Statistics;
