//! Digest functions
//!
//! A pool is parametric in its digest type `H`: any fixed-width, comparable value works as a
//! store key. The pool attaches no meaning to it beyond equality, so a weak digest only costs
//! extra collisions, never wrong results (unless validation is turned off).
//!
//! The functions here cover the reference deployments: 32-bit and 64-bit non-cryptographic
//! high-speed digests. Seeds are fixed, so equal content always yields the same digest within
//! a process.

use ahash::RandomState;
use core::{fmt, hash::Hash};

/// Bound satisfied by every usable digest type
pub trait Digest: Copy + Eq + Hash + Send + Sync + fmt::Debug + 'static {}

impl<T> Digest for T where T: Copy + Eq + Hash + Send + Sync + fmt::Debug + 'static {}

/// Boxed caller-supplied digest function
pub(crate) type DigestFn<H> = dyn Fn(&[u8]) -> H + Send + Sync;

static CONTENT_HASHER: RandomState = RandomState::with_seeds(
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// 64-bit content digest
#[must_use]
#[inline]
pub fn hash64(bytes: &[u8]) -> u64 { CONTENT_HASHER.hash_one(bytes) }

/// 32-bit content digest, the 64-bit digest folded in half
#[must_use]
#[inline]
pub fn hash32(bytes: &[u8]) -> u32 {
    let h = hash64(bytes);
    (h ^ (h >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(hash64(b"usr/share"), hash64(b"usr/share"));
        assert_eq!(hash32(b"usr/share"), hash32(b"usr/share"));
    }

    #[test]
    fn test_distinguishes_content() {
        assert_ne!(hash64(b"lib"), hash64(b"bin"));
        assert_ne!(hash64(b""), hash64(b"\0"));
    }

    #[test]
    fn test_hash32_is_folded_hash64() {
        let h = hash64(b"fold");
        assert_eq!(hash32(b"fold"), (h as u32) ^ ((h >> 32) as u32));
    }
}
