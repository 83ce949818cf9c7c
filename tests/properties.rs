use proptest::prelude::*;
use stringdedup::{Pool, PoolConfig};

proptest! {
    #[test]
    fn content_fidelity_under_forced_collisions(inputs in prop::collection::vec(".{0,12}", 1..40)) {
        // Two-bit digest: collisions on almost every insertion
        let pool = Pool::new(|bytes: &[u8]| bytes.iter().fold(0u8, |acc, b| acc ^ b) & 0b11);
        let handles: Vec<_> = inputs.iter().map(|s| pool.intern_str(s)).collect();

        for (input, handle) in inputs.iter().zip(&handles) {
            prop_assert_eq!(handle.as_str(), input.as_str());
        }
    }

    #[test]
    fn raw_bytes_fidelity(inputs in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..40)) {
        let pool = Pool::with_config(
            |bytes: &[u8]| bytes.len() as u16,
            PoolConfig::default().with_allow_unsafe_bytes(true),
        );
        for input in &inputs {
            let handle = pool.intern_bytes(input);
            prop_assert_eq!(handle.as_bytes(), input.as_slice());
        }
    }

    #[test]
    fn second_intern_is_a_saving(s in ".{1,24}") {
        let pool = Pool::new_hash64();
        let first = pool.intern_str(&s);
        let added = pool.statistics().items_added;

        let second = pool.intern_str(&s);
        let stats = pool.statistics();

        prop_assert_eq!(first.as_ptr(), second.as_ptr());
        prop_assert_eq!(stats.items_added, added);
        prop_assert_eq!(stats.items_saved, 1);
    }

    #[test]
    fn releasing_everything_empties_the_pool(inputs in prop::collection::vec(".{0,8}", 0..50)) {
        let pool = Pool::new_hash32();
        let handles: Vec<_> = inputs.iter().map(|s| pool.intern_str(s)).collect();
        drop(handles);

        prop_assert_eq!(pool.size(), 0);
        prop_assert_eq!(pool.byte_count(), 0);
    }
}
