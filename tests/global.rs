use stringdedup::{ConfigError, PoolConfig, global};

#[test]
fn global_pool_lifecycle() {
    global::init(PoolConfig::default().with_allow_unsafe_bytes(true)).unwrap();
    assert!(matches!(
        global::init(PoolConfig::default()),
        Err(ConfigError::GlobalAlreadyInitialized)
    ));
    assert!(global::pool().config().allow_unsafe_bytes);

    let a = global::intern_str("var");
    let b = global::intern_bytes_as_str(b"var").unwrap();
    let c = global::intern_bytes(b"var");
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.as_ptr(), c.as_ptr());
    assert_eq!(global::size(), 1);
    assert_eq!(global::byte_count(), 3);
    assert_eq!(global::statistics().items_saved, 2);

    global::flush();
    assert_eq!(global::size(), 0);
    drop((a, b, c));
    assert_eq!(global::size(), 0);
}
