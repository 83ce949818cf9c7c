use std::{
    thread,
    time::{Duration, Instant},
};
use stringdedup::{Pool, PoolConfig, digest};

const KEEP_ALIVE: Duration = Duration::from_millis(300);

fn keep_alive_pool() -> Pool<u64> {
    Pool::with_config(digest::hash64, PoolConfig::default().with_keep_alive(KEEP_ALIVE))
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn released_entry_survives_for_keep_alive_duration() {
    let pool = keep_alive_pool();
    let start = Instant::now();
    drop(pool.intern_str("short-lived"));

    assert_eq!(pool.size(), 1);
    assert_eq!(pool.keep_alive_len(), 1);
    let stats = pool.statistics();
    assert_eq!(stats.keep_alive_items_added, 1);

    thread::sleep(KEEP_ALIVE / 2);
    let size = pool.size();
    if start.elapsed() < KEEP_ALIVE {
        assert_eq!(size, 1);
    }

    // Evicted within duration plus one sweep interval, with slack for slow schedulers
    assert!(wait_until(KEEP_ALIVE * 10, || {
        pool.size() == 0 && pool.statistics().keep_alive_items_removed == 1
    }));
    assert!(start.elapsed() >= KEEP_ALIVE);
    assert_eq!(pool.keep_alive_len(), 0);

    let stats = pool.statistics();
    assert_eq!(stats.keep_alive_items_removed, 1);
    assert_eq!(stats.items_removed, 1);
}

#[test]
fn hit_during_keep_alive_reuses_buffer() {
    let pool = keep_alive_pool();
    let address = pool.intern_str("revived").as_ptr();

    let revived = pool.intern_str("revived");
    assert_eq!(revived.as_ptr(), address);
    assert_eq!(pool.statistics().items_saved, 1);

    // An outside reference keeps the entry after keep-alive expires
    assert!(wait_until(KEEP_ALIVE * 10, || pool.keep_alive_len() == 0));
    assert_eq!(pool.size(), 1);

    drop(revived);
    assert_eq!(pool.size(), 0);
}

#[test]
fn sweeper_rearms_after_going_dormant() {
    let pool = keep_alive_pool();
    drop(pool.intern_str("first-wave"));
    assert!(wait_until(KEEP_ALIVE * 10, || pool.statistics().keep_alive_items_removed == 1));

    drop(pool.intern_str("second-wave"));
    assert_eq!(pool.size(), 1);
    assert!(wait_until(KEEP_ALIVE * 10, || pool.statistics().keep_alive_items_removed == 2));
    assert_eq!(pool.size(), 0);

    let stats = pool.statistics();
    assert_eq!(stats.keep_alive_items_added, 2);
    assert_eq!(stats.keep_alive_items_removed, 2);
}

#[test]
fn flush_drops_keep_alive_references() {
    let pool = keep_alive_pool();
    for i in 0..10 {
        drop(pool.intern_str(&format!("pinned-{i}")));
    }
    assert_eq!(pool.keep_alive_len(), 10);

    pool.flush();
    assert_eq!(pool.keep_alive_len(), 0);
    assert_eq!(pool.size(), 0);

    let stats = pool.statistics();
    assert_eq!(stats.keep_alive_items_removed, 10);
    assert_eq!(stats.items_removed, 10);
}

#[test]
fn dropping_pool_stops_the_sweeper() {
    let pool = keep_alive_pool();
    let handle = pool.intern_str("outlives-pool");
    drop(pool);
    thread::sleep(KEEP_ALIVE / 2);
    assert_eq!(handle, "outlives-pool");
}
