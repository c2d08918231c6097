use bytes::Bytes;

use super::*;

fn keys<const N: usize>(cache: &BoundedCache<&'static str, u32>, expect: [&'static str; N]) {
    let mut present: Vec<_> = expect
        .iter()
        .copied()
        .filter(|k| cache.contains(k))
        .collect();
    present.sort();
    let mut expect = expect.to_vec();
    expect.sort();
    assert_eq!(present, expect);
    assert_eq!(cache.len(), N);
}

#[test]
fn test_lru_eviction_order() {
    let cache = BoundedCache::new(3, 0);
    cache.set("a", 1, 1);
    cache.set("b", 2, 1);
    cache.set("c", 3, 1);

    // Refresh "a", making "b" the least-recently-used entry.
    assert_eq!(cache.get(&"a"), Some(1));

    cache.set("d", 4, 1);

    keys(&cache, ["a", "c", "d"]);
    assert_eq!(cache.get(&"b"), None);
}

#[test]
fn test_count_limit() {
    let cache = BoundedCache::new(2, 0);
    cache.set("a", 1, 1);
    cache.set("b", 2, 1);
    cache.set("c", 3, 1);

    keys(&cache, ["b", "c"]);
}

#[test]
fn test_cost_limit_evicts_multiple() {
    let cache = BoundedCache::new(0, 10);
    cache.set("a", 1, 4);
    cache.set("b", 2, 4);
    // Inserting 8 blows the budget by 6; both "a" and "b" have to go.
    cache.set("c", 3, 8);

    keys(&cache, ["c"]);
    assert_eq!(cache.total_cost(), 8);
}

#[test]
fn test_oversized_entry_rejected() {
    let cache = BoundedCache::new(0, 10);
    cache.set("a", 1, 4);
    cache.set("big", 2, 11);

    // The oversized entry is not stored and nothing else was evicted for it.
    assert_eq!(cache.get(&"big"), None);
    assert_eq!(cache.get(&"a"), Some(1));
    assert_eq!(cache.total_cost(), 4);
}

#[test]
fn test_replace_updates_cost_and_recency() {
    let cache = BoundedCache::new(0, 10);
    cache.set("a", 1, 4);
    cache.set("b", 2, 4);

    // Replacing "a" refreshes it; the higher cost pushes "b" out.
    cache.set("a", 10, 7);

    assert_eq!(cache.get(&"a"), Some(10));
    assert_eq!(cache.get(&"b"), None);
    assert_eq!(cache.total_cost(), 7);
}

#[test]
fn test_remove_is_idempotent() {
    let cache = BoundedCache::new(0, 0);
    cache.set("a", 1, 1);

    assert_eq!(cache.remove(&"a"), Some(1));
    assert_eq!(cache.remove(&"a"), None);
    assert_eq!(cache.remove(&"never-there"), None);
    assert!(cache.is_empty());
}

#[test]
fn test_clear_resets_cost() {
    let cache = BoundedCache::new(0, 0);
    cache.set("a", 1, 5);
    cache.set("b", 2, 7);
    assert_eq!(cache.total_cost(), 12);

    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.total_cost(), 0);
    assert_eq!(cache.get(&"a"), None);

    // The cache stays usable after a clear.
    cache.set("c", 3, 3);
    assert_eq!(cache.get(&"c"), Some(3));
    assert_eq!(cache.total_cost(), 3);
}

#[test]
fn test_zero_limits_are_unbounded() {
    let cache = BoundedCache::new(0, 0);
    for i in 0..10_000u32 {
        cache.set(i, i, 1);
    }
    assert_eq!(cache.len(), 10_000);
}

#[test]
fn test_slot_reuse_after_eviction() {
    let cache = BoundedCache::new(2, 0);
    for i in 0..100u32 {
        cache.set(i, i, 1);
    }
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&99), Some(99));
    assert_eq!(cache.get(&98), Some(98));
}

#[test]
fn test_network_cache_uses_body_length_as_cost() {
    use crate::fetch::RequestKey;

    let cache = BoundedCache::new(0, 10);

    let small = RequestKey::custom("small");
    let big = RequestKey::custom("big");

    NetworkCache::set(&cache, small.clone(), Bytes::from_static(b"1234"));
    assert_eq!(cache.total_cost(), 4);

    // An 11-byte body exceeds the 10-byte budget and is rejected.
    NetworkCache::set(&cache, big.clone(), Bytes::from_static(b"12345678901"));
    assert_eq!(NetworkCache::get(&cache, &big), None);
    assert_eq!(
        NetworkCache::get(&cache, &small),
        Some(Bytes::from_static(b"1234"))
    );
}

#[test]
fn test_concurrent_access() {
    use std::sync::Arc;

    let cache = Arc::new(BoundedCache::new(64, 0));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..1_000u32 {
                    cache.set(i % 128, t * 10_000 + i, 1);
                    cache.get(&(i % 128));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // The count bound held throughout.
    assert!(cache.len() <= 64);
}
