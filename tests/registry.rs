
use smallchat::registry::default_nick;
use smallchat::{ClientRegistry, Error};
use std::collections::BTreeSet;
use test_helper::MemConn;

fn registry(capacity: usize) -> ClientRegistry<MemConn> {
    ClientRegistry::new(capacity)
}

#[test]
fn admit_assigns_default_nick_and_raises_mark() {
    let mut registry = registry(16);
    assert!(registry.is_empty());
    assert_eq!(registry.high_water_mark(), None);

    let peer = registry.admit(7, MemConn::new()).unwrap();
    assert_eq!(peer.handle(), 7);
    assert_eq!(peer.nick(), b"user:7");

    registry.admit(3, MemConn::new()).unwrap();
    assert_eq!(registry.high_water_mark(), Some(7));
    assert_eq!(registry.len(), 2);
    assert!(registry.contains(3));
    assert!(!registry.contains(4));
    assert_eq!(registry.handles(), vec![3, 7]);
}

#[test]
fn admit_into_occupied_slot_fails() {
    let mut registry = registry(4);
    registry.admit(1, MemConn::new()).unwrap();

    let err = registry.admit(1, MemConn::new()).unwrap_err();
    assert!(matches!(err, Error::SlotOccupied { handle: 1 }));
    assert_eq!(registry.len(), 1);
}

#[test]
fn admit_out_of_range_fails() {
    let mut registry = registry(4);
    let err = registry.admit(4, MemConn::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::HandleOutOfRange {
            handle: 4,
            capacity: 4
        }
    ));
    assert!(registry.is_empty());
}

#[test]
fn evict_only_peer_empties_mark() {
    let mut registry = registry(8);
    registry.admit(5, MemConn::new()).unwrap();

    let peer = registry.evict(5).expect("peer should be evicted");
    assert_eq!(peer.handle(), 5);
    assert_eq!(registry.high_water_mark(), None);
    assert_eq!(registry.len(), 0);
    assert!(registry.evict(5).is_none());
}

#[test]
fn evict_highest_of_three_lowers_mark() {
    let mut registry = registry(16);
    for handle in [2, 5, 9] {
        registry.admit(handle, MemConn::new()).unwrap();
    }

    registry.evict(9);
    assert_eq!(registry.high_water_mark(), Some(5));
    assert_eq!(registry.handles(), vec![2, 5]);
}

#[test]
fn evict_lowest_of_three_keeps_mark() {
    let mut registry = registry(16);
    for handle in [2, 5, 9] {
        registry.admit(handle, MemConn::new()).unwrap();
    }

    registry.evict(2);
    assert_eq!(registry.high_water_mark(), Some(9));
    assert_eq!(registry.handles(), vec![5, 9]);
}

#[test]
fn next_free_handle_reuses_lowest_slot() {
    let mut registry = registry(4);
    for _ in 0..3 {
        let handle = registry.next_free_handle().unwrap();
        registry.admit(handle, MemConn::new()).unwrap();
    }
    assert_eq!(registry.handles(), vec![0, 1, 2]);

    registry.evict(1);
    assert_eq!(registry.next_free_handle(), Some(1));

    let peer = registry.admit(1, MemConn::new()).unwrap();
    assert_eq!(peer.nick(), default_nick(1));
}

#[test]
fn iter_except_skips_excluded_in_ascending_order() {
    let mut registry = registry(16);
    for handle in [9, 1, 4] {
        registry.admit(handle, MemConn::new()).unwrap();
    }

    let all: Vec<_> = registry.iter_except(None).map(|p| p.handle()).collect();
    assert_eq!(all, vec![1, 4, 9]);

    let others: Vec<_> = registry.iter_except(Some(4)).map(|p| p.handle()).collect();
    assert_eq!(others, vec![1, 9]);

    // Excluding a handle that is not live changes nothing.
    let others: Vec<_> = registry.iter_except(Some(3)).map(|p| p.handle()).collect();
    assert_eq!(others, vec![1, 4, 9]);
}

#[test]
fn fill_to_capacity_then_evict_all_returns_to_empty() {
    let capacity = 1000;
    let mut registry = registry(capacity);

    while let Some(handle) = registry.next_free_handle() {
        registry.admit(handle, MemConn::new()).unwrap();
    }
    assert_eq!(registry.len(), capacity);
    assert_eq!(registry.high_water_mark(), Some(capacity - 1));
    assert_eq!(registry.next_free_handle(), None);

    for handle in 0..capacity {
        assert!(registry.evict(handle).is_some());
    }
    assert!(registry.is_empty());
    assert_eq!(registry.high_water_mark(), None);
    assert_eq!(registry.next_free_handle(), Some(0));
    assert_eq!(registry.iter_except(None).count(), 0);
}

#[test]
fn drain_evicts_everything() {
    let mut registry = registry(8);
    for handle in [6, 0, 3] {
        registry.admit(handle, MemConn::new()).unwrap();
    }

    let drained: Vec<_> = registry.drain().iter().map(|p| p.handle()).collect();
    assert_eq!(drained, vec![0, 3, 6]);
    assert!(registry.is_empty());
    assert_eq!(registry.high_water_mark(), None);
}

#[test]
fn live_sequence_matches_admitted_set() {
    // Deterministic pseudo-random admit/evict script checked against a model.
    let capacity = 64;
    let mut registry = registry(capacity);
    let mut model = BTreeSet::new();
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

    for _ in 0..5000 {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let handle = (seed >> 33) as usize % capacity;

        if model.contains(&handle) {
            assert!(registry.evict(handle).is_some());
            model.remove(&handle);
        } else {
            registry.admit(handle, MemConn::new()).unwrap();
            model.insert(handle);
        }

        let expected: Vec<_> = model.iter().copied().collect();
        assert_eq!(registry.handles(), expected);
        assert_eq!(registry.len(), model.len());
        assert_eq!(registry.high_water_mark(), model.iter().next_back().copied());
    }
}
