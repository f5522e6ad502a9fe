//! Behaviour every storage backend must share
//!
//! Each function takes a freshly opened store and panics on a violation.
//! The per-backend test files pull in the macros at the bottom with
//! `#[macro_use] mod common;` and stamp them out once per engine.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use node_reputation::irreparable::IrreparableSegment;
use node_reputation::reputation::{
    InitialStats, NodeUpdate, NodeUpdateRequest, ReputationStore, SelectionCriteria,
};
use node_reputation::{IrreparableSegmentStore, NodeId, StoreError};

pub fn node(byte: u8) -> NodeId {
    NodeId::new([byte; 32])
}

fn audit(id: NodeId, success: bool) -> NodeUpdate {
    NodeUpdate {
        id,
        update_audit: true,
        audit_success: success,
        update_uptime: false,
        is_up: false,
    }
}

fn stats(audit_success: i64, total_audit: i64, uptime_success: i64, total_uptime: i64) -> InitialStats {
    InitialStats {
        audit_success_count: audit_success,
        total_audit_count: total_audit,
        uptime_success_count: uptime_success,
        total_uptime_count: total_uptime,
    }
}

// ============================================================================
// Reputation
// ============================================================================

pub mod reputation {
    use super::*;

    pub fn create_then_get(store: &ReputationStore) {
        let id = node(1);
        let created = store.create(id, Some(stats(3, 4, 1, 2))).unwrap();
        let fetched = store.get(&id).unwrap();

        assert_eq!(fetched.id, id);
        assert_eq!(fetched.audit, created.audit);
        assert_eq!(fetched.audit.ratio(), 0.75);
        assert_eq!(fetched.uptime.ratio(), 0.5);
    }

    pub fn create_duplicate_fails(store: &ReputationStore) {
        let id = node(2);
        store.create(id, None).unwrap();
        let err = store.create(id, Some(stats(1, 1, 0, 0))).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        // The original row is untouched
        assert_eq!(store.get(&id).unwrap().audit.total_count(), 0);
    }

    pub fn create_rejects_inconsistent_counters(store: &ReputationStore) {
        let id = node(3);
        for bad in [stats(-1, 0, 0, 0), stats(0, -1, 0, 0), stats(5, 2, 0, 0), stats(0, 0, 3, 1)] {
            let err = store.create(id, Some(bad)).unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "{:?}", bad);
        }
        assert!(store.get(&id).unwrap_err().is_not_found());
    }

    pub fn get_missing_is_not_found(store: &ReputationStore) {
        assert!(store.get(&node(4)).unwrap_err().is_not_found());
    }

    pub fn create_entry_if_not_exists_is_idempotent(store: &ReputationStore) {
        let id = node(5);
        let first = store.create_entry_if_not_exists(&id).unwrap();
        assert_eq!(first.audit.total_count(), 0);

        store.update_audit_success(&id, true).unwrap();
        let second = store.create_entry_if_not_exists(&id).unwrap();
        assert_eq!(second.audit.total_count(), 1);
        assert_eq!(second.created_at, first.created_at);
    }

    /// Zero stats, then a passed and a failed audit
    pub fn audit_ratio_scenario(store: &ReputationStore) {
        let id = node(6);
        store.create(id, None).unwrap();

        store.update(&audit(id, true)).unwrap();
        let s = store.get(&id).unwrap();
        assert_eq!((s.audit.success_count(), s.audit.total_count(), s.audit.ratio()), (1, 1, 1.0));

        store.update(&audit(id, false)).unwrap();
        let s = store.get(&id).unwrap();
        assert_eq!((s.audit.success_count(), s.audit.total_count(), s.audit.ratio()), (1, 2, 0.5));

        // Uptime was never requested
        assert_eq!(s.uptime.total_count(), 0);
        assert_eq!(s.uptime.ratio(), 0.0);
    }

    pub fn update_creates_missing_node(store: &ReputationStore) {
        let id = node(7);
        let first = store.apply_update(&audit(id, true)).unwrap();
        assert!(first.created);
        assert!(!store.apply_update(&audit(id, true)).unwrap().created);

        let id = node(17);
        let s = store
            .update(&NodeUpdate {
                id,
                update_audit: true,
                audit_success: false,
                update_uptime: true,
                is_up: true,
            })
            .unwrap();

        assert_eq!((s.audit.success_count(), s.audit.total_count()), (0, 1));
        assert_eq!((s.uptime.success_count(), s.uptime.total_count()), (1, 1));
        assert_eq!(store.get(&id).unwrap(), s);
    }

    pub fn update_without_dimensions_returns_current(store: &ReputationStore) {
        let id = node(8);
        store.create(id, Some(stats(1, 2, 0, 0))).unwrap();
        let s = store
            .update(&NodeUpdate {
                id,
                update_audit: false,
                audit_success: true,
                update_uptime: false,
                is_up: true,
            })
            .unwrap();
        assert_eq!(s.audit.total_count(), 2);
        assert_eq!(s.uptime.total_count(), 0);
    }

    pub fn single_dimension_updates_require_existing(store: &ReputationStore) {
        let id = node(9);
        assert!(store.update_uptime(&id, true).unwrap_err().is_not_found());
        assert!(store.update_audit_success(&id, true).unwrap_err().is_not_found());
        assert!(store.get(&id).unwrap_err().is_not_found());

        store.create(id, None).unwrap();
        let s = store.update_uptime(&id, false).unwrap();
        assert_eq!((s.uptime.success_count(), s.uptime.total_count(), s.uptime.ratio()), (0, 1, 0.0));
        let s = store.update_audit_success(&id, true).unwrap();
        assert_eq!(s.audit.ratio(), 1.0);
        assert_eq!(s.uptime.total_count(), 1);
    }

    pub fn batch_isolates_failures(store: &ReputationStore) {
        let good = node(10);
        let requests = vec![
            NodeUpdateRequest::from(audit(good, true)),
            NodeUpdateRequest {
                node_id: "zz-not-an-id".into(),
                update_audit: true,
                audit_success: true,
                update_uptime: false,
                is_up: false,
            },
            NodeUpdateRequest::from(audit(good, false)),
        ];

        let outcome = store.update_batch(&requests);

        assert_eq!(outcome.stats.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].node.node_id, "zz-not-an-id");
        assert_eq!(outcome.stats[1].audit.total_count(), 2);
        assert_eq!(store.get(&good).unwrap().audit.success_count(), 1);
    }

    pub fn find_valid_filters_conjunctively(store: &ReputationStore) {
        let strong = node(20);
        let low_count = node(21);
        let low_uptime = node(22);
        let unknown = node(23);
        store.create(strong, Some(stats(9, 10, 9, 10))).unwrap();
        store.create(low_count, Some(stats(4, 4, 4, 4))).unwrap();
        store.create(low_uptime, Some(stats(10, 10, 1, 10))).unwrap();

        let criteria = SelectionCriteria {
            min_audit_count: 5,
            min_audit_ratio: 0.9,
            min_uptime_ratio: 0.5,
        };
        let passed: BTreeSet<NodeId> = store
            .find_valid_nodes(&[strong, low_count, low_uptime, unknown, strong], &criteria)
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(passed, BTreeSet::from([strong]));
    }

    pub fn find_valid_returns_each_id_once(store: &ReputationStore) {
        let id = node(24);
        store.create(id, None).unwrap();
        let passed = store
            .find_valid_nodes(&[id, id, id], &SelectionCriteria::default())
            .unwrap();
        assert_eq!(passed, vec![id]);
    }

    pub fn find_valid_empty_and_bounds(store: &ReputationStore) {
        assert!(store
            .find_valid_nodes(&[], &SelectionCriteria::default())
            .unwrap()
            .is_empty());

        let too_many: Vec<NodeId> = (0..=1000u32)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[..4].copy_from_slice(&i.to_be_bytes());
                NodeId::new(bytes)
            })
            .collect();
        let err = store
            .find_valid_nodes(&too_many, &SelectionCriteria::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    pub fn list_is_ordered_by_id(store: &ReputationStore) {
        for byte in [0x30, 0x10, 0x20] {
            store.create(node(byte), None).unwrap();
        }
        let ids: Vec<NodeId> = store.list(10, 0).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![node(0x10), node(0x20), node(0x30)]);

        let page: Vec<NodeId> = store.list(1, 1).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(page, vec![node(0x20)]);
    }

    /// A full counter rejects further outcomes and the row stays readable
    pub fn full_counter_rejects_outcomes(store: &ReputationStore) {
        let id = node(30);
        store.create(id, Some(stats(0, i64::MAX, 0, 0))).unwrap();

        let err = store.update(&audit(id, true)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "{:?}", err);
        assert!(matches!(
            store.update_audit_success(&id, false),
            Err(StoreError::Validation(_))
        ));

        let s = store.get(&id).unwrap();
        assert_eq!((s.audit.success_count(), s.audit.total_count()), (0, i64::MAX));

        // The other dimension still counts
        let s = store.update_uptime(&id, true).unwrap();
        assert_eq!(s.uptime.total_count(), 1);
        assert_eq!(s.audit.total_count(), i64::MAX);
    }

    /// First-time `update` calls racing on one brand-new id: every call
    /// succeeds and every outcome is counted
    pub fn concurrent_first_updates_all_count(store: Arc<ReputationStore>) {
        const CALLS: usize = 16;
        let id = node(40);

        thread::scope(|scope| {
            for i in 0..CALLS {
                let store = store.clone();
                scope.spawn(move || {
                    store.update(&audit(id, i % 2 == 0)).unwrap();
                });
            }
        });

        let s = store.get(&id).unwrap();
        assert_eq!(s.audit.total_count(), CALLS as i64);
        assert_eq!(s.audit.success_count(), (CALLS / 2) as i64);
        assert_eq!(s.audit.ratio(), 0.5);
    }

    pub fn concurrent_create_entry_has_one_winner(store: Arc<ReputationStore>) {
        let id = node(41);
        let created: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    scope.spawn(move || store.ensure_entry(&id).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Every caller sees the same row, and exactly one inserted it
        assert!(created
            .windows(2)
            .all(|w| w[0].stats.created_at == w[1].stats.created_at));
        assert_eq!(created.iter().filter(|e| e.created).count(), 1);
    }
}

// ============================================================================
// Irreparable segments
// ============================================================================

pub mod irreparable {
    use super::*;

    pub fn segment(path: &[u8], lost: i64) -> IrreparableSegment {
        IrreparableSegment {
            segment_path: path.to_vec(),
            segment_detail: b"pointer-snapshot".to_vec(),
            lost_pieces_count: lost,
            damaged_at_unix_sec: 1_700_000_000,
            repair_attempt_count: 1,
        }
    }

    /// Later calls bump the counter and keep the first call's fields
    pub fn increment_preserves_first_insert(store: &IrreparableSegmentStore) {
        store.increment_repair_attempts(&segment(b"P", 10)).unwrap();

        let mut second = segment(b"P", 99);
        second.segment_detail = b"other".to_vec();
        second.damaged_at_unix_sec = 42;
        let stored = store.increment_repair_attempts(&second).unwrap();

        assert_eq!(stored.repair_attempt_count, 2);
        let fetched = store.get(b"P").unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.lost_pieces_count, 10);
        assert_eq!(fetched.segment_detail, b"pointer-snapshot".to_vec());
        assert_eq!(fetched.damaged_at_unix_sec, 1_700_000_000);
    }

    /// The incoming count seeds a new row and is ignored afterwards
    pub fn incoming_count_seeds_only(store: &IrreparableSegmentStore) {
        let mut seg = segment(b"seeded", 1);
        seg.repair_attempt_count = 10;
        store.increment_repair_attempts(&seg).unwrap();
        store.increment_repair_attempts(&seg).unwrap();
        assert_eq!(store.get(b"seeded").unwrap().repair_attempt_count, 11);
    }

    pub fn n_calls_count_n(store: &IrreparableSegmentStore) {
        for _ in 0..5 {
            store.increment_repair_attempts(&segment(b"many", 3)).unwrap();
        }
        assert_eq!(store.get(b"many").unwrap().repair_attempt_count, 5);
    }

    pub fn rejects_invalid_records(store: &IrreparableSegmentStore) {
        let mut bad = segment(b"", 1);
        assert!(matches!(
            store.increment_repair_attempts(&bad),
            Err(StoreError::Validation(_))
        ));

        bad = segment(b"neg", -1);
        assert!(matches!(
            store.increment_repair_attempts(&bad),
            Err(StoreError::Validation(_))
        ));
        assert!(store.get(b"neg").unwrap_err().is_not_found());
    }

    pub fn get_missing_is_not_found(store: &IrreparableSegmentStore) {
        assert!(store.get(b"nope").unwrap_err().is_not_found());
    }

    pub fn delete_then_recreate(store: &IrreparableSegmentStore) {
        store.increment_repair_attempts(&segment(b"D", 2)).unwrap();
        store.increment_repair_attempts(&segment(b"D", 2)).unwrap();

        assert!(store.delete(b"D").unwrap());
        assert!(store.get(b"D").unwrap_err().is_not_found());

        // Deleting again succeeds and reports nothing removed
        assert!(!store.delete(b"D").unwrap());

        // A recreated row starts over
        let fresh = store.increment_repair_attempts(&segment(b"D", 7)).unwrap();
        assert_eq!(fresh.repair_attempt_count, 1);
        assert_eq!(fresh.lost_pieces_count, 7);
    }

    pub fn list_is_ordered_by_path(store: &IrreparableSegmentStore) {
        for path in [&b"c"[..], &b"a"[..], &b"b"[..]] {
            store.increment_repair_attempts(&segment(path, 1)).unwrap();
        }
        let paths: Vec<Vec<u8>> = store
            .list(10, 0)
            .unwrap()
            .into_iter()
            .map(|s| s.segment_path)
            .collect();
        assert_eq!(paths, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(store.list(2, 2).unwrap().len(), 1);
    }

    /// A full attempt count rejects the next attempt and the row stays readable
    pub fn full_attempt_count_rejects_increment(store: &IrreparableSegmentStore) {
        let mut seg = segment(b"full", 2);
        seg.repair_attempt_count = i64::MAX;
        store.increment_repair_attempts(&seg).unwrap();

        let err = store.increment_repair_attempts(&seg).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "{:?}", err);

        let fetched = store.get(b"full").unwrap();
        assert_eq!(fetched.repair_attempt_count, i64::MAX);
        assert_eq!(fetched.lost_pieces_count, 2);
    }

    /// Callers racing to create the same path never lose an attempt
    pub fn concurrent_increments_all_count(store: Arc<IrreparableSegmentStore>) {
        const CALLS: i64 = 16;

        thread::scope(|scope| {
            for _ in 0..CALLS {
                let store = store.clone();
                scope.spawn(move || {
                    store.increment_repair_attempts(&segment(b"race", 4)).unwrap();
                });
            }
        });

        assert_eq!(store.get(b"race").unwrap().repair_attempt_count, CALLS);
    }
}

// ============================================================================
// Test stamping
// ============================================================================

/// Stamp out the reputation contract for a backend. `$open` returns
/// `(guard, ReputationStore)`; the guard keeps on-disk state alive.
macro_rules! reputation_contract {
    ($open:path) => {
        use $crate::common::reputation as contract;

        #[test]
        fn create_then_get() {
            let (_guard, store) = $open();
            contract::create_then_get(&store);
        }

        #[test]
        fn create_duplicate_fails() {
            let (_guard, store) = $open();
            contract::create_duplicate_fails(&store);
        }

        #[test]
        fn create_rejects_inconsistent_counters() {
            let (_guard, store) = $open();
            contract::create_rejects_inconsistent_counters(&store);
        }

        #[test]
        fn get_missing_is_not_found() {
            let (_guard, store) = $open();
            contract::get_missing_is_not_found(&store);
        }

        #[test]
        fn create_entry_if_not_exists_is_idempotent() {
            let (_guard, store) = $open();
            contract::create_entry_if_not_exists_is_idempotent(&store);
        }

        #[test]
        fn audit_ratio_scenario() {
            let (_guard, store) = $open();
            contract::audit_ratio_scenario(&store);
        }

        #[test]
        fn update_creates_missing_node() {
            let (_guard, store) = $open();
            contract::update_creates_missing_node(&store);
        }

        #[test]
        fn update_without_dimensions_returns_current() {
            let (_guard, store) = $open();
            contract::update_without_dimensions_returns_current(&store);
        }

        #[test]
        fn single_dimension_updates_require_existing() {
            let (_guard, store) = $open();
            contract::single_dimension_updates_require_existing(&store);
        }

        #[test]
        fn batch_isolates_failures() {
            let (_guard, store) = $open();
            contract::batch_isolates_failures(&store);
        }

        #[test]
        fn find_valid_filters_conjunctively() {
            let (_guard, store) = $open();
            contract::find_valid_filters_conjunctively(&store);
        }

        #[test]
        fn find_valid_returns_each_id_once() {
            let (_guard, store) = $open();
            contract::find_valid_returns_each_id_once(&store);
        }

        #[test]
        fn find_valid_empty_and_bounds() {
            let (_guard, store) = $open();
            contract::find_valid_empty_and_bounds(&store);
        }

        #[test]
        fn list_is_ordered_by_id() {
            let (_guard, store) = $open();
            contract::list_is_ordered_by_id(&store);
        }

        #[test]
        fn full_counter_rejects_outcomes() {
            let (_guard, store) = $open();
            contract::full_counter_rejects_outcomes(&store);
        }

        #[test]
        fn concurrent_first_updates_all_count() {
            let (_guard, store) = $open();
            contract::concurrent_first_updates_all_count(std::sync::Arc::new(store));
        }

        #[test]
        fn concurrent_create_entry_has_one_winner() {
            let (_guard, store) = $open();
            contract::concurrent_create_entry_has_one_winner(std::sync::Arc::new(store));
        }
    };
}

/// Stamp out the irreparable-segment contract for a backend
macro_rules! irreparable_contract {
    ($open:path) => {
        use $crate::common::irreparable as contract;

        #[test]
        fn increment_preserves_first_insert() {
            let (_guard, store) = $open();
            contract::increment_preserves_first_insert(&store);
        }

        #[test]
        fn incoming_count_seeds_only() {
            let (_guard, store) = $open();
            contract::incoming_count_seeds_only(&store);
        }

        #[test]
        fn n_calls_count_n() {
            let (_guard, store) = $open();
            contract::n_calls_count_n(&store);
        }

        #[test]
        fn rejects_invalid_records() {
            let (_guard, store) = $open();
            contract::rejects_invalid_records(&store);
        }

        #[test]
        fn get_missing_is_not_found() {
            let (_guard, store) = $open();
            contract::get_missing_is_not_found(&store);
        }

        #[test]
        fn delete_then_recreate() {
            let (_guard, store) = $open();
            contract::delete_then_recreate(&store);
        }

        #[test]
        fn list_is_ordered_by_path() {
            let (_guard, store) = $open();
            contract::list_is_ordered_by_path(&store);
        }

        #[test]
        fn full_attempt_count_rejects_increment() {
            let (_guard, store) = $open();
            contract::full_attempt_count_rejects_increment(&store);
        }

        #[test]
        fn concurrent_increments_all_count() {
            let (_guard, store) = $open();
            contract::concurrent_increments_all_count(std::sync::Arc::new(store));
        }
    };
}
