//! Hold/route index built from a synced store

mod common;

use std::collections::HashSet;

use common::{day, face, route};
use mastoc::core::{LocalStore, RouteHoldIndex, RouteQuery};

fn seeded_store() -> LocalStore {
    let mut store = LocalStore::open_in_memory().unwrap();
    store.save_face(&face("face-1", &[1, 2, 3, 4, 5])).unwrap();
    store
        .save_routes(&[
            route("easy", "S1 O2 T3", 12.0, Some("Alice"), day(2024, 5, 1)),
            route("mid", "S1 F4 T3", 16.0, Some("Bob"), day(2024, 5, 2)),
            route("hard", "S2 O4 T5", 22.0, Some("Alice"), day(2024, 5, 3)),
            route("open", "S1 T5", 18.0, None, day(2024, 5, 4)),
        ])
        .unwrap();
    store
}

#[test]
fn test_index_matches_store_queries() {
    let store = seeded_store();
    let index = RouteHoldIndex::from_store(&store);

    assert_eq!(index.len(), 4);
    for hold_id in 1..=5 {
        let from_index: HashSet<&str> = index
            .routes_for_hold(hold_id)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        let from_store: Vec<String> = store
            .get_routes_by_hold(hold_id)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(from_index.len(), from_store.len(), "hold {}", hold_id);
        assert!(from_store.iter().all(|id| from_index.contains(id.as_str())));
    }

    assert_eq!(index.hold(4).map(|h| h.face_id.as_str()), Some("face-1"));
}

#[test]
fn test_filtered_routes_combines_holds_grades_and_setters() {
    let index = RouteHoldIndex::from_store(&seeded_store());

    let query = RouteQuery::default()
        .with_holds([1, 3])
        .with_grades(Some(10.0), Some(20.0))
        .excluding_setters(["Bob"]);
    let ids: Vec<&str> = index.filtered_routes(&query).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["easy"]);

    let alice = RouteQuery::default().including_setters(["Alice"]);
    assert_eq!(index.filtered_routes(&alice).len(), 2);
}

#[test]
fn test_hold_grade_spread_and_usage() {
    let index = RouteHoldIndex::from_store(&seeded_store());

    assert_eq!(index.hold_min_grade(1, None, None, None), Some(12.0));
    assert_eq!(index.hold_max_grade(1, None, None, None), Some(18.0));
    assert_eq!(index.hold_max_grade(1, Some(0.0), Some(15.0), None), Some(12.0));

    let usage = index.holds_usage(None, None);
    assert_eq!(usage.get(&1), Some(&3));
    assert_eq!(usage.get(&2), Some(&2));

    let hard_only: HashSet<String> = ["hard".to_string()].into_iter().collect();
    let percentile = index.holds_usage_percentile(None, None, Some(&hard_only));
    assert_eq!(percentile.len(), 3);
    assert!(!percentile.contains_key(&1));
}

#[test]
fn test_setters_sorted_by_route_count() {
    let index = RouteHoldIndex::from_store(&seeded_store());
    let setters = index.setters();

    assert_eq!(setters[0].name, "Alice");
    assert_eq!(setters[0].route_count, 2);
    assert_eq!(setters.len(), 2);
}
