//! Primary/secondary failover through `BackendRouter`

mod common;

use chrono::Utc;
use std::time::Duration;

use common::{face, route, FakeRemote, Failure};
use mastoc::remote::{
    BackendKind, BackendRouter, ManagedService, RemoteError, RemoteSource, RouteFilter,
    RoutePayload,
};

fn recent(id: &str) -> mastoc::entities::Route {
    route(id, "S1 T2", 16.0, None, Utc::now())
}

fn router(primary: FakeRemote, secondary: FakeRemote, fallback: bool) -> BackendRouter {
    BackendRouter::new(Box::new(primary)).with_secondary(Box::new(secondary), fallback)
}

#[test]
fn test_read_fails_over_when_enabled() {
    let primary = FakeRemote::new(BackendKind::Managed).failing(Failure::Network);
    let secondary = FakeRemote::new(BackendKind::Legacy).with_face(face("face-1", &[1]));
    let primary_calls = primary.call_log();
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, true);
    let faces = router.list_face_ids().unwrap();

    assert_eq!(faces, vec!["face-1".to_string()]);
    assert_eq!(primary_calls.borrow().as_slice(), ["managed:list_face_ids"]);
    assert_eq!(secondary_calls.borrow().as_slice(), ["legacy:list_face_ids"]);
    assert_eq!(router.active_kind(), BackendKind::Managed);
}

#[test]
fn test_no_failover_without_fallback() {
    let primary = FakeRemote::new(BackendKind::Managed).failing(Failure::Network);
    let secondary = FakeRemote::new(BackendKind::Legacy).with_face(face("face-1", &[1]));
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, false);
    let err = router.list_face_ids().unwrap_err();

    assert!(matches!(err, RemoteError::Network { .. }));
    assert!(secondary_calls.borrow().is_empty());
}

#[test]
fn test_no_failover_to_unauthenticated_secondary() {
    let primary = FakeRemote::new(BackendKind::Managed).failing(Failure::Network);
    let secondary = FakeRemote::new(BackendKind::Legacy).unauthenticated();
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, true);

    assert!(router.get_face_holds("face-1").is_err());
    assert!(secondary_calls.borrow().is_empty());
}

#[test]
fn test_validation_errors_are_not_retried() {
    let primary = FakeRemote::new(BackendKind::Managed).failing(Failure::Validation);
    let secondary = FakeRemote::new(BackendKind::Legacy);
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, true);

    assert!(matches!(
        router.get_social_counts("r1"),
        Err(RemoteError::Validation(_))
    ));
    assert!(secondary_calls.borrow().is_empty());
}

#[test]
fn test_writes_stay_on_primary() {
    let primary = FakeRemote::new(BackendKind::Managed).failing(Failure::Network);
    let secondary = FakeRemote::new(BackendKind::Legacy);
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, true);
    let payload = RoutePayload::new("Slab", "S1 T2");

    assert!(router.create_route("face-1", &payload).is_err());
    assert!(router.update_route("r1", &payload).is_err());
    assert!(secondary_calls.borrow().is_empty());
}

#[test]
fn test_switch_to_swaps_sources() {
    let primary = FakeRemote::new(BackendKind::Managed);
    let secondary = FakeRemote::new(BackendKind::Legacy);
    let mut router = router(primary, secondary, false);

    assert!(router.switch_to(BackendKind::Legacy));
    assert_eq!(router.active_kind(), BackendKind::Legacy);
    assert_eq!(router.kind(), BackendKind::Legacy);

    let mut lonely = BackendRouter::new(Box::new(FakeRemote::new(BackendKind::Managed)));
    assert!(!lonely.switch_to(BackendKind::Legacy));
    assert_eq!(lonely.active_kind(), BackendKind::Managed);
}

#[test]
fn test_failover_progress_never_goes_backwards() {
    let mut primary = FakeRemote::new(BackendKind::Managed)
        .with_routes([recent("a"), recent("b"), recent("c")]);
    primary.page_size = 1;
    primary.fail_from_page = Some(3);
    let mut secondary = FakeRemote::new(BackendKind::Legacy)
        .with_routes([recent("a"), recent("b"), recent("c")]);
    secondary.page_size = 1;

    let router = router(primary, secondary, true);
    let mut seen = Vec::new();
    let routes = router
        .list_all_routes(&RouteFilter::default(), &mut |current, total| {
            seen.push((current, total));
            Ok(())
        })
        .unwrap();

    assert_eq!(routes.len(), 3);
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(seen.last(), Some(&(3, 3)));
}

#[test]
fn test_cancellation_is_not_retried() {
    let primary = FakeRemote::new(BackendKind::Managed).with_routes([recent("a")]);
    let secondary = FakeRemote::new(BackendKind::Legacy).with_routes([recent("a")]);
    let secondary_calls = secondary.call_log();

    let router = router(primary, secondary, true);
    let result = router.list_all_routes(&RouteFilter::default(), &mut |_, _| {
        Err(RemoteError::Cancelled("stop".to_string()))
    });

    assert!(matches!(result, Err(RemoteError::Cancelled(_))));
    assert!(secondary_calls.borrow().is_empty());
}

/// Managed client with no API key or token; it fails before any request is sent
fn managed_without_credentials() -> ManagedService {
    ManagedService::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap()
}

#[test]
fn test_unauthenticated_primary_fails_over() {
    let primary = managed_without_credentials();
    assert!(!primary.is_authenticated());
    let secondary = FakeRemote::new(BackendKind::Legacy).with_routes([recent("legacy-1")]);

    let router =
        BackendRouter::new(Box::new(primary)).with_secondary(Box::new(secondary), true);
    let routes = router
        .list_all_routes(&RouteFilter::default(), &mut |_, _| Ok(()))
        .unwrap();

    let ids: Vec<_> = routes.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["legacy-1"]);
}

#[test]
fn test_unauthenticated_primary_without_fallback_reports_authentication() {
    let secondary = FakeRemote::new(BackendKind::Legacy).with_routes([recent("legacy-1")]);
    let secondary_calls = secondary.call_log();

    let router = BackendRouter::new(Box::new(managed_without_credentials()))
        .with_secondary(Box::new(secondary), false);
    let err = router
        .list_all_routes(&RouteFilter::default(), &mut |_, _| Ok(()))
        .unwrap_err();

    assert!(matches!(
        err,
        RemoteError::Authentication {
            backend: BackendKind::Managed,
            ..
        }
    ));
    assert!(secondary_calls.borrow().is_empty());
}
