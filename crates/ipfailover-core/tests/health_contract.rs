//! Contract Test: Health Check
//!
//! Constraints verified:
//! - Healthy when the checker answers and state is readable or absent
//! - A failing checker is unhealthy
//! - Corrupted state is unhealthy unless the policy tolerates it
//! - The check never writes to state

mod common;

use common::*;
use ipfailover_core::{FileStateStore, HealthPolicy, MemoryStateStore, check_health};

#[tokio::test]
async fn healthy_with_absent_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileStateStore::new(&path).await.unwrap();
    let checker = ScriptedIpChecker::fixed(PUBLIC);

    let report = check_health(&checker, &store, &HealthPolicy::default()).await;

    assert!(report.is_healthy(), "problems: {:?}", report.problems);
    assert_eq!(report.address, Some(PUBLIC));
    assert!(!report.state_corrupted);
    assert_eq!(checker.calls(), 1);
    assert!(!path.exists(), "health check must not create state");
}

#[tokio::test]
async fn failing_checker_is_unhealthy() {
    let checker = ScriptedIpChecker::failing();
    let report = check_health(&checker, &MemoryStateStore::new(), &HealthPolicy::default()).await;

    assert!(!report.is_healthy());
    assert_eq!(report.address, None);
    assert_eq!(report.problems.len(), 1);
    assert!(report.problems[0].contains("IP check failed"));
}

#[tokio::test]
async fn corrupted_state_depends_on_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    let store = FileStateStore::new(&path).await.unwrap();
    let checker = ScriptedIpChecker::fixed(PUBLIC);

    let strict = check_health(&checker, &store, &HealthPolicy::default()).await;
    assert!(!strict.is_healthy());
    assert!(strict.state_corrupted);

    let tolerant = HealthPolicy {
        tolerate_corrupt_state: true,
        ..HealthPolicy::default()
    };
    let lenient = check_health(&checker, &store, &tolerant).await;
    assert!(lenient.is_healthy());
    assert!(lenient.state_corrupted);

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}
