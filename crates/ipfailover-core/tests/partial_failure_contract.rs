//! Architectural Contract Test: Partial Failure
//!
//! Records on different providers converge independently.
//!
//! Constraints verified:
//! - One provider failing does not stop the others
//! - All failures of a cycle come back together as one aggregate error
//! - Successful records are marked; only failed ones are retried next cycle
//! - `last_applied_address` advances iff at least one record succeeded
//! - Client errors are not retryable, server errors are
//! - A failed detection skips the cycle with zero provider calls
//! - A hung provider is cut off by the operation deadline

mod common;

use common::*;
use ipfailover_core::config::RecordType;
use ipfailover_core::traits::{NoopMetrics, StateStore};
use ipfailover_core::{CycleOutcome, EngineEvent, Error, ErrorKind, MemoryStateStore, PrometheusMetrics};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TwoProviders {
    alpha: InMemoryDnsProvider,
    beta: InMemoryDnsProvider,
    store: MemoryStateStore,
    h: Harness,
}

fn two_providers(metrics: Arc<dyn ipfailover_core::MetricsCollector>) -> TwoProviders {
    let alpha = InMemoryDnsProvider::new("alpha");
    let beta = InMemoryDnsProvider::new("beta");
    let store = MemoryStateStore::new();
    let config = test_config(
        vec![record("a.example.com", "alpha"), record("b.example.com", "beta")],
        3,
    );
    let h = harness(
        &config,
        Arc::new(store.clone()),
        metrics,
        vec![
            (config.records[0].clone(), alpha.clone()),
            (config.records[1].clone(), beta.clone()),
        ],
    );
    TwoProviders { alpha, beta, store, h }
}

#[tokio::test]
async fn one_failing_provider_does_not_block_the_other() {
    let mut t = two_providers(Arc::new(NoopMetrics));
    t.beta.fail_with_status(Some(503));

    let err = t.h.engine.run_cycle().await.unwrap_err();
    let Error::Aggregate(agg) = &err else {
        panic!("expected aggregate error, got {err:?}");
    };
    assert_eq!(agg.len(), 1);
    assert_eq!(agg.failures[0].provider, "beta");
    assert_eq!(agg.failures[0].record, "beta:b.example.com:A");
    assert_eq!(agg.failures[0].error.status_code(), Some(503));
    assert!(err.is_retryable());

    assert_eq!(
        t.alpha.value_of("a.example.com", RecordType::A).as_deref(),
        Some("10.0.0.1")
    );
    assert_eq!(t.beta.record_count(), 0);

    // Success of alpha is recorded, and the address advanced
    let ledger = t.store.get_applied_records().await.unwrap();
    assert!(ledger.contains_key("alpha:a.example.com:A"));
    assert!(!ledger.contains_key("beta:b.example.com:A"));
    assert_eq!(t.store.get_last_applied_address().await.unwrap(), "10.0.0.1");

    let events = drain(&mut t.h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::RecordFailed { record, retryable: true, .. } if record == "beta:b.example.com:A"
    )));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::FailoverCompleted { previous: None, .. })));
}

#[tokio::test]
async fn next_cycle_retries_only_failed_records() {
    let t = two_providers(Arc::new(NoopMetrics));
    t.beta.fail_with_status(Some(503));
    assert!(t.h.engine.run_cycle().await.is_err());

    let alpha_calls = t.alpha.total_calls();
    let beta_calls = t.beta.total_calls();

    t.beta.fail_with_status(None);
    let outcome = t.h.engine.run_cycle().await.unwrap();

    match outcome {
        CycleOutcome::Applied { records, .. } => {
            assert_eq!(records, vec!["beta:b.example.com:A".to_string()]);
        }
        other => panic!("expected applied outcome, got {other:?}"),
    }
    assert_eq!(t.alpha.total_calls(), alpha_calls, "converged record untouched");
    assert!(t.beta.total_calls() > beta_calls);
    assert_eq!(
        t.beta.value_of("b.example.com", RecordType::A).as_deref(),
        Some("10.0.0.1")
    );

    // Address already advanced last cycle
    assert_eq!(t.store.snapshot().await.unwrap().update_count, 1);
}

#[tokio::test]
async fn total_failure_leaves_state_untouched() {
    let t = two_providers(Arc::new(NoopMetrics));
    t.alpha.fail_with_status(Some(500));
    t.beta.fail_with_status(Some(502));

    let err = t.h.engine.run_cycle().await.unwrap_err();
    let Error::Aggregate(agg) = &err else {
        panic!("expected aggregate error, got {err:?}");
    };
    assert_eq!(agg.len(), 2);
    assert!(err.to_string().starts_with("2 record update(s) failed"));

    let state = t.store.snapshot().await.unwrap();
    assert_eq!(state.last_applied_address, "");
    assert_eq!(state.update_count, 0);
    assert!(state.records.is_empty());
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    let mut t = two_providers(Arc::new(NoopMetrics));
    t.alpha.fail_with_status(Some(401));
    t.beta.fail_with_status(Some(404));

    let err = t.h.engine.run_cycle().await.unwrap_err();
    assert!(!err.is_retryable());

    let events = drain(&mut t.h.events);
    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::RecordFailed { retryable, .. } => Some(*retryable),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![false, false]);
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let t = two_providers(Arc::new(NoopMetrics));
    t.alpha.fail_with_status(Some(429));

    let err = t.h.engine.run_cycle().await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn detection_failure_skips_cycle() {
    let metrics = Arc::new(PrometheusMetrics::new().unwrap());
    let mut t = two_providers(metrics.clone());
    t.h.checker.set(None);

    let err = t.h.engine.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IpCheck);
    assert!(err.is_retryable());

    assert_eq!(t.alpha.total_calls() + t.beta.total_calls(), 0);
    assert_eq!(t.h.prober.probes(), 0, "no decision without an address");

    let snap = metrics.snapshot();
    assert_eq!(snap.checks, 1);
    assert_eq!(snap.check_errors, 1);

    let events = drain(&mut t.h.events);
    assert!(matches!(events.as_slice(), [EngineEvent::CheckFailed { .. }]));

    // Detection recovers; the cycle proceeds normally
    t.h.checker.set(Some(PUBLIC));
    assert!(t.h.engine.run_cycle().await.is_ok());
}

#[tokio::test]
async fn hung_provider_is_cut_off_by_deadline() {
    let t = two_providers(Arc::new(NoopMetrics));
    t.beta.hang(true);

    let started = Instant::now();
    let err = t.h.engine.run_cycle().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));

    let Error::Aggregate(agg) = &err else {
        panic!("expected aggregate error, got {err:?}");
    };
    assert_eq!(agg.len(), 1);
    assert!(matches!(
        &agg.failures[0].error,
        Error::DnsProvider { source, .. } if source.kind() == ErrorKind::Timeout
    ));
    assert!(err.is_retryable());

    // The healthy provider still converged
    assert_eq!(
        t.alpha.value_of("a.example.com", RecordType::A).as_deref(),
        Some("10.0.0.1")
    );
}

#[tokio::test]
async fn per_record_metrics_are_labelled() {
    let metrics = Arc::new(PrometheusMetrics::new().unwrap());
    let t = two_providers(metrics.clone());
    t.beta.fail_with_status(Some(503));

    let _ = t.h.engine.run_cycle().await;

    let snap = metrics.snapshot();
    assert_eq!(snap.dns_updates.get("alpha/a.example.com"), Some(&1));
    assert_eq!(snap.dns_errors.get("beta/b.example.com"), Some(&1));
    assert_eq!(snap.dns_errors.get("alpha/a.example.com"), None);
}
