//! Health check
//!
//! Healthy means: the IP checker answers once, and the state document can be
//! read. An absent document is fine. A corrupted one is reported and only
//! counts as healthy when the policy tolerates it, since the next write will
//! replace it anyway.

use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

use crate::error::Error;
use crate::traits::{IpChecker, StateStore};

#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub tolerate_corrupt_state: bool,
    /// Deadline for each check
    pub timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            tolerate_corrupt_state: false,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Detected address, if the check succeeded
    pub address: Option<IpAddr>,
    pub state_corrupted: bool,
    /// Human-readable failures; empty when healthy
    pub problems: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }
}

pub async fn check_health(
    ip_checker: &dyn IpChecker,
    store: &dyn StateStore,
    policy: &HealthPolicy,
) -> HealthReport {
    let mut report = HealthReport::default();

    match tokio::time::timeout(policy.timeout, ip_checker.current_ip()).await {
        Ok(Ok(address)) => report.address = Some(address),
        Ok(Err(e)) => report.problems.push(format!("IP check failed: {e}")),
        Err(_) => report.problems.push(format!(
            "IP check timed out after {}s",
            policy.timeout.as_secs()
        )),
    }

    match tokio::time::timeout(policy.timeout, store.snapshot()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e @ Error::StateCorrupted { .. })) => {
            report.state_corrupted = true;
            if policy.tolerate_corrupt_state {
                warn!(error = %e, "State is corrupted; tolerated, next write replaces it");
            } else {
                report.problems.push(e.to_string());
            }
        }
        Ok(Err(e)) => report.problems.push(format!("State unreadable: {e}")),
        Err(_) => report.problems.push(format!(
            "State read timed out after {}s",
            policy.timeout.as_secs()
        )),
    }

    report
}
