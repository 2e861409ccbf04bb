//! Failover decision
//!
//! Probes the primary address and turns the outcome into the address DNS
//! should point at, using the persisted consecutive-failure counter:
//!
//! - Probe succeeds: counter resets to 0, primary wins immediately
//! - Probe fails: counter increments; primary is kept while the count is
//!   within `failover_retries`, secondary once it exceeds it
//!
//! With `failover_retries = 3` the flip happens on the fourth consecutive
//! failure. With `failover_retries = 0` it happens on the first.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FailoverConfig, StateFailureStrategy};
use crate::error::Result;
use crate::traits::{ReachabilityProber, StateStore};

/// Which candidate a decision selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}

/// Output of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Always exactly the primary or the secondary address
    pub target: IpAddr,
    pub role: Role,
    /// Failure count after this decision (0 if the counter was unavailable)
    pub failure_count: u32,
}

/// Decides between the primary and secondary address
pub struct FailoverDecider {
    primary: IpAddr,
    secondary: IpAddr,
    failover_retries: u32,
    probe_timeout: Duration,
    strategy: StateFailureStrategy,
    prober: Arc<dyn ReachabilityProber>,
}

impl FailoverDecider {
    pub fn new(
        primary: IpAddr,
        secondary: IpAddr,
        failover_retries: u32,
        probe_timeout: Duration,
        prober: Arc<dyn ReachabilityProber>,
    ) -> Self {
        Self {
            primary,
            secondary,
            failover_retries,
            probe_timeout,
            strategy: StateFailureStrategy::default(),
            prober,
        }
    }

    /// Build from validated configuration
    pub fn from_config(config: &FailoverConfig, prober: Arc<dyn ReachabilityProber>) -> Result<Self> {
        Ok(Self::new(
            config.primary_ip()?,
            config.secondary_ip()?,
            config.failover_retries,
            config.engine.probe_timeout(),
            prober,
        )
        .with_strategy(config.state_failure_strategy))
    }

    pub fn with_strategy(mut self, strategy: StateFailureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn primary(&self) -> IpAddr {
        self.primary
    }

    pub fn secondary(&self) -> IpAddr {
        self.secondary
    }

    /// The threshold rule on its own
    pub fn role_for(&self, failure_count: u32) -> Role {
        if failure_count > self.failover_retries {
            Role::Secondary
        } else {
            Role::Primary
        }
    }

    fn decision(&self, role: Role, failure_count: u32) -> Decision {
        let target = match role {
            Role::Primary => self.primary,
            Role::Secondary => self.secondary,
        };
        Decision {
            target,
            role,
            failure_count,
        }
    }

    /// Probe the primary and decide
    ///
    /// Errors only when the failure counter cannot be updated and the
    /// strategy is [`StateFailureStrategy::FailFast`].
    pub async fn decide(&self, store: &dyn StateStore) -> Result<Decision> {
        let outcome = self.prober.probe(self.primary, self.probe_timeout).await;

        if outcome.is_reachable() {
            if let Err(e) = store.reset_primary_failure_count().await {
                if self.strategy == StateFailureStrategy::FailFast {
                    return Err(e);
                }
                warn!(error = %e, "Failed to reset primary failure count");
            }
            debug!(primary = %self.primary, "Primary reachable");
            return Ok(self.decision(Role::Primary, 0));
        }

        let failure_count = match store.increment_primary_failure_count().await {
            Ok(count) => count,
            Err(e) => match self.strategy {
                StateFailureStrategy::FailFast => return Err(e),
                StateFailureStrategy::ImmediateFailover => {
                    warn!(error = %e, "Failure count unavailable, failing over immediately");
                    return Ok(self.decision(Role::Secondary, 0));
                }
                StateFailureStrategy::ContinueWithWarning => {
                    warn!(error = %e, "Failure count unavailable, assuming first failure");
                    1
                }
            },
        };

        let role = self.role_for(failure_count);
        match role {
            Role::Primary => info!(
                primary = %self.primary,
                failures = failure_count,
                tolerated = self.failover_retries,
                "Primary unreachable, within tolerance"
            ),
            Role::Secondary => warn!(
                primary = %self.primary,
                secondary = %self.secondary,
                failures = failure_count,
                "Primary unreachable, selecting secondary"
            ),
        }

        Ok(self.decision(role, failure_count))
    }
}
