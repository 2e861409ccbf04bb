//! Failover engine
//!
//! The FailoverEngine is responsible for:
//! - Detecting the public address each tick via IpChecker
//! - Deciding primary vs secondary via FailoverDecider
//! - Reconciling every record that has not converged to the decision
//! - Persisting the outcome in the StateStore
//!
//! ## Architecture
//!
//! ```text
//!   tick ──▶ IpChecker ──▶ FailoverDecider ──▶ compare with ledger
//!                              │    ▲                 │
//!                              ▼    │                 ▼ (pending records)
//!                       ReachabilityProber      reconciler::reconcile
//!                              StateStore  ◀──── mark applied / advance
//! ```
//!
//! ## Cycle
//!
//! 1. Detect address; on failure record the error and skip the cycle
//! 2. Persist check info
//! 3. Decide the target
//! 4. Skip with zero provider calls if every record already points at it
//! 5. Reconcile pending records, continuing past failures
//! 6. Mark successes; advance `last_applied_address` if any succeeded
//! 7. Report all failures together as one aggregate error

use chrono::Utc;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::FailoverConfig;
use crate::error::{AggregateError, Error, Result};
use crate::failover::{Decision, FailoverDecider, Role};
use crate::reconciler;
use crate::registry::RecordBinding;
use crate::traits::{IpChecker, MetricsCollector, ReachabilityProber, StateStore};

/// Events emitted by the FailoverEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { records_count: usize },

    /// Address detection succeeded
    CheckCompleted { address: IpAddr },

    /// Address detection failed; cycle skipped
    CheckFailed { error: String },

    /// Decision made
    Decision {
        target: IpAddr,
        role: Role,
        failure_count: u32,
    },

    /// Every record already points at the target
    UpdateSkipped { address: IpAddr },

    /// One record converged
    RecordReconciled {
        record: String,
        address: IpAddr,
        created: bool,
    },

    /// One record failed to converge
    RecordFailed {
        record: String,
        error: String,
        retryable: bool,
    },

    /// `last_applied_address` moved to a new value
    FailoverCompleted {
        previous: Option<String>,
        current: IpAddr,
    },

    /// Engine stopped
    Stopped { reason: String },
}

/// Result of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do
    Unchanged(Decision),
    /// Listed records were reconciled to the decision's target
    Applied {
        decision: Decision,
        records: Vec<String>,
    },
}

/// Core failover engine
///
/// ## Lifecycle
///
/// 1. Create with [`FailoverEngine::new()`]
/// 2. Start with [`FailoverEngine::run()`]
/// 3. Cancel the token to stop; the in-flight cycle is dropped promptly
///
/// ## Load Resistance
///
/// - One cycle at a time; late ticks are delayed, never overlapped
/// - Every outbound call carries a deadline
/// - Bounded event channel; events are dropped (logged) when full
pub struct FailoverEngine {
    ip_checker: Arc<dyn IpChecker>,
    decider: FailoverDecider,
    bindings: Vec<RecordBinding>,
    state_store: Arc<dyn StateStore>,
    metrics: Arc<dyn MetricsCollector>,
    poll_interval: Duration,
    operation_timeout: Duration,
    probe_timeout: Duration,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl FailoverEngine {
    /// Create a new engine
    ///
    /// Returns the engine and the receiving end of its event channel.
    pub fn new(
        config: &FailoverConfig,
        ip_checker: Arc<dyn IpChecker>,
        prober: Arc<dyn ReachabilityProber>,
        state_store: Arc<dyn StateStore>,
        metrics: Arc<dyn MetricsCollector>,
        bindings: Vec<RecordBinding>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        if bindings.is_empty() {
            return Err(Error::config("No record bindings supplied"));
        }

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            ip_checker,
            decider: FailoverDecider::from_config(config, prober)?,
            bindings,
            state_store,
            metrics,
            poll_interval: config.poll_interval(),
            operation_timeout: config.engine.operation_timeout(),
            probe_timeout: config.engine.probe_timeout(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Validate every distinct provider once
    ///
    /// Any failure is fatal at startup.
    pub async fn validate_providers(&self) -> Result<()> {
        let mut seen: Vec<&Arc<dyn crate::traits::DnsProvider>> = Vec::new();

        for binding in &self.bindings {
            if seen.iter().any(|p| Arc::ptr_eq(p, &binding.provider)) {
                continue;
            }
            seen.push(&binding.provider);

            let name = binding.provider.name();
            self.bounded("provider validation", binding.provider.validate())
                .await
                .map_err(|e| Error::dns_provider(name, "<validate>", e))?;
            info!(provider = name, "Provider validated");
        }

        Ok(())
    }

    /// Run until `cancel` fires
    ///
    /// The first cycle runs immediately. Cycle failures are logged and the
    /// loop continues; only provider validation failure ends it with an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.validate_providers().await?;

        self.emit_event(EngineEvent::Started {
            records_count: self.bindings.len(),
        });
        info!(
            records = self.bindings.len(),
            interval_secs = self.poll_interval.as_secs(),
            primary = %self.decider.primary(),
            secondary = %self.decider.secondary(),
            "Failover engine started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break "Shutdown signal",

                Some(_) = ticks.next() => {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => {
                            warn!("Shutdown during cycle, abandoning in-flight work");
                            break "Shutdown signal during cycle";
                        }

                        outcome = self.run_cycle() => self.log_outcome(outcome),
                    }
                }
            }
        };

        info!("{}, engine stopped", reason);
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });

        Ok(())
    }

    fn log_outcome(&self, outcome: Result<CycleOutcome>) {
        match outcome {
            Ok(CycleOutcome::Unchanged(decision)) => {
                debug!(target_address = %decision.target, "No change needed");
            }
            Ok(CycleOutcome::Applied { decision, records }) => {
                info!(
                    target_address = %decision.target,
                    role = %decision.role,
                    records = records.len(),
                    "Cycle applied"
                );
            }
            Err(Error::IpCheck { service, message }) => {
                warn!(service = %service, "IP check failed, skipping cycle: {}", message);
            }
            Err(e) => {
                error!(retryable = e.is_retryable(), "Cycle failed: {}", e);
            }
        }
    }

    /// Run one decision cycle
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        // 1. Detect
        self.metrics.record_check();
        let detected = match self.bounded("IP check", self.ip_checker.current_ip()).await {
            Ok(address) => address,
            Err(e) => {
                self.metrics.record_check_error(self.ip_checker.name());
                self.emit_event(EngineEvent::CheckFailed {
                    error: e.to_string(),
                });
                return Err(match e {
                    e @ Error::IpCheck { .. } => e,
                    other => Error::ip_check(self.ip_checker.name(), other.to_string()),
                });
            }
        };
        self.metrics.set_current_address(detected);
        self.emit_event(EngineEvent::CheckCompleted { address: detected });
        debug!(address = %detected, "Public address detected");

        // 2. Persist check info
        if let Err(e) = self
            .bounded(
                "state write",
                self.state_store
                    .set_last_check_info(&detected.to_string(), Utc::now()),
            )
            .await
        {
            warn!(error = %e, "Failed to persist check info");
        }

        // 3. Decide
        let decision = self
            .bounded_for(
                "failover decision",
                self.operation_timeout + self.probe_timeout,
                self.decider.decide(self.state_store.as_ref()),
            )
            .await?;
        self.emit_event(EngineEvent::Decision {
            target: decision.target,
            role: decision.role,
            failure_count: decision.failure_count,
        });

        // 4. Compare with what is already applied
        let target = decision.target.to_string();
        let (last_applied, ledger) = match self.read_applied().await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(error = %e, "Applied state unreadable, reconciling every record");
                (String::new(), Default::default())
            }
        };

        let pending: Vec<&RecordBinding> = self
            .bindings
            .iter()
            .filter(|b| ledger.get(&b.key()).is_none_or(|r| r.address != target))
            .collect();

        if pending.is_empty() {
            if last_applied != target {
                self.advance(&last_applied, decision.target).await?;
            }
            self.emit_event(EngineEvent::UpdateSkipped {
                address: decision.target,
            });
            return Ok(CycleOutcome::Unchanged(decision));
        }

        info!(
            target_address = %target,
            role = %decision.role,
            pending = pending.len(),
            "Reconciling records"
        );

        // 5. Reconcile, continuing past failures
        let mut succeeded = Vec::new();
        let mut failures = AggregateError::new();

        for binding in pending {
            let key = binding.key();
            let provider = binding.provider.name();
            let desired = binding.record.desired(&target);

            let result = self
                .bounded(
                    "DNS reconcile",
                    reconciler::reconcile(binding.provider.as_ref(), &desired),
                )
                .await
                .map_err(|e| match e {
                    e @ Error::DnsProvider { .. } => e,
                    other => Error::dns_provider(provider, &binding.record.name, other),
                });

            match result {
                Ok(action) => {
                    self.metrics.record_dns_update(provider, &binding.record.name);
                    self.emit_event(EngineEvent::RecordReconciled {
                        record: key.clone(),
                        address: decision.target,
                        created: action.is_created(),
                    });
                    succeeded.push(key);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    self.metrics.record_dns_error(provider, &binding.record.name);
                    warn!(record = %key, retryable, "Record update failed: {}", e);
                    self.emit_event(EngineEvent::RecordFailed {
                        record: key.clone(),
                        error: e.to_string(),
                        retryable,
                    });
                    failures.push(provider, key, e);
                }
            }
        }

        // 6. Persist successes
        if !succeeded.is_empty() {
            self.bounded(
                "state write",
                self.state_store.mark_records_applied(&succeeded, &target),
            )
            .await?;

            if last_applied != target {
                self.advance(&last_applied, decision.target).await?;
            }
        }

        // 7. Report
        failures.into_result()?;
        Ok(CycleOutcome::Applied {
            decision,
            records: succeeded,
        })
    }

    async fn read_applied(
        &self,
    ) -> Result<(String, std::collections::BTreeMap<String, crate::traits::AppliedRecord>)> {
        let last = self
            .bounded("state read", self.state_store.get_last_applied_address())
            .await?;
        let ledger = self
            .bounded("state read", self.state_store.get_applied_records())
            .await?;
        Ok((last, ledger))
    }

    async fn advance(&self, previous: &str, current: IpAddr) -> Result<()> {
        self.bounded(
            "state write",
            self.state_store
                .set_last_applied_address(&current.to_string()),
        )
        .await?;
        self.metrics.set_last_change(Utc::now());

        let from = if previous.is_empty() { "<none>" } else { previous };
        info!(
            from,
            to = %current,
            "Applied address changed"
        );
        self.emit_event(EngineEvent::FailoverCompleted {
            previous: (!previous.is_empty()).then(|| previous.to_string()),
            current,
        });
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.bounded_for(operation, self.operation_timeout, fut).await
    }

    async fn bounded_for<T, F>(&self, operation: &str, deadline: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, deadline.as_secs())),
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            // Never block a cycle on a slow consumer.
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("No event receiver, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_events_compare_by_value() {
        let event = EngineEvent::Decision {
            target: IpAddr::from([10, 0, 0, 2]),
            role: Role::Secondary,
            failure_count: 4,
        };
        assert_eq!(event.clone(), event);
    }
}
