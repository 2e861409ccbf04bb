//! Reachability probing
//!
//! A probe answers one question: can a connection to the address be opened
//! within the deadline? Failure is an outcome, not an error.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable {
        /// Connect error or "timed out"
        reason: String,
    },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Bounded-time reachability check
///
/// Implementations must return within `timeout`, must not retry and must not
/// exchange payload.
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    async fn probe(&self, address: IpAddr, timeout: Duration) -> ProbeOutcome;
}
