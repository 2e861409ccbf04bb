// # IP Checker Trait
//
// Defines the interface for detecting the host's current public address.
//
// ## Implementations
//
// - HTTP endpoints: `ipfailover-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use ipfailover_core::IpChecker;
//
// async fn show(checker: &dyn IpChecker) -> ipfailover_core::Result<()> {
//     let ip = checker.current_ip().await?;
//     println!("{} reports {}", checker.name(), ip);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public address detection
///
/// Called once per decision cycle. Implementations perform a single
/// detection attempt (which may internally fall back across several
/// endpoints) and return either a parsed address or
/// [`crate::Error::IpCheck`].
///
/// # Constraints
///
/// - No caching between calls; every call reflects the network right now
/// - No background tasks; the engine owns scheduling
/// - Must tolerate being dropped mid-request when the engine's deadline
///   elapses or shutdown is requested
#[async_trait]
pub trait IpChecker: Send + Sync {
    /// Name used in logs and metrics (e.g. "http")
    fn name(&self) -> &str;

    /// Detect the current public address
    async fn current_ip(&self) -> Result<IpAddr, crate::Error>;
}
