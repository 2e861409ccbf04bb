//! TCP reachability prober

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::traits::{ProbeOutcome, ReachabilityProber};

/// Default probed port
pub const DEFAULT_PROBE_PORT: u16 = 80;

/// Opens a TCP connection to `address:port` and immediately drops it
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_PORT)
    }
}

#[async_trait]
impl ReachabilityProber for TcpProber {
    async fn probe(&self, address: IpAddr, timeout: Duration) -> ProbeOutcome {
        let target = SocketAddr::new(address, self.port);

        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!(%target, "probe succeeded");
                ProbeOutcome::Reachable
            }
            Ok(Err(e)) => {
                tracing::debug!(%target, error = %e, "probe failed");
                ProbeOutcome::Unreachable {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                tracing::debug!(%target, ?timeout, "probe timed out");
                ProbeOutcome::Unreachable {
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                }
            }
        }
    }
}
