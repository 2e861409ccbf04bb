// # HTTP IP Checker
//
// Detects the public address by asking plain-text "what is my IP" services
// (e.g. ifconfig.io, api.ipify.org).
//
// ## Behaviour
//
// - Endpoints are tried in order; the first valid address wins
// - Each request has a 10 second deadline and identifies itself with
//   `User-Agent: ipfailover/<version>`
// - Bodies are capped at 4 KiB; a body that reaches the cap is rejected
// - The body is trimmed and must parse as an IPv4 or IPv6 address
// - No caching and no background polling: the engine calls once per cycle

use async_trait::async_trait;
use ipfailover_core::config::FailoverConfig;
use ipfailover_core::traits::IpChecker;
use ipfailover_core::{Error, Result};
use std::net::IpAddr;
use std::time::Duration;

/// Per-request deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies of this size or larger are rejected
pub const MAX_BODY_SIZE: usize = 4096;

/// Sent with every request
pub const USER_AGENT: &str = concat!("ipfailover/", env!("CARGO_PKG_VERSION"));

/// HTTP-based public address checker
#[derive(Debug, Clone)]
pub struct HttpIpChecker {
    endpoints: Vec<String>,
    client: reqwest::Client,
}

impl HttpIpChecker {
    /// Create a checker over `endpoints`, tried in order
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        Self::with_timeout(endpoints, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::config("At least one IP check endpoint is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { endpoints, client })
    }

    pub fn from_config(config: &FailoverConfig) -> Result<Self> {
        Self::new(config.check_endpoints.clone())
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Query one endpoint
    async fn fetch_ip(&self, endpoint: &str) -> Result<IpAddr> {
        let mut response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| Error::transport(format!("Request to {endpoint} failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::http(status.as_u16(), endpoint, "unexpected status code"));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response from {endpoint}: {e}")))?
        {
            let room = MAX_BODY_SIZE - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_BODY_SIZE {
                return Err(Error::invalid_input(format!(
                    "Response from {endpoint} exceeds {MAX_BODY_SIZE} bytes"
                )));
            }
        }

        let text = String::from_utf8_lossy(&body);
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid_input(format!("Empty response from {endpoint}")));
        }

        text.parse()
            .map_err(|_| Error::invalid_input(format!("Invalid IP address from {endpoint}: {text}")))
    }
}

#[async_trait]
impl IpChecker for HttpIpChecker {
    fn name(&self) -> &str {
        "http"
    }

    async fn current_ip(&self) -> Result<IpAddr> {
        let mut last_error = None;

        for (attempt, endpoint) in self.endpoints.iter().enumerate() {
            tracing::debug!(endpoint = %endpoint, attempt = attempt + 1, "Checking IP endpoint");

            match self.fetch_ip(endpoint).await {
                Ok(ip) => {
                    tracing::debug!(endpoint = %endpoint, ip = %ip, "IP check successful");
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, "IP check failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let message = match last_error {
            Some(e) => format!("all endpoints failed, last error: {e}"),
            None => "no endpoints configured".to_string(),
        };
        Err(Error::ip_check("http", message))
    }
}
