//! Retry classification
//!
//! The engine never retries inside a cycle; a failed record is simply left
//! unconverged and attempted again on the next tick. This module only answers
//! whether that next attempt is worth logging as transient.

use crate::error::ErrorKind;

/// Decide whether an error of `kind`, optionally carrying an HTTP `status`,
/// is transient.
///
/// A status code always wins: server errors, `429 Too Many Requests` and
/// `408 Request Timeout` are retryable, every other status is not.
pub fn classify_retryable(kind: ErrorKind, status: Option<u16>) -> bool {
    if let Some(status) = status {
        return status >= 500 || status == 429 || status == 408;
    }

    match kind {
        ErrorKind::IpCheck
        | ErrorKind::DnsProvider
        | ErrorKind::Transport
        | ErrorKind::Timeout
        | ErrorKind::Io
        | ErrorKind::StateStore => true,
        ErrorKind::Http
        | ErrorKind::StateCorrupted
        | ErrorKind::Config
        | ErrorKind::InvalidInput
        | ErrorKind::Cancelled
        | ErrorKind::Aggregate
        | ErrorKind::Json
        | ErrorKind::Metrics
        | ErrorKind::Other => false,
    }
}
