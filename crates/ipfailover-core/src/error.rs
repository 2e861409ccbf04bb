//! Error types for ipfailover
//!
//! Every library crate in the workspace reports failures through [`Error`].
//! Whether a failure is worth retrying on a later cycle is decided by
//! [`crate::retry::classify_retryable`], fed by [`Error::kind`] and
//! [`Error::status_code`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ipfailover operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ipfailover
#[derive(Error, Debug)]
pub enum Error {
    /// Public address detection failed
    #[error("IP check failed ({service}): {message}")]
    IpCheck {
        /// Checker or endpoint that failed
        service: String,
        /// Error message
        message: String,
    },

    /// A DNS provider operation failed for one record
    #[error("DNS provider {provider} failed for {record}: {source}")]
    DnsProvider {
        /// Provider name
        provider: String,
        /// Record name the operation targeted
        record: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Non-success HTTP response from a remote API
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Request URL (never carries credentials)
        url: String,
        /// Response body or summary
        message: String,
    },

    /// Transport-level HTTP failure (connect, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// State store I/O failure
    #[error("State store error during {operation}: {message}")]
    StateStore {
        /// Operation that failed (read, write, rename, ...)
        operation: String,
        /// Error message
        message: String,
    },

    /// State document exists but cannot be parsed
    #[error("State file {} is corrupted: {message}", path.display())]
    StateCorrupted {
        /// Path of the corrupted document
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation exceeded its deadline
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Operation name
        operation: String,
        /// Deadline in seconds
        seconds: u64,
    },

    /// Operation was cancelled before completion
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Several per-record failures from one reconciliation cycle
    #[error("{0}")]
    Aggregate(AggregateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metric registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of [`Error`] used by retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IpCheck,
    DnsProvider,
    Http,
    Transport,
    StateStore,
    StateCorrupted,
    Config,
    InvalidInput,
    Timeout,
    Cancelled,
    Aggregate,
    Io,
    Json,
    Metrics,
    Other,
}

impl Error {
    /// Create an IP check error
    pub fn ip_check(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IpCheck {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Wrap an error with the provider and record it occurred for
    pub fn dns_provider(provider: impl Into<String>, record: impl Into<String>, source: Error) -> Self {
        Self::DnsProvider {
            provider: provider.into(),
            record: record.into(),
            source: Box::new(source),
        }
    }

    /// Create an HTTP status error
    pub fn http(status: u16, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a state store error
    pub fn state_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a state corruption error
    pub fn state_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StateCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// The coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IpCheck { .. } => ErrorKind::IpCheck,
            Self::DnsProvider { .. } => ErrorKind::DnsProvider,
            Self::Http { .. } => ErrorKind::Http,
            Self::Transport(_) => ErrorKind::Transport,
            Self::StateStore { .. } => ErrorKind::StateStore,
            Self::StateCorrupted { .. } => ErrorKind::StateCorrupted,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Aggregate(_) => ErrorKind::Aggregate,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Metrics(_) => ErrorKind::Metrics,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// HTTP status carried by this error or its provider cause, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::DnsProvider { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Whether a later attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Aggregate(agg) => agg.failures.iter().any(|f| f.error.is_retryable()),
            // The wrapper is always a provider failure; the cause decides
            // unless it is something we never retry.
            Self::DnsProvider { source, .. } => match source.kind() {
                ErrorKind::Config | ErrorKind::InvalidInput | ErrorKind::Cancelled => false,
                _ => crate::retry::classify_retryable(ErrorKind::DnsProvider, source.status_code()),
            },
            _ => crate::retry::classify_retryable(self.kind(), self.status_code()),
        }
    }
}

/// One failed record within an [`AggregateError`]
#[derive(Debug)]
pub struct RecordFailure {
    /// Provider name
    pub provider: String,
    /// Record key (`provider:name:type`)
    pub record: String,
    /// What went wrong
    pub error: Error,
}

/// All per-record failures of one cycle, in configuration order
#[derive(Debug, Default)]
pub struct AggregateError {
    pub failures: Vec<RecordFailure>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: impl Into<String>, record: impl Into<String>, error: Error) {
        self.failures.push(RecordFailure {
            provider: provider.into(),
            record: record.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(self))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record update(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {} [{}]: {}", failure.record, failure.provider, failure.error)?;
        }
        Ok(())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
