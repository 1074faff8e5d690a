//! Error taxonomy for the fetch pipeline.
//!
//! Mirrors the exception hierarchy of the crawler this crate generalizes:
//! transient/network errors are retryable (their own budget each), permanent
//! errors are not, and parse errors are recorded but never retried.

use std::fmt;

/// The tag the retry table and stats counters key on. Two different
/// `ErrorKind`s within a single URL's attempt chain get independent retry
/// budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Network,
    Parse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "TransientError",
            ErrorKind::Permanent => "PermanentError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Parse => "ParseError",
        };
        f.write_str(s)
    }
}

/// An error surfaced by the HTTP fetcher or the parser wrapper.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transient error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("permanent error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Permanent {
        status: Option<u16>,
        message: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// Short-circuit failures never counted as a new error by the caller:
    /// circuit-breaker-open and robots-deny.
    #[error("{0}")]
    ShortCircuit(String),
}

impl FetchError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FetchError::Transient { .. } => Some(ErrorKind::Transient),
            FetchError::Permanent { .. } => Some(ErrorKind::Permanent),
            FetchError::Network(_) => Some(ErrorKind::Network),
            FetchError::Parse(_) => Some(ErrorKind::Parse),
            FetchError::ShortCircuit(_) => None,
        }
    }

    pub fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::Transient {
            status,
            message: message.into(),
        }
    }

    pub fn permanent(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::Permanent {
            status,
            message: message.into(),
        }
    }
}

/// Orchestrator-level misconfiguration. The only errors that produce a
/// non-zero CLI exit code; a single URL's failure never does.
#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("no seed URLs provided")]
    NoSeeds,

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("sink error: {0}")]
    Sink(#[from] anyhow::Error),
}
