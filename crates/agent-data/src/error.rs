//! Error types for unified data retrieval

use crate::models::{Attempt, Operation, ProviderId};
use agent_utils::ConfigValueError;
use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ProviderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    RateLimitExceeded,
    InvalidCredential,
    NetworkFailure,
    NotFound,
    Unsupported,
}

impl ProviderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::NetworkFailure => "NETWORK_FAILURE",
            Self::NotFound => "NOT_FOUND",
            Self::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a single provider adapter
///
/// These never reach callers directly; the orchestrator records them in the
/// attempt trail and moves on to the next provider.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderError {
    /// Provider-side quota or pacing limit hit
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Missing or rejected API key
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Transport failure, timeout, or unusable response
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Provider answered but has no data for the request
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider cannot serve this symbol, operation, or date range
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::RateLimitExceeded(_) => ProviderErrorKind::RateLimitExceeded,
            Self::InvalidCredential(_) => ProviderErrorKind::InvalidCredential,
            Self::NetworkFailure(_) => ProviderErrorKind::NetworkFailure,
            Self::NotFound(_) => ProviderErrorKind::NotFound,
            Self::Unsupported(_) => ProviderErrorKind::Unsupported,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimitExceeded(m)
            | Self::InvalidCredential(m)
            | Self::NetworkFailure(m)
            | Self::NotFound(m)
            | Self::Unsupported(m) => m,
        }
    }

    /// Whether the same provider may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_) | Self::NetworkFailure(_))
    }

    /// Map a non-success HTTP status to a provider error
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", truncate(body, 200));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::InvalidCredential(detail),
            StatusCode::NOT_FOUND => Self::NotFound(detail),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded(detail),
            _ => Self::NetworkFailure(detail),
        }
    }

    /// Treat credential rejections from endpoints that take no API key as network failures
    pub fn keyless(self) -> Self {
        match self {
            Self::InvalidCredential(m) => Self::NetworkFailure(m),
            other => other,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status, ""),
            None => Self::NetworkFailure(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::NetworkFailure(format!("malformed response: {err}"))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Errors raised while building or reloading a strategy configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown provider '{name}' in {key}")]
    UnknownProvider { name: String, key: &'static str },

    #[error("provider {provider} is not registered")]
    UnregisteredProvider { provider: ProviderId },

    #[error("provider {provider} cannot serve {operation} requests")]
    CapabilityMismatch {
        provider: ProviderId,
        operation: Operation,
    },

    #[error("{operation} priority list is empty")]
    EmptyPriority { operation: Operation },

    #[error(transparent)]
    InvalidValue(#[from] ConfigValueError),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced to callers of the unified service
#[derive(Debug, Error)]
pub enum DataError {
    /// Every provider in the resolved chain failed or was skipped
    #[error("all sources failed for {operation} {symbol}: {}", render_attempts(.attempts))]
    AllSourcesFailed {
        operation: Operation,
        symbol: String,
        attempts: Vec<Attempt>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DataError {
    /// Attempt trail for `AllSourcesFailed`, empty otherwise
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::AllSourcesFailed { attempts, .. } => attempts,
            _ => &[],
        }
    }
}

fn render_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no provider could be attempted".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type alias for unified data operations
pub type Result<T> = std::result::Result<T, DataError>;
