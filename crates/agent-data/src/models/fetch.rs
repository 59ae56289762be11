use super::ProviderId;
use crate::error::{ProviderError, ProviderErrorKind};
use serde::Serialize;
use std::fmt;

/// Which providers a caller allows for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceSelection {
    /// Let the configured strategy decide
    #[default]
    Auto,
    /// Use only this provider
    Provider(ProviderId),
}

impl SourceSelection {
    /// Parse the boundary `source` argument
    ///
    /// Unknown names yield `Err` with the offending name so the caller can log it
    /// before falling back to automatic selection.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        raw.parse().map(Self::Provider)
    }
}

/// Why the orchestrator did not call a provider in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    QuotaExhausted,
    Unhealthy,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExhausted => f.write_str("quota exhausted"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed(ProviderError),
    Skipped(SkipReason),
}

/// One entry in the provenance trail of a fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub provider: ProviderId,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn new(provider: ProviderId, outcome: AttemptOutcome) -> Self {
        Self { provider, outcome }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }

    /// Error kind for failed attempts
    pub fn error_kind(&self) -> Option<ProviderErrorKind> {
        match &self.outcome {
            AttemptOutcome::Failed(error) => Some(error.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Success => write!(f, "{}: SUCCESS", self.provider),
            AttemptOutcome::Failed(error) => {
                write!(f, "{}: {} ({})", self.provider, error.kind(), error.message())
            },
            AttemptOutcome::Skipped(reason) => write!(f, "{}: SKIPPED ({reason})", self.provider),
        }
    }
}

/// Normalized payload plus provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult<T> {
    pub payload: T,
    /// Provider whose data is returned
    pub served_by: ProviderId,
    pub served_from_cache: bool,
    /// Attempts in call order; empty for cache hits
    pub attempts: Vec<Attempt>,
}
