//! Provider adapters and the capability contract they share
//!
//! Adapters make one bounded attempt per call and never retry; fallback across
//! providers belongs to the orchestrator.

pub mod alpha_vantage;
pub mod google_news;
mod http;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageSource;
pub use google_news::GoogleNewsSource;
pub use yahoo::YahooProfileSource;

use crate::error::ProviderError;
use crate::models::{
    CompanyProfile, CostTier, NewsItem, NewsRequest, Operation, ProfileRequest, ProviderId, Symbol,
};
use crate::quota::QuotaPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Static capabilities of a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub supports_news: bool,
    pub supports_profile: bool,
    pub cost_tier: CostTier,
    /// Higher is better; breaks ordering in the `auto` strategy
    pub quality_tier: u8,
    pub quota: QuotaPolicy,
    pub news_ttl: Duration,
    pub profile_ttl: Duration,
}

impl ProviderDescriptor {
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::News => self.supports_news,
            Operation::Profile => self.supports_profile,
        }
    }

    pub fn cache_ttl(&self, operation: Operation) -> Duration {
        match operation {
            Operation::News => self.news_ttl,
            Operation::Profile => self.profile_ttl,
        }
    }
}

/// Remaining budget as reported by the provider itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuotaHint {
    Unbounded,
    Remaining {
        remaining: u32,
        window_reset_at: DateTime<Utc>,
    },
}

/// Common contract implemented by every data source
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn id(&self) -> ProviderId {
        self.descriptor().id
    }

    /// Cheap format check, never a network call
    fn supports(&self, symbol: &Symbol) -> bool;

    async fn fetch_news(
        &self,
        request: &NewsRequest,
        credential: Option<&str>,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        let _ = (request, credential);
        Err(ProviderError::Unsupported(format!("{} does not provide news", self.id())))
    }

    async fn fetch_profile(
        &self,
        request: &ProfileRequest,
        credential: Option<&str>,
    ) -> Result<CompanyProfile, ProviderError> {
        let _ = (request, credential);
        Err(ProviderError::Unsupported(format!(
            "{} does not provide company profiles",
            self.id()
        )))
    }

    /// Lightweight liveness probe
    async fn health_check(&self, credential: Option<&str>) -> bool;

    fn quota_hint(&self) -> QuotaHint {
        QuotaHint::Unbounded
    }
}

pub type SharedProvider = Arc<dyn DataProvider>;

/// Providers registered with a service, keyed by id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, SharedProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same id
    pub fn register(&mut self, provider: SharedProvider) {
        let id = provider.id();
        if self.providers.insert(id, provider).is_some() {
            tracing::debug!("Replaced registered provider {}", id);
        }
    }

    pub fn get(&self, id: ProviderId) -> Option<&SharedProvider> {
        self.providers.get(&id)
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.providers.values().map(|p| p.descriptor().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedProvider> {
        self.providers.values()
    }

    /// Registered providers able to serve `operation`
    pub fn supporting(&self, operation: Operation) -> Vec<ProviderId> {
        self.providers
            .values()
            .filter(|p| p.descriptor().supports(operation))
            .map(|p| p.id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
