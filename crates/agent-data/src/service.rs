//! Unified data service: cache, provider chain resolution, and fallback walk

use crate::cache::{CacheKey, CachedPayload, FlightGroup, ResponseCache, TtlTable};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigResolver, ConfigSource, ConfigSummary, Strategy, StrategyConfig};
use crate::error::{ConfigError, DataError, ProviderError, Result};
use crate::models::{
    Attempt, AttemptOutcome, CompanyProfile, CostTier, FetchResult, NewsItem, NewsQuery,
    NewsRequest, Operation, ProfileQuery, ProfileRequest, ProviderId, SourceSelection, Symbol,
};
use crate::provider::{
    AlphaVantageSource, DataProvider, GoogleNewsSource, ProviderRegistry, QuotaHint,
    SharedProvider, YahooProfileSource,
};
use crate::quota::{HealthPolicy, QuotaStatus, QuotaTracker, UnhealthyReason};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request the orchestrator can route through the provider chain
#[async_trait]
trait UnifiedRequest: Send + Sync {
    type Output: Clone + Send;

    fn operation(&self) -> Operation;
    fn symbol(&self) -> &Symbol;
    fn cache_params(&self) -> serde_json::Value;
    async fn call(
        &self,
        provider: &dyn DataProvider,
        credential: Option<&str>,
    ) -> std::result::Result<Self::Output, ProviderError>;
    fn from_cache(payload: &CachedPayload) -> Option<Self::Output>;
    fn into_cache(output: Self::Output) -> CachedPayload;
}

#[async_trait]
impl UnifiedRequest for NewsRequest {
    type Output = Vec<NewsItem>;

    fn operation(&self) -> Operation {
        Operation::News
    }

    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({
            "start_date": self.start_date,
            "end_date": self.end_date,
            "limit": self.limit,
        })
    }

    async fn call(
        &self,
        provider: &dyn DataProvider,
        credential: Option<&str>,
    ) -> std::result::Result<Self::Output, ProviderError> {
        provider.fetch_news(self, credential).await
    }

    fn from_cache(payload: &CachedPayload) -> Option<Self::Output> {
        match payload {
            CachedPayload::News(items) => Some(items.clone()),
            CachedPayload::Profile(_) => None,
        }
    }

    fn into_cache(output: Self::Output) -> CachedPayload {
        CachedPayload::News(output)
    }
}

#[async_trait]
impl UnifiedRequest for ProfileRequest {
    type Output = CompanyProfile;

    fn operation(&self) -> Operation {
        Operation::Profile
    }

    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({ "detailed": self.detailed })
    }

    async fn call(
        &self,
        provider: &dyn DataProvider,
        credential: Option<&str>,
    ) -> std::result::Result<Self::Output, ProviderError> {
        provider.fetch_profile(self, credential).await
    }

    fn from_cache(payload: &CachedPayload) -> Option<Self::Output> {
        match payload {
            CachedPayload::Profile(profile) => Some(profile.clone()),
            CachedPayload::News(_) => None,
        }
    }

    fn into_cache(output: Self::Output) -> CachedPayload {
        CachedPayload::Profile(output)
    }
}

/// Ordered providers to try for one call
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainPlan {
    chain: Vec<ProviderId>,
    /// Set when the caller pinned a single provider
    scope: Option<ProviderId>,
}

/// Per-provider entry of [`UnifiedDataService::data_source_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub healthy: bool,
    /// `None` means unbounded
    pub quota_remaining: Option<u32>,
    pub window_reset_at: Option<DateTime<Utc>>,
    pub calls_in_window: u32,
    pub unhealthy_reason: Option<UnhealthyReason>,
    pub last_error: Option<ProviderError>,
    /// Budget as reported by the provider itself
    pub reported_quota: QuotaHint,
    pub cost_tier: CostTier,
    pub supports_news: bool,
    pub supports_profile: bool,
    pub credential_configured: bool,
}

/// Result of [`UnifiedDataService::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// At least one provider answered its probe
    pub healthy: bool,
    pub providers: BTreeMap<ProviderId, bool>,
    pub config: ConfigSummary,
}

/// Registered providers per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableSources {
    pub news: Vec<ProviderId>,
    pub profile: Vec<ProviderId>,
}

/// Entry point for unified news and profile retrieval
///
/// Owns the cache, quota tracker, and config resolver; nothing here is a
/// process-wide singleton.
pub struct UnifiedDataService {
    registry: ProviderRegistry,
    config: ConfigResolver,
    cache: ResponseCache,
    quota: QuotaTracker,
    flights: FlightGroup,
    ttl: TtlTable,
}

impl UnifiedDataService {
    pub fn builder() -> UnifiedDataServiceBuilder {
        UnifiedDataServiceBuilder::default()
    }

    /// Service with the built-in providers and configuration from the environment
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let config = StrategyConfig::load(&ConfigSource::Environment)?;
        Self::builder().with_default_providers().config(config).build()
    }

    pub fn current_config(&self) -> Arc<StrategyConfig> {
        self.config.current()
    }

    /// Company news for a date range, served by the first provider that succeeds
    pub async fn get_company_news_unified(&self, query: NewsQuery) -> Result<FetchResult<Vec<NewsItem>>> {
        if query.limit == 0 {
            return Err(DataError::InvalidRequest("limit must be at least 1".to_string()));
        }
        let request = NewsRequest {
            symbol: Symbol::parse(&query.symbol)?,
            start_date: query.start_date,
            end_date: query.end_date,
            limit: query.limit,
        };
        self.fetch(request, query.source).await
    }

    /// Company profile, served by the first provider that succeeds
    pub async fn get_company_profile_unified(&self, query: ProfileQuery) -> Result<FetchResult<CompanyProfile>> {
        let request = ProfileRequest {
            symbol: Symbol::parse(&query.symbol)?,
            detailed: query.detailed,
        };
        self.fetch(request, query.source).await
    }

    /// Health and remaining quota for every registered provider
    pub fn data_source_status(&self) -> BTreeMap<ProviderId, SourceStatus> {
        let config = self.config.current();
        self.registry
            .iter()
            .map(|provider| {
                let descriptor = provider.descriptor();
                let tracked = self.quota.status(descriptor.id).unwrap_or(QuotaStatus {
                    healthy: true,
                    quota_remaining: None,
                    window_reset_at: None,
                    calls_in_window: 0,
                    unhealthy_reason: None,
                    last_error: None,
                });
                let status = SourceStatus {
                    healthy: tracked.healthy,
                    quota_remaining: tracked.quota_remaining,
                    window_reset_at: tracked.window_reset_at,
                    calls_in_window: tracked.calls_in_window,
                    unhealthy_reason: tracked.unhealthy_reason,
                    last_error: tracked.last_error,
                    reported_quota: provider.quota_hint(),
                    cost_tier: descriptor.cost_tier,
                    supports_news: descriptor.supports_news,
                    supports_profile: descriptor.supports_profile,
                    credential_configured: config.api_key(descriptor.id).is_some(),
                };
                (descriptor.id, status)
            })
            .collect()
    }

    /// Load and publish a new configuration
    ///
    /// In-flight fetches keep the snapshot they started with. Providers whose
    /// key changed get their credential failures cleared.
    pub fn reload_data_source_config(
        &self,
        source: &ConfigSource,
    ) -> std::result::Result<Arc<StrategyConfig>, ConfigError> {
        let config = StrategyConfig::load(source).inspect_err(|err| {
            warn!("Rejected data source config reload: {}", err);
        })?;
        self.install_config(config)
    }

    /// Validate and publish an already-built configuration
    pub fn install_config(
        &self,
        config: StrategyConfig,
    ) -> std::result::Result<Arc<StrategyConfig>, ConfigError> {
        let next = self.config.install(config).inspect_err(|err| {
            warn!("Rejected data source config reload: {}", err);
        })?;

        // A reload gives every provider a fresh chance with its credential
        for id in ProviderId::ALL {
            self.quota.clear_credential_failure(id);
        }
        info!(
            "Data source config reloaded: strategy={}, news={:?}, profile={:?}",
            next.strategy, next.news_priority, next.profile_priority
        );
        Ok(next)
    }

    /// Probe every registered provider concurrently
    pub async fn health_check(&self) -> HealthReport {
        let config = self.config.current();
        let probes = self.registry.iter().map(|provider| {
            let credential = config.api_key(provider.id());
            async move { (provider.id(), provider.health_check(credential).await) }
        });
        let providers: BTreeMap<_, _> = join_all(probes).await.into_iter().collect();

        HealthReport {
            healthy: providers.values().any(|healthy| *healthy),
            providers,
            config: config.summary(),
        }
    }

    pub fn available_sources(&self) -> AvailableSources {
        AvailableSources {
            news: self.registry.supporting(Operation::News),
            profile: self.registry.supporting(Operation::Profile),
        }
    }

    /// Drop every cached response
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn fetch<R: UnifiedRequest>(
        &self,
        request: R,
        selection: SourceSelection,
    ) -> Result<FetchResult<R::Output>> {
        let config = self.config.current();
        let operation = request.operation();
        let symbol = request.symbol().clone();

        let plan = self.resolve_chain(&config, operation, &symbol, selection);
        debug!("Resolved {} chain for {}: {:?}", operation, symbol, plan.chain);

        let key = CacheKey::new(operation, plan.scope, symbol.as_str(), request.cache_params());
        if let Some(hit) = self.cached::<R>(&key).await {
            return Ok(hit);
        }
        debug!("Cache miss for key: {:?}", key);

        let _flight = if self.needs_single_flight(&plan.chain) {
            let guard = self.flights.acquire(&key).await;
            if let Some(hit) = self.cached::<R>(&key).await {
                return Ok(hit);
            }
            Some(guard)
        } else {
            None
        };

        let mut attempts = Vec::with_capacity(plan.chain.len());
        for id in plan.chain {
            let Some(provider) = self.registry.get(id) else {
                continue;
            };

            if let Err(reason) = self.quota.try_acquire(id) {
                debug!("Skipping {} for {} {}: {}", id, operation, symbol, reason);
                attempts.push(Attempt::new(id, AttemptOutcome::Skipped(reason)));
                continue;
            }

            let credential = config.api_key(id);
            let outcome = match tokio::time::timeout(
                config.request_timeout,
                request.call(provider.as_ref(), credential),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::NetworkFailure(format!(
                    "no response within {:?}",
                    config.request_timeout
                ))),
            };
            self.quota.record_outcome(id, outcome.as_ref().map(|_| ()));

            match outcome {
                Ok(payload) => {
                    debug!("{} served {} for {}", id, operation, symbol);
                    attempts.push(Attempt::new(id, AttemptOutcome::Success));
                    let ttl = self.ttl.ttl(id, operation, &config.cache_ttl);
                    self.cache
                        .put(key, R::into_cache(payload.clone()), id, ttl)
                        .await;
                    return Ok(FetchResult {
                        payload,
                        served_by: id,
                        served_from_cache: false,
                        attempts,
                    });
                },
                Err(err) => {
                    warn!("{} failed {} for {}: {}", id, operation, symbol, err);
                    attempts.push(Attempt::new(id, AttemptOutcome::Failed(err)));
                },
            }
        }

        let err = DataError::AllSourcesFailed {
            operation,
            symbol: symbol.to_string(),
            attempts,
        };
        warn!("{}", err);
        Err(err)
    }

    async fn cached<R: UnifiedRequest>(&self, key: &CacheKey) -> Option<FetchResult<R::Output>> {
        let entry = self.cache.get(key).await?;
        let payload = R::from_cache(&entry.payload)?;
        debug!("Cache hit for key: {:?}", key);
        Some(FetchResult {
            payload,
            served_by: entry.served_by,
            served_from_cache: true,
            attempts: Vec::new(),
        })
    }

    fn needs_single_flight(&self, chain: &[ProviderId]) -> bool {
        chain.iter().any(|id| {
            self.registry
                .get(*id)
                .is_some_and(|p| p.descriptor().cost_tier == CostTier::Limited)
        })
    }

    fn is_capable(&self, id: ProviderId, operation: Operation, symbol: &Symbol) -> bool {
        self.registry
            .get(id)
            .is_some_and(|p| p.descriptor().supports(operation) && p.supports(symbol))
    }

    fn tier_of(&self, id: ProviderId) -> Option<CostTier> {
        self.registry.get(id).map(|p| p.descriptor().cost_tier)
    }

    fn resolve_chain(
        &self,
        config: &StrategyConfig,
        operation: Operation,
        symbol: &Symbol,
        selection: SourceSelection,
    ) -> ChainPlan {
        if let SourceSelection::Provider(id) = selection {
            if self.is_capable(id, operation, symbol) {
                return ChainPlan {
                    chain: vec![id],
                    scope: Some(id),
                };
            }
            warn!(
                "Requested source {} cannot serve {} for {}, using automatic selection",
                id, operation, symbol
            );
        }

        let capable: Vec<ProviderId> = config
            .priority(operation)
            .iter()
            .copied()
            .filter(|id| self.is_capable(*id, operation, symbol))
            .collect();
        let of_tier = |tier: CostTier| -> Vec<ProviderId> {
            capable
                .iter()
                .copied()
                .filter(|id| self.tier_of(*id) == Some(tier))
                .collect()
        };

        let chain = match config.strategy {
            Strategy::Auto => {
                let mut available: Vec<ProviderId> = capable
                    .iter()
                    .copied()
                    .filter(|id| self.quota.can_attempt(*id))
                    .collect();
                if available.is_empty() {
                    // Keep the unavailable ones so the attempt trail says why
                    available.clone_from(&capable);
                }
                available.sort_by_key(|id| {
                    std::cmp::Reverse(self.registry.get(*id).map_or(0, |p| p.descriptor().quality_tier))
                });
                available
            },
            Strategy::Free => {
                let mut chain = of_tier(CostTier::Free);
                if chain.is_empty() && config.auto_fallback_enabled {
                    chain.extend(self.default_fallback(operation, symbol));
                }
                chain
            },
            Strategy::Enhanced => {
                let mut chain = of_tier(CostTier::Limited);
                if chain.is_empty() {
                    chain = self
                        .registry
                        .supporting(operation)
                        .into_iter()
                        .filter(|id| {
                            self.tier_of(*id) == Some(CostTier::Limited)
                                && self.is_capable(*id, operation, symbol)
                        })
                        .collect();
                }
                if config.auto_fallback_enabled {
                    let free = of_tier(CostTier::Free);
                    if free.is_empty() {
                        chain.extend(self.default_fallback(operation, symbol));
                    } else {
                        chain.extend(free);
                    }
                }
                chain
            },
        };

        ChainPlan { chain, scope: None }
    }

    /// Free provider used when the configured list has none for `operation`
    fn default_fallback(&self, operation: Operation, symbol: &Symbol) -> Option<ProviderId> {
        let id = match operation {
            Operation::News => ProviderId::GoogleNews,
            Operation::Profile => ProviderId::Yahoo,
        };
        (self.is_capable(id, operation, symbol) && self.tier_of(id) == Some(CostTier::Free)).then_some(id)
    }
}

impl std::fmt::Debug for UnifiedDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedDataService")
            .field("providers", &self.registry)
            .field("config", &self.config.current())
            .finish_non_exhaustive()
    }
}

/// Builder for UnifiedDataService
#[derive(Default)]
pub struct UnifiedDataServiceBuilder {
    registry: ProviderRegistry,
    config: Option<StrategyConfig>,
    clock: Option<SharedClock>,
    cache_capacity: Option<usize>,
    health_policy: Option<HealthPolicy>,
}

impl UnifiedDataServiceBuilder {
    /// Register a provider, replacing any earlier one with the same id
    pub fn provider(mut self, provider: SharedProvider) -> Self {
        self.registry.register(provider);
        self
    }

    /// Register Google News, Yahoo Finance, and Alpha Vantage
    pub fn with_default_providers(self) -> Self {
        let clock = self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock));
        self.provider(Arc::new(GoogleNewsSource::new()))
            .provider(Arc::new(YahooProfileSource::new()))
            .provider(Arc::new(AlphaVantageSource::with_clock(clock)))
    }

    pub fn config(mut self, config: StrategyConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn health_policy(mut self, policy: HealthPolicy) -> Self {
        self.health_policy = Some(policy);
        self
    }

    pub fn build(self) -> std::result::Result<UnifiedDataService, ConfigError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let descriptors = self.registry.descriptors();
        let config = ConfigResolver::new(descriptors.clone(), self.config.unwrap_or_default())?;
        let cache = match self.cache_capacity {
            Some(capacity) => ResponseCache::with_capacity(capacity, Arc::clone(&clock)),
            None => ResponseCache::new(Arc::clone(&clock)),
        };
        let quota = QuotaTracker::with_health_policy(
            &descriptors,
            clock,
            self.health_policy.unwrap_or_default(),
        );

        Ok(UnifiedDataService {
            ttl: TtlTable::from_descriptors(&descriptors),
            registry: self.registry,
            config,
            cache,
            quota,
            flights: FlightGroup::new(),
        })
    }
}
