//! Response cache shared by all providers and operations

use crate::clock::{SharedClock, add_duration};
use crate::config::CacheTtlOverrides;
use crate::models::{CompanyProfile, CostTier, NewsItem, Operation, ProviderId};
use crate::provider::ProviderDescriptor;
use cached::{Cached, SizedCache};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

const DEFAULT_CAPACITY: usize = 1_024;
const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// Scope name used when the entry is keyed by the resolved chain
pub const RESOLVED_SCOPE: &str = "resolved";

/// Cache key for unified data requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub operation: Operation,
    /// `"resolved"` or a provider id for single-provider requests
    pub scope: String,
    pub symbol: String,
    /// Normalized request parameters as a JSON string
    pub params: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(
        operation: Operation,
        scope: Option<ProviderId>,
        symbol: impl Into<String>,
        params: impl Serialize,
    ) -> Self {
        Self {
            operation,
            scope: scope.map_or_else(|| RESOLVED_SCOPE.to_string(), |id| id.as_str().to_string()),
            symbol: symbol.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }
}

/// Normalized payload stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CachedPayload {
    News(Vec<NewsItem>),
    Profile(CompanyProfile),
}

/// Immutable cache entry; refreshed by replacement
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: Arc<CachedPayload>,
    pub served_by: ProviderId,
    pub expires_at: DateTime<Utc>,
}

/// Thread-safe cache for normalized responses
///
/// Expired entries are treated as misses and evicted on access. Capacity is
/// bounded; the least recently used entry is dropped first.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<SizedCache<CacheKey, CacheEntry>>>,
    clock: SharedClock,
}

impl ResponseCache {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, clock)
    }

    pub fn with_capacity(capacity: usize, clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(SizedCache::with_size(capacity.max(1)))),
            clock,
        }
    }

    /// Get a live entry from the cache
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.cache_get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.clone()),
            Some(_) => {
                tracing::debug!("Evicting expired cache entry: {:?}", key);
                let _ = entries.cache_remove(key);
                None
            },
            None => None,
        }
    }

    /// Insert a value that expires after `ttl`; a zero TTL disables caching
    pub async fn put(&self, key: CacheKey, payload: CachedPayload, served_by: ProviderId, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry {
            payload: Arc::new(payload),
            served_by,
            expires_at: add_duration(self.clock.now(), ttl),
        };
        let mut entries = self.entries.write().await;
        let _ = entries.cache_set(key, entry);
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.write().await;
        let _ = entries.cache_remove(key);
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.cache_clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

/// Cache TTLs keyed by `(provider, operation)`
///
/// Quota-limited providers get longer TTLs so repeated requests do not burn
/// their daily budget.
#[derive(Debug, Clone, Default)]
pub struct TtlTable {
    entries: HashMap<(ProviderId, Operation), (Duration, CostTier)>,
}

impl TtlTable {
    pub fn from_descriptors(descriptors: &[ProviderDescriptor]) -> Self {
        let entries = descriptors
            .iter()
            .flat_map(|d| {
                [Operation::News, Operation::Profile]
                    .into_iter()
                    .map(move |op| ((d.id, op), (d.cache_ttl(op), d.cost_tier)))
            })
            .collect();
        Self { entries }
    }

    /// TTL for data served by `provider`, honoring per-tier overrides
    pub fn ttl(&self, provider: ProviderId, operation: Operation, overrides: &CacheTtlOverrides) -> Duration {
        match self.entries.get(&(provider, operation)) {
            Some(&(ttl, tier)) => overrides.get(tier, operation).unwrap_or(ttl),
            None => DEFAULT_TTL,
        }
    }
}

/// Coalesces concurrent fetches for the same cache key
///
/// The first caller gets a guard immediately; later callers wait until it is
/// dropped and should then re-check the cache.
#[derive(Debug, Default)]
pub struct FlightGroup {
    inflight: Mutex<HashMap<CacheKey, Flight>>,
}

#[derive(Debug)]
struct Flight {
    lock: Arc<AsyncMutex<()>>,
    /// Callers holding or queued for the lock
    holders: usize,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &CacheKey) -> FlightGuard<'_> {
        let (lock, registration) = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            let flight = inflight.entry(key.clone()).or_insert_with(|| Flight {
                lock: Arc::default(),
                holders: 0,
            });
            flight.holders += 1;
            let registration = FlightRegistration {
                group: self,
                key: key.clone(),
            };
            (Arc::clone(&flight.lock), registration)
        };
        // Dropping this future while queued releases the registration too
        let guard = lock.lock_owned().await;
        FlightGuard {
            _guard: guard,
            registration,
        }
    }

    /// Keys with a fetch in progress or waiters queued
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held while a fetch for one key is in progress
pub struct FlightGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    registration: FlightRegistration<'a>,
}

impl std::fmt::Debug for FlightGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightGuard")
            .field("key", &self.registration.key)
            .finish_non_exhaustive()
    }
}

struct FlightRegistration<'a> {
    group: &'a FlightGroup,
    key: CacheKey,
}

impl Drop for FlightRegistration<'_> {
    fn drop(&mut self) {
        let mut inflight = self.group.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = inflight.get_mut(&self.key) {
            flight.holders = flight.holders.saturating_sub(1);
            if flight.holders == 0 {
                inflight.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{MarketCapRange, Symbol};
    use crate::quota::QuotaPolicy;
    use chrono::TimeZone;
    use tokio_test::{assert_pending, assert_ready};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    fn profile(name: &str) -> CachedPayload {
        CachedPayload::Profile(CompanyProfile {
            symbol: Symbol::parse("ACME").unwrap(),
            official_name: name.to_string(),
            industry: None,
            exchange: None,
            market_cap_range: MarketCapRange::Unknown,
            description: None,
            sector: None,
            country: None,
            currency: None,
            website: None,
            employees: None,
            market_cap: None,
            details: None,
        })
    }

    fn key(symbol: &str) -> CacheKey {
        CacheKey::new(Operation::Profile, None, symbol, serde_json::json!({"detailed": false}))
    }

    #[test]
    fn test_cache_key_scope() {
        assert_eq!(key("ACME").scope, "resolved");
        let scoped = CacheKey::new(Operation::News, Some(ProviderId::GoogleNews), "ACME", ());
        assert_eq!(scoped.scope, "google_news");
        assert_ne!(scoped, CacheKey::new(Operation::News, None, "ACME", ()));
    }

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = ResponseCache::new(clock());
        assert!(cache.is_empty().await);

        cache.put(key("ACME"), profile("Acme Corp"), ProviderId::Yahoo, Duration::from_secs(60)).await;
        let entry = cache.get(&key("ACME")).await.unwrap();
        assert_eq!(*entry.payload, profile("Acme Corp"));
        assert_eq!(entry.served_by, ProviderId::Yahoo);
        assert_eq!(cache.len().await, 1);

        cache.invalidate(&key("ACME")).await;
        assert!(cache.get(&key("ACME")).await.is_none());

        cache.put(key("A"), profile("A"), ProviderId::Yahoo, Duration::from_secs(60)).await;
        cache.put(key("B"), profile("B"), ProviderId::Yahoo, Duration::from_secs(60)).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_lazily_evicted() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());
        cache.put(key("ACME"), profile("Acme"), ProviderId::Yahoo, Duration::from_secs(60)).await;

        clock.advance(Duration::from_secs(59));
        assert!(cache.get(&key("ACME")).await.is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&key("ACME")).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_replacing_entry_refreshes_expiry() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());
        cache.put(key("ACME"), profile("Old"), ProviderId::Yahoo, Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(30));
        cache.put(key("ACME"), profile("New"), ProviderId::AlphaVantage, Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(45));

        let entry = cache.get(&key("ACME")).await.unwrap();
        assert_eq!(*entry.payload, profile("New"));
        assert_eq!(entry.served_by, ProviderId::AlphaVantage);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let cache = ResponseCache::new(clock());
        cache.put(key("ACME"), profile("Acme"), ProviderId::Yahoo, Duration::ZERO).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = ResponseCache::with_capacity(2, clock());
        for symbol in ["A", "B", "C"] {
            cache.put(key(symbol), profile(symbol), ProviderId::Yahoo, Duration::from_secs(60)).await;
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&key("A")).await.is_none());
        assert!(cache.get(&key("C")).await.is_some());
    }

    #[test]
    fn test_ttl_table() {
        let descriptor = |id, tier, news, profile| ProviderDescriptor {
            id,
            supports_news: true,
            supports_profile: true,
            cost_tier: tier,
            quality_tier: 1,
            quota: QuotaPolicy::Unbounded,
            news_ttl: Duration::from_secs(news),
            profile_ttl: Duration::from_secs(profile),
        };
        let table = TtlTable::from_descriptors(&[
            descriptor(ProviderId::GoogleNews, CostTier::Free, 900, 900),
            descriptor(ProviderId::AlphaVantage, CostTier::Limited, 3_600, 21_600),
        ]);
        let none = CacheTtlOverrides::default();

        assert_eq!(
            table.ttl(ProviderId::AlphaVantage, Operation::Profile, &none),
            Duration::from_secs(21_600)
        );
        assert_eq!(table.ttl(ProviderId::GoogleNews, Operation::News, &none), Duration::from_secs(900));
        assert_eq!(table.ttl(ProviderId::Yahoo, Operation::News, &none), DEFAULT_TTL);

        let overrides = CacheTtlOverrides {
            limited_news: Some(Duration::from_secs(10)),
            ..CacheTtlOverrides::default()
        };
        assert_eq!(
            table.ttl(ProviderId::AlphaVantage, Operation::News, &overrides),
            Duration::from_secs(10)
        );
        assert_eq!(
            table.ttl(ProviderId::GoogleNews, Operation::News, &overrides),
            Duration::from_secs(900)
        );
    }

    #[tokio::test]
    async fn test_flight_group_serializes_same_key() {
        let group = FlightGroup::new();
        let acme = key("ACME");
        let other_key = key("OTHER");
        let first = group.acquire(&acme).await;
        assert_eq!(group.in_flight(), 1);

        let mut second = tokio_test::task::spawn(group.acquire(&acme));
        assert_pending!(second.poll());

        let mut other = tokio_test::task::spawn(group.acquire(&other_key));
        let other_guard = assert_ready!(other.poll());
        drop(other_guard);
        drop(other);

        drop(first);
        assert!(second.is_woken());
        let second_guard = assert_ready!(second.poll());
        assert_eq!(group.in_flight(), 1);

        drop(second_guard);
        drop(second);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_flight_group_forgets_cancelled_waiters() {
        let group = FlightGroup::new();
        let acme = key("ACME");
        let first = group.acquire(&acme).await;

        let mut waiter = tokio_test::task::spawn(group.acquire(&acme));
        assert_pending!(waiter.poll());
        assert_eq!(group.in_flight(), 1);

        drop(first);
        drop(waiter);
        assert_eq!(group.in_flight(), 0);

        let first = group.acquire(&acme).await;
        let mut waiter = tokio_test::task::spawn(group.acquire(&acme));
        assert_pending!(waiter.poll());
        drop(waiter);
        assert_eq!(group.in_flight(), 1);
        drop(first);
        assert_eq!(group.in_flight(), 0);
    }
}
