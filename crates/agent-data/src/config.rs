//! Strategy configuration and the resolver that swaps snapshots on reload

use crate::error::ConfigError;
use crate::models::{CostTier, Operation, ProviderId};
use crate::provider::ProviderDescriptor;
use agent_utils::EnvSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment keys read by [`ConfigSource::Environment`]
pub const CONFIG_KEYS: [&str; 10] = [
    "DATA_SOURCE_STRATEGY",
    "ENABLE_AUTO_FALLBACK",
    "ALPHA_VANTAGE_API_KEY",
    "NEWS_SOURCE_PRIORITY",
    "PROFILE_SOURCE_PRIORITY",
    "CACHE_TTL_FREE_NEWS_SECS",
    "CACHE_TTL_FREE_PROFILE_SECS",
    "CACHE_TTL_LIMITED_NEWS_SECS",
    "CACHE_TTL_LIMITED_PROFILE_SECS",
    "PROVIDER_TIMEOUT_SECS",
];

/// Which tier of providers to prefer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Free providers only
    #[default]
    Free,
    /// Quota-limited providers first
    Enhanced,
    /// Configured order filtered by availability and ranked by quality
    Auto,
}

impl Strategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "enhanced" | "alpha_vantage" => Some(Self::Enhanced),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Enhanced => "enhanced",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API key that never shows up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Non-fatal issue found while resolving a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigWarning {
    /// Strategy string was not recognized; `free` was used
    UnknownStrategy(String),
    /// `enhanced` was requested without an Alpha Vantage key; `free` was used
    EnhancedWithoutKey,
}

/// Per-tier cache TTL overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheTtlOverrides {
    pub free_news: Option<Duration>,
    pub free_profile: Option<Duration>,
    pub limited_news: Option<Duration>,
    pub limited_profile: Option<Duration>,
}

impl CacheTtlOverrides {
    pub fn get(&self, tier: CostTier, operation: Operation) -> Option<Duration> {
        match (tier, operation) {
            (CostTier::Free, Operation::News) => self.free_news,
            (CostTier::Free, Operation::Profile) => self.free_profile,
            (CostTier::Limited, Operation::News) => self.limited_news,
            (CostTier::Limited, Operation::Profile) => self.limited_profile,
        }
    }
}

/// Immutable configuration snapshot
///
/// Replaced wholesale on reload; a fetch keeps the snapshot it captured at entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Effective strategy after downgrades
    pub strategy: Strategy,
    pub auto_fallback_enabled: bool,
    pub news_priority: Vec<ProviderId>,
    pub profile_priority: Vec<ProviderId>,
    pub api_keys: HashMap<ProviderId, ApiKey>,
    pub cache_ttl: CacheTtlOverrides,
    /// Upper bound for a single provider attempt
    pub request_timeout: Duration,
    pub warnings: Vec<ConfigWarning>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfigBuilder::default().build()
    }
}

impl StrategyConfig {
    /// Create a new configuration builder
    pub fn builder() -> StrategyConfigBuilder {
        StrategyConfigBuilder::default()
    }

    /// Resolve a configuration from `source`
    pub fn load(source: &ConfigSource) -> Result<Self, ConfigError> {
        source.load()?.resolve()
    }

    pub fn priority(&self, operation: Operation) -> &[ProviderId] {
        match operation {
            Operation::News => &self.news_priority,
            Operation::Profile => &self.profile_priority,
        }
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys.get(&provider).map(ApiKey::expose)
    }

    /// Check every referenced provider against the registered descriptors
    pub fn validate(&self, descriptors: &[ProviderDescriptor]) -> Result<(), ConfigError> {
        for operation in [Operation::News, Operation::Profile] {
            let priority = self.priority(operation);
            if priority.is_empty() {
                return Err(ConfigError::EmptyPriority { operation });
            }
            for &provider in priority {
                let descriptor = descriptors
                    .iter()
                    .find(|d| d.id == provider)
                    .ok_or(ConfigError::UnregisteredProvider { provider })?;
                if !descriptor.supports(operation) {
                    return Err(ConfigError::CapabilityMismatch {
                        provider,
                        operation,
                    });
                }
            }
        }
        Ok(())
    }

    /// Secret-free view for status endpoints and logs
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            strategy: self.strategy,
            auto_fallback_enabled: self.auto_fallback_enabled,
            alpha_vantage_key_configured: self.api_keys.contains_key(&ProviderId::AlphaVantage),
            news_priority: self.news_priority.clone(),
            profile_priority: self.profile_priority.clone(),
            request_timeout_secs: self.request_timeout.as_secs_f64(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Serializable summary of a [`StrategyConfig`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub strategy: Strategy,
    pub auto_fallback_enabled: bool,
    pub alpha_vantage_key_configured: bool,
    pub news_priority: Vec<ProviderId>,
    pub profile_priority: Vec<ProviderId>,
    pub request_timeout_secs: f64,
    pub warnings: Vec<ConfigWarning>,
}

/// Builder for StrategyConfig
#[derive(Debug, Default)]
pub struct StrategyConfigBuilder {
    strategy: Option<Strategy>,
    auto_fallback_enabled: Option<bool>,
    news_priority: Option<Vec<ProviderId>>,
    profile_priority: Option<Vec<ProviderId>>,
    api_keys: HashMap<ProviderId, ApiKey>,
    cache_ttl: CacheTtlOverrides,
    request_timeout: Option<Duration>,
    warnings: Vec<ConfigWarning>,
}

impl StrategyConfigBuilder {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn auto_fallback(mut self, enabled: bool) -> Self {
        self.auto_fallback_enabled = Some(enabled);
        self
    }

    pub fn news_priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.news_priority = Some(priority);
        self
    }

    pub fn profile_priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.profile_priority = Some(priority);
        self
    }

    pub fn api_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        let key = key.into();
        if key.trim().is_empty() {
            self.api_keys.remove(&provider);
        } else {
            self.api_keys.insert(provider, ApiKey::new(key.trim()));
        }
        self
    }

    pub fn cache_ttl(mut self, overrides: CacheTtlOverrides) -> Self {
        self.cache_ttl = overrides;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn warning(mut self, warning: ConfigWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Build the snapshot, applying default priorities and strategy downgrades
    pub fn build(self) -> StrategyConfig {
        let mut warnings = self.warnings;
        let has_enhanced_key = self.api_keys.contains_key(&ProviderId::AlphaVantage);

        let mut strategy = self.strategy.unwrap_or_default();
        if strategy == Strategy::Enhanced && !has_enhanced_key {
            tracing::warn!("Enhanced strategy requested without ALPHA_VANTAGE_API_KEY, using free");
            warnings.push(ConfigWarning::EnhancedWithoutKey);
            strategy = Strategy::Free;
        }

        let prefer_enhanced = has_enhanced_key && strategy != Strategy::Free;
        let (default_news, default_profile) = if prefer_enhanced {
            (
                vec![ProviderId::AlphaVantage, ProviderId::GoogleNews],
                vec![ProviderId::AlphaVantage, ProviderId::Yahoo],
            )
        } else {
            (vec![ProviderId::GoogleNews], vec![ProviderId::Yahoo])
        };

        StrategyConfig {
            strategy,
            auto_fallback_enabled: self.auto_fallback_enabled.unwrap_or(true),
            news_priority: dedup(self.news_priority.unwrap_or(default_news)),
            profile_priority: dedup(self.profile_priority.unwrap_or(default_profile)),
            api_keys: self.api_keys,
            cache_ttl: self.cache_ttl,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            warnings,
        }
    }
}

fn dedup(priority: Vec<ProviderId>) -> Vec<ProviderId> {
    let mut seen = Vec::with_capacity(priority.len());
    for id in priority {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Where a configuration is read from
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Process environment, captured at load time
    Environment,
    /// Explicit key/value pairs using the environment key names
    Pairs(HashMap<String, String>),
    /// JSON document with camelCase keys
    File(PathBuf),
}

impl ConfigSource {
    pub fn pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Pairs(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn load(&self) -> Result<RawConfig, ConfigError> {
        match self {
            Self::Environment => RawConfig::from_env(&EnvSnapshot::capture(&CONFIG_KEYS)),
            Self::Pairs(pairs) => RawConfig::from_env(&EnvSnapshot::from_pairs(pairs.clone())),
            Self::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(serde_json::from_str(&content)?)
            },
        }
    }
}

/// Unvalidated configuration values as read from a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    pub strategy: Option<String>,
    pub enable_auto_fallback: Option<bool>,
    pub alpha_vantage_api_key: Option<String>,
    pub news_source_priority: Option<Vec<String>>,
    pub profile_source_priority: Option<Vec<String>>,
    pub cache_ttl_free_news_secs: Option<u64>,
    pub cache_ttl_free_profile_secs: Option<u64>,
    pub cache_ttl_limited_news_secs: Option<u64>,
    pub cache_ttl_limited_profile_secs: Option<u64>,
    pub provider_timeout_secs: Option<u64>,
}

impl RawConfig {
    pub fn from_env(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        Ok(Self {
            strategy: env.get("DATA_SOURCE_STRATEGY").map(str::to_string),
            enable_auto_fallback: env.get_bool("ENABLE_AUTO_FALLBACK")?,
            alpha_vantage_api_key: env.get("ALPHA_VANTAGE_API_KEY").map(str::to_string),
            news_source_priority: env.get_list("NEWS_SOURCE_PRIORITY"),
            profile_source_priority: env.get_list("PROFILE_SOURCE_PRIORITY"),
            cache_ttl_free_news_secs: env.get_u64("CACHE_TTL_FREE_NEWS_SECS")?,
            cache_ttl_free_profile_secs: env.get_u64("CACHE_TTL_FREE_PROFILE_SECS")?,
            cache_ttl_limited_news_secs: env.get_u64("CACHE_TTL_LIMITED_NEWS_SECS")?,
            cache_ttl_limited_profile_secs: env.get_u64("CACHE_TTL_LIMITED_PROFILE_SECS")?,
            provider_timeout_secs: env.get_u64("PROVIDER_TIMEOUT_SECS")?,
        })
    }

    /// Turn raw values into a snapshot
    ///
    /// Unknown strategies degrade to `free` with a warning; unknown provider
    /// names and explicitly empty priority lists are errors.
    pub fn resolve(self) -> Result<StrategyConfig, ConfigError> {
        let mut builder = StrategyConfig::builder();

        if let Some(raw) = self.strategy.as_deref() {
            builder = match Strategy::parse(raw) {
                Some(strategy) => builder.strategy(strategy),
                None => {
                    tracing::warn!("Unknown DATA_SOURCE_STRATEGY {:?}, using free", raw);
                    builder
                        .strategy(Strategy::Free)
                        .warning(ConfigWarning::UnknownStrategy(raw.to_string()))
                },
            };
        }
        if let Some(enabled) = self.enable_auto_fallback {
            builder = builder.auto_fallback(enabled);
        }
        if let Some(key) = self.alpha_vantage_api_key {
            builder = builder.api_key(ProviderId::AlphaVantage, key);
        }
        if let Some(names) = self.news_source_priority {
            builder = builder.news_priority(parse_priority(
                &names,
                "NEWS_SOURCE_PRIORITY",
                Operation::News,
            )?);
        }
        if let Some(names) = self.profile_source_priority {
            builder = builder.profile_priority(parse_priority(
                &names,
                "PROFILE_SOURCE_PRIORITY",
                Operation::Profile,
            )?);
        }

        let secs = |v: Option<u64>| v.map(Duration::from_secs);
        builder = builder.cache_ttl(CacheTtlOverrides {
            free_news: secs(self.cache_ttl_free_news_secs),
            free_profile: secs(self.cache_ttl_free_profile_secs),
            limited_news: secs(self.cache_ttl_limited_news_secs),
            limited_profile: secs(self.cache_ttl_limited_profile_secs),
        });
        if let Some(timeout) = secs(self.provider_timeout_secs).filter(|d| !d.is_zero()) {
            builder = builder.request_timeout(timeout);
        }

        Ok(builder.build())
    }
}

fn parse_priority(
    names: &[String],
    key: &'static str,
    operation: Operation,
) -> Result<Vec<ProviderId>, ConfigError> {
    let ids = names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| {
            name.parse().map_err(|_| ConfigError::UnknownProvider {
                name: name.clone(),
                key,
            })
        })
        .collect::<Result<Vec<ProviderId>, _>>()?;
    if ids.is_empty() {
        return Err(ConfigError::EmptyPriority { operation });
    }
    Ok(ids)
}

/// Holds the active [`StrategyConfig`] and replaces it whole on reload
///
/// Nothing mutates a published snapshot.
#[derive(Debug)]
pub struct ConfigResolver {
    current: RwLock<Arc<StrategyConfig>>,
    descriptors: Vec<ProviderDescriptor>,
}

impl ConfigResolver {
    pub fn new(
        descriptors: Vec<ProviderDescriptor>,
        initial: StrategyConfig,
    ) -> Result<Self, ConfigError> {
        initial.validate(&descriptors)?;
        Ok(Self {
            current: RwLock::new(Arc::new(initial)),
            descriptors,
        })
    }

    /// Latest published snapshot
    ///
    /// Takes the read lock only long enough to clone the `Arc`, so a reader may
    /// briefly wait on a concurrent [`install`](Self::install). It never sees a
    /// partially written config.
    pub fn current(&self) -> Arc<StrategyConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Load, validate, and publish a configuration from `source`
    ///
    /// On error the active snapshot is left untouched.
    pub fn reload(&self, source: &ConfigSource) -> Result<Arc<StrategyConfig>, ConfigError> {
        let config = StrategyConfig::load(source)?;
        self.install(config)
    }

    /// Validate and publish an already-built configuration
    pub fn install(&self, config: StrategyConfig) -> Result<Arc<StrategyConfig>, ConfigError> {
        config.validate(&self.descriptors)?;
        let next = Arc::new(config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        Ok(next)
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaPolicy;

    fn descriptor(id: ProviderId, news: bool, profile: bool, tier: CostTier) -> ProviderDescriptor {
        ProviderDescriptor {
            id,
            supports_news: news,
            supports_profile: profile,
            cost_tier: tier,
            quality_tier: 1,
            quota: QuotaPolicy::Unbounded,
            news_ttl: Duration::from_secs(900),
            profile_ttl: Duration::from_secs(900),
        }
    }

    fn all_descriptors() -> Vec<ProviderDescriptor> {
        vec![
            descriptor(ProviderId::GoogleNews, true, false, CostTier::Free),
            descriptor(ProviderId::Yahoo, false, true, CostTier::Free),
            descriptor(ProviderId::AlphaVantage, true, true, CostTier::Limited),
        ]
    }

    #[test]
    fn test_default_config() {
        let config = StrategyConfig::default();
        assert_eq!(config.strategy, Strategy::Free);
        assert!(config.auto_fallback_enabled);
        assert_eq!(config.news_priority, vec![ProviderId::GoogleNews]);
        assert_eq!(config.profile_priority, vec![ProviderId::Yahoo]);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_enhanced_with_key_prefers_alpha_vantage() {
        let config = StrategyConfig::builder()
            .strategy(Strategy::Enhanced)
            .api_key(ProviderId::AlphaVantage, "demo-key")
            .build();
        assert_eq!(config.strategy, Strategy::Enhanced);
        assert_eq!(
            config.news_priority,
            vec![ProviderId::AlphaVantage, ProviderId::GoogleNews]
        );
        assert_eq!(config.profile_priority, vec![ProviderId::AlphaVantage, ProviderId::Yahoo]);
        assert_eq!(config.api_key(ProviderId::AlphaVantage), Some("demo-key"));
    }

    #[test]
    fn test_enhanced_without_key_downgrades() {
        let config = StrategyConfig::builder().strategy(Strategy::Enhanced).build();
        assert_eq!(config.strategy, Strategy::Free);
        assert_eq!(config.warnings, vec![ConfigWarning::EnhancedWithoutKey]);
        assert_eq!(config.news_priority, vec![ProviderId::GoogleNews]);
    }

    #[test]
    fn test_resolve_from_pairs() {
        let source = ConfigSource::pairs([
            ("DATA_SOURCE_STRATEGY", "alpha_vantage"),
            ("ALPHA_VANTAGE_API_KEY", "secret"),
            ("ENABLE_AUTO_FALLBACK", "false"),
            ("NEWS_SOURCE_PRIORITY", "google_news, alpha_vantage"),
            ("CACHE_TTL_FREE_NEWS_SECS", "120"),
            ("PROVIDER_TIMEOUT_SECS", "3"),
        ]);
        let config = StrategyConfig::load(&source).unwrap();

        assert_eq!(config.strategy, Strategy::Enhanced);
        assert!(!config.auto_fallback_enabled);
        assert_eq!(
            config.news_priority,
            vec![ProviderId::GoogleNews, ProviderId::AlphaVantage]
        );
        assert_eq!(config.profile_priority, vec![ProviderId::AlphaVantage, ProviderId::Yahoo]);
        assert_eq!(
            config.cache_ttl.get(CostTier::Free, Operation::News),
            Some(Duration::from_secs(120))
        );
        assert_eq!(config.cache_ttl.get(CostTier::Limited, Operation::News), None);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_free() {
        let config = StrategyConfig::load(&ConfigSource::pairs([("DATA_SOURCE_STRATEGY", "premium")]))
            .unwrap();
        assert_eq!(config.strategy, Strategy::Free);
        assert_eq!(
            config.warnings,
            vec![ConfigWarning::UnknownStrategy("premium".to_string())]
        );
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = StrategyConfig::load(&ConfigSource::pairs([(
            "NEWS_SOURCE_PRIORITY",
            "google_news,finnhub",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider { ref name, .. } if name == "finnhub"));
    }

    #[test]
    fn test_empty_priority_is_rejected() {
        let err = StrategyConfig::load(&ConfigSource::pairs([("PROFILE_SOURCE_PRIORITY", " , ")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyPriority {
                operation: Operation::Profile
            }
        ));
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = StrategyConfig::load(&ConfigSource::pairs([("ENABLE_AUTO_FALLBACK", "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validate_against_registry() {
        let config = StrategyConfig::builder()
            .profile_priority(vec![ProviderId::GoogleNews])
            .build();
        let err = config.validate(&all_descriptors()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CapabilityMismatch {
                provider: ProviderId::GoogleNews,
                operation: Operation::Profile
            }
        ));

        let only_google = vec![descriptor(ProviderId::GoogleNews, true, false, CostTier::Free)];
        let err = StrategyConfig::default().validate(&only_google).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnregisteredProvider {
                provider: ProviderId::Yahoo
            }
        ));
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = StrategyConfig::builder()
            .strategy(Strategy::Auto)
            .api_key(ProviderId::AlphaVantage, "top-secret")
            .build();
        let summary = serde_json::to_string(&config.summary()).unwrap();
        assert!(summary.contains("\"alpha_vantage_key_configured\":true"));
        assert!(!summary.contains("top-secret"));
        assert!(!format!("{config:?}").contains("top-secret"));
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("agent-data-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"strategy": "auto", "alphaVantageApiKey": "k", "profileSourcePriority": ["yfinance"]}"#,
        )
        .unwrap();
        let config = StrategyConfig::load(&ConfigSource::File(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.strategy, Strategy::Auto);
        assert_eq!(config.profile_priority, vec![ProviderId::Yahoo]);
        assert_eq!(
            config.news_priority,
            vec![ProviderId::AlphaVantage, ProviderId::GoogleNews]
        );

        let missing = ConfigSource::File(PathBuf::from("/nonexistent/agent-data.json"));
        assert!(matches!(StrategyConfig::load(&missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_resolver_reload_keeps_old_snapshot_on_error() {
        let resolver = ConfigResolver::new(all_descriptors(), StrategyConfig::default()).unwrap();
        let before = resolver.current();

        let bad = ConfigSource::pairs([("NEWS_SOURCE_PRIORITY", "nope")]);
        assert!(resolver.reload(&bad).is_err());
        assert!(Arc::ptr_eq(&before, &resolver.current()));

        let good = ConfigSource::pairs([
            ("DATA_SOURCE_STRATEGY", "enhanced"),
            ("ALPHA_VANTAGE_API_KEY", "k"),
        ]);
        let after = resolver.reload(&good).unwrap();
        assert_eq!(after.strategy, Strategy::Enhanced);
        assert!(Arc::ptr_eq(&after, &resolver.current()));
        assert_eq!(before.strategy, Strategy::Free, "captured snapshots never change");
    }
}
