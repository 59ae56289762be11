//! Unified company news and profile retrieval
//!
//! This crate puts several external data providers behind one entry point.
//! It includes:
//!
//! - Provider adapters for Google News RSS, Yahoo Finance, and Alpha Vantage
//! - Strategy configuration (`free`, `enhanced`, `auto`) with hot reload
//! - A TTL response cache with single-flight for quota-limited providers
//! - Per-provider quota windows and health tracking
//! - Ordered fallback with a full attempt trail on every result
//!
//! # Architecture
//!
//! [`UnifiedDataService`] resolves an ordered provider chain from the current
//! [`StrategyConfig`] snapshot, serves from the cache when it can, and otherwise
//! walks the chain until one provider succeeds. Each provider implements
//! [`DataProvider`]; the [`QuotaTracker`] decides whether an attempt is allowed.
//!
//! # Example
//!
//! ```rust,no_run
//! use agent_data::{NewsQuery, ProfileQuery, UnifiedDataService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = UnifiedDataService::from_env()?;
//!
//!     let news = service
//!         .get_company_news_unified(NewsQuery::from_iso("AAPL", "2024-01-01", "2024-01-07")?)
//!         .await?;
//!     println!("{} articles from {}", news.payload.len(), news.served_by);
//!
//!     let profile = service.get_company_profile_unified(ProfileQuery::new("AAPL")).await?;
//!     println!("{}", profile.payload.official_name);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod quota;
pub mod service;

// Re-export main types for convenience
pub use config::{ConfigSource, Strategy, StrategyConfig};
pub use error::{ConfigError, DataError, ProviderError, ProviderErrorKind, Result};
pub use models::{
    Attempt, AttemptOutcome, CompanyProfile, FetchResult, NewsItem, NewsQuery, ProfileQuery,
    ProviderId, SourceSelection,
};
pub use provider::{DataProvider, ProviderDescriptor, ProviderRegistry};
pub use quota::{QuotaStatus, QuotaTracker};
pub use service::{HealthReport, SourceStatus, UnifiedDataService, UnifiedDataServiceBuilder};
