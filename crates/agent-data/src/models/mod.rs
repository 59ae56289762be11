//! Domain types shared by the providers, cache, and orchestrator

mod fetch;
mod ids;
mod news;
mod profile;

pub use fetch::{Attempt, AttemptOutcome, FetchResult, SkipReason, SourceSelection};
pub use ids::{CostTier, Operation, ProviderId, Symbol};
pub use news::{NewsItem, NewsQuery, NewsRequest, RelevanceHint};
pub use profile::{CompanyProfile, MarketCapRange, ProfileDetails, ProfileQuery, ProfileRequest};
