//! Alpha Vantage client, the quota-limited news and profile source

use super::http::{DEFAULT_TIMEOUT, USER_AGENT, build_client, check_status};
use super::{DataProvider, ProviderDescriptor, QuotaHint};
use crate::clock::{SharedClock, SystemClock};
use crate::error::ProviderError;
use crate::models::{
    CompanyProfile, CostTier, MarketCapRange, NewsItem, NewsRequest, ProfileDetails,
    ProfileRequest, ProviderId, RelevanceHint, Symbol,
};
use crate::quota::QuotaPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const DAILY_LIMIT: u32 = 500;
const PER_MINUTE_LIMIT: u32 = 5;
const MAX_SPAN_DAYS: i64 = 365;
const MAX_NEWS_LIMIT: usize = 1_000;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

static US_TICKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,5}([.-][A-Z]{1,2})?$").ok());

/// Calls made on one UTC day, as tracked by this client
#[derive(Debug, Clone, Copy)]
struct DailyCounter {
    day: NaiveDate,
    calls: u32,
}

/// Alpha Vantage API client
pub struct AlphaVantageSource {
    client: Client,
    base_url: String,
    rate_limiter: SharedRateLimiter,
    daily: Mutex<DailyCounter>,
    daily_limit: u32,
    clock: SharedClock,
    descriptor: ProviderDescriptor,
}

impl Default for AlphaVantageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AlphaVantageSource {
    /// Create a client with the free-tier limits (5/minute, 500/day)
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Free-tier limits, counted against `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self::with_limits(PER_MINUTE_LIMIT, DAILY_LIMIT, clock)
    }

    /// Create a client with custom pacing and daily budget
    ///
    /// # Arguments
    /// * `per_minute` - Maximum requests per minute
    /// * `daily_limit` - Maximum requests per UTC day
    /// * `clock` - Time source for the daily counter
    pub fn with_limits(per_minute: u32, daily_limit: u32, clock: SharedClock) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        let today = clock.now().date_naive();
        let mut descriptor = Self::default_descriptor();
        descriptor.quota = QuotaPolicy::per_day(daily_limit);

        Self {
            client: build_client(DEFAULT_TIMEOUT, USER_AGENT),
            base_url: BASE_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            daily: Mutex::new(DailyCounter { day: today, calls: 0 }),
            daily_limit,
            clock,
            descriptor,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn default_descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            id: ProviderId::AlphaVantage,
            supports_news: true,
            supports_profile: true,
            cost_tier: CostTier::Limited,
            quality_tier: 2,
            quota: QuotaPolicy::per_day(DAILY_LIMIT),
            news_ttl: Duration::from_secs(3_600),
            profile_ttl: Duration::from_secs(21_600),
        }
    }

    /// Reserve one call against the per-minute and daily budgets
    fn reserve_call(&self) -> Result<(), ProviderError> {
        if self.rate_limiter.check().is_err() {
            return Err(ProviderError::RateLimitExceeded(format!(
                "Alpha Vantage allows {PER_MINUTE_LIMIT} requests per minute"
            )));
        }

        let today = self.clock.now().date_naive();
        let mut daily = self.daily.lock().unwrap_or_else(PoisonError::into_inner);
        if daily.day != today {
            *daily = DailyCounter { day: today, calls: 0 };
        }
        if daily.calls >= self.daily_limit {
            tracing::warn!("Alpha Vantage daily limit reached: {}/{}", daily.calls, self.daily_limit);
            return Err(ProviderError::RateLimitExceeded(format!(
                "Alpha Vantage daily limit of {} calls reached",
                self.daily_limit
            )));
        }
        daily.calls += 1;
        tracing::debug!("Alpha Vantage call {}/{}", daily.calls, self.daily_limit);
        Ok(())
    }

    async fn query(&self, params: &[(&str, &str)], credential: Option<&str>) -> Result<Value, ProviderError> {
        let api_key = credential
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidCredential("ALPHA_VANTAGE_API_KEY is not configured".into())
            })?;
        self.reserve_call()?;

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", api_key)])
            .send()
            .await?;
        let data: Value = check_status(response).await?.json().await?;
        check_body(&data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for AlphaVantageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageSource")
            .field("base_url", &self.base_url)
            .field("daily_limit", &self.daily_limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataProvider for AlphaVantageSource {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        US_TICKER
            .as_ref()
            .is_some_and(|re| re.is_match(symbol.as_str()))
    }

    async fn fetch_news(
        &self,
        request: &NewsRequest,
        credential: Option<&str>,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        validate_range(request)?;

        let time_from = format!("{}T0000", request.start_date.format("%Y%m%d"));
        let time_to = format!("{}T2359", request.end_date.format("%Y%m%d"));
        let limit = request.limit.min(MAX_NEWS_LIMIT).to_string();
        let params = [
            ("function", "NEWS_SENTIMENT"),
            ("tickers", request.symbol.as_str()),
            ("sort", "LATEST"),
            ("limit", limit.as_str()),
            ("time_from", time_from.as_str()),
            ("time_to", time_to.as_str()),
        ];

        let data = self.query(&params, credential).await?;
        let items = parse_news(data, &request.symbol, request.limit)?;
        if items.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no Alpha Vantage articles for {} between {} and {}",
                request.symbol, request.start_date, request.end_date
            )));
        }
        Ok(items)
    }

    async fn fetch_profile(
        &self,
        request: &ProfileRequest,
        credential: Option<&str>,
    ) -> Result<CompanyProfile, ProviderError> {
        let params = [("function", "OVERVIEW"), ("symbol", request.symbol.as_str())];
        let data = self.query(&params, credential).await?;
        parse_overview(data, request)
    }

    /// Answered from local state; never calls the API
    async fn health_check(&self, credential: Option<&str>) -> bool {
        if credential.map(str::trim).is_none_or(str::is_empty) {
            return false;
        }
        matches!(self.quota_hint(), QuotaHint::Remaining { remaining, .. } if remaining > 0)
    }

    fn quota_hint(&self) -> QuotaHint {
        let today = self.clock.now().date_naive();
        let daily = *self.daily.lock().unwrap_or_else(PoisonError::into_inner);
        let used = if daily.day == today { daily.calls } else { 0 };
        let reset = today
            .checked_add_days(Days::new(1))
            .unwrap_or(today)
            .and_time(NaiveTime::MIN)
            .and_utc();
        QuotaHint::Remaining {
            remaining: self.daily_limit.saturating_sub(used),
            window_reset_at: reset,
        }
    }
}

fn validate_range(request: &NewsRequest) -> Result<(), ProviderError> {
    if request.start_date > request.end_date {
        return Err(ProviderError::Unsupported(format!(
            "start date {} is after end date {}",
            request.start_date, request.end_date
        )));
    }
    if request.span_days() > MAX_SPAN_DAYS {
        return Err(ProviderError::Unsupported(format!(
            "Alpha Vantage news is limited to {MAX_SPAN_DAYS} days per request"
        )));
    }
    Ok(())
}

/// Classify error payloads Alpha Vantage returns with HTTP 200
fn check_body(data: &Value) -> Result<(), ProviderError> {
    let message = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
    let mentions_key = |text: &str| {
        let lower = text.to_ascii_lowercase();
        lower.contains("apikey") || lower.contains("api key")
    };

    if let Some(error) = message("Error Message") {
        if mentions_key(&error) {
            return Err(ProviderError::InvalidCredential(error));
        }
        return Err(ProviderError::NotFound(error));
    }
    if let Some(note) = message("Note") {
        return Err(ProviderError::RateLimitExceeded(note));
    }
    if let Some(info) = message("Information") {
        if mentions_key(&info) && info.to_ascii_lowercase().contains("invalid") {
            return Err(ProviderError::InvalidCredential(info));
        }
        return Err(ProviderError::RateLimitExceeded(info));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct NewsFeed {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    time_published: String,
    summary: Option<String>,
    source: Option<String>,
    #[serde(default)]
    ticker_sentiment: Vec<TickerSentiment>,
}

#[derive(Debug, Deserialize)]
struct TickerSentiment {
    ticker: String,
    relevance_score: Option<String>,
}

fn parse_news(data: Value, symbol: &Symbol, limit: usize) -> Result<Vec<NewsItem>, ProviderError> {
    let feed: NewsFeed = serde_json::from_value(data)?;
    Ok(feed
        .feed
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .take(limit)
        .map(|item| {
            let relevance = item
                .ticker_sentiment
                .iter()
                .find(|t| t.ticker.eq_ignore_ascii_case(symbol.as_str()))
                .and_then(|t| t.relevance_score.as_deref())
                .and_then(|score| score.parse::<f64>().ok())
                .map(RelevanceHint::TickerScore);
            NewsItem {
                title: item.title.trim().to_string(),
                source: item
                    .source
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Alpha Vantage".to_string()),
                published_at: parse_timestamp(&item.time_published),
                url: item.url,
                symbol_relevance_hint: relevance,
                summary: item.summary.filter(|s| !s.is_empty()),
            }
        })
        .collect())
}

/// Parse `YYYYMMDDTHHMMSS` (seconds optional) as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M"))
        .ok()
        .map(|dt| dt.and_utc())
}

/// Company overview data
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompanyOverview {
    symbol: Option<String>,
    name: Option<String>,
    description: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_cap: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "ForwardPE")]
    forward_pe: Option<String>,
    #[serde(rename = "PEGRatio")]
    peg_ratio: Option<String>,
    #[serde(rename = "PriceToBookRatio")]
    price_to_book: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    dividend_yield: Option<String>,
    profit_margin: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM")]
    return_on_equity: Option<String>,
    #[serde(rename = "RevenueTTM")]
    revenue: Option<String>,
    beta: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<String>,
    analyst_target_price: Option<String>,
}

/// Alpha Vantage encodes missing values as `"None"` or `"-"`
fn number(value: Option<&String>) -> Option<f64> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "None" && *s != "-")
        .and_then(|s| s.parse().ok())
}

fn text(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty() && s != "None")
}

fn parse_overview(data: Value, request: &ProfileRequest) -> Result<CompanyProfile, ProviderError> {
    let overview: CompanyOverview = serde_json::from_value(data)?;
    if overview.symbol.as_deref().is_none_or(str::is_empty) {
        return Err(ProviderError::NotFound(format!(
            "Alpha Vantage has no overview for {}",
            request.symbol
        )));
    }
    let official_name = text(overview.name.clone())
        .ok_or_else(|| ProviderError::NotFound(format!("Alpha Vantage has no name for {}", request.symbol)))?;
    let market_cap = number(overview.market_cap.as_ref());

    let details = request.detailed.then(|| ProfileDetails {
        pe_ratio: number(overview.pe_ratio.as_ref()),
        forward_pe: number(overview.forward_pe.as_ref()),
        peg_ratio: number(overview.peg_ratio.as_ref()),
        price_to_book: number(overview.price_to_book.as_ref()),
        eps: number(overview.eps.as_ref()),
        dividend_yield: number(overview.dividend_yield.as_ref()),
        profit_margin: number(overview.profit_margin.as_ref()),
        return_on_equity: number(overview.return_on_equity.as_ref()),
        revenue_ttm: number(overview.revenue.as_ref()),
        beta: number(overview.beta.as_ref()),
        fifty_two_week_high: number(overview.week_52_high.as_ref()),
        fifty_two_week_low: number(overview.week_52_low.as_ref()),
        analyst_target_price: number(overview.analyst_target_price.as_ref()),
    });

    Ok(CompanyProfile {
        symbol: request.symbol.clone(),
        official_name,
        industry: text(overview.industry),
        exchange: text(overview.exchange),
        market_cap_range: MarketCapRange::from_market_cap(market_cap),
        description: text(overview.description),
        sector: text(overview.sector),
        country: text(overview.country),
        currency: text(overview.currency),
        website: None,
        employees: None,
        market_cap,
        details,
    })
}
