//! Google News RSS search, the free unlimited news source

use super::http::{DEFAULT_TIMEOUT, USER_AGENT, build_client, check_keyless_status};
use super::{DataProvider, ProviderDescriptor};
use crate::error::ProviderError;
use crate::models::{CostTier, NewsItem, NewsRequest, ProviderId, RelevanceHint, Symbol};
use crate::quota::QuotaPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

const RSS_SEARCH_URL: &str = "https://news.google.com/rss/search";
const MAX_QUERIES: usize = 4;
/// Ranges this short are widened because the feed skews toward older articles
const SHORT_RANGE_DAYS: i64 = 7;
const WIDEN_BY_DAYS: u64 = 30;
const MAX_UNDATED: usize = 5;

static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Google News RSS client
#[derive(Debug, Clone)]
pub struct GoogleNewsSource {
    client: Client,
    base_url: String,
    descriptor: ProviderDescriptor,
}

impl Default for GoogleNewsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleNewsSource {
    pub fn new() -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT, USER_AGENT),
            base_url: RSS_SEARCH_URL.to_string(),
            descriptor: Self::default_descriptor(),
        }
    }

    /// Point the client at another RSS search endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn default_descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            id: ProviderId::GoogleNews,
            supports_news: true,
            supports_profile: false,
            cost_tier: CostTier::Free,
            quality_tier: 1,
            quota: QuotaPolicy::Unbounded,
            news_ttl: Duration::from_secs(900),
            profile_ttl: Duration::from_secs(900),
        }
    }

    async fn search(&self, query: &str, max_items: usize) -> Result<Vec<NewsItem>, ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("hl", "en"), ("gl", "US"), ("ceid", "US:en")])
            .send()
            .await?;
        let body = check_keyless_status(response).await?.text().await?;

        let mut items = parse_feed(&body, query)?;
        items.truncate(max_items);
        Ok(items)
    }
}

#[async_trait]
impl DataProvider for GoogleNewsSource {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn supports(&self, _symbol: &Symbol) -> bool {
        true
    }

    async fn fetch_news(
        &self,
        request: &NewsRequest,
        _credential: Option<&str>,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        if request.start_date > request.end_date {
            return Err(ProviderError::Unsupported(format!(
                "start date {} is after end date {}",
                request.start_date, request.end_date
            )));
        }

        let queries = search_queries(&request.symbol);
        let per_query = request.limit / queries.len() + 3;

        let results = join_all(queries.iter().map(|q| self.search(q, per_query))).await;

        let mut collected = Vec::new();
        let mut last_error = None;
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(items) => collected.extend(items),
                Err(err) => {
                    tracing::warn!("Google News query {:?} failed: {}", query, err);
                    last_error = Some(err);
                },
            }
        }
        if let Some(err) = last_error.filter(|_| collected.is_empty()) {
            return Err(err);
        }

        let items = select_items(deduplicate(collected), request);
        if items.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no Google News articles for {} between {} and {}",
                request.symbol, request.start_date, request.end_date
            )));
        }
        Ok(items)
    }

    async fn health_check(&self, _credential: Option<&str>) -> bool {
        match self.search("stock market", 1).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("Google News health check failed: {}", err);
                false
            },
        }
    }
}

/// Market-aware search phrases for a symbol
pub fn search_queries(symbol: &Symbol) -> Vec<String> {
    let sym = symbol.as_str();
    let base = symbol.base();

    let mut queries = if sym.ends_with(".HK") {
        vec![
            format!("\"{sym}\" stock Hong Kong"),
            format!("\"{base}.HK\" earnings"),
            format!("\"{sym}\" HKEX"),
            format!("{base} HK stock news"),
        ]
    } else if sym.ends_with(".SS") || sym.ends_with(".SZ") {
        vec![
            format!("\"{sym}\" stock Shanghai"),
            format!("\"{sym}\" stock Shenzhen"),
            format!("\"{sym}\" A股"),
            format!("{sym} 股票"),
        ]
    } else if sym.len() == 4 && sym.chars().all(|c| c.is_ascii_digit()) {
        vec![
            format!("\"{sym}\" stock Japan TSE"),
            format!("TSE:{sym}"),
            format!("Tokyo stock {sym}"),
        ]
    } else {
        vec![
            format!("\"{sym}\" stock"),
            format!("\"{sym}\" earnings"),
            format!("\"{sym}\" news"),
            format!("{sym} stock market"),
        ]
    };
    queries.truncate(MAX_QUERIES);
    queries
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<RssSource>,
}

#[derive(Debug, Deserialize)]
struct RssSource {
    #[serde(rename = "$text", default)]
    name: String,
}

/// Parse an RSS search result into news items
pub(crate) fn parse_feed(xml: &str, query: &str) -> Result<Vec<NewsItem>, ProviderError> {
    let rss: Rss = quick_xml::de::from_str(xml)
        .map_err(|e| ProviderError::NetworkFailure(format!("malformed RSS feed: {e}")))?;

    Ok(rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let title = strip_html(item.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                return None;
            }
            let summary = item
                .description
                .as_deref()
                .map(strip_html)
                .filter(|s| !s.is_empty());
            let source = item
                .source
                .map(|s| s.name.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Google News".to_string());
            let published_at = item
                .pub_date
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc2822(raw.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));

            Some(NewsItem {
                title,
                source,
                published_at,
                url: item.link.unwrap_or_default().trim().to_string(),
                symbol_relevance_hint: Some(RelevanceHint::SearchQuery(query.to_string())),
                summary,
            })
        })
        .collect())
}

fn strip_html(text: &str) -> String {
    let stripped = match HTML_TAG.as_ref() {
        Some(tag) => tag.replace_all(text, " "),
        None => Cow::Borrowed(text),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop items without a URL and repeats of an earlier URL or title
pub(crate) fn deduplicate(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen_urls = HashSet::new();
    let mut seen_titles = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            !item.url.is_empty()
                && !seen_urls.contains(&item.url)
                && !seen_titles.contains(&item.title)
                && seen_urls.insert(item.url.clone())
                && seen_titles.insert(item.title.clone())
        })
        .collect()
}

/// Apply the date window, newest first, then the limit
///
/// The end date is inclusive. Short ranges are widened backwards, and undated
/// items are only used when nothing dated falls in the window.
pub(crate) fn select_items(items: Vec<NewsItem>, request: &NewsRequest) -> Vec<NewsItem> {
    let mut start = request.start_date;
    if request.span_days() <= SHORT_RANGE_DAYS {
        start = start.checked_sub_days(Days::new(WIDEN_BY_DAYS)).unwrap_or(start);
    }
    let start = start.and_time(NaiveTime::MIN).and_utc();
    let end = request
        .end_date
        .checked_add_days(Days::new(1))
        .unwrap_or(request.end_date)
        .and_time(NaiveTime::MIN)
        .and_utc();

    let (dated, undated): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.published_at.is_some());
    let mut selected: Vec<NewsItem> = dated
        .into_iter()
        .filter(|item| item.published_at.is_some_and(|at| start <= at && at <= end))
        .collect();
    if selected.is_empty() {
        selected = undated.into_iter().take(MAX_UNDATED).collect();
    }

    selected.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    selected.truncate(request.limit);
    selected
}
