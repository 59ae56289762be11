use super::{SourceSelection, Symbol};
use crate::error::DataError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_NEWS_LIMIT: usize = 20;

/// A news article normalized across providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    /// Publisher name
    pub source: String,
    /// `None` only for feed entries without a parseable date
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    pub symbol_relevance_hint: Option<RelevanceHint>,
    pub summary: Option<String>,
}

/// Why a provider considers an article relevant to the symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RelevanceHint {
    /// Provider-computed ticker relevance in `0.0..=1.0`
    TickerScore(f64),
    /// Search query that matched the article
    SearchQuery(String),
}

/// Caller-facing news request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: SourceSelection,
    pub limit: usize,
}

impl NewsQuery {
    pub fn new(symbol: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start_date,
            end_date,
            source: SourceSelection::Auto,
            limit: DEFAULT_NEWS_LIMIT,
        }
    }

    /// Build from `YYYY-MM-DD` strings
    pub fn from_iso(symbol: impl Into<String>, start: &str, end: &str) -> Result<Self, DataError> {
        Ok(Self::new(symbol, parse_date(start)?, parse_date(end)?))
    }

    pub fn source(mut self, source: SourceSelection) -> Self {
        self.source = source;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| DataError::InvalidRequest(format!("invalid date {raw:?}: {e}")))
}

/// Validated news request handed to adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsRequest {
    pub symbol: Symbol,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit: usize,
}

impl NewsRequest {
    /// Inclusive length of the requested range in days
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_query_defaults() {
        let query = NewsQuery::from_iso("ACME", "2024-01-01", "2024-01-31").unwrap();
        assert_eq!(query.source, SourceSelection::Auto);
        assert_eq!(query.limit, 20);
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert!(NewsQuery::from_iso("ACME", "2024-13-01", "2024-01-31").is_err());
    }

    #[test]
    fn test_span_days_is_inclusive() {
        let request = NewsRequest {
            symbol: Symbol::parse("ACME").unwrap(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            limit: 20,
        };
        assert_eq!(request.span_days(), 31);
    }
}
