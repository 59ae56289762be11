//! Yahoo Finance quote summary, the free profile source

use super::http::{BROWSER_USER_AGENT, DEFAULT_TIMEOUT, build_client, check_keyless_status};
use super::{DataProvider, ProviderDescriptor};
use crate::error::ProviderError;
use crate::models::{
    CompanyProfile, CostTier, MarketCapRange, ProfileDetails, ProfileRequest, ProviderId, Symbol,
};
use crate::quota::QuotaPolicy;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use yahoo_finance_api as yahoo;

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const BASIC_MODULES: &str = "price,summaryProfile,summaryDetail";
const DETAILED_MODULES: &str = "price,summaryProfile,summaryDetail,defaultKeyStatistics,financialData";

#[derive(Debug, Clone)]
struct Crumb {
    cookie: String,
    value: String,
}

/// Yahoo Finance profile client
#[derive(Debug)]
pub struct YahooProfileSource {
    client: Client,
    crumb: RwLock<Option<Crumb>>,
    descriptor: ProviderDescriptor,
}

impl Default for YahooProfileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooProfileSource {
    pub fn new() -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT, BROWSER_USER_AGENT),
            crumb: RwLock::new(None),
            descriptor: Self::default_descriptor(),
        }
    }

    pub fn default_descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            id: ProviderId::Yahoo,
            supports_news: false,
            supports_profile: true,
            cost_tier: CostTier::Free,
            quality_tier: 1,
            quota: QuotaPolicy::per_minute(60),
            news_ttl: Duration::from_secs(900),
            profile_ttl: Duration::from_secs(14_400),
        }
    }

    async fn crumb(&self) -> Result<Crumb, ProviderError> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }

        let response = self.client.get(COOKIE_URL).send().await?;
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(value, _)| value.to_string()))
            .ok_or_else(|| ProviderError::NetworkFailure("Yahoo did not return a session cookie".into()))?;

        let response = self
            .client
            .get(CRUMB_URL)
            .header(header::COOKIE, &cookie)
            .send()
            .await?;
        let value = check_keyless_status(response).await?.text().await?.trim().to_string();
        if value.is_empty() {
            return Err(ProviderError::NetworkFailure("Yahoo returned an empty crumb".into()));
        }

        let crumb = Crumb { cookie, value };
        *slot = Some(crumb.clone());
        tracing::debug!("Refreshed Yahoo crumb");
        Ok(crumb)
    }

    async fn quote_summary(&self, request: &ProfileRequest) -> Result<QuoteSummaryResult, ProviderError> {
        let crumb = self.crumb().await?;
        let modules = if request.detailed { DETAILED_MODULES } else { BASIC_MODULES };
        let url = format!("{QUOTE_SUMMARY_URL}/{}", request.symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("modules", modules), ("crumb", crumb.value.as_str())])
            .header(header::COOKIE, &crumb.cookie)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            *self.crumb.write().await = None;
            return Err(ProviderError::NetworkFailure(
                "Yahoo rejected the session crumb; it will be refreshed".into(),
            ));
        }
        let body = check_keyless_status(response).await?.text().await?;
        parse_quote_summary(&body, &request.symbol)
    }
}

#[async_trait]
impl DataProvider for YahooProfileSource {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        symbol
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    }

    async fn fetch_profile(
        &self,
        request: &ProfileRequest,
        _credential: Option<&str>,
    ) -> Result<CompanyProfile, ProviderError> {
        let result = self.quote_summary(request).await?;
        normalize(result, request)
    }

    async fn health_check(&self, _credential: Option<&str>) -> bool {
        let connector = match yahoo::YahooConnector::new() {
            Ok(connector) => connector,
            Err(err) => {
                tracing::debug!("Yahoo connector unavailable: {}", err);
                return false;
            },
        };
        match connector.search_ticker("AAPL").await {
            Ok(result) => !result.quotes.is_empty(),
            Err(err) => {
                tracing::debug!("Yahoo health check failed: {}", err);
                false
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryResult>>,
    error: Option<QuoteSummaryError>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    price: Option<Price>,
    summary_profile: Option<SummaryProfile>,
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    financial_data: Option<FinancialData>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, or `{}` when missing
#[derive(Debug, Default, Deserialize)]
struct Raw {
    raw: Option<f64>,
}

fn raw(value: Option<&Raw>) -> Option<f64> {
    value.and_then(|v| v.raw)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    long_name: Option<String>,
    short_name: Option<String>,
    exchange_name: Option<String>,
    currency: Option<String>,
    market_cap: Option<Raw>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryProfile {
    sector: Option<String>,
    industry: Option<String>,
    website: Option<String>,
    long_business_summary: Option<String>,
    country: Option<String>,
    full_time_employees: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    market_cap: Option<Raw>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<Raw>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<Raw>,
    dividend_yield: Option<Raw>,
    beta: Option<Raw>,
    fifty_two_week_high: Option<Raw>,
    fifty_two_week_low: Option<Raw>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    peg_ratio: Option<Raw>,
    price_to_book: Option<Raw>,
    trailing_eps: Option<Raw>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    profit_margins: Option<Raw>,
    return_on_equity: Option<Raw>,
    total_revenue: Option<Raw>,
    target_mean_price: Option<Raw>,
}

fn parse_quote_summary(body: &str, symbol: &Symbol) -> Result<QuoteSummaryResult, ProviderError> {
    let response: QuoteSummaryResponse = serde_json::from_str(body)?;
    if let Some(error) = response.quote_summary.error {
        let description = error.description.unwrap_or_default();
        return Err(match error.code.as_deref() {
            Some("Not Found") => ProviderError::NotFound(format!("{symbol}: {description}")),
            _ => ProviderError::NetworkFailure(format!("Yahoo error for {symbol}: {description}")),
        });
    }
    response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ProviderError::NotFound(format!("no Yahoo profile for {symbol}")))
}

fn normalize(result: QuoteSummaryResult, request: &ProfileRequest) -> Result<CompanyProfile, ProviderError> {
    let price = result.price.unwrap_or_default();
    let profile = result.summary_profile.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();

    let official_name = price
        .long_name
        .or(price.short_name)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ProviderError::NotFound(format!("Yahoo has no name for {}", request.symbol)))?;
    let market_cap = raw(detail.market_cap.as_ref()).or(raw(price.market_cap.as_ref()));

    let details = request.detailed.then(|| {
        let stats = result.default_key_statistics.unwrap_or_default();
        let financials = result.financial_data.unwrap_or_default();
        ProfileDetails {
            pe_ratio: raw(detail.trailing_pe.as_ref()),
            forward_pe: raw(detail.forward_pe.as_ref()),
            peg_ratio: raw(stats.peg_ratio.as_ref()),
            price_to_book: raw(stats.price_to_book.as_ref()),
            eps: raw(stats.trailing_eps.as_ref()),
            dividend_yield: raw(detail.dividend_yield.as_ref()),
            profit_margin: raw(financials.profit_margins.as_ref()),
            return_on_equity: raw(financials.return_on_equity.as_ref()),
            revenue_ttm: raw(financials.total_revenue.as_ref()),
            beta: raw(detail.beta.as_ref()),
            fifty_two_week_high: raw(detail.fifty_two_week_high.as_ref()),
            fifty_two_week_low: raw(detail.fifty_two_week_low.as_ref()),
            analyst_target_price: raw(financials.target_mean_price.as_ref()),
        }
    });

    Ok(CompanyProfile {
        symbol: request.symbol.clone(),
        official_name,
        industry: profile.industry,
        exchange: price.exchange_name,
        market_cap_range: MarketCapRange::from_market_cap(market_cap),
        description: profile.long_business_summary,
        sector: profile.sector,
        country: profile.country,
        currency: price.currency,
        website: profile.website,
        employees: profile.full_time_employees,
        market_cap,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = r#"{
      "quoteSummary": {
        "result": [{
          "price": {
            "longName": "Apple Inc.",
            "shortName": "Apple",
            "exchangeName": "NasdaqGS",
            "currency": "USD",
            "marketCap": {"raw": 3.4e12, "fmt": "3.4T"}
          },
          "summaryProfile": {
            "sector": "Technology",
            "industry": "Consumer Electronics",
            "website": "https://www.apple.com",
            "longBusinessSummary": "Apple designs smartphones.",
            "country": "United States",
            "fullTimeEmployees": 161000
          },
          "summaryDetail": {
            "trailingPE": {"raw": 33.1},
            "dividendYield": {"raw": 0.0044},
            "fiftyTwoWeekHigh": {"raw": 237.23},
            "fiftyTwoWeekLow": {}
          },
          "defaultKeyStatistics": {"pegRatio": {"raw": 2.1}, "trailingEps": {"raw": 6.57}},
          "financialData": {"profitMargins": {"raw": 0.26}, "targetMeanPrice": {"raw": 245.0}}
        }],
        "error": null
      }
    }"#;

    fn request(detailed: bool) -> ProfileRequest {
        ProfileRequest {
            symbol: Symbol::parse("AAPL").unwrap(),
            detailed,
        }
    }

    #[test]
    fn test_normalize_basic_profile() {
        let result = parse_quote_summary(SUMMARY, &request(false).symbol).unwrap();
        let profile = normalize(result, &request(false)).unwrap();

        assert_eq!(profile.official_name, "Apple Inc.");
        assert_eq!(profile.exchange.as_deref(), Some("NasdaqGS"));
        assert_eq!(profile.industry.as_deref(), Some("Consumer Electronics"));
        assert_eq!(profile.employees, Some(161_000));
        assert_eq!(profile.market_cap, Some(3.4e12));
        assert_eq!(profile.market_cap_range, MarketCapRange::Mega);
        assert!(profile.details.is_none());
    }

    #[test]
    fn test_normalize_detailed_profile() {
        let result = parse_quote_summary(SUMMARY, &request(true).symbol).unwrap();
        let details = normalize(result, &request(true)).unwrap().details.unwrap();

        assert_eq!(details.pe_ratio, Some(33.1));
        assert_eq!(details.peg_ratio, Some(2.1));
        assert_eq!(details.eps, Some(6.57));
        assert_eq!(details.fifty_two_week_high, Some(237.23));
        assert_eq!(details.fifty_two_week_low, None);
        assert_eq!(details.analyst_target_price, Some(245.0));
    }

    #[test]
    fn test_quote_summary_not_found() {
        let body = r#"{"quoteSummary":{"result":null,"error":{"code":"Not Found","description":"Quote not found for symbol: ZZZZ"}}}"#;
        let err = parse_quote_summary(body, &Symbol::parse("ZZZZ").unwrap()).unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let empty = r#"{"quoteSummary":{"result":[],"error":null}}"#;
        assert!(matches!(
            parse_quote_summary(empty, &Symbol::parse("ZZZZ").unwrap()),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let result = QuoteSummaryResult::default();
        assert!(matches!(
            normalize(result, &request(false)),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_supports_symbol_shapes() {
        let source = YahooProfileSource::new();
        assert!(source.supports(&Symbol::parse("0700.HK").unwrap()));
        assert!(source.supports(&Symbol::parse("^GSPC").unwrap()));
        assert!(!source.supports(&Symbol::parse("A/B").unwrap()));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_live_fetch_profile() {
        let source = YahooProfileSource::new();
        let profile = source.fetch_profile(&request(false), None).await.unwrap();
        assert_eq!(profile.symbol.as_str(), "AAPL");
    }
}
