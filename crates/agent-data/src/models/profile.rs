use super::{SourceSelection, Symbol};
use serde::{Deserialize, Serialize};

/// Company profile normalized across providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: Symbol,
    pub official_name: String,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub market_cap_range: MarketCapRange,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub website: Option<String>,
    pub employees: Option<u64>,
    /// Market capitalization in `currency` units
    pub market_cap: Option<f64>,
    /// Only populated for detailed requests
    pub details: Option<ProfileDetails>,
}

/// Valuation and performance metrics returned for detailed profile requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub profit_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub beta: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub analyst_target_price: Option<f64>,
}

impl ProfileDetails {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Market capitalization bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCapRange {
    Mega,
    Large,
    Mid,
    Small,
    Micro,
    Nano,
    Unknown,
}

impl MarketCapRange {
    pub fn from_market_cap(market_cap: Option<f64>) -> Self {
        const BILLION: f64 = 1_000_000_000.0;
        const MILLION: f64 = 1_000_000.0;

        match market_cap {
            Some(cap) if !cap.is_finite() || cap <= 0.0 => Self::Unknown,
            Some(cap) if cap >= 200.0 * BILLION => Self::Mega,
            Some(cap) if cap >= 10.0 * BILLION => Self::Large,
            Some(cap) if cap >= 2.0 * BILLION => Self::Mid,
            Some(cap) if cap >= 300.0 * MILLION => Self::Small,
            Some(cap) if cap >= 50.0 * MILLION => Self::Micro,
            Some(_) => Self::Nano,
            None => Self::Unknown,
        }
    }
}

/// Caller-facing profile request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub symbol: String,
    pub source: SourceSelection,
    pub detailed: bool,
}

impl ProfileQuery {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: SourceSelection::Auto,
            detailed: false,
        }
    }

    pub fn source(mut self, source: SourceSelection) -> Self {
        self.source = source;
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }
}

/// Validated profile request handed to adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRequest {
    pub symbol: Symbol,
    pub detailed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_cap_buckets() {
        assert_eq!(MarketCapRange::from_market_cap(Some(3.0e12)), MarketCapRange::Mega);
        assert_eq!(MarketCapRange::from_market_cap(Some(50.0e9)), MarketCapRange::Large);
        assert_eq!(MarketCapRange::from_market_cap(Some(2.0e9)), MarketCapRange::Mid);
        assert_eq!(MarketCapRange::from_market_cap(Some(500.0e6)), MarketCapRange::Small);
        assert_eq!(MarketCapRange::from_market_cap(Some(60.0e6)), MarketCapRange::Micro);
        assert_eq!(MarketCapRange::from_market_cap(Some(1.0e6)), MarketCapRange::Nano);
        assert_eq!(MarketCapRange::from_market_cap(Some(0.0)), MarketCapRange::Unknown);
        assert_eq!(MarketCapRange::from_market_cap(None), MarketCapRange::Unknown);
    }

    #[test]
    fn test_profile_query_builder() {
        let query = ProfileQuery::new("MSFT").detailed(true);
        assert!(query.detailed);
        assert_eq!(query.source, SourceSelection::Auto);
    }
}
