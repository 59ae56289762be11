use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    /// Google News RSS search
    #[serde(rename = "google_news")]
    GoogleNews,
    /// Yahoo Finance quote summary
    #[serde(rename = "yfinance", alias = "yahoo")]
    Yahoo,
    /// Alpha Vantage REST API
    #[serde(rename = "alpha_vantage")]
    AlphaVantage,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::GoogleNews, Self::Yahoo, Self::AlphaVantage];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleNews => "google_news",
            Self::Yahoo => "yfinance",
            Self::AlphaVantage => "alpha_vantage",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google_news" | "google" => Ok(Self::GoogleNews),
            "yfinance" | "yahoo" => Ok(Self::Yahoo),
            "alpha_vantage" | "alphavantage" => Ok(Self::AlphaVantage),
            other => Err(other.to_string()),
        }
    }
}

/// Kind of data being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    News,
    Profile,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost tier of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Limited,
}

/// Normalized ticker symbol: trimmed and upper-cased
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let symbol = raw.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(DataError::InvalidRequest("symbol must not be empty".to_string()));
        }
        if symbol.len() > 20 || symbol.chars().any(char::is_whitespace) {
            return Err(DataError::InvalidRequest(format!("malformed symbol: {raw:?}")));
        }
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the exchange suffix, e.g. `0700` for `0700.HK`
    pub fn base(&self) -> &str {
        self.0.split_once('.').map_or(&self.0, |(base, _)| base)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_parsing() {
        assert_eq!("google_news".parse::<ProviderId>(), Ok(ProviderId::GoogleNews));
        assert_eq!(" YFinance ".parse::<ProviderId>(), Ok(ProviderId::Yahoo));
        assert_eq!("yahoo".parse::<ProviderId>(), Ok(ProviderId::Yahoo));
        assert_eq!("alpha_vantage".parse::<ProviderId>(), Ok(ProviderId::AlphaVantage));
        assert_eq!("bloomberg".parse::<ProviderId>(), Err("bloomberg".to_string()));
    }

    #[test]
    fn test_provider_id_round_trips_through_display() {
        for id in ProviderId::ALL {
            assert_eq!(id.to_string().parse::<ProviderId>(), Ok(id));
        }
        assert_eq!(serde_json::to_string(&ProviderId::Yahoo).unwrap(), "\"yfinance\"");
    }

    #[test]
    fn test_symbol_normalization() {
        let symbol = Symbol::parse("  aapl ").unwrap();
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(Symbol::parse("0700.hk").unwrap().base(), "0700");
        assert!(Symbol::parse("   ").is_err());
        assert!(Symbol::parse("BRK B").is_err());
    }
}
