//! Environment-driven configuration helpers
//!
//! Values are captured once into an [`EnvSnapshot`] so that callers never poll
//! the process environment while serving requests.

use std::collections::HashMap;
use thiserror::Error;

/// A configuration value that is present but malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value {value:?} for {key}: expected {expected}")]
pub struct ConfigValueError {
    pub key: String,
    pub value: String,
    pub expected: &'static str,
}

/// Immutable capture of configuration key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Read the listed keys from the process environment
    pub fn capture(keys: &[&str]) -> Self {
        let vars = keys
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| ((*key).to_string(), value)))
            .collect();
        Self { vars }
    }

    /// Build a snapshot from explicit pairs, e.g. a declarative config source
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Trimmed value for `key`; blank values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Whether `key` was set at all, even to an empty string
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigValueError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid(key, raw, "a boolean")),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigValueError> {
        self.get(key)
            .map(|raw| raw.parse().map_err(|_| invalid(key, raw, "an unsigned integer")))
            .transpose()
    }

    /// Split a comma-separated list, dropping blank entries
    ///
    /// Returns `Some(vec![])` when the key is set but holds no entries, so callers
    /// can tell "explicitly empty" from "unset".
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        let raw = self.vars.get(key)?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

fn invalid(key: &str, value: &str, expected: &'static str) -> ConfigValueError {
    ConfigValueError {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_trims_and_skips_blank() {
        let env = EnvSnapshot::from_pairs([("A", "  value "), ("B", "   ")]);
        assert_eq!(env.get("A"), Some("value"));
        assert_eq!(env.get("B"), None);
        assert!(env.contains("B"));
        assert_eq!(env.get("C"), None);
    }

    #[test]
    fn test_get_bool() {
        let env = EnvSnapshot::from_pairs([("ON", "Yes"), ("OFF", "0"), ("BAD", "maybe")]);
        assert_eq!(env.get_bool("ON").unwrap(), Some(true));
        assert_eq!(env.get_bool("OFF").unwrap(), Some(false));
        assert_eq!(env.get_bool("MISSING").unwrap(), None);

        let err = env.get_bool("BAD").unwrap_err();
        assert_eq!(err.key, "BAD");
        assert!(err.to_string().contains("a boolean"));
    }

    #[test]
    fn test_get_u64() {
        let env = EnvSnapshot::from_pairs([("N", "900"), ("NEG", "-1")]);
        assert_eq!(env.get_u64("N").unwrap(), Some(900));
        assert!(env.get_u64("NEG").is_err());
    }

    #[test]
    fn test_get_list() {
        let env = EnvSnapshot::from_pairs([("L", "alpha_vantage, google_news,,"), ("E", " , ")]);
        assert_eq!(
            env.get_list("L"),
            Some(vec!["alpha_vantage".to_string(), "google_news".to_string()])
        );
        assert_eq!(env.get_list("E"), Some(vec![]));
        assert_eq!(env.get_list("MISSING"), None);
    }
}
