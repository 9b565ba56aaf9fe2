//! Symbol universe — category-organized instrument lists.
//!
//! The universe is a TOML file mapping category names (index membership,
//! asset class, whatever grouping the operator uses) to symbol lists. Task
//! generation takes the cross product of these symbols with the requested
//! timeframes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("failed to read universe file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// The complete universe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All symbols across all categories.
    pub fn all_symbols(&self) -> Vec<&str> {
        self.categories
            .values()
            .flat_map(|symbols| symbols.iter().map(|s| s.as_str()))
            .collect()
    }

    /// Symbols for one category.
    pub fn category_symbols(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(|v| v.as_slice())
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(|s| s.as_str()).collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.categories.values().map(|v| v.len()).sum()
    }

    /// Restrict to a subset of categories; unknown names are ignored.
    pub fn select(&self, names: &[String]) -> Universe {
        Universe {
            categories: self
                .categories
                .iter()
                .filter(|(name, _)| names.iter().any(|n| n == *name))
                .map(|(name, symbols)| (name.clone(), symbols.clone()))
                .collect(),
        }
    }

    /// A small built-in NSE universe for demos and smoke runs.
    pub fn default_nse() -> Self {
        let mut categories = BTreeMap::new();

        categories.insert(
            "nifty50".into(),
            vec![
                "RELIANCE", "TCS", "HDFCBANK", "INFY", "ICICIBANK", "HINDUNILVR", "ITC", "SBIN",
                "BHARTIARTL", "LT",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        );

        categories.insert(
            "banknifty".into(),
            vec![
                "HDFCBANK", "ICICIBANK", "SBIN", "KOTAKBANK", "AXISBANK", "INDUSINDBK",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        );

        categories.insert(
            "etf".into(),
            vec!["NIFTYBEES", "BANKBEES", "GOLDBEES"]
                .into_iter()
                .map(String::from)
                .collect(),
        );

        Self { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_has_categories() {
        let u = Universe::default_nse();
        assert!(u.category_names().contains(&"nifty50"));
        assert!(u.category_names().contains(&"etf"));
        assert!(u.symbol_count() > 10);
    }

    #[test]
    fn toml_roundtrip() {
        let u = Universe::default_nse();
        let toml_str = u.to_toml().unwrap();
        let parsed = Universe::from_toml(&toml_str).unwrap();
        assert_eq!(u.symbol_count(), parsed.symbol_count());
    }

    #[test]
    fn all_symbols_flattens() {
        let u = Universe::default_nse();
        let all = u.all_symbols();
        assert!(all.contains(&"RELIANCE"));
        assert!(all.contains(&"GOLDBEES"));
    }

    #[test]
    fn category_lookup() {
        let u = Universe::default_nse();
        let bank = u.category_symbols("banknifty").unwrap();
        assert!(bank.contains(&"SBIN".to_string()));
        assert!(u.category_symbols("missing").is_none());
    }

    #[test]
    fn select_filters_categories() {
        let u = Universe::default_nse();
        let only = u.select(&["etf".to_string(), "nope".to_string()]);
        assert_eq!(only.category_names(), vec!["etf"]);
    }
}
