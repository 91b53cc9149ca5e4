//! Semantic cache keys.

use std::fmt;

/// What kind of data a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    CoinsByName,
    GlobalSummary,
    ChartSeries,
}

impl DataKind {
    fn prefix(self) -> &'static str {
        match self {
            DataKind::CoinsByName => "coins_by_name",
            DataKind::GlobalSummary => "global_summary",
            DataKind::ChartSeries => "chart_series",
        }
    }
}

/// Key derived from (data kind, currency, optional query range).
///
/// Renders to a filesystem-safe string, e.g. `chart_series_usd_bitcoin_7d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: DataKind, currency: &str, range: Option<&str>) -> Self {
        let mut key = format!("{}_{}", kind.prefix(), sanitize(currency));
        if let Some(range) = range {
            key.push('_');
            key.push_str(&sanitize(range));
        }
        CacheKey(key)
    }

    pub fn coins(currency: &str) -> Self {
        Self::new(DataKind::CoinsByName, currency, None)
    }

    pub fn global_summary(currency: &str) -> Self {
        Self::new(DataKind::GlobalSummary, currency, None)
    }

    pub fn chart_series(currency: &str, coin: &str, range: &str) -> Self {
        Self::new(DataKind::ChartSeries, currency, Some(&format!("{coin}_{range}")))
    }

    /// Session flag keys that aren't tied to a data kind.
    pub fn flag(name: &str) -> Self {
        CacheKey(format!("flag_{}", sanitize(name)))
    }

    /// Rebuild a key from its rendered form, e.g. a name listed on disk.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        valid.then(|| CacheKey(raw.to_string()))
    }

    /// Rendered prefix shared by every key of `kind` in `currency`.
    pub fn prefix(kind: DataKind, currency: &str) -> String {
        format!("{}_{}_", kind.prefix(), sanitize(currency))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
