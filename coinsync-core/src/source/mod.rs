//! Data source trait and structured error types.
//!
//! The DataSource trait abstracts over price APIs so the sync engine can run
//! against CoinGecko in production and a scripted source in tests. The cache
//! tiers sit above this trait; sources don't know about caching.

pub mod coingecko;

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::Receiver;

use thiserror::Error;

use crate::coin::{ChartPoint, ChartRange, GlobalSummary, Page};

pub use coingecko::CoinGeckoSource;

/// Structured error types for source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("coin not found: {name}")]
    NotFound { name: String },

    #[error("source error: {0}")]
    Other(String),
}

/// A paginated source of coin market data.
///
/// Implementations must be shareable across the refresh worker and the
/// caller's thread.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Start streaming every page of coins priced in `currency`.
    ///
    /// The returned channel yields zero or more pages and then closes. A
    /// failure part-way through simply closes the channel early; there is no
    /// per-page error. An `Err` here means the stream could not be started.
    fn fetch_all_pages(&self, currency: &str) -> Result<Receiver<Page>, SourceError>;

    /// Market-wide aggregates in `currency`.
    fn fetch_global_summary(&self, currency: &str) -> Result<GlobalSummary, SourceError>;

    /// Current price of a single coin, looked up by name or symbol.
    fn fetch_price(&self, name: &str, currency: &str) -> Result<f64, SourceError>;

    /// Price history for one coin over a chart window.
    fn fetch_chart(
        &self,
        name: &str,
        currency: &str,
        range: ChartRange,
    ) -> Result<Vec<ChartPoint>, SourceError>;
}

/// Which API backs the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChoice {
    CoinGecko,
}

/// Returned when the configured source name isn't one we support.
#[derive(Debug, Error)]
#[error("invalid API choice '{0}' (expected: coingecko)")]
pub struct UnknownSource(pub String);

impl SourceChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceChoice::CoinGecko => "coingecko",
        }
    }

    /// Build the concrete source for this choice.
    pub fn build(self) -> Result<Box<dyn DataSource>, SourceError> {
        match self {
            SourceChoice::CoinGecko => Ok(Box::new(CoinGeckoSource::new()?)),
        }
    }
}

impl FromStr for SourceChoice {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coingecko" | "" => Ok(SourceChoice::CoinGecko),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

impl fmt::Display for SourceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
