//! Column ordering for the coin table.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::coin::Coin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    #[default]
    Rank,
    Name,
    Symbol,
    Price,
    MarketCap,
    Volume24h,
    Change1h,
    Change24h,
    Change7d,
    Change30d,
    Change1y,
    TotalSupply,
    AvailableSupply,
    LastUpdated,
}

#[derive(Debug, Error)]
#[error("unknown sort key '{0}'")]
pub struct UnknownSortKey(pub String);

impl SortKey {
    pub const ALL: [SortKey; 14] = [
        SortKey::Rank,
        SortKey::Name,
        SortKey::Symbol,
        SortKey::Price,
        SortKey::MarketCap,
        SortKey::Volume24h,
        SortKey::Change1h,
        SortKey::Change24h,
        SortKey::Change7d,
        SortKey::Change30d,
        SortKey::Change1y,
        SortKey::TotalSupply,
        SortKey::AvailableSupply,
        SortKey::LastUpdated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Rank => "rank",
            SortKey::Name => "name",
            SortKey::Symbol => "symbol",
            SortKey::Price => "price",
            SortKey::MarketCap => "market_cap",
            SortKey::Volume24h => "volume_24h",
            SortKey::Change1h => "change_1h",
            SortKey::Change24h => "change_24h",
            SortKey::Change7d => "change_7d",
            SortKey::Change30d => "change_30d",
            SortKey::Change1y => "change_1y",
            SortKey::TotalSupply => "total_supply",
            SortKey::AvailableSupply => "available_supply",
            SortKey::LastUpdated => "last_updated",
        }
    }

    /// Compare two coins on this column only.
    pub fn compare(self, a: &Coin, b: &Coin) -> Ordering {
        match self {
            SortKey::Rank => a.rank.cmp(&b.rank),
            SortKey::Name => cmp_text(&a.name, &b.name),
            SortKey::Symbol => cmp_text(&a.symbol, &b.symbol),
            SortKey::Price => a.price.total_cmp(&b.price),
            SortKey::MarketCap => a.market_cap.total_cmp(&b.market_cap),
            SortKey::Volume24h => a.volume_24h.total_cmp(&b.volume_24h),
            SortKey::Change1h => a.percent_change_1h.total_cmp(&b.percent_change_1h),
            SortKey::Change24h => a.percent_change_24h.total_cmp(&b.percent_change_24h),
            SortKey::Change7d => a.percent_change_7d.total_cmp(&b.percent_change_7d),
            SortKey::Change30d => a.percent_change_30d.total_cmp(&b.percent_change_30d),
            SortKey::Change1y => a.percent_change_1y.total_cmp(&b.percent_change_1y),
            SortKey::TotalSupply => a.total_supply.total_cmp(&b.total_supply),
            SortKey::AvailableSupply => a.available_supply.total_cmp(&b.available_supply),
            SortKey::LastUpdated => cmp_timestamp(&a.last_updated, &b.last_updated),
        }
    }
}

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    /// Accepts the canonical names plus the compact column names older
    /// config files use (`marketcap`, `24hchange`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim().to_ascii_lowercase().as_str() {
            "rank" => SortKey::Rank,
            "name" => SortKey::Name,
            "symbol" => SortKey::Symbol,
            "price" => SortKey::Price,
            "market_cap" | "marketcap" => SortKey::MarketCap,
            "volume_24h" | "24hvolume" => SortKey::Volume24h,
            "change_1h" | "1hchange" => SortKey::Change1h,
            "change_24h" | "24hchange" => SortKey::Change24h,
            "change_7d" | "7dchange" => SortKey::Change7d,
            "change_30d" | "30dchange" => SortKey::Change30d,
            "change_1y" | "1ychange" => SortKey::Change1y,
            "total_supply" | "totalsupply" => SortKey::TotalSupply,
            "available_supply" | "availablesupply" => SortKey::AvailableSupply,
            "last_updated" | "lastupdated" => SortKey::LastUpdated,
            other => return Err(UnknownSortKey(other.to_string())),
        };
        Ok(key)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable sort by `key`; equal values fall back to ascending rank.
pub fn sort_coins(coins: &mut [Coin], key: SortKey, desc: bool) {
    coins.sort_by(|a, b| {
        let primary = key.compare(a, b);
        let primary = if desc { primary.reverse() } else { primary };
        primary.then_with(|| a.rank.cmp(&b.rank))
    });
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Unix-seconds strings compare numerically; anything else lexically.
fn cmp_timestamp(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
