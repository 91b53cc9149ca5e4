//! Coin domain types.
//!
//! `CoinRecord` is what a data source hands us. `Coin` is what the registry
//! keeps: the same metrics plus the locally owned favorite flag, which no
//! source ever supplies.

use serde::{Deserialize, Serialize};

/// One coin as reported by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoinRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: u32,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub available_supply: f64,
    pub total_supply: f64,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    pub percent_change_30d: f64,
    pub percent_change_1y: f64,
    pub last_updated: String,
}

/// One bounded batch of records emitted during a fetch cycle.
pub type Page = Vec<CoinRecord>;

/// A tracked coin: source metrics plus the favorite mark.
///
/// `name` is the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Coin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: u32,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub available_supply: f64,
    pub total_supply: f64,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    pub percent_change_30d: f64,
    pub percent_change_1y: f64,
    pub last_updated: String,
    #[serde(default)]
    pub favorite: bool,
}

impl Coin {
    pub fn from_record(record: CoinRecord, favorite: bool) -> Self {
        let mut coin = Coin {
            favorite,
            ..Coin::default()
        };
        coin.apply(record);
        coin
    }

    /// Overwrite every source-supplied field. `favorite` is left alone.
    pub fn apply(&mut self, record: CoinRecord) {
        let CoinRecord {
            id,
            name,
            symbol,
            rank,
            price,
            volume_24h,
            market_cap,
            available_supply,
            total_supply,
            percent_change_1h,
            percent_change_24h,
            percent_change_7d,
            percent_change_30d,
            percent_change_1y,
            last_updated,
        } = record;

        self.id = id;
        self.name = name;
        self.symbol = symbol;
        self.rank = rank;
        self.price = price;
        self.volume_24h = volume_24h;
        self.market_cap = market_cap;
        self.available_supply = available_supply;
        self.total_supply = total_supply;
        self.percent_change_1h = percent_change_1h;
        self.percent_change_24h = percent_change_24h;
        self.percent_change_7d = percent_change_7d;
        self.percent_change_30d = percent_change_30d;
        self.percent_change_1y = percent_change_1y;
        self.last_updated = last_updated;
    }

    /// Strip the local state back off, e.g. to replay a cached snapshot as a page.
    pub fn to_record(&self) -> CoinRecord {
        CoinRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            rank: self.rank,
            price: self.price,
            volume_24h: self.volume_24h,
            market_cap: self.market_cap,
            available_supply: self.available_supply,
            total_supply: self.total_supply,
            percent_change_1h: self.percent_change_1h,
            percent_change_24h: self.percent_change_24h,
            percent_change_7d: self.percent_change_7d,
            percent_change_30d: self.percent_change_30d,
            percent_change_1y: self.percent_change_1y,
            last_updated: self.last_updated.clone(),
        }
    }
}

/// Market-wide aggregates shown above the coin table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GlobalSummary {
    pub total_market_cap: f64,
    pub total_volume_24h: f64,
    pub btc_dominance: f64,
    pub active_currencies: u64,
    pub active_assets: u64,
    pub active_markets: u64,
}

impl GlobalSummary {
    /// A zero market cap means the value was never really populated.
    pub fn is_empty(&self) -> bool {
        self.total_market_cap == 0.0
    }
}

/// One sample of a chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Selectable chart window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartRange {
    OneHour,
    OneDay,
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    YearToDate,
    All,
}

impl ChartRange {
    pub const ALL: [ChartRange; 9] = [
        ChartRange::OneHour,
        ChartRange::OneDay,
        ChartRange::OneWeek,
        ChartRange::OneMonth,
        ChartRange::ThreeMonths,
        ChartRange::SixMonths,
        ChartRange::OneYear,
        ChartRange::YearToDate,
        ChartRange::All,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChartRange::OneHour => "1H",
            ChartRange::OneDay => "24H",
            ChartRange::OneWeek => "7D",
            ChartRange::OneMonth => "1M",
            ChartRange::ThreeMonths => "3M",
            ChartRange::SixMonths => "6M",
            ChartRange::OneYear => "1Y",
            ChartRange::YearToDate => "YTD",
            ChartRange::All => "All",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(wanted))
    }

    /// Number of days to request from a source, `None` for "max".
    ///
    /// Year-to-date depends on today's date.
    pub fn days(self, today: chrono::NaiveDate) -> Option<u32> {
        use chrono::Datelike;
        match self {
            ChartRange::OneHour | ChartRange::OneDay => Some(1),
            ChartRange::OneWeek => Some(7),
            ChartRange::OneMonth => Some(30),
            ChartRange::ThreeMonths => Some(90),
            ChartRange::SixMonths => Some(180),
            ChartRange::OneYear => Some(365),
            ChartRange::YearToDate => Some(today.ordinal().max(1)),
            ChartRange::All => None,
        }
    }
}

impl std::fmt::Display for ChartRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
