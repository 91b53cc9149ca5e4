//! coinsync core: coin domain types, data sources, cache tiers, registry merge.
//!
//! This crate holds everything the sync engine reasons about:
//! - Coin records, global summaries, chart series
//! - The `DataSource` trait and the CoinGecko adapter
//! - Memory and disk cache tiers with a read-through combinator
//! - The registry / ordered-list pair and its merge algorithm
//! - Sorting and favorites migration

pub mod book;
pub mod cache;
pub mod coin;
pub mod favorites;
pub mod sort;
pub mod source;

pub use book::{CoinBook, CoinBookReader, MergeStats, OrderedList, Registry, SharedBook};
pub use coin::{ChartPoint, ChartRange, Coin, CoinRecord, GlobalSummary, Page};
pub use favorites::{Favorites, Migrated};
pub use sort::{sort_coins, SortKey, UnknownSortKey};
pub use source::{DataSource, SourceChoice, SourceError, UnknownSource};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the refresh worker touches crosses
    /// threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Coin>();
        require_sync::<Coin>();
        require_send::<CoinRecord>();
        require_sync::<CoinRecord>();
        require_send::<GlobalSummary>();
        require_sync::<GlobalSummary>();
        require_send::<CoinBook>();
        require_sync::<CoinBook>();
        require_send::<CoinBookReader>();
        require_sync::<CoinBookReader>();
        require_send::<Favorites>();
        require_sync::<Favorites>();

        require_send::<cache::MemoryCache>();
        require_sync::<cache::MemoryCache>();
        require_send::<cache::DiskCache>();
        require_sync::<cache::DiskCache>();
        require_send::<cache::TieredCache>();
        require_sync::<cache::TieredCache>();

        require_send::<Box<dyn DataSource>>();
        require_sync::<Box<dyn DataSource>>();
        require_send::<source::CoinGeckoSource>();
        require_sync::<source::CoinGeckoSource>();
    }

    /// Sources never see favorite state: the trait only hands out records.
    #[test]
    fn records_carry_no_favorite() {
        let coin = Coin::from_record(CoinRecord::default(), true);
        let json = serde_json::to_value(coin.to_record()).unwrap();
        assert!(json.get("favorite").is_none());
    }
}
