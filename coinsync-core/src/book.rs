//! Coin registry and its display-ordered projection.
//!
//! The `Registry` is the canonical name → coin mapping. The `OrderedList` is
//! the sequence the table renders. Both live inside a `CoinBook` so a single
//! lock guards them together and every mutation keeps them in agreement:
//! for every name in the registry, the list slot at `positions[name]` holds
//! the same coin.
//!
//! Slots only move on `resort`. Merging a page appends unseen coins at the
//! end (arrival order) and rewrites existing slots in place.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::coin::{Coin, CoinRecord};
use crate::sort::{sort_coins, SortKey};

/// Canonical name → coin mapping.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    coins: HashMap<String, Coin>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Coin> {
        self.coins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.coins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.coins.values()
    }
}

/// Display order over the registry.
#[derive(Debug, Clone, Default)]
pub struct OrderedList {
    slots: Vec<Coin>,
    positions: HashMap<String, usize>,
}

impl OrderedList {
    pub fn as_slice(&self) -> &[Coin] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|c| c.name.as_str())
    }

    fn push(&mut self, coin: Coin) {
        self.positions.insert(coin.name.clone(), self.slots.len());
        self.slots.push(coin);
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Coin> {
        let idx = *self.positions.get(name)?;
        self.slots.get_mut(idx)
    }

    fn reindex(&mut self) {
        self.positions.clear();
        for (idx, coin) in self.slots.iter().enumerate() {
            self.positions.insert(coin.name.clone(), idx);
        }
    }
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
    }
}

/// Registry and ordered list, mutated together.
///
/// The book also remembers which settlement currency each coin's metrics
/// were last merged in, so a per-currency snapshot never carries prices
/// quoted in another currency.
#[derive(Debug, Clone, Default)]
pub struct CoinBook {
    registry: Registry,
    list: OrderedList,
    priced_in: HashMap<String, String>,
}

impl CoinBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn list(&self) -> &OrderedList {
        &self.list
    }

    pub fn get(&self, name: &str) -> Option<&Coin> {
        self.registry.get(name)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Merge one page.
    ///
    /// Unseen names get a new coin (favorite taken from `is_favorite`) and a
    /// slot at the end of the list. Known names have every source field
    /// overwritten, both in the registry and in their existing slot; the
    /// favorite mark is untouched. A name repeated within the page collapses
    /// onto one slot with the last record winning.
    ///
    /// The merged coins lose any currency tag; use `merge_priced` when the
    /// settlement currency is known.
    pub fn merge<'a, I>(&mut self, records: I, is_favorite: impl Fn(&str) -> bool) -> MergeStats
    where
        I: IntoIterator<Item = &'a CoinRecord>,
    {
        self.merge_tagged(records, None, is_favorite)
    }

    /// `merge`, recording `currency` as the quote currency of every coin in
    /// the page.
    pub fn merge_priced<'a, I>(
        &mut self,
        records: I,
        currency: &str,
        is_favorite: impl Fn(&str) -> bool,
    ) -> MergeStats
    where
        I: IntoIterator<Item = &'a CoinRecord>,
    {
        self.merge_tagged(records, Some(currency), is_favorite)
    }

    fn merge_tagged<'a, I>(
        &mut self,
        records: I,
        currency: Option<&str>,
        is_favorite: impl Fn(&str) -> bool,
    ) -> MergeStats
    where
        I: IntoIterator<Item = &'a CoinRecord>,
    {
        let mut stats = MergeStats::default();
        for record in records {
            if record.name.is_empty() {
                continue;
            }
            match currency {
                Some(c) => {
                    self.priced_in.insert(record.name.clone(), c.to_string());
                }
                None => {
                    self.priced_in.remove(&record.name);
                }
            }
            match self.registry.coins.get_mut(&record.name) {
                Some(existing) => {
                    existing.apply(record.clone());
                    let updated = existing.clone();
                    if let Some(slot) = self.list.slot_mut(&record.name) {
                        *slot = updated;
                    }
                    stats.updated += 1;
                }
                None => {
                    let coin = Coin::from_record(record.clone(), is_favorite(&record.name));
                    self.list.push(coin.clone());
                    self.registry.coins.insert(record.name.clone(), coin);
                    stats.inserted += 1;
                }
            }
        }
        stats
    }

    /// Reorder the list. The registry is unaffected.
    pub fn resort(&mut self, key: SortKey, desc: bool) {
        sort_coins(&mut self.list.slots, key, desc);
        self.list.reindex();
    }

    /// Set the favorite mark on one coin. Returns false if the name is unknown.
    pub fn set_favorite(&mut self, name: &str, favorite: bool) -> bool {
        let Some(coin) = self.registry.coins.get_mut(name) else {
            return false;
        };
        coin.favorite = favorite;
        if let Some(slot) = self.list.slot_mut(name) {
            slot.favorite = favorite;
        }
        true
    }

    /// Source records for the coins last merged in `currency`, in current
    /// list order, without local state.
    pub fn snapshot_priced(&self, currency: &str) -> Vec<CoinRecord> {
        self.list
            .slots
            .iter()
            .filter(|coin| self.priced_in(&coin.name) == Some(currency))
            .map(Coin::to_record)
            .collect()
    }

    /// Currency the coin's metrics were last merged in, if known.
    pub fn priced_in(&self, name: &str) -> Option<&str> {
        self.priced_in.get(name).map(String::as_str)
    }

    /// Coins in ascending rank order, ties by name.
    pub fn by_rank(&self) -> Vec<&Coin> {
        let mut coins: Vec<&Coin> = self.registry.iter().collect();
        coins.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
        coins
    }
}

/// Shared handle to a book.
pub type SharedBook = Arc<RwLock<CoinBook>>;

/// Read-only view for render paths. Readers never block each other.
#[derive(Clone)]
pub struct CoinBookReader {
    book: SharedBook,
}

impl CoinBookReader {
    pub fn new(book: SharedBook) -> Self {
        Self { book }
    }

    /// Hold the read lock for the lifetime of the guard.
    pub fn read(&self) -> RwLockReadGuard<'_, CoinBook> {
        self.book.read()
    }

    /// Copy of the list in display order.
    pub fn visible(&self) -> Vec<Coin> {
        self.book.read().list().as_slice().to_vec()
    }

    pub fn get(&self, name: &str) -> Option<Coin> {
        self.book.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.book.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.read().is_empty()
    }
}
