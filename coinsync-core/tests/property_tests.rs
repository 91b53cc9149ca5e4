//! Property tests for registry merge invariants.
//!
//! Uses proptest to verify:
//! 1. Idempotence: merging a page twice equals merging it once
//! 2. Order preservation: slots never move on merge; new names append
//! 3. Favorite survival: metric refreshes never clear a favorite mark
//! 4. Registry/list agreement after any sequence of merges and resorts
//! 5. Migration convergence: a second pass is a no-op

use std::collections::HashSet;

use proptest::prelude::*;

use coinsync_core::{CoinBook, CoinRecord, Favorites, SortKey};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_record() -> impl Strategy<Value = CoinRecord> {
    (0u8..30, 1u32..1000, 0.0..100_000.0_f64, -50.0..50.0_f64).prop_map(|(id, rank, price, change)| {
        CoinRecord {
            id: format!("coin-{id}"),
            name: format!("Coin {id}"),
            symbol: format!("C{}", id % 10),
            rank,
            price,
            percent_change_24h: change,
            ..CoinRecord::default()
        }
    })
}

fn arb_page() -> impl Strategy<Value = Vec<CoinRecord>> {
    prop::collection::vec(arb_record(), 0..20)
}

fn arb_pages() -> impl Strategy<Value = Vec<Vec<CoinRecord>>> {
    prop::collection::vec(arb_page(), 1..6)
}

fn arb_sort() -> impl Strategy<Value = (SortKey, bool)> {
    (prop::sample::select(SortKey::ALL.to_vec()), any::<bool>())
}

fn no_favorites(_: &str) -> bool {
    false
}

fn order(book: &CoinBook) -> Vec<String> {
    book.list().names().map(str::to_string).collect()
}

// ── 1. Idempotence ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn merging_twice_equals_once(seed in arb_pages(), page in arb_page()) {
        let mut once = CoinBook::new();
        for p in &seed {
            once.merge(p, no_favorites);
        }
        once.merge(&page, no_favorites);

        let mut twice = once.clone();
        twice.merge(&page, no_favorites);

        prop_assert_eq!(once.list().as_slice(), twice.list().as_slice());
    }
}

// ── 2. Order preservation ────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_only_appends(seed in arb_pages(), page in arb_page()) {
        let mut book = CoinBook::new();
        for p in &seed {
            book.merge(p, no_favorites);
        }
        let before = order(&book);

        book.merge(&page, no_favorites);
        let after = order(&book);

        prop_assert!(after.len() >= before.len());
        prop_assert_eq!(&after[..before.len()], &before[..]);

        // Appended names are exactly the unseen ones, in first-arrival order.
        let mut seen: HashSet<String> = before.iter().cloned().collect();
        let expected_tail: Vec<String> = page
            .iter()
            .filter(|r| seen.insert(r.name.clone()))
            .map(|r| r.name.clone())
            .collect();
        prop_assert_eq!(&after[before.len()..], &expected_tail[..]);
    }
}

// ── 3. Favorite survival ─────────────────────────────────────────────

proptest! {
    #[test]
    fn favorites_survive_refreshes(first in arb_page(), updates in arb_pages()) {
        let mut book = CoinBook::new();
        book.merge(&first, no_favorites);

        let marked: Vec<String> = order(&book).into_iter().step_by(2).collect();
        for name in &marked {
            book.set_favorite(name, true);
        }

        for page in &updates {
            book.merge(page, no_favorites);
        }

        for name in &marked {
            prop_assert!(book.get(name).unwrap().favorite);
            let slot = book.list().position(name).unwrap();
            prop_assert!(book.list().as_slice()[slot].favorite);
        }
    }
}

// ── 4. Registry/list agreement ───────────────────────────────────────

proptest! {
    #[test]
    fn registry_and_list_agree(pages in arb_pages(), sorts in prop::collection::vec(arb_sort(), 0..4)) {
        let mut book = CoinBook::new();
        let mut sorts = sorts.into_iter();
        for page in &pages {
            book.merge(page, no_favorites);
            if let Some((key, desc)) = sorts.next() {
                book.resort(key, desc);
            }
        }

        let distinct: HashSet<&str> = pages.iter().flatten().map(|r| r.name.as_str()).collect();
        prop_assert_eq!(book.registry().len(), distinct.len());
        prop_assert_eq!(book.list().len(), distinct.len());
        for (idx, coin) in book.list().as_slice().iter().enumerate() {
            prop_assert_eq!(book.list().position(&coin.name), Some(idx));
            prop_assert_eq!(book.get(&coin.name), Some(coin));
        }
    }

    #[test]
    fn resort_orders_by_key_then_rank(pages in arb_pages(), (key, desc) in arb_sort()) {
        let mut book = CoinBook::new();
        for page in &pages {
            book.merge(page, no_favorites);
        }
        book.resort(key, desc);

        for w in book.list().as_slice().windows(2) {
            let primary = key.compare(&w[0], &w[1]);
            let primary = if desc { primary.reverse() } else { primary };
            prop_assert!(primary.then_with(|| w[0].rank.cmp(&w[1].rank)).is_le());
        }
    }
}

// ── 5. Migration convergence ─────────────────────────────────────────

proptest! {
    #[test]
    fn migration_converges(page in arb_page(), symbols in prop::collection::btree_set("[a-cC][0-9]", 0..6)) {
        let mut book = CoinBook::new();
        book.merge(&page, no_favorites);
        let mut favorites = Favorites { legacy_symbols: symbols, ..Favorites::default() };

        let migrated = favorites.migrate(&mut book);
        for m in &migrated {
            prop_assert!(favorites.contains(&m.name));
            prop_assert!(book.get(&m.name).unwrap().favorite);
            prop_assert!(!favorites.legacy_symbols.contains(&m.symbol));
        }

        let snapshot = favorites.clone();
        prop_assert!(favorites.migrate(&mut book).is_empty());
        prop_assert_eq!(favorites, snapshot);
    }
}
