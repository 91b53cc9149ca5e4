//! Favorite marks and migration off the legacy symbol-keyed index.
//!
//! Favorites used to be keyed by ticker symbol, which collides (several
//! coins share a symbol). They are now keyed by coin name. Legacy entries
//! move across once a coin with a matching symbol is known; the first match
//! in rank order wins.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::book::CoinBook;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    #[serde(default)]
    pub names: BTreeSet<String>,
    /// Deprecated symbol-keyed entries still waiting to migrate.
    #[serde(default, rename = "symbols")]
    pub legacy_symbols: BTreeSet<String>,
}

/// One legacy entry that moved across.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migrated {
    pub symbol: String,
    pub name: String,
}

impl Favorites {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Flip the mark for `name`, returning the new state.
    pub fn toggle(&mut self, name: &str) -> bool {
        if self.names.remove(name) {
            false
        } else {
            self.names.insert(name.to_string());
            true
        }
    }

    /// Nothing left to migrate.
    pub fn is_converged(&self) -> bool {
        self.legacy_symbols.is_empty()
    }

    /// Move legacy symbol entries onto coin names.
    ///
    /// Walks the book in rank order; each coin whose symbol matches a legacy
    /// entry (ignoring case) gets its name added and its coin marked, and the
    /// legacy entry is removed. Symbols with no matching coin stay for a
    /// later pass. Running again after convergence changes nothing.
    pub fn migrate(&mut self, book: &mut CoinBook) -> Vec<Migrated> {
        if self.legacy_symbols.is_empty() {
            return Vec::new();
        }

        // Spellings differing only in case all belong to the same coin.
        let mut pending: HashMap<String, Vec<String>> = HashMap::new();
        for symbol in &self.legacy_symbols {
            pending
                .entry(symbol.to_lowercase())
                .or_default()
                .push(symbol.clone());
        }

        let matches: Vec<(Vec<String>, String)> = book
            .by_rank()
            .into_iter()
            .filter_map(|coin| {
                let originals = pending.remove(&coin.symbol.to_lowercase())?;
                Some((originals, coin.name.clone()))
            })
            .collect();

        let mut migrated = Vec::with_capacity(matches.len());
        for (originals, name) in matches {
            self.names.insert(name.clone());
            book.set_favorite(&name, true);
            for symbol in originals {
                self.legacy_symbols.remove(&symbol);
                tracing::debug!(%symbol, %name, "migrated legacy favorite");
                migrated.push(Migrated {
                    symbol,
                    name: name.clone(),
                });
            }
        }
        migrated
    }
}
