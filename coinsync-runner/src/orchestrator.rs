//! Sync orchestrator.
//!
//! Runs the refresh protocol against a `DataSource`, the two cache tiers and
//! the coin book:
//!
//! ```text
//! Idle → CheckingCache ─ hit ──→ Reconciling ──────────────┐
//!                      └ miss ─→ Fetching → StreamMerging ─┴→ Resorting → Redrawing → Idle
//! ```
//!
//! One cycle runs at a time (`refresh_lock`). The book has its own narrower
//! lock so render paths can read while a cycle is streaming. Resorts are
//! debounced: merges only mark the table dirty and `tick` schedules the
//! resort once marks stop arriving. The end of a cycle flushes any pending
//! resort.
//!
//! Page merges happen on the calling thread under the book lock. Resort and
//! redraw are handed to the UI thread through `UiHandle`, and the cycle
//! reaches `Idle` once that thread has run them.
//!
//! Lock order: `refresh_lock`, then `favorites`, then `book`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use coinsync_core::cache::{CacheKey, DataKind, DiskCacheError, Fetched, Origin, TierTtls, TieredCache, Ttl};
use coinsync_core::{
    ChartPoint, ChartRange, CoinBook, CoinBookReader, CoinRecord, DataSource, Favorites,
    GlobalSummary, MergeStats, Migrated, SharedBook, SortKey, SourceError,
};

use crate::config::{normalize_currency, ConfigError, SyncConfig, DEFAULT_CURRENCY};
use crate::debounce::{ResortScheduler, QUIET_PERIOD};
use crate::ui::{SyncEvent, UiHandle};

/// Memory lifetime of snapshots hydrated from disk at startup.
pub const BOOTSTRAP_MEMORY_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    CheckingCache,
    Reconciling,
    Fetching,
    StreamMerging,
    Resorting,
    Redrawing,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Live fetch failed and no fallback snapshot exists. The next tick
    /// retries; never fatal.
    #[error("no {what} available for {currency}: {reason}")]
    TransientFetch {
        what: &'static str,
        currency: String,
        reason: String,
    },

    /// Never returned: a corrupt disk entry is logged as this error and
    /// then read as a miss.
    #[error("cache entry '{key}' is corrupt: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("coin not found: {name}")]
    CoinNotFound { name: String },
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Configuration(_))
    }
}

/// Result of one completed refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub currency: String,
    pub origin: Origin,
    pub pages_merged: usize,
    /// Pages drained without merging because the currency changed mid-stream.
    pub pages_skipped: usize,
    pub stats: MergeStats,
    pub migrated: Vec<Migrated>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    pub coins: usize,
    pub migrated: Vec<Migrated>,
    /// Summary and chart snapshots copied into memory.
    pub preloaded: usize,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub currency: String,
    pub sort_key: SortKey,
    pub sort_desc: bool,
    pub ttls: TierTtls,
    pub quiet_period: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            sort_key: SortKey::Rank,
            sort_desc: false,
            ttls: TierTtls::MARKET,
            quiet_period: QUIET_PERIOD,
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            currency: config.currency()?,
            sort_key: config.sort_key()?,
            sort_desc: config.sort_desc,
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone)]
struct View {
    currency: String,
    sort_key: SortKey,
    sort_desc: bool,
}

pub struct SyncOrchestrator {
    source: Arc<dyn DataSource>,
    cache: TieredCache,
    book: SharedBook,
    favorites: Mutex<Favorites>,
    view: Arc<RwLock<View>>,
    ttls: TierTtls,
    refresh_lock: Mutex<()>,
    phase: Arc<Mutex<SyncPhase>>,
    scheduler: ResortScheduler,
    ui: UiHandle,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn DataSource>,
        cache: TieredCache,
        favorites: Favorites,
        settings: SyncSettings,
        ui: UiHandle,
    ) -> Self {
        Self {
            source,
            cache,
            book: Arc::new(RwLock::new(CoinBook::new())),
            favorites: Mutex::new(favorites),
            view: Arc::new(RwLock::new(View {
                currency: settings.currency,
                sort_key: settings.sort_key,
                sort_desc: settings.sort_desc,
            })),
            ttls: settings.ttls,
            refresh_lock: Mutex::new(()),
            phase: Arc::new(Mutex::new(SyncPhase::Idle)),
            scheduler: ResortScheduler::new(settings.quiet_period),
            ui,
        }
    }

    /// Validate `config` and build from it.
    pub fn from_config(
        config: &SyncConfig,
        source: Arc<dyn DataSource>,
        cache: TieredCache,
        ui: UiHandle,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let settings = SyncSettings::from_config(config)?;
        Ok(Self::new(source, cache, config.favorites.clone(), settings, ui))
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn reader(&self) -> CoinBookReader {
        CoinBookReader::new(Arc::clone(&self.book))
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    pub fn currency(&self) -> String {
        self.view.read().currency.clone()
    }

    pub fn sort(&self) -> (SortKey, bool) {
        let view = self.view.read();
        (view.sort_key, view.sort_desc)
    }

    pub fn favorites(&self) -> Favorites {
        self.favorites.lock().clone()
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            tracing::debug!(from = ?*current, to = ?phase, "sync phase");
            *current = phase;
        }
    }

    // ── Startup ──────────────────────────────────────────────────────

    /// Hydrate from disk before the first live fetch.
    ///
    /// Loads the coins snapshot into the book (sorted), migrates legacy
    /// favorites, and copies summary and chart snapshots for the active
    /// currency into memory with a short TTL.
    pub fn bootstrap(&self) -> BootstrapReport {
        let _cycle = self.refresh_lock.lock();
        let currency = self.currency();
        let mut report = BootstrapReport::default();

        self.set_phase(SyncPhase::CheckingCache);
        let coins_key = CacheKey::coins(&currency);
        match self.cache.disk().get::<Vec<CoinRecord>>(&coins_key) {
            Ok(snapshot) if !snapshot.is_empty() => {
                self.set_phase(SyncPhase::Reconciling);
                report.coins = self.merge_and_mark(&snapshot, &currency).total();
            }
            Ok(_) => {}
            Err(e) => log_disk_miss(&coins_key, e),
        }
        report.migrated = self.migrate_favorites();

        let summary_key = CacheKey::global_summary(&currency);
        if let Some(summary) = self.cache.recover(&summary_key, GlobalSummary::is_empty) {
            self.cache
                .memory()
                .set(&summary_key, summary, Ttl::After(BOOTSTRAP_MEMORY_TTL));
            report.preloaded += 1;
        }
        report.preloaded += self.preload_charts(&currency);

        self.finish_cycle();
        tracing::info!(
            coins = report.coins,
            migrated = report.migrated.len(),
            preloaded = report.preloaded,
            "bootstrap complete"
        );
        report
    }

    fn preload_charts(&self, currency: &str) -> usize {
        let prefix = CacheKey::prefix(DataKind::ChartSeries, currency);
        let entries = match self.cache.disk().status() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "could not list disk cache");
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries.iter().filter(|e| !e.expired && e.key.starts_with(&prefix)) {
            let Some(key) = CacheKey::parse(&entry.key) else { continue };
            if let Some(series) = self.cache.recover(&key, |s: &Vec<ChartPoint>| s.is_empty()) {
                self.cache
                    .memory()
                    .set(&key, series, Ttl::After(BOOTSTRAP_MEMORY_TTL));
                loaded += 1;
            }
        }
        loaded
    }

    // ── Refresh cycle ────────────────────────────────────────────────

    /// Run one full refresh cycle for the active currency.
    ///
    /// Memory hit: reconcile from the snapshot, no network. Miss: stream
    /// pages from the source and merge each as it arrives. If the stream
    /// yields nothing, fall back to the disk snapshot.
    pub fn refresh_coins(&self) -> Result<RefreshOutcome, SyncError> {
        let _cycle = self.refresh_lock.lock();
        let result = self.run_cycle();
        self.finish_cycle();

        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    currency = %outcome.currency,
                    origin = %outcome.origin,
                    pages = outcome.pages_merged,
                    inserted = outcome.stats.inserted,
                    updated = outcome.stats.updated,
                    "refresh complete"
                );
                self.ui.notify(SyncEvent::RefreshFinished(outcome.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed");
                self.ui.notify(SyncEvent::RefreshFailed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Drop the memory snapshot so the next cycle goes to the source.
    pub fn force_refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.cache.invalidate(&CacheKey::coins(&self.currency()));
        self.refresh_coins()
    }

    fn run_cycle(&self) -> Result<RefreshOutcome, SyncError> {
        let currency = self.currency();
        let key = CacheKey::coins(&currency);

        self.set_phase(SyncPhase::CheckingCache);
        if let Some(snapshot) = self.cache.peek(&key, |s: &Vec<CoinRecord>| s.is_empty()) {
            tracing::debug!(%currency, coins = snapshot.len(), "coins served from memory");
            self.set_phase(SyncPhase::Reconciling);
            let stats = self.merge_and_mark(&snapshot, &currency);
            return Ok(self.outcome(currency, Origin::Memory, 1, 0, stats));
        }

        self.set_phase(SyncPhase::Fetching);
        let pages = match self.source.fetch_all_pages(&currency) {
            Ok(rx) => rx,
            Err(e) => return self.recover_coins(currency, &key, e.to_string()),
        };

        self.set_phase(SyncPhase::StreamMerging);
        let mut merged = 0;
        let mut skipped = 0;
        let mut stats = MergeStats::default();
        for page in pages {
            if page.is_empty() {
                continue;
            }
            if self.currency() != currency {
                skipped += 1;
                tracing::debug!(%currency, "currency changed, dropping page");
                continue;
            }
            let page_stats = self.merge_and_mark(&page, &currency);
            stats += page_stats;
            merged += 1;
            self.store_coins_snapshot(&key, &currency);
            tracing::debug!(
                page = merged,
                inserted = page_stats.inserted,
                updated = page_stats.updated,
                "merged page"
            );
        }

        if merged == 0 && skipped == 0 {
            return self.recover_coins(currency, &key, "stream closed before any page".into());
        }
        Ok(self.outcome(currency, Origin::Live, merged, skipped, stats))
    }

    fn recover_coins(
        &self,
        currency: String,
        key: &CacheKey,
        reason: String,
    ) -> Result<RefreshOutcome, SyncError> {
        tracing::warn!(%currency, %reason, "live fetch failed, falling back to disk");
        match self.cache.recover(key, |s: &Vec<CoinRecord>| s.is_empty()) {
            Some(snapshot) => {
                self.set_phase(SyncPhase::Reconciling);
                let stats = self.merge_and_mark(&snapshot, &currency);
                Ok(self.outcome(currency, Origin::Disk, 1, 0, stats))
            }
            None => Err(SyncError::TransientFetch {
                what: "coins",
                currency,
                reason,
            }),
        }
    }

    fn outcome(
        &self,
        currency: String,
        origin: Origin,
        pages_merged: usize,
        pages_skipped: usize,
        stats: MergeStats,
    ) -> RefreshOutcome {
        RefreshOutcome {
            currency,
            origin,
            pages_merged,
            pages_skipped,
            stats,
            migrated: self.migrate_favorites(),
        }
    }

    fn merge_and_mark(&self, records: &[CoinRecord], currency: &str) -> MergeStats {
        let (stats, total) = {
            let favorites = self.favorites.lock();
            let mut book = self.book.write();
            let stats = book.merge_priced(records, currency, |name| favorites.contains(name));
            (stats, book.len())
        };
        self.scheduler.mark(Instant::now());
        self.ui.notify(SyncEvent::CoinsMerged { stats, total });
        stats
    }

    /// Persist the coins whose metrics were last merged in `currency`.
    fn store_coins_snapshot(&self, key: &CacheKey, currency: &str) {
        let snapshot = self.book.read().snapshot_priced(currency);
        if snapshot.is_empty() {
            return;
        }
        self.cache.store(key, &snapshot, self.ttls);
    }

    /// Flush a pending resort onto the UI thread, or go idle if there is
    /// nothing to resort.
    fn finish_cycle(&self) {
        match self.scheduler.take_now() {
            Some(coalesced) => {
                self.set_phase(SyncPhase::Resorting);
                self.submit_resort(coalesced);
            }
            None => self.set_phase(SyncPhase::Idle),
        }
    }

    fn submit_resort(&self, coalesced: usize) {
        let job = ResortJob {
            book: Arc::clone(&self.book),
            view: Arc::clone(&self.view),
            phase: Arc::clone(&self.phase),
            ui: self.ui.clone(),
            coalesced,
        };
        self.ui.run_on_ui_thread_or_inline(move || job.run());
    }

    // ── Debounce ─────────────────────────────────────────────────────

    /// Mark the table for resorting on a later tick.
    pub fn request_resort(&self) {
        self.scheduler.mark(Instant::now());
    }

    /// Schedule a resort and redraw on the UI thread if the table is dirty
    /// and has been quiet long enough. Returns whether one was scheduled.
    ///
    /// Safe to call from any thread. Phase is only reported when no cycle
    /// is running; an in-flight cycle owns the phase.
    pub fn tick(&self, now: Instant) -> bool {
        let Some(coalesced) = self.scheduler.take_due(now) else {
            return false;
        };
        if self.refresh_lock.try_lock().is_some() {
            self.set_phase(SyncPhase::Resorting);
        }
        self.submit_resort(coalesced);
        true
    }

    // ── View settings ────────────────────────────────────────────────

    /// Switch the active currency. Returns whether it changed.
    ///
    /// Does not fetch; pages still streaming for the old currency are
    /// dropped.
    pub fn set_currency(&self, currency: &str) -> Result<bool, SyncError> {
        let code = normalize_currency(currency)?;
        {
            let mut view = self.view.write();
            if view.currency == code {
                return Ok(false);
            }
            view.currency = code.clone();
        }
        tracing::info!(currency = %code, "currency changed");
        self.ui.notify(SyncEvent::CurrencyChanged(code));
        Ok(true)
    }

    pub fn set_sort(&self, key: SortKey, desc: bool) {
        {
            let mut view = self.view.write();
            view.sort_key = key;
            view.sort_desc = desc;
        }
        self.request_resort();
    }

    // ── Other read-throughs ──────────────────────────────────────────

    pub fn refresh_global_summary(&self) -> Result<Fetched<GlobalSummary>, SyncError> {
        let currency = self.currency();
        let key = CacheKey::global_summary(&currency);
        let fetched = self
            .cache
            .read_through(&key, self.ttls, GlobalSummary::is_empty, || {
                self.source.fetch_global_summary(&currency)
            })
            .map_err(|e| transient("global summary", &currency, e))?;

        if fetched.value.is_empty() {
            return Err(SyncError::TransientFetch {
                what: "global summary",
                currency,
                reason: "source returned an empty summary".into(),
            });
        }
        self.ui.notify(SyncEvent::SummaryUpdated(fetched.value.clone()));
        Ok(fetched)
    }

    pub fn chart_series(
        &self,
        coin: &str,
        range: ChartRange,
    ) -> Result<Fetched<Vec<ChartPoint>>, SyncError> {
        let currency = self.currency();
        let key = CacheKey::chart_series(&currency, coin, range.label());
        let fetched = self
            .cache
            .read_through(&key, self.ttls, |s: &Vec<ChartPoint>| s.is_empty(), || {
                self.source.fetch_chart(coin, &currency, range)
            })
            .map_err(|e| match e {
                SourceError::NotFound { name } => SyncError::CoinNotFound { name },
                other => transient("chart series", &currency, other),
            })?;

        if fetched.value.is_empty() {
            return Err(SyncError::TransientFetch {
                what: "chart series",
                currency,
                reason: format!("no points for {coin} over {range}"),
            });
        }
        Ok(fetched)
    }

    /// Current price straight from the source, bypassing both caches.
    pub fn price(&self, name: &str, currency: Option<&str>) -> Result<f64, SyncError> {
        let currency = match currency {
            Some(c) => normalize_currency(c)?,
            None => self.currency(),
        };
        self.source
            .fetch_price(name, &currency)
            .map_err(|e| match e {
                SourceError::NotFound { name } => SyncError::CoinNotFound { name },
                other => transient("price", &currency, other),
            })
    }

    // ── Favorites ────────────────────────────────────────────────────

    /// Flip the favorite mark on a known coin. Returns the new state, or
    /// `None` if no coin has that name.
    pub fn toggle_favorite(&self, name: &str) -> Option<bool> {
        let snapshot = {
            let mut favorites = self.favorites.lock();
            let mut book = self.book.write();
            book.get(name)?;
            let state = favorites.toggle(name);
            book.set_favorite(name, state);
            (state, favorites.clone())
        };

        let (state, favorites) = snapshot;
        self.ui.notify(SyncEvent::FavoritesChanged(favorites));
        self.ui.notify(SyncEvent::Redraw);
        Some(state)
    }

    /// Move any legacy symbol favorites that now match a known coin.
    pub fn migrate_favorites(&self) -> Vec<Migrated> {
        let mut favorites = self.favorites.lock();
        if favorites.is_converged() {
            return Vec::new();
        }
        let migrated = {
            let mut book = self.book.write();
            favorites.migrate(&mut book)
        };
        if !migrated.is_empty() {
            tracing::info!(count = migrated.len(), "migrated legacy favorites");
            self.ui.notify(SyncEvent::FavoritesChanged(favorites.clone()));
        }
        migrated
    }
}

/// Resort plus redraw, run wherever the UI handle puts it.
///
/// Phase only moves forward from the step this job owns, so a cycle that
/// started in the meantime keeps its own phase.
struct ResortJob {
    book: SharedBook,
    view: Arc<RwLock<View>>,
    phase: Arc<Mutex<SyncPhase>>,
    ui: UiHandle,
    coalesced: usize,
}

impl ResortJob {
    fn run(self) {
        let (key, desc) = {
            let view = self.view.read();
            (view.sort_key, view.sort_desc)
        };
        let coins = {
            let mut book = self.book.write();
            book.resort(key, desc);
            book.len()
        };
        tracing::debug!(%key, desc, coins, coalesced = self.coalesced, "resorted");
        self.ui.notify(SyncEvent::Resorted {
            coins,
            coalesced: self.coalesced,
        });

        advance(&self.phase, SyncPhase::Resorting, SyncPhase::Redrawing);
        self.ui.notify(SyncEvent::Redraw);
        advance(&self.phase, SyncPhase::Redrawing, SyncPhase::Idle);
    }
}

fn advance(phase: &Mutex<SyncPhase>, from: SyncPhase, to: SyncPhase) {
    let mut current = phase.lock();
    if *current == from {
        tracing::debug!(from = ?from, to = ?to, "sync phase");
        *current = to;
    }
}

fn transient(what: &'static str, currency: &str, err: impl std::fmt::Display) -> SyncError {
    SyncError::TransientFetch {
        what,
        currency: currency.to_string(),
        reason: err.to_string(),
    }
}

fn log_disk_miss(key: &CacheKey, err: DiskCacheError) {
    match err {
        DiskCacheError::Corrupt { key, reason } => {
            let err = SyncError::CacheCorruption { key, reason };
            tracing::warn!(error = %err, "treating corrupt snapshot as a miss");
        }
        other => tracing::debug!(key = %key, error = %other, "no disk snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinsync_core::cache::{DiskCache, MemoryCache};
    use coinsync_core::{ChartPoint, GlobalSummary, Page};
    use std::sync::mpsc::{self, Receiver};

    /// Source that always fails.
    struct Offline;

    impl DataSource for Offline {
        fn name(&self) -> &str {
            "offline"
        }
        fn fetch_all_pages(&self, _: &str) -> Result<Receiver<Page>, SourceError> {
            Err(SourceError::NetworkUnreachable("offline".into()))
        }
        fn fetch_global_summary(&self, _: &str) -> Result<GlobalSummary, SourceError> {
            Err(SourceError::NetworkUnreachable("offline".into()))
        }
        fn fetch_price(&self, name: &str, _: &str) -> Result<f64, SourceError> {
            Err(SourceError::NotFound { name: name.into() })
        }
        fn fetch_chart(&self, _: &str, _: &str, _: ChartRange) -> Result<Vec<ChartPoint>, SourceError> {
            Ok(Vec::new())
        }
    }

    /// Source whose page stream closes immediately.
    struct Silent;

    impl DataSource for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn fetch_all_pages(&self, _: &str) -> Result<Receiver<Page>, SourceError> {
            let (_tx, rx) = mpsc::channel();
            Ok(rx)
        }
        fn fetch_global_summary(&self, _: &str) -> Result<GlobalSummary, SourceError> {
            Ok(GlobalSummary::default())
        }
        fn fetch_price(&self, _: &str, _: &str) -> Result<f64, SourceError> {
            Ok(1.0)
        }
        fn fetch_chart(&self, _: &str, _: &str, _: ChartRange) -> Result<Vec<ChartPoint>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(source: Arc<dyn DataSource>, dir: &std::path::Path) -> SyncOrchestrator {
        let cache = TieredCache::new(Arc::new(MemoryCache::default()), DiskCache::new(dir));
        SyncOrchestrator::new(
            source,
            cache,
            Favorites::default(),
            SyncSettings::default(),
            UiHandle::detached(),
        )
    }

    #[test]
    fn offline_without_snapshot_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Offline), dir.path());

        let err = orch.refresh_coins().unwrap_err();
        assert!(matches!(err, SyncError::TransientFetch { what: "coins", .. }));
        assert!(!err.is_fatal());
        assert_eq!(orch.phase(), SyncPhase::Idle);
    }

    #[test]
    fn empty_stream_without_snapshot_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        assert!(matches!(
            orch.refresh_coins(),
            Err(SyncError::TransientFetch { .. })
        ));
    }

    #[test]
    fn empty_summary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        assert!(orch.refresh_global_summary().is_err());
    }

    #[test]
    fn price_not_found_maps_to_coin_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Offline), dir.path());
        assert!(matches!(
            orch.price("Nope", None),
            Err(SyncError::CoinNotFound { .. })
        ));
        assert!(matches!(
            orch.price("Bitcoin", Some("$$")),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn set_currency_normalizes_and_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        assert!(!orch.set_currency("usd").unwrap());
        assert!(orch.set_currency("eur").unwrap());
        assert_eq!(orch.currency(), "EUR");
    }

    #[test]
    fn tick_without_marks_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        assert!(!orch.tick(Instant::now()));
        orch.set_sort(SortKey::Price, true);
        assert!(orch.tick(Instant::now() + Duration::from_secs(1)));
        assert_eq!(orch.phase(), SyncPhase::Idle);
    }

    #[test]
    fn corrupt_snapshot_bootstraps_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcache.coins_by_name_usd.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let orch = orchestrator(Arc::new(Offline), dir.path());

        let report = orch.bootstrap();
        assert_eq!(report.coins, 0);
        assert!(dir.path().join("fcache.coins_by_name_usd.json.quarantined").exists());
        assert_eq!(orch.phase(), SyncPhase::Idle);
    }

    #[test]
    fn detached_resort_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        orch.merge_and_mark(
            &[
                CoinRecord { name: "B".into(), rank: 2, ..CoinRecord::default() },
                CoinRecord { name: "A".into(), rank: 1, ..CoinRecord::default() },
            ],
            "USD",
        );
        orch.finish_cycle();

        let names: Vec<String> = orch.book.read().list().names().map(str::to_string).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(orch.phase(), SyncPhase::Idle);
    }

    #[test]
    fn toggle_unknown_coin_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(Silent), dir.path());
        assert_eq!(orch.toggle_favorite("Bitcoin"), None);
        assert!(orch.favorites().names.is_empty());
    }
}
