//! Shared helpers for runner integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use coinsync_core::cache::{DiskCache, MemoryCache, TieredCache};
use coinsync_core::{ChartPoint, ChartRange, CoinRecord, DataSource, Favorites, GlobalSummary, Page, SourceError};
use coinsync_runner::{ui_channel, SyncOrchestrator, SyncSettings, UiInbox};

/// What the next `fetch_all_pages` call does.
pub enum Script {
    /// Emit these pages, then close.
    Pages(Vec<Page>),
    /// Hand back a stream the test feeds by hand.
    Gated(Receiver<Page>),
    /// Fail to start the stream.
    Fail(String),
}

/// A `DataSource` driven by a queue of scripts.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    page_calls: AtomicUsize,
    summary: Mutex<Option<GlobalSummary>>,
    chart: Mutex<Vec<ChartPoint>>,
    price_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Queue a gated stream and return its feeding end.
    pub fn push_gated(&self) -> Sender<Page> {
        let (tx, rx) = mpsc::channel();
        self.push(Script::Gated(rx));
        tx
    }

    pub fn set_summary(&self, summary: Option<GlobalSummary>) {
        *self.summary.lock() = summary;
    }

    pub fn set_chart(&self, points: Vec<ChartPoint>) {
        *self.chart.lock() = points;
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

impl DataSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_all_pages(&self, _currency: &str) -> Result<Receiver<Page>, SourceError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.lock().pop_front() {
            Some(Script::Pages(pages)) => {
                let (tx, rx) = mpsc::channel();
                for page in pages {
                    let _ = tx.send(page);
                }
                Ok(rx)
            }
            Some(Script::Gated(rx)) => Ok(rx),
            Some(Script::Fail(reason)) => Err(SourceError::NetworkUnreachable(reason)),
            None => Err(SourceError::Other("no script queued".into())),
        }
    }

    fn fetch_global_summary(&self, _currency: &str) -> Result<GlobalSummary, SourceError> {
        self.summary
            .lock()
            .clone()
            .ok_or_else(|| SourceError::NetworkUnreachable("summary offline".into()))
    }

    fn fetch_price(&self, name: &str, _currency: &str) -> Result<f64, SourceError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "Bitcoin" | "BTC" => Ok(64_000.0),
            _ => Err(SourceError::NotFound { name: name.into() }),
        }
    }

    fn fetch_chart(
        &self,
        _name: &str,
        _currency: &str,
        _range: ChartRange,
    ) -> Result<Vec<ChartPoint>, SourceError> {
        let points = self.chart.lock().clone();
        if points.is_empty() {
            Err(SourceError::NetworkUnreachable("chart offline".into()))
        } else {
            Ok(points)
        }
    }
}

pub fn record(name: &str, symbol: &str, rank: u32, price: f64) -> CoinRecord {
    CoinRecord {
        id: name.to_lowercase().replace(' ', "-"),
        name: name.into(),
        symbol: symbol.into(),
        rank,
        price,
        market_cap: price * 1_000.0,
        last_updated: "1700000000".into(),
        ..CoinRecord::default()
    }
}

pub fn cache_in(dir: &Path) -> TieredCache {
    TieredCache::new(Arc::new(MemoryCache::default()), DiskCache::new(dir))
}

pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub inbox: UiInbox,
}

pub fn harness(dir: &Path, favorites: Favorites) -> Harness {
    let source = ScriptedSource::new();
    let (ui, inbox) = ui_channel();
    let orchestrator = SyncOrchestrator::new(
        Arc::clone(&source) as Arc<dyn DataSource>,
        cache_in(dir),
        favorites,
        SyncSettings::default(),
        ui,
    );
    Harness {
        source,
        orchestrator: Arc::new(orchestrator),
        inbox,
    }
}

/// Names in current display order.
pub fn display_order(orchestrator: &SyncOrchestrator) -> Vec<String> {
    orchestrator
        .reader()
        .visible()
        .into_iter()
        .map(|c| c.name)
        .collect()
}
