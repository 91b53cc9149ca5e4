//! coinsync CLI: live coin table, price lookups, and cache management.
//!
//! Commands:
//! - `watch`: stream market data into a sorted table, refreshing on an interval
//! - `price`: one-off price lookup, uncached
//! - `global`: market-wide summary
//! - `chart`: price history summary for one coin
//! - `favorite`: toggle a coin's favorite mark
//! - `cache status` / `cache clean`: inspect or remove cache files
//! - `reset`: remove cache files and the config file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use coinsync_core::cache::{DiskCache, Janitor, MemoryCache, TieredCache, SWEEP_INTERVAL};
use coinsync_core::{ChartRange, Coin, DataSource, Favorites, GlobalSummary};
use coinsync_runner::{
    ui_channel, RefreshWorker, SyncConfig, SyncEvent, SyncOrchestrator, UiInbox, WorkerCommand,
};

#[derive(Parser)]
#[command(name = "coinsync", about = "coinsync: live cryptocurrency prices with a tiered cache")]
struct Cli {
    /// Config file. Defaults to <config dir>/coinsync/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory. Overrides the config file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream coins into a sorted table and keep it refreshed.
    Watch {
        /// Settlement currency (e.g. USD, EUR). Overrides the config file.
        #[arg(long)]
        currency: Option<String>,

        /// Rows to print.
        #[arg(long, default_value_t = 25)]
        limit: usize,

        /// Exit after the first refresh cycle.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Print the current price of a coin, bypassing the cache.
    Price {
        /// Coin name or symbol.
        name: String,

        #[arg(long)]
        currency: Option<String>,
    },
    /// Print the market-wide summary.
    Global,
    /// Summarize a coin's price history.
    Chart {
        /// Coin name.
        coin: String,

        /// One of 1H, 24H, 7D, 1M, 3M, 6M, 1Y, YTD, All.
        #[arg(long, default_value = "1Y")]
        range: String,
    },
    /// Toggle a coin's favorite mark (the coin must be in the cached table).
    Favorite {
        name: String,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Remove every cache file and the config file.
    Reset {
        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries with size and expiry.
    Status,
    /// Remove every cache file.
    Clean,
}

struct Paths {
    config: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl Paths {
    fn cache_dir(&self, config: &SyncConfig) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| config.cache_dir_or(default_cache_dir()))
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = Paths {
        config: cli.config.unwrap_or_else(default_config_path),
        cache_dir: cli.cache_dir,
    };

    match cli.command {
        Commands::Watch {
            currency,
            limit,
            once,
        } => run_watch(&paths, currency, limit, once),
        Commands::Price { name, currency } => run_price(&paths, &name, currency.as_deref()),
        Commands::Global => run_global(&paths),
        Commands::Chart { coin, range } => run_chart(&paths, &coin, &range),
        Commands::Favorite { name } => run_favorite(&paths, &name),
        Commands::Cache { action } => {
            let config = SyncConfig::load(&paths.config)?;
            let cache = DiskCache::new(paths.cache_dir(&config));
            match action {
                CacheAction::Status => run_cache_status(&cache),
                CacheAction::Clean => run_cache_clean(&cache),
            }
        }
        Commands::Reset { confirm } => run_reset(&paths, confirm),
    }
}

/// `DEBUG` set to anything turns on debug logging; otherwise `RUST_LOG`,
/// defaulting to warnings only.
fn init_tracing() {
    let filter = if std::env::var_os("DEBUG").is_some() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coinsync")
        .join("config.toml")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("coinsync")
}

/// Everything a command needs to talk to the orchestrator.
struct Session {
    orchestrator: Arc<SyncOrchestrator>,
    inbox: UiInbox,
    _janitor: Janitor,
}

impl Session {
    fn open(config: &SyncConfig, cache_dir: PathBuf) -> Result<Self> {
        let source: Arc<dyn DataSource> = Arc::from(config.source_choice()?.build()?);

        let memory = Arc::new(MemoryCache::default());
        let janitor = memory
            .start_janitor(SWEEP_INTERVAL)
            .context("starting cache janitor")?;
        let cache = TieredCache::new(memory, DiskCache::new(cache_dir));

        let (ui, inbox) = ui_channel();
        let orchestrator = SyncOrchestrator::from_config(config, source, cache, ui)?;
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            inbox,
            _janitor: janitor,
        })
    }

    /// Wait for queued disk writes before the process exits.
    fn close(self) {
        if !self.orchestrator.cache().disk().flush(Duration::from_secs(5)) {
            tracing::warn!("exiting with disk cache writes still pending");
        }
    }
}

/// Persist favorites without touching fields overridden on the command line.
fn save_favorites(path: &Path, favorites: Favorites) -> Result<()> {
    let mut on_disk = SyncConfig::load(path)?;
    on_disk.favorites = favorites;
    on_disk
        .save(path)
        .with_context(|| format!("saving favorites to {}", path.display()))
}

fn run_watch(paths: &Paths, currency: Option<String>, limit: usize, once: bool) -> Result<()> {
    let mut config = SyncConfig::load(&paths.config)?;
    if let Some(currency) = currency {
        config.currency = currency;
    }
    let session = Session::open(&config, paths.cache_dir(&config))?;
    let orchestrator = Arc::clone(&session.orchestrator);

    let report = orchestrator.bootstrap();
    // This thread is the UI thread; run the queued resort before printing.
    session.inbox.drain();
    if !report.migrated.is_empty() {
        save_favorites(&paths.config, orchestrator.favorites())?;
    }
    if report.coins > 0 {
        print_table(&orchestrator.reader().visible(), limit, &orchestrator.currency());
    }

    let worker = RefreshWorker::spawn(Arc::clone(&orchestrator), config.refresh_interval())
        .context("starting refresh worker")?;
    worker.send(WorkerCommand::Refresh);
    worker.send(WorkerCommand::RefreshSummary);

    loop {
        let events = session.inbox.wait(Duration::from_millis(100));
        orchestrator.tick(Instant::now());

        let mut redraw = false;
        let mut done = false;
        for event in events {
            match event {
                SyncEvent::Redraw => redraw = true,
                SyncEvent::SummaryUpdated(summary) => print_global(&summary, &orchestrator.currency()),
                SyncEvent::FavoritesChanged(favorites) => save_favorites(&paths.config, favorites)?,
                SyncEvent::RefreshFinished(outcome) => {
                    tracing::info!(
                        origin = %outcome.origin,
                        pages = outcome.pages_merged,
                        coins = outcome.stats.total(),
                        "refresh finished"
                    );
                    done = once;
                }
                SyncEvent::RefreshFailed { message } => {
                    eprintln!("Refresh failed: {message}");
                    done = once;
                }
                SyncEvent::CoinsMerged { .. }
                | SyncEvent::Resorted { .. }
                | SyncEvent::CurrencyChanged(_) => {}
            }
        }

        if redraw {
            print_table(&orchestrator.reader().visible(), limit, &orchestrator.currency());
        }
        if done {
            break;
        }
    }

    worker.shutdown();
    session.close();
    Ok(())
}

fn run_price(paths: &Paths, name: &str, currency: Option<&str>) -> Result<()> {
    let config = SyncConfig::load(&paths.config)?;
    let session = Session::open(&config, paths.cache_dir(&config))?;
    let orchestrator = &session.orchestrator;

    let currency = currency.map(str::to_string).unwrap_or_else(|| orchestrator.currency());
    let price = orchestrator.price(name, Some(&currency))?;
    println!("{} {}", format_price(price), currency.to_ascii_uppercase());
    session.close();
    Ok(())
}

fn run_global(paths: &Paths) -> Result<()> {
    let config = SyncConfig::load(&paths.config)?;
    let session = Session::open(&config, paths.cache_dir(&config))?;
    let fetched = session.orchestrator.refresh_global_summary()?;
    print_global(&fetched.value, &session.orchestrator.currency());
    tracing::debug!(origin = %fetched.origin, "global summary");
    session.close();
    Ok(())
}

fn run_chart(paths: &Paths, coin: &str, range: &str) -> Result<()> {
    let Some(range) = ChartRange::from_label(range) else {
        let valid: Vec<&str> = ChartRange::ALL.iter().map(|r| r.label()).collect();
        bail!("unknown chart range '{range}'. Valid: {}", valid.join(", "));
    };

    let config = SyncConfig::load(&paths.config)?;
    let session = Session::open(&config, paths.cache_dir(&config))?;
    let fetched = session.orchestrator.chart_series(coin, range)?;
    let points = &fetched.value;

    let (min, max) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.value), hi.max(p.value))
    });
    let first = points.first().map(|p| p.value).unwrap_or_default();
    let last = points.last().map(|p| p.value).unwrap_or_default();
    let change = if first != 0.0 { (last - first) / first * 100.0 } else { 0.0 };

    println!("{coin} over {range} ({} points, from {})", points.len(), fetched.origin);
    println!("  First:  {}", format_price(first));
    println!("  Last:   {}", format_price(last));
    println!("  Low:    {}", format_price(min));
    println!("  High:   {}", format_price(max));
    println!("  Change: {change:+.2}%");
    session.close();
    Ok(())
}

fn run_favorite(paths: &Paths, name: &str) -> Result<()> {
    let config = SyncConfig::load(&paths.config)?;
    let session = Session::open(&config, paths.cache_dir(&config))?;
    let orchestrator = &session.orchestrator;
    orchestrator.bootstrap();

    let Some(state) = orchestrator.toggle_favorite(name) else {
        bail!("unknown coin '{name}' (run `coinsync watch` first to populate the cache)");
    };
    save_favorites(&paths.config, orchestrator.favorites())?;
    println!("{name}: {}", if state { "favorited" } else { "unfavorited" });
    session.close();
    Ok(())
}

fn run_cache_status(cache: &DiskCache) -> Result<()> {
    let entries = cache.status()?;
    if entries.is_empty() {
        println!("Cache is empty: {}", cache.cache_dir().display());
        return Ok(());
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!("Cache: {}", cache.cache_dir().display());
    println!("Entries: {}", entries.len());
    println!("Total size: {}", format_size(total));
    println!();
    println!("{:<40} {:>10} {:<20} {}", "Key", "Size", "Stored", "Expires");
    println!("{}", "-".repeat(92));
    for entry in &entries {
        let expires = if entry.expired {
            "expired".to_string()
        } else {
            entry.expires_at.format("%Y-%m-%d %H:%M:%S").to_string()
        };
        println!(
            "{:<40} {:>10} {:<20} {}",
            entry.key,
            format_size(entry.size_bytes),
            entry.stored_at.format("%Y-%m-%d %H:%M:%S"),
            expires
        );
    }
    Ok(())
}

fn run_cache_clean(cache: &DiskCache) -> Result<()> {
    let removed = cache.clean()?;
    for path in &removed {
        println!("Removed: {}", path.display());
    }
    println!("Done. Removed {} file(s).", removed.len());
    Ok(())
}

fn run_reset(paths: &Paths, confirm: bool) -> Result<()> {
    let config = SyncConfig::load(&paths.config)?;
    let cache = DiskCache::new(paths.cache_dir(&config));

    if !confirm {
        println!("Would remove cache files in: {}", cache.cache_dir().display());
        if paths.config.exists() {
            println!("Would remove config: {}", paths.config.display());
        }
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    run_cache_clean(&cache)?;
    if paths.config.exists() {
        std::fs::remove_file(&paths.config)
            .with_context(|| format!("removing {}", paths.config.display()))?;
        println!("Removed: {}", paths.config.display());
    }
    Ok(())
}

fn print_table(coins: &[Coin], limit: usize, currency: &str) {
    println!();
    println!(
        "{:>5} {:<1} {:<22} {:<8} {:>16} {:>9} {:>20}",
        "Rank", "", "Name", "Symbol", format!("Price ({currency})"), "24h %", "Market Cap"
    );
    println!("{}", "-".repeat(86));
    for coin in coins.iter().take(limit) {
        println!(
            "{:>5} {:<1} {:<22} {:<8} {:>16} {:>+8.2}% {:>20}",
            coin.rank,
            if coin.favorite { "*" } else { "" },
            truncate(&coin.name, 22),
            coin.symbol,
            format_price(coin.price),
            coin.percent_change_24h,
            format_large(coin.market_cap)
        );
    }
}

fn print_global(summary: &GlobalSummary, currency: &str) {
    println!();
    println!("Market Cap:     {} {currency}", format_large(summary.total_market_cap));
    println!("24H Volume:     {} {currency}", format_large(summary.total_volume_24h));
    println!("BTC Dominance:  {:.2}%", summary.btc_dominance);
    println!("Currencies:     {}", summary.active_currencies);
    println!("Markets:        {}", summary.active_markets);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.2}")
    } else {
        format!("{price:.6}")
    }
}

fn format_large(value: f64) -> String {
    if value >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if value >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        format!("{value:.0}")
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
