//! Background refresh worker. All fetching and merging runs here.
//!
//! The worker waits on its command channel with a short timeout; every wake-up
//! ticks the resort debounce and, when the refresh interval has elapsed,
//! starts a new cycle. Results reach the UI through the orchestrator's
//! `UiHandle`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::orchestrator::SyncOrchestrator;

/// How often the worker wakes to tick the debounce.
pub const TICK_INTERVAL: Duration = Duration::from_millis(25);

/// Commands sent from the UI to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Refresh,
    /// Skip the memory tier and go to the source.
    ForceRefresh,
    RefreshSummary,
    SetCurrency(String),
    Shutdown,
}

/// Spawn the worker thread. It exits on `Shutdown` or when every sender is
/// dropped.
pub fn spawn_worker(
    orchestrator: Arc<SyncOrchestrator>,
    rx: Receiver<WorkerCommand>,
    refresh_every: Option<Duration>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("coinsync-refresh".into())
        .spawn(move || worker_loop(&orchestrator, rx, refresh_every))
}

fn worker_loop(
    orchestrator: &SyncOrchestrator,
    rx: Receiver<WorkerCommand>,
    refresh_every: Option<Duration>,
) {
    let mut next_refresh = next_due(refresh_every);

    loop {
        match rx.recv_timeout(TICK_INTERVAL) {
            Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => {
                if handle_command(orchestrator, cmd) {
                    next_refresh = next_due(refresh_every);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        orchestrator.tick(now);

        if next_refresh.is_some_and(|due| now >= due) {
            run_refresh(orchestrator, false);
            next_refresh = next_due(refresh_every);
        }
    }
    tracing::debug!("refresh worker stopped");
}

/// When the next automatic refresh is due. An interval too long to
/// represent means never.
fn next_due(every: Option<Duration>) -> Option<Instant> {
    every.and_then(|every| Instant::now().checked_add(every))
}

/// Returns true if a coins refresh ran.
fn handle_command(orchestrator: &SyncOrchestrator, cmd: WorkerCommand) -> bool {
    match cmd {
        WorkerCommand::Refresh => {
            run_refresh(orchestrator, false);
            true
        }
        WorkerCommand::ForceRefresh => {
            run_refresh(orchestrator, true);
            true
        }
        WorkerCommand::RefreshSummary => {
            if let Err(e) = orchestrator.refresh_global_summary() {
                tracing::warn!(error = %e, "global summary refresh failed");
            }
            false
        }
        WorkerCommand::SetCurrency(currency) => match orchestrator.set_currency(&currency) {
            Ok(true) => {
                run_refresh(orchestrator, false);
                if let Err(e) = orchestrator.refresh_global_summary() {
                    tracing::warn!(error = %e, "global summary refresh failed");
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(%currency, error = %e, "rejected currency change");
                false
            }
        },
        WorkerCommand::Shutdown => false, // handled in loop
    }
}

fn run_refresh(orchestrator: &SyncOrchestrator, force: bool) {
    let result = if force {
        orchestrator.force_refresh()
    } else {
        orchestrator.refresh_coins()
    };
    // The orchestrator already reported the outcome to the UI.
    if let Err(e) = result {
        tracing::debug!(error = %e, "refresh cycle ended without data");
    }
}

/// Owned worker: a command sender plus the thread, joined on drop.
pub struct RefreshWorker {
    tx: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    pub fn spawn(
        orchestrator: Arc<SyncOrchestrator>,
        refresh_every: Option<Duration>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_worker(orchestrator, rx, refresh_every)?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Returns false if the worker has already stopped.
    pub fn send(&self, cmd: WorkerCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    /// Ask the worker to stop and wait for it. Any in-flight cycle finishes
    /// first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
