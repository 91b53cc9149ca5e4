//! Marshaling from background threads onto the thread that owns the UI.
//!
//! Background code holds a cloneable `UiHandle`; the UI thread owns the
//! `UiInbox` and drains it from its main loop. Closures queued with
//! `run_on_ui_thread` execute during the drain, on the draining thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use coinsync_core::{Favorites, GlobalSummary, MergeStats};

use crate::orchestrator::RefreshOutcome;

/// Notifications the UI may react to.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// One page (or cached snapshot) was merged into the registry.
    CoinsMerged { stats: MergeStats, total: usize },
    /// The ordered list was re-sorted.
    Resorted { coins: usize, coalesced: usize },
    /// The table should be redrawn.
    Redraw,
    SummaryUpdated(GlobalSummary),
    RefreshFinished(RefreshOutcome),
    RefreshFailed { message: String },
    /// Favorites changed and should be persisted.
    FavoritesChanged(Favorites),
    CurrencyChanged(String),
}

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

enum UiMessage {
    Task(UiTask),
    Event(SyncEvent),
}

/// Sending half. Cheap to clone; safe to use from any thread.
#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiMessage>,
}

impl UiHandle {
    /// Queue `f` to run on the UI thread. Returns false if the UI is gone.
    pub fn run_on_ui_thread<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(UiMessage::Task(Box::new(f))).is_ok()
    }

    /// Queue `f` for the UI thread; with no UI attached (the inbox is gone),
    /// run it on the caller instead.
    pub fn run_on_ui_thread_or_inline<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(mpsc::SendError(UiMessage::Task(task))) = self.tx.send(UiMessage::Task(Box::new(f))) {
            task();
        }
    }

    pub fn notify(&self, event: SyncEvent) -> bool {
        self.tx.send(UiMessage::Event(event)).is_ok()
    }

    /// A handle whose messages go nowhere, for headless use.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel();
        Self { tx }
    }
}

/// Receiving half, owned by the UI thread.
pub struct UiInbox {
    rx: Receiver<UiMessage>,
}

impl UiInbox {
    /// Run every queued task and return every queued event, without blocking.
    pub fn drain(&self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => Self::dispatch(msg, &mut events),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Block up to `timeout` for the first message, then drain the rest.
    pub fn wait(&self, timeout: Duration) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Self::dispatch(msg, &mut events),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events;
            }
        }
        events.extend(self.drain());
        events
    }

    fn dispatch(msg: UiMessage, events: &mut Vec<SyncEvent>) {
        match msg {
            UiMessage::Task(task) => task(),
            UiMessage::Event(event) => events.push(event),
        }
    }
}

pub fn ui_channel() -> (UiHandle, UiInbox) {
    let (tx, rx) = mpsc::channel();
    (UiHandle { tx }, UiInbox { rx })
}
