//! coinsync runner: refresh orchestration on top of `coinsync-core`.
//!
//! This crate provides:
//! - TOML configuration with favorites persistence
//! - The sync orchestrator (cache read-through, page streaming, fallback)
//! - Debounced resorting
//! - The background refresh worker
//! - Marshaling of notifications onto the UI thread

pub mod config;
pub mod debounce;
pub mod orchestrator;
pub mod ui;
pub mod worker;

pub use config::{normalize_currency, ConfigError, SyncConfig};
pub use debounce::{ResortScheduler, QUIET_PERIOD};
pub use orchestrator::{
    BootstrapReport, RefreshOutcome, SyncError, SyncOrchestrator, SyncPhase, SyncSettings,
};
pub use ui::{ui_channel, SyncEvent, UiHandle, UiInbox};
pub use worker::{spawn_worker, RefreshWorker, WorkerCommand, TICK_INTERVAL};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<SyncOrchestrator>();
        assert_sync::<SyncOrchestrator>();
    }

    #[test]
    fn events_are_send() {
        assert_send::<SyncEvent>();
        assert_send::<UiHandle>();
        assert_send::<RefreshOutcome>();
        assert_sync::<RefreshOutcome>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<SyncConfig>();
        assert_sync::<SyncConfig>();
        assert_send::<SyncSettings>();
        assert_sync::<SyncSettings>();
    }
}
