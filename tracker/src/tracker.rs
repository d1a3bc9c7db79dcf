//! The tracker facade tying inventory, monitoring and actions together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::info;

use crate::actions::{self, ActionError};
use crate::entry::StartupEntry;
use crate::inventory::{self, ConfigStore, JobScheduler, StartupFolders};
use crate::monitor::{self, MonitorEvent, RunState};
use crate::snapshot::{ProcessTable, SystemProcessTable};

/// Progress events beyond this backlog are dropped; terminal events are not.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("a monitoring run is already active")]
    MonitorActive,
}

/// Owns the entry list and the backends, and enforces the one-run-at-a-time
/// rule. Presentation layers talk to this and nothing below it.
pub struct StartupTracker {
    entries: Arc<RwLock<Vec<StartupEntry>>>,
    table: Arc<Mutex<Box<dyn ProcessTable>>>,
    store: Box<dyn ConfigStore>,
    folders: Box<dyn StartupFolders>,
    scheduler: Box<dyn JobScheduler>,
    backup_dir: PathBuf,
    state: Arc<AtomicU8>,
}

impl StartupTracker {
    pub fn new(
        store: Box<dyn ConfigStore>,
        folders: Box<dyn StartupFolders>,
        scheduler: Box<dyn JobScheduler>,
        table: Box<dyn ProcessTable>,
        backup_dir: PathBuf,
    ) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            table: Arc::new(Mutex::new(table)),
            store,
            folders,
            scheduler,
            backup_dir,
            state: Arc::new(AtomicU8::new(RunState::Idle as u8)),
        }
    }

    /// Tracker wired to the real backends for this platform. Hosts without
    /// startup enumeration still get a working (empty) inventory.
    pub fn with_system_backends(backup_dir: PathBuf) -> Self {
        #[cfg(windows)]
        let tracker = Self::new(
            Box::new(inventory::WindowsConfigStore),
            Box::new(inventory::WindowsStartupFolders),
            Box::new(inventory::SchtasksScheduler),
            Box::new(SystemProcessTable::new()),
            backup_dir,
        );
        #[cfg(not(windows))]
        let tracker = Self::new(
            Box::new(inventory::UnavailableBackends),
            Box::new(inventory::UnavailableBackends),
            Box::new(inventory::UnavailableBackends),
            Box::new(SystemProcessTable::new()),
            backup_dir,
        );
        tracker
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Rebuilds the inventory from the backends, discarding prior entries
    /// and their monitoring results. Rejected while a run is active so the
    /// sampler never loses the list under its feet.
    pub async fn refresh(&self) -> Result<Vec<StartupEntry>, TrackerError> {
        let mut entries = self.entries.write().await;
        if self.run_state() != RunState::Idle {
            return Err(TrackerError::MonitorActive);
        }
        *entries = inventory::aggregate(
            self.store.as_ref(),
            self.folders.as_ref(),
            self.scheduler.as_ref(),
        );
        info!("Inventory refreshed: {} entries", entries.len());
        Ok(entries.clone())
    }

    /// Current entries, cloned so callers never observe the sampler's
    /// in-place writes mid-run.
    pub async fn entries(&self) -> Vec<StartupEntry> {
        self.entries.read().await.clone()
    }

    /// Launches one monitoring run on a background task and hands back the
    /// event channel. Rejects when a run is already active; re-entry is
    /// disallowed, not queued.
    pub fn start_monitoring(
        &self,
        duration: Duration,
        interval: Duration,
    ) -> Result<mpsc::Receiver<MonitorEvent>, TrackerError> {
        self.state
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| TrackerError::MonitorActive)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let entries = Arc::clone(&self.entries);
        let table = Arc::clone(&self.table);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            monitor::run(entries, table, state, duration, interval, tx).await;
        });
        Ok(rx)
    }

    /// Deactivates the entry at `index` and, on success, marks it disabled
    /// and records the outcome in its notes.
    pub async fn deactivate_at(&self, index: usize) -> Result<String, ActionError> {
        let target = {
            let entries = self.entries.read().await;
            match entries.get(index) {
                Some(entry) => entry.clone(),
                None => return Err(ActionError::NotFound(format!("No entry at index {index}."))),
            }
        };
        // Placeholder rows and already-deactivated entries have nothing
        // left to act on.
        if !target.is_actionable() {
            return Err(ActionError::AlreadyDisabled);
        }

        // The backend call can block on OS work; the entry lock is not held
        // across it.
        let message = actions::deactivate(
            &target,
            self.store.as_ref(),
            self.scheduler.as_ref(),
            &self.backup_dir,
        )?;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(index) {
            entry.enabled = false;
            entry.push_note(&message);
        }
        info!("Deactivated '{}': {}", target.name, message);
        Ok(message)
    }
}
