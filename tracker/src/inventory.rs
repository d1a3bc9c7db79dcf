//! Startup inventory: enumeration backends and aggregation

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::entry::{Source, StartupEntry};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{SchtasksScheduler, WindowsConfigStore, WindowsStartupFolders};

/// Scope of a configuration-store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    User,
    Machine,
}

impl StoreScope {
    /// Prefix used in entry locations (`HKCU\...::Name`).
    pub fn prefix(self) -> &'static str {
        match self {
            StoreScope::User => "HKCU",
            StoreScope::Machine => "HKLM",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "HKCU" => Some(StoreScope::User),
            "HKLM" => Some(StoreScope::Machine),
            _ => None,
        }
    }

    fn source(self) -> Source {
        match self {
            StoreScope::User => Source::ConfigStoreUser,
            StoreScope::Machine => Source::ConfigStoreMachine,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("key or value not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => StoreError::PermissionDenied,
            std::io::ErrorKind::NotFound => StoreError::NotFound,
            _ => StoreError::Other(err.to_string()),
        }
    }
}

/// A whole enumeration backend could not be queried. The backend then
/// contributes no entries; aggregation of the others continues.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Failure reported by the job scheduler's own disable operation, carrying
/// whatever diagnostic text the scheduler produced.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SchedulerError(pub String);

/// Key/value configuration store holding launch commands, scoped per-user or
/// per-machine (the registry Run keys on Windows).
pub trait ConfigStore: Send + Sync {
    fn list_values(&self, scope: StoreScope, key_path: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Deletes the single named value, never the key holding it.
    fn delete_value(&self, scope: StoreScope, key_path: &str, value_name: &str) -> Result<(), StoreError>;
}

/// Filesystem startup folders (per-user and all-users).
pub trait StartupFolders: Send + Sync {
    /// The fixed (source, directory) pairs to scan, in scan order.
    fn folders(&self) -> Vec<(Source, PathBuf)>;

    /// Files directly inside `dir`. An absent directory is an empty listing,
    /// not an error.
    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let reader = match std::fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(_) => return Vec::new(),
        };
        reader
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub name: String,
    pub status: String,
    pub command: String,
    pub triggers: String,
}

/// Job scheduler (the Task Scheduler on Windows).
pub trait JobScheduler: Send + Sync {
    fn query_jobs(&self) -> Result<Vec<JobRecord>, BackendError>;
    fn disable_job(&self, name: &str) -> Result<(), SchedulerError>;
}

/// Fallback for hosts where startup enumeration is not implemented; every
/// source reports unavailable and the inventory stays empty, which is a
/// valid (if useless) state.
pub struct UnavailableBackends;

impl ConfigStore for UnavailableBackends {
    fn list_values(&self, _scope: StoreScope, _key_path: &str) -> Result<Vec<(String, String)>, StoreError> {
        Err(StoreError::Other("config store not supported on this platform".into()))
    }

    fn delete_value(&self, _scope: StoreScope, _key_path: &str, _value_name: &str) -> Result<(), StoreError> {
        Err(StoreError::Other("config store not supported on this platform".into()))
    }
}

impl StartupFolders for UnavailableBackends {
    fn folders(&self) -> Vec<(Source, PathBuf)> {
        Vec::new()
    }
}

impl JobScheduler for UnavailableBackends {
    fn query_jobs(&self) -> Result<Vec<JobRecord>, BackendError> {
        Err(BackendError("job scheduler not supported on this platform".into()))
    }

    fn disable_job(&self, _name: &str) -> Result<(), SchedulerError> {
        Err(SchedulerError("job scheduler not supported on this platform".into()))
    }
}

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
const RUN_KEY_WOW64: &str = r"Software\WOW6432Node\Microsoft\Windows\CurrentVersion\Run";

/// Config-store scopes scanned for launch commands, in fixed order.
pub fn store_locations() -> [(StoreScope, &'static str); 3] {
    [
        (StoreScope::User, RUN_KEY),
        (StoreScope::Machine, RUN_KEY),
        (StoreScope::Machine, RUN_KEY_WOW64),
    ]
}

/// Collects startup entries from all three backends and deduplicates by
/// (source, location), keeping the first occurrence. A failing backend
/// contributes nothing; the others are still collected.
pub fn aggregate(
    store: &dyn ConfigStore,
    folders: &dyn StartupFolders,
    scheduler: &dyn JobScheduler,
) -> Vec<StartupEntry> {
    let mut entries = config_store_entries(store);
    entries.extend(folder_entries(folders));
    entries.extend(job_entries(scheduler));

    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert((e.source, e.location.clone())));
    entries
}

fn config_store_entries(store: &dyn ConfigStore) -> Vec<StartupEntry> {
    let mut entries = Vec::new();
    for (scope, key_path) in store_locations() {
        match store.list_values(scope, key_path) {
            Ok(values) => {
                for (name, data) in values {
                    let location = format!("{}\\{}::{}", scope.prefix(), key_path, name);
                    entries.push(StartupEntry::new(name, scope.source(), location, data, true));
                }
            }
            Err(StoreError::PermissionDenied) => {
                // Leave a marker so the operator can tell an unreadable
                // scope from an empty one.
                let key = format!("{}\\{}", scope.prefix(), key_path);
                entries.push(StartupEntry::placeholder(
                    format!("(access denied) {key}"),
                    scope.source(),
                    key,
                ));
            }
            Err(StoreError::NotFound) => {}
            Err(err) => warn!("Config store {}\\{} unavailable: {}", scope.prefix(), key_path, err),
        }
    }
    entries
}

fn folder_entries(folders: &dyn StartupFolders) -> Vec<StartupEntry> {
    let mut entries = Vec::new();
    for (source, dir) in folders.folders() {
        for path in folders.list_files(&dir) {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let location = path.to_string_lossy().into_owned();
            entries.push(StartupEntry::new(name, source, location.clone(), location, true));
        }
    }
    entries
}

fn job_entries(scheduler: &dyn JobScheduler) -> Vec<StartupEntry> {
    let records = match scheduler.query_jobs() {
        Ok(records) => records,
        Err(err) => {
            warn!("Job scheduler unavailable: {}", err);
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for record in records {
        if record.name.is_empty() || !is_startup_trigger(&record.triggers) {
            continue;
        }
        let enabled = !record.status.trim().eq_ignore_ascii_case("disabled");
        let command = if record.command.is_empty() {
            format!("(see task) triggers={}", record.triggers)
        } else {
            record.command
        };
        entries.push(StartupEntry::new(
            record.name.clone(),
            Source::ScheduledJob,
            record.name,
            command,
            enabled,
        ));
    }
    entries
}

/// A job counts as a startup candidate only if its trigger text says it runs
/// at logon or boot.
fn is_startup_trigger(triggers: &str) -> bool {
    let triggers = triggers.to_lowercase();
    triggers.contains("at log on") || triggers.contains("at startup")
}
