//! Source-specific deactivation of startup entries.
//!
//! Deactivation is reversible by the operator: config-store values can be
//! re-added, relocated files live under the backup directory, and scheduled
//! jobs are disabled rather than deleted.

use std::path::Path;

use chrono::Local;
use thiserror::Error;

use crate::entry::{Source, StartupEntry};
use crate::inventory::{ConfigStore, JobScheduler, SchedulerError, StoreError, StoreScope};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Permission denied. Try running as Administrator.")]
    PermissionDenied,
    /// The target was already gone; informational, not a fault.
    #[error("{0}")]
    NotFound(String),
    /// The entry's location string is not in the shape its source implies.
    #[error("{0}")]
    InvalidFormat(String),
    /// No deactivation procedure exists for the entry's source.
    #[error("Unsupported item type.")]
    UnsupportedSource,
    /// The entry is already disabled; there is nothing left to deactivate.
    #[error("Item is already disabled or unavailable.")]
    AlreadyDisabled,
    #[error("{0}")]
    Other(String),
}

/// Deactivates `entry` according to its source. Returns the human-readable
/// success message; the caller records it and flips `enabled`, this layer
/// never mutates the entry.
pub fn deactivate(
    entry: &StartupEntry,
    store: &dyn ConfigStore,
    scheduler: &dyn JobScheduler,
    backup_dir: &Path,
) -> Result<String, ActionError> {
    match entry.source {
        Source::ConfigStoreUser | Source::ConfigStoreMachine => remove_store_value(entry, store),
        Source::StartupFolderUser | Source::StartupFolderAllUsers => {
            move_to_backup(entry, backup_dir)
        }
        Source::ScheduledJob => disable_scheduled_job(entry, scheduler),
    }
}

fn remove_store_value(entry: &StartupEntry, store: &dyn ConfigStore) -> Result<String, ActionError> {
    let (scope, key_path, value_name) = parse_store_location(&entry.location)?;
    match store.delete_value(scope, key_path, value_name) {
        Ok(()) => Ok(format!("Removed registry Run entry: {value_name}")),
        Err(StoreError::PermissionDenied) => Err(ActionError::PermissionDenied),
        Err(StoreError::NotFound) => Err(ActionError::NotFound(
            "Registry key/value not found (already removed?).".into(),
        )),
        Err(StoreError::Other(msg)) => Err(ActionError::Other(format!("Registry removal failed: {msg}"))),
    }
}

/// Splits `HKCU\Software\...\Run::Name` into scope, key path and value name.
fn parse_store_location(location: &str) -> Result<(StoreScope, &str, &str), ActionError> {
    let invalid = || ActionError::InvalidFormat("Invalid registry location format.".into());
    let (prefix, rest) = location.split_once('\\').ok_or_else(invalid)?;
    let (key_path, value_name) = rest.split_once("::").ok_or_else(invalid)?;
    let scope = StoreScope::from_prefix(prefix).ok_or_else(invalid)?;
    Ok((scope, key_path, value_name))
}

fn move_to_backup(entry: &StartupEntry, backup_dir: &Path) -> Result<String, ActionError> {
    let source = Path::new(&entry.location);
    if !source.exists() {
        return Err(ActionError::NotFound(
            "Startup file not found (already removed?).".into(),
        ));
    }

    std::fs::create_dir_all(backup_dir).map_err(io_to_action)?;
    let file_name = source.file_name().ok_or_else(|| {
        ActionError::InvalidFormat(format!("Startup file location has no file name: {}", entry.location))
    })?;

    // Never overwrite an earlier backup of the same file.
    let mut dest = backup_dir.join(file_name);
    if dest.exists() {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        dest = backup_dir.join(format!("{stem}_{stamp}{suffix}"));
    }

    move_file(source, &dest).map_err(io_to_action)?;
    Ok(format!("Moved startup file to backup: {}", dest.display()))
}

/// Rename, falling back to copy-and-delete when the backup directory sits
/// on another volume.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

fn io_to_action(err: std::io::Error) -> ActionError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => ActionError::PermissionDenied,
        std::io::ErrorKind::NotFound => ActionError::NotFound(
            "Startup file not found (already removed?).".into(),
        ),
        _ => ActionError::Other(format!("File move failed: {err}")),
    }
}

fn disable_scheduled_job(entry: &StartupEntry, scheduler: &dyn JobScheduler) -> Result<String, ActionError> {
    match scheduler.disable_job(&entry.location) {
        Ok(()) => Ok(format!("Disabled scheduled task: {}", entry.location)),
        Err(SchedulerError(message)) => {
            Err(ActionError::Other(format!("Failed to disable task: {message}")))
        }
    }
}
