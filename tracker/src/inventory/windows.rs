//! Windows implementations of the enumeration backends.

use std::path::PathBuf;
use std::process::Command;

use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE};
use winreg::RegKey;

use super::{BackendError, ConfigStore, JobRecord, JobScheduler, SchedulerError, StartupFolders, StoreError, StoreScope};
use crate::entry::Source;

const STARTUP_SUBDIR: &str = r"Microsoft\Windows\Start Menu\Programs\Startup";

fn hive(scope: StoreScope) -> RegKey {
    match scope {
        StoreScope::User => RegKey::predef(HKEY_CURRENT_USER),
        StoreScope::Machine => RegKey::predef(HKEY_LOCAL_MACHINE),
    }
}

/// Registry-backed config store over the Run keys.
pub struct WindowsConfigStore;

impl ConfigStore for WindowsConfigStore {
    fn list_values(&self, scope: StoreScope, key_path: &str) -> Result<Vec<(String, String)>, StoreError> {
        let key = hive(scope)
            .open_subkey_with_flags(key_path, KEY_READ)
            .map_err(StoreError::from)?;
        // Unreadable individual values are skipped rather than failing the
        // whole scope.
        Ok(key
            .enum_values()
            .filter_map(|v| v.ok())
            .map(|(name, value)| (name, value.to_string()))
            .collect())
    }

    fn delete_value(&self, scope: StoreScope, key_path: &str, value_name: &str) -> Result<(), StoreError> {
        let key = hive(scope)
            .open_subkey_with_flags(key_path, KEY_SET_VALUE)
            .map_err(StoreError::from)?;
        key.delete_value(value_name).map_err(StoreError::from)
    }
}

/// The two shell startup folders, located through the environment.
pub struct WindowsStartupFolders;

impl StartupFolders for WindowsStartupFolders {
    fn folders(&self) -> Vec<(Source, PathBuf)> {
        let mut out = Vec::new();
        if let Ok(appdata) = std::env::var("APPDATA") {
            out.push((Source::StartupFolderUser, PathBuf::from(appdata).join(STARTUP_SUBDIR)));
        }
        if let Ok(programdata) = std::env::var("PROGRAMDATA") {
            out.push((Source::StartupFolderAllUsers, PathBuf::from(programdata).join(STARTUP_SUBDIR)));
        }
        out
    }
}

/// Task Scheduler backend driven through `schtasks`.
pub struct SchtasksScheduler;

impl JobScheduler for SchtasksScheduler {
    fn query_jobs(&self) -> Result<Vec<JobRecord>, BackendError> {
        let output = Command::new("schtasks")
            .args(["/Query", "/FO", "CSV", "/V"])
            .output()
            .map_err(|e| BackendError(format!("failed to run schtasks: {e}")))?;
        if !output.status.success() {
            return Err(BackendError(format!("schtasks query exited with {}", output.status)));
        }
        parse_job_csv(&String::from_utf8_lossy(&output.stdout))
    }

    fn disable_job(&self, name: &str) -> Result<(), SchedulerError> {
        let output = Command::new("schtasks")
            .args(["/Change", "/TN", name, "/DISABLE"])
            .output()
            .map_err(|e| SchedulerError(format!("failed to run schtasks: {e}")))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            "Unknown error.".to_string()
        };
        Err(SchedulerError(message))
    }
}

/// Parses verbose `schtasks` CSV output. The tool repeats the header row
/// before every task block and pads with blank lines; blanks are dropped and
/// the repeated headers fall out later because their trigger text never
/// matches a startup trigger.
fn parse_job_csv(raw: &str) -> Result<Vec<JobRecord>, BackendError> {
    let cleaned: String = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(cleaned.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| BackendError(format!("unreadable schtasks output: {e}")))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let (name_col, status_col, command_col, triggers_col) = match (
        column("TaskName"),
        column("Status"),
        column("Task To Run"),
        column("Triggers"),
    ) {
        (Some(n), Some(s), Some(c), Some(t)) => (n, s, c, t),
        _ => return Err(BackendError("unrecognized schtasks output format".into())),
    };

    let field = |record: &csv::StringRecord, idx: usize| {
        record.get(idx).unwrap_or("").trim().to_string()
    };
    Ok(reader
        .records()
        .filter_map(|r| r.ok())
        .map(|record| JobRecord {
            name: field(&record, name_col),
            status: field(&record, status_col),
            command: field(&record, command_col),
            triggers: field(&record, triggers_col),
        })
        .collect())
}
