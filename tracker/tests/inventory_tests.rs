use std::fs;
use std::path::PathBuf;

use startup_tracker::entry::Source;
use startup_tracker::inventory::{
    aggregate, BackendError, ConfigStore, JobRecord, JobScheduler, SchedulerError, StartupFolders,
    StoreError, StoreScope,
};
use tempfile::TempDir;

struct FakeStore {
    user: Vec<(String, String)>,
    machine_denied: bool,
}

impl ConfigStore for FakeStore {
    fn list_values(&self, scope: StoreScope, key_path: &str) -> Result<Vec<(String, String)>, StoreError> {
        match scope {
            StoreScope::User => Ok(self.user.clone()),
            StoreScope::Machine => {
                if key_path.contains("WOW6432Node") {
                    Err(StoreError::NotFound)
                } else if self.machine_denied {
                    Err(StoreError::PermissionDenied)
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    fn delete_value(&self, _scope: StoreScope, _key_path: &str, _value_name: &str) -> Result<(), StoreError> {
        Err(StoreError::Other("read-only fake".into()))
    }
}

struct FakeFolders {
    dirs: Vec<(Source, PathBuf)>,
}

impl StartupFolders for FakeFolders {
    fn folders(&self) -> Vec<(Source, PathBuf)> {
        self.dirs.clone()
    }
}

struct FakeScheduler {
    records: Vec<JobRecord>,
    fail: bool,
}

impl JobScheduler for FakeScheduler {
    fn query_jobs(&self) -> Result<Vec<JobRecord>, BackendError> {
        if self.fail {
            Err(BackendError("scheduler offline".into()))
        } else {
            Ok(self.records.clone())
        }
    }

    fn disable_job(&self, _name: &str) -> Result<(), SchedulerError> {
        Ok(())
    }
}

fn empty_store() -> FakeStore {
    FakeStore { user: Vec::new(), machine_denied: false }
}

fn no_folders() -> FakeFolders {
    FakeFolders { dirs: Vec::new() }
}

fn no_jobs() -> FakeScheduler {
    FakeScheduler { records: Vec::new(), fail: false }
}

fn job(name: &str, status: &str, command: &str, triggers: &str) -> JobRecord {
    JobRecord {
        name: name.to_string(),
        status: status.to_string(),
        command: command.to_string(),
        triggers: triggers.to_string(),
    }
}

#[test]
fn test_config_store_entry_shape() {
    let store = FakeStore {
        user: vec![("Updater".into(), "C:\\Apps\\updater.exe".into())],
        machine_denied: false,
    };
    let entries = aggregate(&store, &no_folders(), &no_jobs());
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.source, Source::ConfigStoreUser);
    assert_eq!(
        entry.location,
        "HKCU\\Software\\Microsoft\\Windows\\CurrentVersion\\Run::Updater"
    );
    assert_eq!(entry.command, "C:\\Apps\\updater.exe");
    assert!(entry.enabled);
}

#[test]
fn test_denied_scope_leaves_placeholder() {
    let store = FakeStore { user: Vec::new(), machine_denied: true };
    let entries = aggregate(&store, &no_folders(), &no_jobs());
    assert_eq!(entries.len(), 1);
    let marker = &entries[0];
    assert!(marker.name.starts_with("(access denied)"));
    assert!(!marker.enabled);
    assert_eq!(marker.source, Source::ConfigStoreMachine);
    assert_eq!(
        marker.location,
        "HKLM\\Software\\Microsoft\\Windows\\CurrentVersion\\Run"
    );
}

#[test]
fn test_dedup_keeps_first_occurrence() {
    let store = FakeStore {
        user: vec![
            ("App".into(), "first.exe".into()),
            ("App".into(), "second.exe".into()),
        ],
        machine_denied: false,
    };
    let entries = aggregate(&store, &no_folders(), &no_jobs());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].command, "first.exe");
}

#[test]
fn test_folder_files_become_entries() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("Slack.lnk"), b"link").unwrap();
    fs::write(dir.path().join("Notes.lnk"), b"link").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();

    let folders = FakeFolders {
        dirs: vec![(Source::StartupFolderUser, dir.path().to_path_buf())],
    };
    let entries = aggregate(&empty_store(), &folders, &no_jobs());

    // The nested directory is not a startup file.
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(entry.source, Source::StartupFolderUser);
        assert_eq!(entry.command, entry.location);
    }
    let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["Notes", "Slack"]);
}

#[test]
fn test_missing_folder_yields_nothing() {
    let folders = FakeFolders {
        dirs: vec![(
            Source::StartupFolderAllUsers,
            PathBuf::from("/definitely/not/here/startup"),
        )],
    };
    let entries = aggregate(&empty_store(), &folders, &no_jobs());
    assert!(entries.is_empty());
}

#[test]
fn test_job_trigger_filter() {
    let scheduler = FakeScheduler {
        records: vec![
            job("OneDrive Update", "Ready", "C:\\od.exe", "At Log On of any user"),
            job("Nightly Backup", "Ready", "C:\\bk.exe", "Daily at 03:00"),
            job("Telemetry", "Disabled", "C:\\tel.exe", "AT STARTUP"),
            job("", "Ready", "C:\\ghost.exe", "At startup"),
            // Verbose CSV output repeats its header row per task block.
            job("TaskName", "Status", "Task To Run", "Triggers"),
        ],
        fail: false,
    };
    let entries = aggregate(&empty_store(), &no_folders(), &scheduler);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "OneDrive Update");
    assert_eq!(entries[0].location, "OneDrive Update");
    assert!(entries[0].enabled);
    assert_eq!(entries[1].name, "Telemetry");
    assert!(!entries[1].enabled);
}

#[test]
fn test_job_without_command_describes_triggers() {
    let scheduler = FakeScheduler {
        records: vec![job("Sync", "Ready", "", "At startup")],
        fail: false,
    };
    let entries = aggregate(&empty_store(), &no_folders(), &scheduler);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].command, "(see task) triggers=At startup");
}

#[test]
fn test_failing_scheduler_does_not_abort_aggregation() {
    let store = FakeStore {
        user: vec![("Keep".into(), "C:\\keep.exe".into())],
        machine_denied: false,
    };
    let scheduler = FakeScheduler { records: Vec::new(), fail: true };
    let entries = aggregate(&store, &no_folders(), &scheduler);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Keep");
}

#[test]
fn test_backend_order_is_fixed() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("FromFolder.lnk"), b"link").unwrap();

    let store = FakeStore {
        user: vec![("FromStore".into(), "C:\\s.exe".into())],
        machine_denied: false,
    };
    let folders = FakeFolders {
        dirs: vec![(Source::StartupFolderUser, dir.path().to_path_buf())],
    };
    let scheduler = FakeScheduler {
        records: vec![job("FromJobs", "Ready", "C:\\j.exe", "At startup")],
        fail: false,
    };

    let entries = aggregate(&store, &folders, &scheduler);
    let sources: Vec<Source> = entries.iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        [Source::ConfigStoreUser, Source::StartupFolderUser, Source::ScheduledJob]
    );
}
