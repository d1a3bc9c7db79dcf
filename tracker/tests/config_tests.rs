use startup_tracker::config::{Config, MonitorConfig, MIN_DURATION_SECONDS};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.monitor.duration_seconds, 120);
    assert_eq!(config.monitor.interval_seconds, 1.0);
    assert!(config
        .actions
        .backup_dir
        .to_string_lossy()
        .contains("StartupTracker_Backups"));
}

#[test]
fn test_load_from_toml() {
    let toml_content = r#"
[monitor]
duration_seconds = 45
interval_seconds = 0.5

[actions]
backup_dir = "D:/Backups/Startup"
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.monitor.duration_seconds, 45);
    assert_eq!(config.monitor.interval_seconds, 0.5);
    assert_eq!(config.actions.backup_dir.to_string_lossy(), "D:/Backups/Startup");
}

#[test]
fn test_save_config() {
    let config = Config::default();
    let file = NamedTempFile::new().unwrap();
    config.save(file.path()).unwrap();
    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.monitor.duration_seconds, config.monitor.duration_seconds);
    assert_eq!(loaded.actions.backup_dir, config.actions.backup_dir);
}

#[test]
fn test_monitor_settings_are_clamped() {
    let settings = MonitorConfig {
        duration_seconds: 1,
        interval_seconds: 0.01,
    };
    assert_eq!(settings.duration(), Duration::from_secs(MIN_DURATION_SECONDS));
    assert_eq!(settings.interval(), Duration::from_secs_f64(0.25));
}

#[test]
fn test_monitor_settings_above_floor_pass_through() {
    let settings = MonitorConfig {
        duration_seconds: 300,
        interval_seconds: 2.0,
    };
    assert_eq!(settings.duration(), Duration::from_secs(300));
    assert_eq!(settings.interval(), Duration::from_secs(2));
}
