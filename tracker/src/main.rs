use anyhow::Result;
use clap::{Parser, Subcommand};
use startup_tracker::{
    config::{Config, MonitorConfig},
    entry::StartupEntry,
    monitor::MonitorEvent,
    tracker::StartupTracker,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Inventory the programs your machine launches at startup, correlate them
/// with live processes and measure what they cost.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path (defaults to the per-user location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List startup entries from all sources
    List,
    /// Monitor matched processes' CPU/memory over an observation window
    Monitor {
        /// Observation window in seconds
        #[arg(short, long)]
        duration: Option<u64>,
        /// Sampling cadence in seconds
        #[arg(short, long)]
        interval: Option<f64>,
    },
    /// Deactivate entries by their position in `list` output
    Disable {
        /// Entry indices as shown by `list`
        #[arg(required = true)]
        indices: Vec<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tables go to stdout; keep diagnostics on stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    let tracker = StartupTracker::with_system_backends(config.actions.backup_dir.clone());

    match cli.command {
        Command::List => {
            let entries = tracker.refresh().await?;
            print_inventory(&entries);
        }

        Command::Monitor { duration, interval } => {
            let entries = tracker.refresh().await?;
            println!("Monitoring {} startup entries...", entries.len());

            let settings = MonitorConfig {
                duration_seconds: duration.unwrap_or(config.monitor.duration_seconds),
                interval_seconds: interval.unwrap_or(config.monitor.interval_seconds),
            };
            let mut events = tracker.start_monitoring(settings.duration(), settings.interval())?;

            while let Some(event) = events.recv().await {
                match event {
                    MonitorEvent::Progress { fraction, samples } => {
                        print!("\r  {:>3.0}% of window elapsed, {} sampling passes", fraction * 100.0, samples);
                        let _ = std::io::stdout().flush();
                    }
                    MonitorEvent::Done => {
                        println!();
                        break;
                    }
                    MonitorEvent::Error(message) => {
                        println!();
                        warn!("Monitoring aborted: {}", message);
                        break;
                    }
                }
            }

            print_results(&tracker.entries().await);
        }

        Command::Disable { indices } => {
            let entries = tracker.refresh().await?;
            // Outcomes are reported per entry; one failure never rolls back
            // the ones that already succeeded.
            for index in indices {
                let label = entries
                    .get(index)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| format!("entry {index}"));
                match tracker.deactivate_at(index).await {
                    Ok(message) => println!("[{index}] {label}: {message}"),
                    Err(err) => println!("[{index}] {label}: FAILED: {err}"),
                }
            }
        }
    }

    Ok(())
}

fn print_inventory(entries: &[StartupEntry]) {
    println!(
        "{:<4} {:<28} {:<24} {:<8} {}",
        "#", "NAME", "SOURCE", "ENABLED", "COMMAND"
    );
    for (idx, entry) in entries.iter().enumerate() {
        println!(
            "{:<4} {:<28} {:<24} {:<8} {}",
            idx,
            clip(&entry.name, 28),
            entry.source,
            entry.enabled,
            clip(&entry.command, 60),
        );
    }
}

fn print_results(entries: &[StartupEntry]) {
    println!(
        "{:<4} {:<28} {:>8} {:>9} {:>10} {:>9} {:>10}  {}",
        "#", "NAME", "PID", "AVG CPU%", "PEAK CPU%", "AVG MB", "PEAK MB", "NOTES"
    );
    for (idx, entry) in entries.iter().enumerate() {
        println!(
            "{:<4} {:<28} {:>8} {:>9} {:>10} {:>9} {:>10}  {}",
            idx,
            clip(&entry.name, 28),
            entry.matched_pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            fmt_stat(entry.avg_cpu),
            fmt_stat(entry.peak_cpu),
            fmt_stat(entry.avg_memory_mb),
            fmt_stat(entry.peak_memory_mb),
            entry.notes,
        );
    }
}

fn fmt_stat(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".into())
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
