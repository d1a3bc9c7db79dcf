//! The concurrent resource-sampling engine.
//!
//! One run per invocation: snapshot, match unmatched entries, sample every
//! tracked pid, report progress, sleep to cadence, repeat until the deadline.
//! Results are written into the shared entry list; the caller observes the
//! run through a bounded event channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::entry::StartupEntry;
use crate::matcher::match_entry;
use crate::snapshot::{ProcessTable, ResourceSample, SampleError};

/// Engine state, stored in an atomic so starting a run is a single
/// compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Finalizing = 2,
}

impl RunState {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RunState::Running,
            2 => RunState::Finalizing,
            _ => RunState::Idle,
        }
    }
}

/// Events pushed to the observer channel during a run. `Progress` is lossy
/// (dropped when the channel is full); `Done` and `Error` are terminal and
/// always delivered if the receiver is alive.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Progress { fraction: f64, samples: u64 },
    Done,
    Error(String),
}

/// Per-pid accumulator, alive from first match until the process disappears
/// or the run ends.
#[derive(Debug, Default)]
struct TrackingState {
    cpu_sum: f64,
    cpu_peak: f64,
    mem_sum: u64,
    mem_peak: u64,
    samples: u32,
    denied_noted: bool,
}

impl TrackingState {
    fn record(&mut self, sample: ResourceSample) {
        self.cpu_sum += sample.cpu_percent;
        self.cpu_peak = self.cpu_peak.max(sample.cpu_percent);
        self.mem_sum += sample.memory_bytes;
        self.mem_peak = self.mem_peak.max(sample.memory_bytes);
        self.samples += 1;
    }

    /// Writes averages and peaks into the entry. Zero samples finalize as
    /// zeros rather than dividing by zero.
    fn finalize_into(&self, entry: &mut StartupEntry) {
        let n = f64::from(self.samples.max(1));
        entry.avg_cpu = Some(self.cpu_sum / n);
        entry.peak_cpu = Some(self.cpu_peak);
        entry.avg_memory_mb = Some(bytes_to_mb(self.mem_sum as f64 / n));
        entry.peak_memory_mb = Some(bytes_to_mb(self.mem_peak as f64));
    }
}

fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / (1024.0 * 1024.0)
}

/// Drives one monitoring run to completion, then drops the engine back to
/// `Idle`. The caller is expected to have already moved the state atomic to
/// `Running`; this function owns every later transition.
pub async fn run(
    entries: Arc<RwLock<Vec<StartupEntry>>>,
    table: Arc<Mutex<Box<dyn ProcessTable>>>,
    state: Arc<AtomicU8>,
    duration: Duration,
    interval: Duration,
    events: mpsc::Sender<MonitorEvent>,
) {
    info!("Monitoring run started: window {:?}, cadence {:?}", duration, interval);
    match sample_until_deadline(&entries, &table, &state, duration, interval, &events).await {
        Ok(samples) => {
            info!("Monitoring run complete after {} sampling passes", samples);
            let _ = events.send(MonitorEvent::Done).await;
        }
        Err(message) => {
            warn!("Monitoring run aborted: {}", message);
            let _ = events.send(MonitorEvent::Error(message)).await;
        }
    }
    state.store(RunState::Idle as u8, Ordering::SeqCst);
}

async fn sample_until_deadline(
    entries: &RwLock<Vec<StartupEntry>>,
    table: &Mutex<Box<dyn ProcessTable>>,
    state: &AtomicU8,
    duration: Duration,
    interval: Duration,
    events: &mpsc::Sender<MonitorEvent>,
) -> Result<u64, String> {
    let start = Instant::now();
    let deadline = start + duration;

    // Results from an earlier run are discarded before sampling begins.
    {
        let mut entries = entries.write().await;
        for entry in entries.iter_mut() {
            entry.reset_monitoring();
        }
    }

    // Accumulators keyed by pid, plus the index of the entry each pid
    // belongs to. Entry indices stay valid because refresh is rejected
    // while a run is active.
    let mut tracked: HashMap<u32, TrackingState> = HashMap::new();
    let mut entry_of: HashMap<u32, usize> = HashMap::new();
    let mut passes: u64 = 0;

    while Instant::now() < deadline {
        let iteration_started = Instant::now();

        // Fresh snapshot every pass so processes created after the run
        // began are still discoverable.
        let records = {
            let mut table = table
                .lock()
                .map_err(|_| "process table lock poisoned".to_string())?;
            table.snapshot()
        };

        {
            let mut entries = entries.write().await;

            // Match entries that have no pid yet. A pid is never reassigned
            // within the run, even after the process exits.
            for (idx, entry) in entries.iter_mut().enumerate() {
                if !entry.enabled || entry.matched_pid.is_some() {
                    continue;
                }
                if let Some(pid) = match_entry(entry, &records) {
                    entry.matched_pid = Some(pid);
                    entry.matched_process_name =
                        records.iter().find(|r| r.pid == pid).map(|r| r.name.clone());
                    tracked.insert(pid, TrackingState::default());
                    entry_of.insert(pid, idx);
                    debug!("Matched '{}' to pid {}", entry.name, pid);
                }
            }

            // Sample every tracked pid.
            let mut dead = Vec::new();
            {
                let mut table = table
                    .lock()
                    .map_err(|_| "process table lock poisoned".to_string())?;
                for (&pid, tracking) in tracked.iter_mut() {
                    match table.sample(pid) {
                        Ok(sample) => tracking.record(sample),
                        Err(SampleError::Gone) => dead.push(pid),
                        Err(SampleError::AccessDenied) => {
                            if !tracking.denied_noted {
                                if let Some(&idx) = entry_of.get(&pid) {
                                    entries[idx].push_note(
                                        "Access denied during sampling (some stats may be missing).",
                                    );
                                }
                                tracking.denied_noted = true;
                            }
                        }
                    }
                }
            }

            // An exited process keeps whatever it accumulated.
            for pid in dead {
                if let Some(tracking) = tracked.remove(&pid) {
                    if let Some(&idx) = entry_of.get(&pid) {
                        tracking.finalize_into(&mut entries[idx]);
                    }
                    debug!("Pid {} exited during monitoring", pid);
                }
            }
        }

        passes += 1;
        let fraction = (start.elapsed().as_secs_f64() / duration.as_secs_f64()).min(1.0);
        let _ = events.try_send(MonitorEvent::Progress { fraction, samples: passes });

        // Sleep off whatever the iteration left of the cadence.
        let to_sleep = interval.saturating_sub(iteration_started.elapsed());
        if !to_sleep.is_zero() {
            tokio::time::sleep(to_sleep).await;
        }
    }

    state.store(RunState::Finalizing as u8, Ordering::SeqCst);
    let mut entries = entries.write().await;
    for (&pid, tracking) in &tracked {
        if let Some(&idx) = entry_of.get(&pid) {
            tracking.finalize_into(&mut entries[idx]);
        }
    }
    for entry in entries.iter_mut() {
        if entry.enabled && entry.matched_pid.is_none() {
            entry.push_note("No matching process found during monitoring window.");
        }
    }

    Ok(passes)
}
