//! Point-in-time process listings and per-pid resource sampling.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use thiserror::Error;

use crate::entry::normalize_command;

/// One live process as seen in a snapshot. `exe_path` and `command_line`
/// are already normalized for matching; `name` stays as the OS reports it
/// so it can double as a display name.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub exe_path: String,
    pub command_line: String,
}

/// CPU is percent of one core since the previous sample of the same pid;
/// the first sample after tracking starts reads as (near) zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("process no longer exists")]
    Gone,
    #[error("access denied")]
    AccessDenied,
}

/// Live process table. Snapshots capture identity only; `sample` reads
/// resource counters for one pid and is where per-process failures surface.
pub trait ProcessTable: Send + Sync {
    fn snapshot(&mut self) -> Vec<ProcessRecord>;
    fn sample(&mut self, pid: u32) -> Result<ResourceSample, SampleError>;
}

/// Real process table backed by the system.
pub struct SystemProcessTable {
    sys: System,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&mut self) -> Vec<ProcessRecord> {
        // Identity only. CPU counters must stay untouched here: refreshing
        // them would re-anchor every pid's utilization window at the
        // snapshot, and the sample taken moments later would read a
        // near-zero delta instead of usage since the previous sample.
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        let mut records: Vec<ProcessRecord> = self
            .sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let args: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect();
                ProcessRecord {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    exe_path: process
                        .exe()
                        .map(|p| normalize_command(&p.to_string_lossy()))
                        .unwrap_or_default(),
                    command_line: normalize_command(&args.join(" ")),
                }
            })
            .collect();
        records.sort_by_key(|r| r.pid);
        records
    }

    fn sample(&mut self, pid: u32) -> Result<ResourceSample, SampleError> {
        let target = Pid::from_u32(pid);
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = self.sys.process(target).ok_or(SampleError::Gone)?;
        Ok(ResourceSample {
            cpu_percent: f64::from(process.cpu_usage()),
            memory_bytes: process.memory(),
        })
    }
}
