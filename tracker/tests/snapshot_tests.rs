use startup_tracker::snapshot::{ProcessTable, SystemProcessTable};

#[test]
fn test_snapshot_lists_current_process() {
    let mut table = SystemProcessTable::new();
    let records = table.snapshot();
    let me = records
        .iter()
        .find(|r| r.pid == std::process::id())
        .expect("snapshot must include the current process");
    assert!(!me.name.is_empty());
}

#[test]
fn test_sample_reads_resident_memory() {
    let mut table = SystemProcessTable::new();
    let sample = table.sample(std::process::id()).unwrap();
    assert!(sample.memory_bytes > 0);
}

/// A snapshot taken right before a sample must not re-anchor the pid's CPU
/// measurement window; the sample still reads utilization since the previous
/// sample, not since the snapshot.
#[cfg(unix)]
#[test]
fn test_snapshot_does_not_reset_cpu_window() {
    use std::process::{Command, Stdio};
    use std::thread::sleep;
    use std::time::Duration;

    let mut child = Command::new("sh")
        .args(["-c", "while :; do :; done"])
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    sleep(Duration::from_millis(100));

    let mut table = SystemProcessTable::new();
    // First sample is the zero baseline; readings start with the second.
    let _ = table.sample(pid);

    let mut total = 0.0;
    for _ in 0..5 {
        sleep(Duration::from_millis(400));
        // Interleave a full snapshot the way the monitor loop does.
        let _ = table.snapshot();
        total += table.sample(pid).unwrap().cpu_percent;
    }
    let average = total / 5.0;

    child.kill().unwrap();
    let _ = child.wait();

    // A spin loop burns (close to) a full core; anything near zero means the
    // snapshot consumed the CPU delta.
    assert!(average > 10.0, "busy loop averaged {average:.1}% cpu");
}
