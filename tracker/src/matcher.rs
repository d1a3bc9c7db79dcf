//! Heuristic association of startup entries with live processes.

use crate::entry::{normalize_command, StartupEntry};
use crate::snapshot::ProcessRecord;

/// Picks the first plausible process for `entry`, or `None`.
///
/// Exactly one tier is selected from the entry's derived fields, then the
/// records are scanned in order and the first hit wins. There is no
/// fallthrough to a weaker tier once one is selected. Substring tests keep
/// this deliberately permissive; a wrong-but-plausible match beats missing
/// a wrapped or renamed executable.
pub fn match_entry(entry: &StartupEntry, records: &[ProcessRecord]) -> Option<u32> {
    let exe_guess = entry.exe_guess.as_deref().unwrap_or("");
    if !exe_guess.is_empty() && looks_path_like(exe_guess) {
        return records
            .iter()
            .find(|r| r.exe_path.contains(exe_guess))
            .map(|r| r.pid);
    }

    if entry.normalized_command.chars().count() >= 6 {
        let needle: String = entry.normalized_command.chars().take(20).collect();
        return records
            .iter()
            .find(|r| r.command_line.contains(&needle))
            .map(|r| r.pid);
    }

    let name = normalize_command(&entry.name);
    if name.chars().count() >= 3 {
        return records
            .iter()
            .find(|r| normalize_command(&r.name).contains(&name))
            .map(|r| r.pid);
    }

    None
}

fn looks_path_like(guess: &str) -> bool {
    guess.contains(".exe") || guess.contains('\\') || guess.contains('/')
}
