//! Startup entry model and launch-command normalization

use std::fmt;

/// Where a startup entry was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    ConfigStoreUser,
    ConfigStoreMachine,
    StartupFolderUser,
    StartupFolderAllUsers,
    ScheduledJob,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::ConfigStoreUser => write!(f, "Registry:HKCU Run"),
            Source::ConfigStoreMachine => write!(f, "Registry:HKLM Run"),
            Source::StartupFolderUser => write!(f, "StartupFolder:User"),
            Source::StartupFolderAllUsers => write!(f, "StartupFolder:AllUsers"),
            Source::ScheduledJob => write!(f, "ScheduledTask"),
        }
    }
}

/// One configured startup item, its derived matching fields and the
/// monitoring results of the most recent sampling run.
#[derive(Debug, Clone)]
pub struct StartupEntry {
    pub name: String,
    pub source: Source,
    /// Backend-specific address: `HKCU\<key>::<value>`, a file path, or a
    /// task name. `(source, location)` is the dedup key.
    pub location: String,
    pub command: String,
    pub enabled: bool,

    // Derived once at construction, immutable afterwards.
    pub normalized_command: String,
    pub exe_guess: Option<String>,

    // Written only by the sampling loop during a run, except `notes`,
    // which the deactivation path appends to as well.
    pub matched_pid: Option<u32>,
    pub matched_process_name: Option<String>,
    pub avg_cpu: Option<f64>,
    pub peak_cpu: Option<f64>,
    pub avg_memory_mb: Option<f64>,
    pub peak_memory_mb: Option<f64>,
    pub notes: String,
}

impl StartupEntry {
    pub fn new(
        name: impl Into<String>,
        source: Source,
        location: impl Into<String>,
        command: impl Into<String>,
        enabled: bool,
    ) -> Self {
        let command = command.into();
        let normalized_command = normalize_command(&command);
        let exe_guess = guess_executable(&command);
        Self {
            name: name.into(),
            source,
            location: location.into(),
            command,
            enabled,
            normalized_command,
            exe_guess,
            matched_pid: None,
            matched_process_name: None,
            avg_cpu: None,
            peak_cpu: None,
            avg_memory_mb: None,
            peak_memory_mb: None,
            notes: String::new(),
        }
    }

    /// Disabled marker row for a backend scope that could not be read, so an
    /// empty source is distinguishable from an unreadable one.
    pub fn placeholder(name: impl Into<String>, source: Source, location: impl Into<String>) -> Self {
        Self::new(name, source, location, "", false)
    }

    /// Entries that are disabled (including placeholder rows) cannot be
    /// deactivated again.
    pub fn is_actionable(&self) -> bool {
        self.enabled
    }

    /// Appends to `notes`, never overwriting what is already there.
    pub fn push_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push(' ');
        }
        self.notes.push_str(note);
    }

    /// Clears everything a sampling run writes. Called at the start of each
    /// run so stale results never leak into a new one.
    pub fn reset_monitoring(&mut self) {
        self.matched_pid = None;
        self.matched_process_name = None;
        self.avg_cpu = None;
        self.peak_cpu = None;
        self.avg_memory_mb = None;
        self.peak_memory_mb = None;
        self.notes.clear();
    }
}

/// Expands `%VAR%` references from the process environment. Unknown
/// variables and stray `%` characters are left as-is.
pub fn expand_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            // Lone or doubled '%': emit it and keep scanning.
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Canonical form used for all fuzzy matching: environment variables
/// expanded, surrounding quotes stripped, whitespace runs collapsed,
/// lower-cased. Idempotent.
pub fn normalize_command(raw: &str) -> String {
    let expanded = expand_env_vars(raw);
    let stripped = expanded.trim().trim_matches('"').trim();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

/// Best-effort extraction of the executable path from a launch command,
/// normalized like [`normalize_command`]. Handles quoted paths, quote-aware
/// tokenization, and falls back to the text before the first space.
pub fn guess_executable(raw: &str) -> Option<String> {
    let expanded = expand_env_vars(raw);
    let cmd = expanded.trim();
    if cmd.is_empty() {
        return None;
    }

    let token = if let Some(quoted) = leading_quoted_segment(cmd) {
        quoted
    } else if let Some(first) = first_token(cmd) {
        first
    } else {
        cmd.split(' ').next().unwrap_or(cmd).to_string()
    };

    let normalized = normalize_command(&token);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn leading_quoted_segment(cmd: &str) -> Option<String> {
    let rest = cmd.strip_prefix('"')?;
    match rest.find('"') {
        Some(end) if end > 0 => Some(rest[..end].to_string()),
        _ => None,
    }
}

/// First whitespace-delimited token, treating double-quoted spans as part of
/// the token. Unbalanced quotes yield `None` so the caller can fall back.
fn first_token(cmd: &str) -> Option<String> {
    let mut token = String::new();
    let mut in_quotes = false;
    for ch in cmd.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                token.push(ch);
            }
            c if c.is_whitespace() && !in_quotes => break,
            c => token.push(c),
        }
    }
    if in_quotes || token.is_empty() {
        None
    } else {
        Some(token)
    }
}
