//! Utility functions for log paths, rotation, ANSI stripping, and time formatting.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Number of run logs kept by [`prune_logs`].
pub const KEEP_LOGS: usize = 30;

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range), so cursor movement, erase, etc.
/// are also stripped without consuming unrelated text.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Return `$XDG_STATE_HOME/syscfg/logs` (default `~/.local/state/syscfg/logs`).
#[must_use]
pub fn log_root() -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map_or_else(
            || {
                std::env::var_os("HOME")
                    .map_or_else(|| PathBuf::from("."), PathBuf::from)
                    .join(".local/state")
            },
            PathBuf::from,
        )
        .join("syscfg")
        .join("logs")
}

/// Return `<root>/YYYY-MM-DD/<command>-HHMMSS.log` for `now`, creating the
/// date directory.
///
/// Returns `None` if the directory cannot be created.
pub(super) fn log_file_path(root: &Path, command: &str, now: DateTime<Utc>) -> Option<PathBuf> {
    let dir = root.join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&dir).ok()?;
    Some(dir.join(format!("{command}-{}.log", now.format("%H%M%S"))))
}

/// Delete all but the `keep` newest run logs under `root` and remove date
/// directories left empty. Returns the number of files removed.
///
/// Logs are ordered by date directory, then by the `HHMMSS` suffix of the
/// file name, so ordering does not depend on filesystem timestamps.
pub fn prune_logs(root: &Path, keep: usize) -> usize {
    let Ok(days) = fs::read_dir(root) else {
        return 0;
    };
    let mut logs: Vec<(String, String, PathBuf)> = Vec::new();
    let mut day_dirs = Vec::new();
    for day in days.flatten() {
        let day_path = day.path();
        if !day_path.is_dir() {
            continue;
        }
        let day_name = day.file_name().to_string_lossy().to_string();
        if let Ok(files) = fs::read_dir(&day_path) {
            for file in files.flatten() {
                let path = file.path();
                if path.extension().is_some_and(|e| e == "log") {
                    let stamp = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| s.rsplit_once('-'))
                        .map_or_else(String::new, |(_, t)| t.to_string());
                    logs.push((day_name.clone(), stamp, path));
                }
            }
        }
        day_dirs.push(day_path);
    }

    logs.sort_by(|a, b| b.cmp(a));
    let mut removed = 0;
    for (_, _, path) in logs.iter().skip(keep) {
        if fs::remove_file(path).is_ok() {
            removed += 1;
        }
    }
    for dir in day_dirs {
        let is_empty = fs::read_dir(&dir).is_ok_and(|mut d| d.next().is_none());
        if is_empty {
            fs::remove_dir(&dir).ok();
        }
    }
    removed
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `HH:MM:SS`.
pub(super) fn format_utc_time() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
