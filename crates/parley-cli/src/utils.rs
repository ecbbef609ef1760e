//! Shared utilities

use parley_agent::CompactionReason;
use std::path::{Path, PathBuf};

/// Keep the first `max` characters, appending `suffix` if anything was cut.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_with(s: &str, max: usize, suffix: &str) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}{}", truncated, suffix)
    } else {
        truncated
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    PathBuf::from(path)
}

/// Resolve a tool path: absolute (or `~`) paths as given, others under `base`
pub fn resolve_in(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Format a compaction reason for display.
pub fn compaction_reason_str(reason: CompactionReason) -> &'static str {
    match reason {
        CompactionReason::Threshold => "threshold",
        CompactionReason::Overload => "overload",
        CompactionReason::Manual => "manual",
    }
}
