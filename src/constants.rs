//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment overrides are read here and nowhere else.

use std::path::PathBuf;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name (also the data directory name)
pub const APP_NAME: &str = "wolf-sentinel";

/// Default scan interval (milliseconds)
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2_000;

/// Distinct titles a process may show before it is suspicious
pub const DEFAULT_MUTATION_THRESHOLD: usize = 1;

/// Titles never acted on (case-insensitive substring)
pub const DEFAULT_PROTECTED_KEYWORDS: &[&str] = &[
    "Cursor",
    "Claude",
    "Anthropic",
    "Chrome",
    "Chromium",
    "Firefox",
    "Brave",
    "Edge",
];

/// Grace between SIGTERM and SIGKILL for children / target (milliseconds)
pub const DEFAULT_CHILD_GRACE_MS: u64 = 100;
pub const DEFAULT_TARGET_GRACE_MS: u64 = 200;

/// Bounded wait for the worker on stop (seconds)
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;

/// Hunt records kept in memory
pub const DEFAULT_HUNT_LOG_CAPACITY: usize = 500;

/// Consecutive failed cycles before health turns Degraded
pub const DEFAULT_DEGRADED_AFTER_FAILURES: u32 = 3;

/// Bounded wait for title / hostname helper commands (milliseconds)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_000;

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// `<data_local_dir>/wolf-sentinel`, or `./wolf-sentinel` without a home
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_trap_dir() -> PathBuf {
    default_log_dir().join("traps")
}

/// Get scan interval override from environment
pub fn get_scan_interval_ms() -> Option<u64> {
    std::env::var("WOLF_SCAN_INTERVAL_MS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Get mutation threshold override from environment
pub fn get_mutation_threshold() -> Option<usize> {
    std::env::var("WOLF_MUTATION_THRESHOLD")
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn get_trap_dir() -> Option<PathBuf> {
    std::env::var_os("WOLF_TRAP_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var_os("WOLF_LOG_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Check if elimination is enabled (unset = no override)
pub fn get_eliminate() -> Option<bool> {
    std::env::var("WOLF_ELIMINATE")
        .ok()
        .map(|s| parse_flag(&s))
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value != "false" && value != "0" && value != "no" && value != "off"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("FALSE"));
        assert!(!parse_flag(" 0 "));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_default_dirs_nest() {
        assert!(default_trap_dir().starts_with(default_log_dir()));
        assert!(default_log_dir().ends_with(APP_NAME));
    }
}
