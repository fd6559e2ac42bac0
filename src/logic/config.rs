//! Sentinel Configuration
//!
//! Loaded once at start: defaults, then an optional JSON file, then
//! environment overrides, then CLI flags. Immutable afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;
use crate::logic::process_intel::TraceOptions;
use crate::logic::response::KillPolicy;
use crate::logic::threat::ProtectedList;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SENTINEL CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub scan_interval_ms: u64,
    /// Suspicious once recorded distinct titles exceed this
    pub mutation_threshold: usize,
    pub trace_parents: bool,
    pub trace_children: bool,
    pub trace_network: bool,
    pub protected_keywords: Vec<String>,
    pub trap_before_kill: bool,
    pub trap_dir: PathBuf,
    /// false = observe only: trap and trace, never signal
    pub eliminate: bool,
    pub child_grace_ms: u64,
    pub target_grace_ms: u64,
    pub max_parent_depth: usize,
    pub stop_timeout_secs: u64,
    pub hunt_log_capacity: usize,
    pub degraded_after_failures: u32,
    pub log_dir: PathBuf,
    pub title_probe_timeout_ms: u64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: constants::DEFAULT_SCAN_INTERVAL_MS,
            mutation_threshold: constants::DEFAULT_MUTATION_THRESHOLD,
            trace_parents: true,
            trace_children: true,
            trace_network: true,
            protected_keywords: constants::DEFAULT_PROTECTED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            trap_before_kill: true,
            trap_dir: constants::default_trap_dir(),
            eliminate: true,
            child_grace_ms: constants::DEFAULT_CHILD_GRACE_MS,
            target_grace_ms: constants::DEFAULT_TARGET_GRACE_MS,
            max_parent_depth: crate::logic::process_intel::tree::MAX_PARENT_DEPTH,
            stop_timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
            hunt_log_capacity: constants::DEFAULT_HUNT_LOG_CAPACITY,
            degraded_after_failures: constants::DEFAULT_DEGRADED_AFTER_FAILURES,
            log_dir: constants::default_log_dir(),
            title_probe_timeout_ms: constants::DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

/// Overrides read from the environment (see `constants`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub scan_interval_ms: Option<u64>,
    pub mutation_threshold: Option<usize>,
    pub trap_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub eliminate: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            scan_interval_ms: constants::get_scan_interval_ms(),
            mutation_threshold: constants::get_mutation_threshold(),
            trap_dir: constants::get_trap_dir(),
            log_dir: constants::get_log_dir(),
            eliminate: constants::get_eliminate(),
        }
    }
}

impl SentinelConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults or file, then environment; validated
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&EnvOverrides::from_env());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvOverrides) {
        if let Some(ms) = env.scan_interval_ms {
            self.scan_interval_ms = ms;
        }
        if let Some(threshold) = env.mutation_threshold {
            self.mutation_threshold = threshold;
        }
        if let Some(dir) = &env.trap_dir {
            self.trap_dir = dir.clone();
        }
        if let Some(dir) = &env.log_dir {
            self.log_dir = dir.clone();
        }
        if let Some(eliminate) = env.eliminate {
            self.eliminate = eliminate;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid("scan_interval_ms must be greater than 0".into()));
        }
        // Every process shows one title; threshold 0 would flag the whole table
        if self.mutation_threshold == 0 {
            return Err(ConfigError::Invalid("mutation_threshold must be at least 1".into()));
        }
        if self.hunt_log_capacity == 0 {
            return Err(ConfigError::Invalid("hunt_log_capacity must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.title_probe_timeout_ms)
    }

    pub fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            parents: self.trace_parents,
            children: self.trace_children,
            network: self.trace_network,
            max_depth: self.max_parent_depth,
        }
    }

    pub fn kill_policy(&self) -> KillPolicy {
        KillPolicy {
            child_grace: Duration::from_millis(self.child_grace_ms),
            target_grace: Duration::from_millis(self.target_grace_ms),
        }
    }

    pub fn protected_list(&self) -> ProtectedList {
        ProtectedList::new(&self.protected_keywords)
    }
}

// ============================================================================
// TESTS
// ============================================================================
