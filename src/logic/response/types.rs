//! Response Types - elimination results and trap records

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::probe::{MemoryUsage, NetConnection};
use crate::logic::process_intel::ProcessSnapshot;
use crate::logic::threat::DetectionReason;

// ============================================================================
// ELIMINATION TYPES
// ============================================================================

/// What happened when one process was asked to die
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminationStatus {
    /// Exited after the graceful signal
    Terminated,
    /// Survived the grace period, killed
    Forced,
    /// Already gone before any signal landed
    Vanished,
    /// Title matched the protected list; never signalled
    Protected { title: String },
    Failed { error: String },
}

impl TerminationStatus {
    /// Terminated, forced or already gone
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            TerminationStatus::Terminated | TerminationStatus::Forced | TerminationStatus::Vanished
        )
    }

    /// Killed by us (not merely gone)
    pub fn is_kill(&self) -> bool {
        matches!(self, TerminationStatus::Terminated | TerminationStatus::Forced)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTermination {
    pub pid: u32,
    pub name: String,
    #[serde(flatten)]
    pub status: TerminationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationOutcome {
    /// Target is gone (killed now or already exited)
    Eliminated,
    /// Target title is protected; nothing was signalled
    ProtectedSkip,
    /// Observe-only mode; nothing was signalled
    Observed,
    /// Target survived every attempt
    Failed,
}

impl EliminationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EliminationOutcome::Eliminated => "eliminated",
            EliminationOutcome::ProtectedSkip => "protected_skip",
            EliminationOutcome::Observed => "observed",
            EliminationOutcome::Failed => "failed",
        }
    }
}

/// Structured result of one elimination attempt. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationResult {
    pub pid: u32,
    pub outcome: EliminationOutcome,
    pub target: Option<TerminationStatus>,
    pub children: Vec<ChildTermination>,
    pub errors: Vec<String>,
}

impl EliminationResult {
    pub fn new(pid: u32, outcome: EliminationOutcome) -> Self {
        Self {
            pid,
            outcome,
            target: None,
            children: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn killed(&self) -> bool {
        self.outcome == EliminationOutcome::Eliminated
    }

    pub fn children_killed(&self) -> Vec<u32> {
        self.children
            .iter()
            .filter(|c| c.status.is_kill())
            .map(|c| c.pid)
            .collect()
    }

    pub fn children_vanished(&self) -> Vec<u32> {
        self.children
            .iter()
            .filter(|c| c.status == TerminationStatus::Vanished)
            .map(|c| c.pid)
            .collect()
    }
}

// ============================================================================
// TRAP TYPES
// ============================================================================

/// Identity block of a dissection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapIdentity {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub exe: Option<PathBuf>,
    pub cmdline: String,
    pub cwd: Option<PathBuf>,
    pub create_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Best-effort forensic capture. Each field degrades independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissection {
    pub identity: TrapIdentity,
    pub open_files: Vec<String>,
    pub connections: Vec<NetConnection>,
    pub memory: Option<MemoryUsage>,
    pub num_threads: Option<u64>,
    /// Sub-fields that could not be read, with the reason
    pub unavailable: Vec<String>,
}

/// Durable forensic record, written before any elimination attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapRecord {
    pub pid: u32,
    pub reason: DetectionReason,
    pub snapshot: ProcessSnapshot,
    pub dissection: Dissection,
    pub host: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A trap that made it to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapReceipt {
    pub pid: u32,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TrapError {
    #[error("trap storage io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trap serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
