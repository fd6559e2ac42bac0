//! Hunt Record Types
//!
//! One immutable record per detection-to-resolution cycle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::process_intel::TraceResult;
use crate::logic::response::{EliminationOutcome, EliminationResult};
use crate::logic::threat::{DetectionReason, SuspicionRecord};

// ============================================================================
// RESOLUTION
// ============================================================================

/// Terminal branch of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntResolution {
    Eliminated,
    ProtectedSkip,
    /// Observe-only mode: trapped and traced, never signalled
    Observed,
    /// Trap written, elimination attempted, target survived
    Failed,
    /// Gone from the table before it could be trapped
    Vanished,
}

impl HuntResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            HuntResolution::Eliminated => "eliminated",
            HuntResolution::ProtectedSkip => "protected_skip",
            HuntResolution::Observed => "observed",
            HuntResolution::Failed => "failed",
            HuntResolution::Vanished => "vanished",
        }
    }
}

impl From<EliminationOutcome> for HuntResolution {
    fn from(outcome: EliminationOutcome) -> Self {
        match outcome {
            EliminationOutcome::Eliminated => HuntResolution::Eliminated,
            EliminationOutcome::ProtectedSkip => HuntResolution::ProtectedSkip,
            EliminationOutcome::Observed => HuntResolution::Observed,
            EliminationOutcome::Failed => HuntResolution::Failed,
        }
    }
}

// ============================================================================
// HUNT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntRecord {
    pub id: Uuid,
    pub pid: u32,
    pub start_time: u64,
    pub name: String,
    pub reason: DetectionReason,
    pub detected_at: DateTime<Utc>,
    pub title_history: Vec<String>,
    pub protected_at_detection: bool,
    pub trap_path: Option<PathBuf>,
    pub trace: Option<TraceResult>,
    pub elimination: Option<EliminationResult>,
    pub resolution: HuntResolution,
    pub resolved_at: DateTime<Utc>,
}

impl HuntRecord {
    fn from_suspicion(suspicion: &SuspicionRecord, resolution: HuntResolution) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid: suspicion.snapshot.pid,
            start_time: suspicion.snapshot.start_time,
            name: suspicion.snapshot.name.clone(),
            reason: suspicion.reason,
            detected_at: suspicion.detected_at,
            title_history: suspicion.title_history.clone(),
            protected_at_detection: suspicion.protected_at_detection,
            trap_path: None,
            trace: None,
            elimination: None,
            resolution,
            resolved_at: Utc::now(),
        }
    }

    /// Incident that went all the way through trap / trace / eliminate
    pub fn resolved(
        suspicion: &SuspicionRecord,
        trap_path: Option<PathBuf>,
        trace: TraceResult,
        elimination: EliminationResult,
    ) -> Self {
        let mut record = Self::from_suspicion(suspicion, elimination.outcome.into());
        record.trap_path = trap_path;
        record.trace = Some(trace);
        record.elimination = Some(elimination);
        record
    }

    /// Process left the table before resolution; no trace
    pub fn vanished(suspicion: &SuspicionRecord) -> Self {
        Self::from_suspicion(suspicion, HuntResolution::Vanished)
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::process_intel::ProcessSnapshot;
    use crate::logic::threat::{classify, ProtectedList};

    fn suspicion() -> SuspicionRecord {
        let snap = ProcessSnapshot::new(9, "agent", "agent --x", "two", 1009);
        classify(&snap, &["one".to_string(), "two".to_string()], &ProtectedList::default())
    }

    #[test]
    fn test_vanished_has_no_trace() {
        let record = HuntRecord::vanished(&suspicion());
        assert_eq!(record.resolution, HuntResolution::Vanished);
        assert!(record.trace.is_none());
        assert!(record.elimination.is_none());
        assert_eq!(record.start_time, 1009);
        assert!(record.resolved_at >= record.detected_at);
    }

    #[test]
    fn test_resolution_follows_outcome() {
        let elimination = EliminationResult::new(9, EliminationOutcome::ProtectedSkip);
        let record = HuntRecord::resolved(&suspicion(), None, TraceResult::empty(9), elimination);
        assert_eq!(record.resolution, HuntResolution::ProtectedSkip);

        let line = record.to_jsonl();
        assert!(!line.contains('\n'));
        let back: HuntRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }
}
