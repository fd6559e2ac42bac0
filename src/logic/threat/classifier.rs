//! Suspicion Classifier
//!
//! Turns a threshold crossing into a SuspicionRecord. Every crossing is
//! recorded, protected titles included; exemption only happens later, when
//! the eliminator re-reads the title.

use chrono::Utc;

use crate::logic::process_intel::ProcessSnapshot;

use super::types::{DetectionReason, ProtectedList, SuspicionRecord};

pub fn classify(
    snapshot: &ProcessSnapshot,
    history: &[String],
    protected: &ProtectedList,
) -> SuspicionRecord {
    SuspicionRecord {
        snapshot: snapshot.clone(),
        reason: DetectionReason::TitleChange,
        detected_at: Utc::now(),
        title_changes: history.len(),
        title_history: history.to_vec(),
        protected_at_detection: protected.is_protected(&snapshot.title),
    }
}
