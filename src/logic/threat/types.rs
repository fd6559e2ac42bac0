//! Threat Types
//!
//! Data only: detection reasons, suspicion records, the protected list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::process_intel::ProcessSnapshot;

// ============================================================================
// DETECTION REASON
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionReason {
    /// Distinct-title count crossed the mutation threshold
    TitleChange,
}

impl DetectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionReason::TitleChange => "TITLE_CHANGE",
        }
    }
}

// ============================================================================
// SUSPICION RECORD
// ============================================================================

/// Created once per process when it first crosses the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspicionRecord {
    pub snapshot: ProcessSnapshot,
    pub reason: DetectionReason,
    pub detected_at: DateTime<Utc>,
    pub title_changes: usize,
    pub title_history: Vec<String>,
    /// Audit only: the title matched the protected list at detection time.
    /// Never consulted for exemption.
    pub protected_at_detection: bool,
}

impl SuspicionRecord {
    pub fn pid(&self) -> u32 {
        self.snapshot.pid
    }
}

// ============================================================================
// PROTECTED LIST
// ============================================================================

/// Case-insensitive substring allow-list matched against current titles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedList {
    keywords: Vec<String>,
}

impl ProtectedList {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// First keyword found in `title`, if any
    pub fn matching(&self, title: &str) -> Option<&str> {
        let title = title.to_lowercase();
        self.keywords
            .iter()
            .find(|k| title.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn is_protected(&self, title: &str) -> bool {
        self.matching(title).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_case_insensitive_substring() {
        let list = ProtectedList::new(["Cursor", "Claude", "Firefox"]);
        assert!(list.is_protected("Mozilla FIREFOX - New Tab"));
        assert!(list.is_protected("claude.ai - chat"));
        assert_eq!(list.matching("My cursor editor"), Some("cursor"));
        assert!(!list.is_protected("svchost-helper"));
    }

    #[test]
    fn test_blank_keywords_ignored() {
        let list = ProtectedList::new(["", "   "]);
        assert!(!list.is_protected("anything"));
        assert!(!list.is_protected(""));
    }

    #[test]
    fn test_reason_wire_name() {
        let json = serde_json::to_string(&DetectionReason::TitleChange).unwrap();
        assert_eq!(json, "\"TITLE_CHANGE\"");
        assert_eq!(DetectionReason::TitleChange.as_str(), "TITLE_CHANGE");
    }
}
