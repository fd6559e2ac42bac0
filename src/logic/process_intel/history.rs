//! Title History Tracker
//!
//! Per-process ordered list of distinct titles. Only changes are recorded:
//! a title equal to the previous entry is not appended. A process is
//! signalled once, the first time its history length exceeds the threshold.

use std::collections::{HashMap, HashSet};

use crate::logic::threat::ProtectedList;

use super::types::{ProcessKey, ProcessSnapshot};

/// A protected title was just recorded for a process. Emitted only when
/// the title changes (including the first sighting), not on every cycle
/// the protected title stays the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedSighting {
    pub pid: u32,
    pub title: String,
    pub keyword: String,
}

/// Result of observing one cycle's snapshots
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Processes crossing the threshold for the first time
    pub mutations: Vec<ProcessKey>,
    pub protected_sightings: Vec<ProtectedSighting>,
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct TitleHistoryTracker {
    histories: HashMap<ProcessKey, Vec<String>>,
    signalled: HashSet<ProcessKey>,
}

impl TitleHistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        snapshots: &HashMap<u32, ProcessSnapshot>,
        threshold: usize,
        protected: &ProtectedList,
    ) -> Observation {
        let mut observation = Observation::default();
        let live: HashSet<ProcessKey> = snapshots.values().map(ProcessSnapshot::key).collect();

        let before = self.histories.len();
        self.histories.retain(|key, _| live.contains(key));
        self.signalled.retain(|key| live.contains(key));
        observation.pruned = before - self.histories.len();

        let mut pids: Vec<&u32> = snapshots.keys().collect();
        pids.sort_unstable();

        for pid in pids {
            let snapshot = &snapshots[pid];
            let key = snapshot.key();
            let history = self.histories.entry(key).or_default();

            if history.last() == Some(&snapshot.title) {
                continue;
            }
            history.push(snapshot.title.clone());

            if let Some(keyword) = protected.matching(&snapshot.title) {
                observation.protected_sightings.push(ProtectedSighting {
                    pid: snapshot.pid,
                    title: snapshot.title.clone(),
                    keyword: keyword.to_string(),
                });
            }

            if history.len() > threshold && self.signalled.insert(key) {
                observation.mutations.push(key);
            }
        }

        observation
    }

    pub fn history(&self, key: &ProcessKey) -> Option<&[String]> {
        self.histories.get(key).map(Vec::as_slice)
    }

    pub fn tracked(&self) -> usize {
        self.histories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snaps(entries: &[(u32, u64, &str)]) -> HashMap<u32, ProcessSnapshot> {
        entries
            .iter()
            .map(|(pid, start, title)| (*pid, ProcessSnapshot::new(*pid, "proc", "proc", title, *start)))
            .collect()
    }

    fn key(pid: u32, start_time: u64) -> ProcessKey {
        ProcessKey { pid, start_time }
    }

    #[test]
    fn test_threshold_two_needs_third_title() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        let obs = tracker.observe(&snaps(&[(42, 1, "update-agent")]), 2, &none);
        assert!(obs.mutations.is_empty());

        let obs = tracker.observe(&snaps(&[(42, 1, "svchost-helper")]), 2, &none);
        assert!(obs.mutations.is_empty());

        let obs = tracker.observe(&snaps(&[(42, 1, "explorer")]), 2, &none);
        assert_eq!(obs.mutations, vec![key(42, 1)]);
    }

    #[test]
    fn test_threshold_one_triggers_on_first_change() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        tracker.observe(&snaps(&[(42, 1, "update-agent")]), 1, &none);
        let obs = tracker.observe(&snaps(&[(42, 1, "svchost-helper")]), 1, &none);
        assert_eq!(obs.mutations, vec![key(42, 1)]);
    }

    #[test]
    fn test_signalled_only_once() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        let titles = ["a", "b", "c", "d", "e"];
        let mut signals = 0;
        for t in titles {
            signals += tracker.observe(&snaps(&[(7, 1, t)]), 1, &none).mutations.len();
        }
        assert_eq!(signals, 1);
        assert_eq!(tracker.history(&key(7, 1)).unwrap().len(), 5);
    }

    #[test]
    fn test_repeated_title_not_appended() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        for _ in 0..5 {
            tracker.observe(&snaps(&[(7, 1, "same")]), 1, &none);
        }
        assert_eq!(tracker.history(&key(7, 1)).unwrap(), ["same".to_string()]);

        // A-B-A counts as three recorded titles: only consecutive duplicates collapse
        tracker.observe(&snaps(&[(7, 1, "other")]), 5, &none);
        tracker.observe(&snaps(&[(7, 1, "same")]), 5, &none);
        assert_eq!(tracker.history(&key(7, 1)).unwrap().len(), 3);
    }

    #[test]
    fn test_exited_processes_pruned() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        tracker.observe(&snaps(&[(1, 1, "a"), (2, 1, "b")]), 1, &none);
        let obs = tracker.observe(&snaps(&[(1, 1, "a")]), 1, &none);
        assert_eq!(obs.pruned, 1);
        assert_eq!(tracker.tracked(), 1);
        assert!(tracker.history(&key(2, 1)).is_none());
    }

    #[test]
    fn test_reused_pid_starts_fresh() {
        let mut tracker = TitleHistoryTracker::new();
        let none = ProtectedList::default();

        tracker.observe(&snaps(&[(9, 100, "first")]), 1, &none);
        // Same pid, different start time: a new process, not a title change
        let obs = tracker.observe(&snaps(&[(9, 200, "second")]), 1, &none);
        assert!(obs.mutations.is_empty());
        assert_eq!(tracker.history(&key(9, 200)).unwrap(), ["second".to_string()]);
        assert!(tracker.history(&key(9, 100)).is_none());
    }

    #[test]
    fn test_protected_titles_reported_but_still_signalled() {
        let mut tracker = TitleHistoryTracker::new();
        let protected = ProtectedList::new(["Claude"]);

        let obs = tracker.observe(&snaps(&[(3, 1, "Claude - chat")]), 1, &protected);
        assert_eq!(obs.protected_sightings.len(), 1);
        assert_eq!(obs.protected_sightings[0].keyword, "claude");

        let obs = tracker.observe(&snaps(&[(3, 1, "Claude - settings")]), 1, &protected);
        assert_eq!(obs.mutations, vec![key(3, 1)]);
    }

    #[test]
    fn test_unchanged_protected_title_not_reported_again() {
        let mut tracker = TitleHistoryTracker::new();
        let protected = ProtectedList::new(["Claude"]);

        let obs = tracker.observe(&snaps(&[(3, 1, "Claude - chat")]), 5, &protected);
        assert_eq!(obs.protected_sightings.len(), 1);

        let obs = tracker.observe(&snaps(&[(3, 1, "Claude - chat")]), 5, &protected);
        assert!(obs.protected_sightings.is_empty());

        let obs = tracker.observe(&snaps(&[(3, 1, "Claude - settings")]), 5, &protected);
        assert_eq!(obs.protected_sightings.len(), 1);
        assert_eq!(obs.protected_sightings[0].title, "Claude - settings");
    }
}
