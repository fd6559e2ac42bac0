//! Process Actions Module - Eliminator
//!
//! Terminates a flagged process subtree: descendants first (deepest first),
//! then the target. Each process gets a graceful signal, a short grace
//! period, then a forced kill. Protected titles are re-checked here, right
//! before any signal, for the target and for every child. A protected child
//! shields its own descendants as well.
//!
//! A zombie counts as dead: it is listed until its parent reaps it, and
//! that parent is usually the target itself.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::logic::probe::{ProbeError, ProcessTable, TermSignal, TitleReader};
use crate::logic::process_intel::{resolve_title, ProcessKey, TraceResult};
use crate::logic::threat::ProtectedList;

use super::types::{ChildTermination, EliminationOutcome, EliminationResult, TerminationStatus};

const POLL_STEP: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct KillPolicy {
    pub child_grace: Duration,
    pub target_grace: Duration,
}

impl Default for KillPolicy {
    fn default() -> Self {
        Self {
            child_grace: Duration::from_millis(100),
            target_grace: Duration::from_millis(200),
        }
    }
}

// ============================================================================
// ELIMINATION
// ============================================================================

pub fn eliminate(
    table: &mut dyn ProcessTable,
    titles: &dyn TitleReader,
    protected: &ProtectedList,
    target: ProcessKey,
    trace: &TraceResult,
    policy: KillPolicy,
) -> EliminationResult {
    let pid = target.pid;
    let mut result = EliminationResult::new(pid, EliminationOutcome::Eliminated);

    // Gone, or the pid now belongs to someone else: nothing left to kill
    let live = table
        .query(pid)
        .filter(|row| target.start_time == 0 || row.start_time == target.start_time)
        .filter(|_| table.is_alive(pid));
    let Some(row) = live else {
        result.target = Some(TerminationStatus::Vanished);
        return result;
    };

    let title = resolve_title(titles, &row);
    if protected.is_protected(&title) {
        log::warn!("SKIP KILL for protected window PID {} TITLE '{}'", pid, title);
        result.outcome = EliminationOutcome::ProtectedSkip;
        result.target = Some(TerminationStatus::Protected { title });
        return result;
    }

    let shielded = shielded_children(table, titles, protected, trace);

    for child in trace.children.iter().rev() {
        let status = if let Some(title) = shielded.get(&child.pid) {
            log::warn!("SKIP KILL for protected child PID {} TITLE '{}'", child.pid, title);
            TerminationStatus::Protected { title: title.clone() }
        } else if !table.is_alive(child.pid) {
            TerminationStatus::Vanished
        } else {
            match table.query(child.pid) {
                None => TerminationStatus::Vanished,
                Some(child_row) => {
                    let child_title = resolve_title(titles, &child_row);
                    if protected.is_protected(&child_title) {
                        log::warn!("SKIP KILL for protected child PID {} TITLE '{}'", child.pid, child_title);
                        TerminationStatus::Protected { title: child_title }
                    } else {
                        terminate(table, child.pid, policy.child_grace)
                    }
                }
            }
        };

        if let TerminationStatus::Failed { error } = &status {
            result.errors.push(format!("Child {}: {}", child.pid, error));
        }
        result.children.push(ChildTermination {
            pid: child.pid,
            name: child.name.clone(),
            status,
        });
    }

    let status = terminate(table, pid, policy.target_grace);
    if let TerminationStatus::Failed { error } = &status {
        result.errors.push(format!("Main process: {}", error));
        result.outcome = EliminationOutcome::Failed;
    }
    result.target = Some(status);
    result
}

/// Children with a protected title, plus everything below them, keyed by
/// pid with the protected title that shields them. `trace.children` is in
/// breadth-first order, so a parent is always decided before its children.
fn shielded_children(
    table: &mut dyn ProcessTable,
    titles: &dyn TitleReader,
    protected: &ProtectedList,
    trace: &TraceResult,
) -> HashMap<u32, String> {
    let mut shielded = HashMap::new();
    for child in &trace.children {
        let Some(row) = table.query(child.pid) else {
            continue;
        };
        let inherited = row.parent_pid.and_then(|ppid| shielded.get(&ppid).cloned());
        if let Some(title) = inherited {
            shielded.insert(child.pid, title);
            continue;
        }
        let title = resolve_title(titles, &row);
        if protected.is_protected(&title) {
            shielded.insert(child.pid, title);
        }
    }
    shielded
}

/// Graceful signal, grace period, then forced kill
pub fn terminate(table: &mut dyn ProcessTable, pid: u32, grace: Duration) -> TerminationStatus {
    match table.signal(pid, TermSignal::Terminate) {
        Ok(()) => {
            if wait_for_exit(table, pid, grace) {
                return TerminationStatus::Terminated;
            }
        }
        Err(ProbeError::Vanished { .. }) => return TerminationStatus::Vanished,
        Err(e) => log::warn!("Graceful stop of PID {} failed: {}", pid, e),
    }

    match table.signal(pid, TermSignal::Kill) {
        Ok(()) if wait_for_exit(table, pid, grace) => TerminationStatus::Forced,
        Ok(()) => TerminationStatus::Failed {
            error: "still alive after forced kill".to_string(),
        },
        // Exited between the two signals
        Err(ProbeError::Vanished { .. }) => TerminationStatus::Terminated,
        Err(e) => TerminationStatus::Failed { error: e.to_string() },
    }
}

fn wait_for_exit(table: &mut dyn ProcessTable, pid: u32, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !table.is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_STEP.min(grace));
    }
}

// ============================================================================
// TESTS
// ============================================================================
