//! Hunt Loop - orchestrates one cycle after another
//!
//! scan -> observe titles -> classify -> per suspicious process:
//! trap -> trace -> eliminate -> record.
//!
//! The `Hunter` owns every map (registry, histories, suspicious, trapped,
//! hunted). Readers only ever see what it publishes into `HuntShared`.
//!
//! Per process: Tracked -> Suspicious -> Trapped -> Resolved
//! (Eliminated | ProtectedSkip | Observed | Failed | Vanished).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::logic::config::SentinelConfig;
use crate::logic::probe::Probes;
use crate::logic::process_intel::{
    build_snapshots, trace, ProcessKey, ProcessSnapshot, TitleHistoryTracker, TraceResult,
};
use crate::logic::response::{
    eliminate, trap, EliminationOutcome, EliminationResult, TrapReceipt, TrapStore,
};
use crate::logic::telemetry::{AuditLog, HuntJournal, HuntRecord};
use crate::logic::threat::{classify, ProtectedList, SuspicionRecord};

pub mod types;


pub use types::{CycleReport, HealthStatus, HuntShared, HuntStatus, SentinelError};

pub struct Hunter {
    config: Arc<SentinelConfig>,
    probes: Probes,
    protected: ProtectedList,
    store: TrapStore,

    // Owned state
    registry: HashMap<u32, ProcessSnapshot>,
    tracker: TitleHistoryTracker,
    suspicious: BTreeMap<ProcessKey, SuspicionRecord>,
    trapped: HashMap<ProcessKey, TrapReceipt>,
    hunted: HashSet<ProcessKey>,
    hunted_total: u64,

    // Health
    cycles: u64,
    consecutive_failures: u32,
    last_cycle_at: Option<DateTime<Utc>>,
    last_error: Option<String>,

    journal: Option<HuntJournal>,
    audit: AuditLog,
    shared: Arc<HuntShared>,
}

impl Hunter {
    pub fn new(config: Arc<SentinelConfig>, probes: Probes, shared: Arc<HuntShared>) -> Self {
        let journal = match HuntJournal::open(&config.log_dir) {
            Ok(journal) => Some(journal),
            Err(e) => {
                log::warn!("Hunt journal unavailable in {:?}: {} - records kept in memory only", config.log_dir, e);
                None
            }
        };

        Self {
            protected: config.protected_list(),
            store: TrapStore::new(&config.trap_dir),
            audit: AuditLog::open(&config.log_dir),
            config,
            probes,
            registry: HashMap::new(),
            tracker: TitleHistoryTracker::new(),
            suspicious: BTreeMap::new(),
            trapped: HashMap::new(),
            hunted: HashSet::new(),
            hunted_total: 0,
            cycles: 0,
            consecutive_failures: 0,
            last_cycle_at: None,
            last_error: None,
            journal,
            shared,
        }
    }

    // ========================================================================
    // LOOP
    // ========================================================================

    /// Run until `token` is cancelled. Cancellation is checked once per
    /// iteration and between incidents, never inside one.
    pub async fn run(mut self, token: CancellationToken) {
        self.audit.warning(&format!(
            "HUNT STARTED: interval {}ms, threshold {}, eliminate {}, trap-before-kill {}",
            self.config.scan_interval_ms,
            self.config.mutation_threshold,
            self.config.eliminate,
            self.config.trap_before_kill
        ));
        self.publish(true);

        loop {
            if token.is_cancelled() {
                break;
            }

            self.run_guarded(&token);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.scan_interval()) => {}
            }
        }

        self.audit.info(&format!(
            "HUNT STOPPED after {} cycles, {} processes hunted",
            self.cycles, self.hunted_total
        ));
        self.publish(false);
    }

    /// One cycle with failures (errors and panics) caught and counted
    pub fn run_guarded(&mut self, token: &CancellationToken) -> Option<CycleReport> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle(token)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(SentinelError::CyclePanic(panic_message(payload))),
        };

        self.cycles += 1;
        self.last_cycle_at = Some(Utc::now());

        let report = match result {
            Ok(report) => {
                if self.consecutive_failures >= self.config.degraded_after_failures {
                    self.audit.info("Health restored after successful cycle");
                }
                self.consecutive_failures = 0;
                self.last_error = None;
                Some(report)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.audit.error(&format!(
                    "Cycle failed ({} in a row): {}",
                    self.consecutive_failures, e
                ));
                if self.consecutive_failures == self.config.degraded_after_failures {
                    self.audit.error("Health DEGRADED: consecutive cycle failures");
                }
                self.last_error = Some(e.to_string());
                None
            }
        };

        self.publish(true);
        report
    }

    // ========================================================================
    // CYCLE
    // ========================================================================

    pub fn run_cycle(&mut self, token: &CancellationToken) -> Result<CycleReport, SentinelError> {
        let mut report = CycleReport::default();

        let snapshots = build_snapshots(
            self.probes.table.as_mut(),
            self.probes.titles.as_ref(),
            self.config.trace_network,
        )?;
        report.processes = snapshots.len();

        let observation = self
            .tracker
            .observe(&snapshots, self.config.mutation_threshold, &self.protected);
        for sighting in &observation.protected_sightings {
            self.audit.info(&format!(
                "Protected window seen: PID {} TITLE '{}' (keyword '{}')",
                sighting.pid, sighting.title, sighting.keyword
            ));
        }

        let live: HashSet<ProcessKey> = snapshots.values().map(ProcessSnapshot::key).collect();
        self.hunted.retain(|key| live.contains(key));

        for key in observation.mutations {
            if self.hunted.contains(&key) || self.suspicious.contains_key(&key) {
                continue;
            }
            let (Some(snapshot), Some(history)) = (snapshots.get(&key.pid), self.tracker.history(&key)) else {
                continue;
            };

            let record = classify(snapshot, history, &self.protected);
            self.audit.warning(&format!(
                "SUSPICIOUS: PID {} NAME '{}' TITLE '{}' after {} titles {:?}{}",
                key.pid,
                snapshot.name,
                snapshot.title,
                record.title_changes,
                record.title_history,
                if record.protected_at_detection { " (protected title)" } else { "" }
            ));
            self.suspicious.insert(key, record);
            report.new_suspicions += 1;
        }

        self.registry = snapshots;

        let pending: Vec<ProcessKey> = self.suspicious.keys().copied().collect();
        for key in pending {
            if token.is_cancelled() {
                break;
            }
            if self.resolve(key) {
                report.resolved += 1;
            }
        }

        report.pending = self.suspicious.len();
        Ok(report)
    }

    /// Drive one incident as far as it can go this cycle.
    /// Returns true when it reached a terminal state.
    fn resolve(&mut self, key: ProcessKey) -> bool {
        let Some(suspicion) = self.suspicious.get(&key).cloned() else {
            return false;
        };
        let pid = key.pid;

        let alive = self
            .probes
            .table
            .query(pid)
            .is_some_and(|row| row.start_time == key.start_time)
            && self.probes.table.is_alive(pid);
        if !alive {
            self.audit.info(&format!("VANISHED: PID {} left before resolution", pid));
            self.finish(key, HuntRecord::vanished(&suspicion));
            return true;
        }

        if !self.trapped.contains_key(&key) {
            match trap(self.probes.table.as_mut(), &self.store, &suspicion.snapshot, suspicion.reason) {
                Ok(receipt) => {
                    self.audit.info(&format!("TRAP written for PID {}: {:?}", pid, receipt.path));
                    self.trapped.insert(key, receipt);
                }
                Err(e) if self.config.trap_before_kill => {
                    self.audit.error(&format!("TRAP FAILED for PID {}: {} - will retry", pid, e));
                    return false;
                }
                Err(e) => {
                    self.audit.error(&format!("TRAP FAILED for PID {}: {}", pid, e));
                }
            }
        }

        let traced = trace(
            self.probes.table.as_mut(),
            self.probes.resolver.as_ref(),
            pid,
            &self.registry,
            self.config.trace_options(),
        );
        self.log_trace(&traced);

        let elimination = if self.config.eliminate {
            eliminate(
                self.probes.table.as_mut(),
                self.probes.titles.as_ref(),
                &self.protected,
                key,
                &traced,
                self.config.kill_policy(),
            )
        } else {
            EliminationResult::new(pid, EliminationOutcome::Observed)
        };
        self.log_elimination(&elimination);

        let trap_path = self.trapped.get(&key).map(|r| r.path.clone());
        self.finish(key, HuntRecord::resolved(&suspicion, trap_path, traced, elimination));
        true
    }

    fn finish(&mut self, key: ProcessKey, record: HuntRecord) {
        self.suspicious.remove(&key);
        self.trapped.remove(&key);
        self.hunted.insert(key);
        self.hunted_total += 1;

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.append(&record) {
                log::warn!("Failed to append hunt record for PID {}: {}", key.pid, e);
            }
        }
        self.shared.push_hunt(record);
    }

    // ========================================================================
    // LOGGING
    // ========================================================================

    fn log_trace(&mut self, traced: &TraceResult) {
        let chain: Vec<String> = traced
            .parent_chain
            .iter()
            .map(|p| format!("{}({})", p.name, p.pid))
            .collect();
        let source = match (&traced.source_ip, &traced.source_host) {
            (Some(ip), Some(host)) if ip != host => format!("{} ({})", ip, host),
            (Some(ip), _) => ip.clone(),
            _ => "local".to_string(),
        };
        self.audit.info(&format!(
            "TRACE PID {}: parents [{}], {} children, source {}",
            traced.pid,
            chain.join(" <- "),
            traced.children.len(),
            source
        ));
    }

    fn log_elimination(&mut self, result: &EliminationResult) {
        let message = match result.outcome {
            EliminationOutcome::Eliminated => format!(
                "ELIMINATED PID {}: {} children killed, {} already gone",
                result.pid,
                result.children_killed().len(),
                result.children_vanished().len()
            ),
            EliminationOutcome::ProtectedSkip => {
                format!("PROTECTED SKIP: PID {} not touched", result.pid)
            }
            EliminationOutcome::Observed => {
                format!("OBSERVED PID {}: elimination disabled", result.pid)
            }
            EliminationOutcome::Failed => format!("ELIMINATION FAILED for PID {}", result.pid),
        };
        self.audit.warning(&message);
        for error in &result.errors {
            self.audit.warning(&format!("  PID {}: {}", result.pid, error));
        }
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    fn publish(&self, hunting: bool) {
        let suspicious_pids: Vec<u32> = self.suspicious.keys().map(|k| k.pid).collect();
        let health = if self.consecutive_failures >= self.config.degraded_after_failures {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        self.shared.publish(HuntStatus {
            hunting,
            processes_tracked: self.registry.len(),
            suspicious_count: suspicious_pids.len(),
            suspicious_pids,
            hunted_count: self.hunted_total,
            cycle_count: self.cycles,
            consecutive_failures: self.consecutive_failures,
            health,
            last_cycle_at: self.last_cycle_at,
            last_error: self.last_error.clone(),
            config: (*self.config).clone(),
        });
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
