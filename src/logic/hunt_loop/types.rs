//! Hunt Loop Types - status, errors and the state shared with readers

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::config::SentinelConfig;
use crate::logic::probe::ProbeError;
use crate::logic::telemetry::HuntRecord;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("process table unavailable: {0}")]
    Probe(#[from] ProbeError),

    #[error("cycle panicked: {0}")]
    CyclePanic(String),

    #[error("failed to spawn hunt worker: {0}")]
    Spawn(#[source] std::io::Error),
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    /// Too many consecutive failed cycles; the loop keeps running
    Degraded,
}

/// Point-in-time copy of the hunter's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntStatus {
    pub hunting: bool,
    pub processes_tracked: usize,
    pub suspicious_count: usize,
    pub suspicious_pids: Vec<u32>,
    pub hunted_count: u64,
    pub cycle_count: u64,
    pub consecutive_failures: u32,
    pub health: HealthStatus,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub config: SentinelConfig,
}

impl HuntStatus {
    pub fn idle(config: SentinelConfig) -> Self {
        Self {
            hunting: false,
            processes_tracked: 0,
            suspicious_count: 0,
            suspicious_pids: Vec::new(),
            hunted_count: 0,
            cycle_count: 0,
            consecutive_failures: 0,
            health: HealthStatus::Healthy,
            last_cycle_at: None,
            last_error: None,
            config,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub processes: usize,
    pub new_suspicions: usize,
    pub resolved: usize,
    /// Still suspicious after this cycle (trap failed or stop requested)
    pub pending: usize,
}

// ============================================================================
// SHARED STATE
// ============================================================================

/// Written only by the worker; everyone else reads copies
pub struct HuntShared {
    status: RwLock<HuntStatus>,
    hunts: RwLock<VecDeque<HuntRecord>>,
    capacity: usize,
}

impl HuntShared {
    pub fn new(config: &SentinelConfig) -> Arc<Self> {
        Arc::new(Self {
            status: RwLock::new(HuntStatus::idle(config.clone())),
            hunts: RwLock::new(VecDeque::with_capacity(config.hunt_log_capacity)),
            capacity: config.hunt_log_capacity.max(1),
        })
    }

    pub fn status(&self) -> HuntStatus {
        self.status.read().clone()
    }

    pub fn publish(&self, status: HuntStatus) {
        *self.status.write() = status;
    }

    pub fn push_hunt(&self, record: HuntRecord) {
        let mut hunts = self.hunts.write();
        if hunts.len() >= self.capacity {
            hunts.pop_front();
        }
        hunts.push_back(record);
    }

    /// Up to `limit` hunt records, most recent first
    pub fn recent(&self, limit: usize) -> Vec<HuntRecord> {
        self.hunts.read().iter().rev().take(limit).cloned().collect()
    }
}
