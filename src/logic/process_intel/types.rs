//! Process Intelligence Types - Shared Types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logic::probe::NetConnection;

// ============================================================================
// IDENTITY
// ============================================================================

/// Process identity across scans.
///
/// The pid alone is reused by the OS; pairing it with the start time keeps a
/// recycled pid from inheriting a stale title history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub pid: u32,
    pub start_time: u64,
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.start_time)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Point-in-time identity record of one process. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub parent_pid: Option<u32>,
    pub children_pids: Vec<u32>,
    pub network_connections: Vec<NetConnection>,
    pub user: Option<String>,
    pub start_time: u64,
}

impl ProcessSnapshot {
    pub fn new(pid: u32, name: &str, cmdline: &str, title: &str, start_time: u64) -> Self {
        Self {
            pid,
            name: name.to_string(),
            cmdline: cmdline.to_string(),
            title: title.to_string(),
            timestamp: Utc::now(),
            hash: fingerprint(pid, name, cmdline, title),
            parent_pid: None,
            children_pids: Vec::new(),
            network_connections: Vec::new(),
            user: None,
            start_time,
        }
    }

    pub fn key(&self) -> ProcessKey {
        ProcessKey {
            pid: self.pid,
            start_time: self.start_time,
        }
    }
}

/// First 16 hex chars of SHA-256 over `pid:name:cmdline:title`
pub fn fingerprint(pid: u32, name: &str, cmdline: &str, title: &str) -> String {
    let identity = format!("{}:{}:{}:{}", pid, name, cmdline, title);
    let digest = Sha256::digest(identity.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(16);
    hex
}

// ============================================================================
// TRACE TYPES
// ============================================================================

/// One hop (ancestor) or one descendant in a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub pid: u32,
    pub name: String,
    /// First few command-line tokens only
    pub cmdline: String,
}

/// Remote end of a connection with its best-effort name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrigin {
    pub address: String,
    /// Resolved hostname, or the raw address when resolution failed
    pub host: String,
    pub resolved: bool,
}

/// Reconstructed lineage and network provenance of a flagged process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    pub pid: u32,
    pub snapshot: Option<ProcessSnapshot>,
    pub parent_chain: Vec<LineageEntry>,
    pub children: Vec<LineageEntry>,
    pub network_connections: Vec<NetConnection>,
    pub origins: Vec<RemoteOrigin>,
    pub source_ip: Option<String>,
    pub source_host: Option<String>,
    pub trace_complete: bool,
}

impl TraceResult {
    pub fn empty(pid: u32) -> Self {
        Self {
            pid,
            snapshot: None,
            parent_chain: Vec::new(),
            children: Vec::new(),
            network_connections: Vec::new(),
            origins: Vec::new(),
            source_ip: None,
            source_host: None,
            trace_complete: false,
        }
    }
}
