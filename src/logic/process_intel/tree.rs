//! Process Tree Module - Tracer
//!
//! Reconstructs where a flagged process came from:
//! - parent chain (bounded, cycle-guarded)
//! - descendant subtree
//! - remote network origins with reverse hostname lookup

use std::collections::{HashMap, HashSet, VecDeque};

use crate::logic::probe::{HostnameResolver, ProcessTable};

use super::snapshot::short_cmdline;
use super::types::{LineageEntry, ProcessSnapshot, RemoteOrigin, TraceResult};

/// Hard ceiling on parent hops
pub const MAX_PARENT_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct TraceOptions {
    pub parents: bool,
    pub children: bool,
    pub network: bool,
    pub max_depth: usize,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            parents: true,
            children: true,
            network: true,
            max_depth: MAX_PARENT_DEPTH,
        }
    }
}

pub fn trace(
    table: &mut dyn ProcessTable,
    resolver: &dyn HostnameResolver,
    pid: u32,
    snapshots: &HashMap<u32, ProcessSnapshot>,
    options: TraceOptions,
) -> TraceResult {
    let mut result = TraceResult::empty(pid);

    let Some(snapshot) = snapshots.get(&pid) else {
        return result;
    };
    result.snapshot = Some(snapshot.clone());
    result.network_connections = snapshot.network_connections.clone();

    if options.parents {
        result.parent_chain = parent_chain(table, pid, options.max_depth);
    }

    if options.children {
        result.children = descendants(snapshots, pid);
    }

    if options.network {
        result.origins = resolve_origins(resolver, snapshot);
        if let Some(first) = result.origins.first() {
            result.source_ip = Some(first.address.clone());
            result.source_host = Some(first.host.clone());
        }
    }

    result.trace_complete = true;
    result
}

/// Walk parent ids upward from the live table.
///
/// Stops at `max_depth` hops (never more than `MAX_PARENT_DEPTH`), at init (pid 0/1), at a self-parented
/// process or at any pid already visited.
pub fn parent_chain(table: &mut dyn ProcessTable, pid: u32, max_depth: usize) -> Vec<LineageEntry> {
    let mut chain = Vec::new();
    let mut visited = HashSet::from([pid]);
    let mut current = pid;

    for _ in 0..max_depth.min(MAX_PARENT_DEPTH) {
        let Some(ppid) = table.query(current).and_then(|row| row.parent_pid) else {
            break;
        };
        if ppid <= 1 || ppid == current || !visited.insert(ppid) {
            break;
        }
        let Some(parent) = table.query(ppid) else {
            break;
        };

        chain.push(LineageEntry {
            pid: ppid,
            name: parent.name,
            cmdline: short_cmdline(&parent.cmd),
        });
        current = ppid;
    }

    chain
}

/// All descendants of `pid`, breadth-first (shallowest first)
pub fn descendants(snapshots: &HashMap<u32, ProcessSnapshot>, pid: u32) -> Vec<LineageEntry> {
    let mut result = Vec::new();
    let mut visited = HashSet::from([pid]);
    let mut queue: VecDeque<u32> = snapshots
        .get(&pid)
        .map(|s| s.children_pids.iter().copied().collect())
        .unwrap_or_default();

    while let Some(child) = queue.pop_front() {
        if !visited.insert(child) {
            continue;
        }
        let Some(snap) = snapshots.get(&child) else {
            continue;
        };

        let tokens: Vec<String> = snap.cmdline.split_whitespace().map(str::to_string).collect();
        result.push(LineageEntry {
            pid: child,
            name: snap.name.clone(),
            cmdline: short_cmdline(&tokens),
        });
        queue.extend(snap.children_pids.iter().copied());
    }

    result
}

fn resolve_origins(resolver: &dyn HostnameResolver, snapshot: &ProcessSnapshot) -> Vec<RemoteOrigin> {
    let mut seen = HashSet::new();
    let mut origins = Vec::new();

    for conn in &snapshot.network_connections {
        let Some(ip) = conn.remote_ip() else { continue };
        if !seen.insert(ip) {
            continue;
        }

        let address = ip.to_string();
        let origin = match resolver.reverse(ip) {
            Some(host) => RemoteOrigin { address, host, resolved: true },
            None => RemoteOrigin { host: address.clone(), address, resolved: false },
        };
        origins.push(origin);
    }

    origins
}
