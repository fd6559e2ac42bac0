//! Snapshot Builder - one pass over the process table per cycle.

use std::collections::HashMap;

use crate::logic::probe::{ProbeError, ProcessTable, RawProcess, TitleReader};

use super::types::ProcessSnapshot;

/// Command-line tokens used when a process has no window title
const TITLE_FALLBACK_TOKENS: usize = 3;

/// Current title of a process.
///
/// Window title first, then the leading command-line tokens, then the
/// executable name, then "".
pub fn resolve_title(titles: &dyn TitleReader, raw: &RawProcess) -> String {
    if let Some(title) = titles.window_title(raw.pid).filter(|t| !t.trim().is_empty()) {
        return title;
    }
    if !raw.cmd.is_empty() {
        return short_cmdline(&raw.cmd);
    }
    raw.name.clone()
}

/// First few command-line tokens joined by spaces
pub fn short_cmdline(cmd: &[String]) -> String {
    cmd.iter()
        .take(TITLE_FALLBACK_TOKENS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the whole table into immutable snapshots keyed by pid.
///
/// A process that vanishes mid-read is skipped; other per-field failures
/// degrade that field. Only an unreadable table is an error.
pub fn build_snapshots(
    table: &mut dyn ProcessTable,
    titles: &dyn TitleReader,
    capture_network: bool,
) -> Result<HashMap<u32, ProcessSnapshot>, ProbeError> {
    let rows = table.enumerate()?;

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for row in &rows {
        if let Some(ppid) = row.parent_pid.filter(|ppid| *ppid != row.pid) {
            children.entry(ppid).or_default().push(row.pid);
        }
    }

    let mut snapshots = HashMap::with_capacity(rows.len());
    for row in rows {
        let connections = if capture_network {
            match table.connections(row.pid) {
                Ok(conns) => conns.into_iter().filter(|c| c.is_established()).collect(),
                Err(e) if e.is_vanished() => continue,
                Err(e) => {
                    log::debug!("connections of pid {} unavailable: {}", row.pid, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let title = resolve_title(titles, &row);
        let cmdline = row.cmd.join(" ");

        let mut snapshot = ProcessSnapshot::new(row.pid, &row.name, &cmdline, &title, row.start_time);
        snapshot.parent_pid = row.parent_pid;
        snapshot.children_pids = children.remove(&row.pid).unwrap_or_default();
        snapshot.children_pids.sort_unstable();
        snapshot.network_connections = connections;
        snapshot.user = row.user;

        snapshots.insert(row.pid, snapshot);
    }

    Ok(snapshots)
}
