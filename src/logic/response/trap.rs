//! Trap & Dissect
//!
//! Captures a suspicious process before anything destructive happens and
//! persists the capture as one JSON document per incident.
//!
//! Files are named `trap_pid<pid>_<unix-millis>.json`. The body is written
//! and synced to a hidden temp file first, then linked under its final
//! name, so a half-written record never appears under a trap name.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::logic::probe::{ProbeError, ProcessTable};
use crate::logic::process_intel::ProcessSnapshot;
use crate::logic::threat::DetectionReason;

use super::types::{Dissection, TrapError, TrapIdentity, TrapReceipt, TrapRecord};

const TRAP_PREFIX: &str = "trap_pid";
const TRAP_EXT: &str = "json";

// ============================================================================
// DISSECTION
// ============================================================================

/// Collapse one fallible sub-field into an Option, noting why it is missing
fn field<T>(pid: u32, what: &str, result: Result<T, ProbeError>, unavailable: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            match &e {
                ProbeError::Vanished { .. } => {}
                ProbeError::PermissionDenied { .. } => {
                    log::warn!("Trap of PID {}: {} unavailable ({})", pid, what, e)
                }
                _ => log::debug!("Trap of PID {}: {} unavailable ({})", pid, what, e),
            }
            unavailable.push(format!("{}: {}", what, e));
            None
        }
    }
}

/// Read everything we can about `pid`; never fails as a whole
pub fn dissect(table: &mut dyn ProcessTable, snapshot: &ProcessSnapshot) -> Dissection {
    let pid = snapshot.pid;
    let mut unavailable = Vec::new();

    let live = table.query(pid);
    if live.is_none() {
        unavailable.push("identity: process vanished".to_string());
    }

    let exe = field(pid, "exe", table.executable(pid), &mut unavailable);
    let cwd = field(pid, "cwd", table.working_dir(pid), &mut unavailable);
    let status = field(pid, "status", table.status(pid), &mut unavailable);
    let open_files = field(pid, "open_files", table.open_files(pid), &mut unavailable).unwrap_or_default();
    let connections = field(pid, "connections", table.connections(pid), &mut unavailable).unwrap_or_default();
    let memory = field(pid, "memory", table.memory(pid), &mut unavailable);
    let num_threads = field(pid, "num_threads", table.thread_count(pid), &mut unavailable);

    let start_time = live.as_ref().map_or(snapshot.start_time, |row| row.start_time);
    let create_time = if start_time > 0 {
        Utc.timestamp_opt(start_time as i64, 0).single()
    } else {
        None
    };

    let identity = TrapIdentity {
        pid,
        name: live.as_ref().map_or_else(|| snapshot.name.clone(), |row| row.name.clone()),
        user: live.as_ref().and_then(|row| row.user.clone()).or_else(|| snapshot.user.clone()),
        exe,
        cmdline: live.as_ref().map_or_else(|| snapshot.cmdline.clone(), |row| row.cmd.join(" ")),
        cwd,
        create_time,
        status,
    };

    Dissection {
        identity,
        open_files,
        connections,
        memory,
        num_threads,
        unavailable,
    }
}

// ============================================================================
// TRAP STORE
// ============================================================================

/// Directory of trap documents, one file per incident
#[derive(Debug, Clone)]
pub struct TrapStore {
    dir: PathBuf,
}

impl TrapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(path: &Path, source: std::io::Error) -> TrapError {
        TrapError::Io { path: path.to_path_buf(), source }
    }

    /// Persist a record durably. Returns the final path.
    pub fn save(&self, record: &TrapRecord) -> Result<PathBuf, TrapError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_err(&self.dir, e))?;
        let body = serde_json::to_vec_pretty(record)?;
        let stamp = record.created_at.timestamp_millis();

        let tmp = self.dir.join(format!(".{}{}_{}_{}.tmp", TRAP_PREFIX, record.pid, stamp, Uuid::new_v4()));
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_err(&tmp, e));
        }

        let published = self.publish(&tmp, record.pid, stamp);
        let _ = fs::remove_file(&tmp);
        let path = published?;

        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(path)
    }

    /// Link the finished temp file under the first free incident name.
    /// `hard_link` refuses to replace an existing file, so earlier
    /// incidents for a reused pid are never overwritten.
    fn publish(&self, tmp: &Path, pid: u32, stamp: i64) -> Result<PathBuf, TrapError> {
        for attempt in 0u32.. {
            let name = if attempt == 0 {
                format!("{}{}_{}.{}", TRAP_PREFIX, pid, stamp, TRAP_EXT)
            } else {
                format!("{}{}_{}_{}.{}", TRAP_PREFIX, pid, stamp, attempt, TRAP_EXT)
            };
            let path = self.dir.join(name);
            match fs::hard_link(tmp, &path) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Self::io_err(&path, e)),
            }
        }
        unreachable!("u32 range exhausted publishing trap file")
    }

    pub fn load(path: &Path) -> Result<TrapRecord, TrapError> {
        let data = fs::read(path).map_err(|e| Self::io_err(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Trap files currently on disk, oldest name first
    pub fn list(&self) -> Result<Vec<PathBuf>, TrapError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(&self.dir, e)),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map_or(false, |ext| ext == TRAP_EXT)
                    && p.file_name()
                        .map_or(false, |n| n.to_string_lossy().starts_with(TRAP_PREFIX))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

// ============================================================================
// TRAP
// ============================================================================

/// Dissect and persist. The receipt only exists once the file is durable.
pub fn trap(
    table: &mut dyn ProcessTable,
    store: &TrapStore,
    snapshot: &ProcessSnapshot,
    reason: DetectionReason,
) -> Result<TrapReceipt, TrapError> {
    let record = TrapRecord {
        pid: snapshot.pid,
        reason,
        snapshot: snapshot.clone(),
        dissection: dissect(table, snapshot),
        host: hostname::get().ok().map(|h| h.to_string_lossy().to_string()),
        created_at: Utc::now(),
    };

    let path = store.save(&record)?;
    Ok(TrapReceipt {
        pid: record.pid,
        path,
        created_at: record.created_at,
    })
}
