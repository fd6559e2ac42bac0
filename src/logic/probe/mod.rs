//! Probe Module - OS collaborators of the hunter
//!
//! The hunter never talks to the operating system directly. Everything it
//! reads or signals goes through one of three traits:
//! - `ProcessTable`: enumerate / query / dissect / signal by pid
//! - `TitleReader`: pid -> current window title
//! - `HostnameResolver`: address -> best-effort hostname
//!
//! All three are fallible and bounded. Production implementations live in
//! `system.rs` (sysinfo + procfs) and `commands.rs` (xdotool, getent).

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod commands;
pub mod system;

#[cfg(test)]
pub mod mock;

pub use commands::{GetentResolver, XdotoolTitleReader};
pub use system::SystemTable;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reading or signalling one process
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Process exited (or was reaped) between enumeration and the read
    #[error("process {pid} vanished")]
    Vanished { pid: u32 },

    #[error("permission denied reading {what} of process {pid}")]
    PermissionDenied { pid: u32, what: &'static str },

    #[error("{what} is not supported on this platform")]
    Unsupported { what: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Transient table races are treated as absence, never as errors
    pub fn is_vanished(&self) -> bool {
        matches!(self, ProbeError::Vanished { .. })
    }
}

// ============================================================================
// RAW TABLE TYPES
// ============================================================================

/// One row of the OS process table, as read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProcess {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub name: String,
    pub cmd: Vec<String>,
    pub user: Option<String>,
    /// Seconds since the epoch; 0 when unknown
    pub start_time: u64,
}

/// A TCP/UDP socket owned by a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConnection {
    pub local: String,
    pub remote: Option<String>,
    pub status: String,
}

impl NetConnection {
    pub fn is_established(&self) -> bool {
        self.status.eq_ignore_ascii_case("ESTABLISHED")
    }

    /// IP part of the remote endpoint, if any
    pub fn remote_ip(&self) -> Option<IpAddr> {
        let remote = self.remote.as_deref()?;
        remote
            .parse::<std::net::SocketAddr>()
            .map(|addr| addr.ip())
            .ok()
            .or_else(|| remote.rsplit_once(':').and_then(|(ip, _)| ip.parse().ok()))
    }
}

/// Resident / virtual memory in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub rss: u64,
    pub vms: u64,
}

/// Signal kinds the eliminator sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermSignal {
    /// Graceful (SIGTERM)
    Terminate,
    /// Forced (SIGKILL)
    Kill,
}

// ============================================================================
// TRAITS
// ============================================================================

/// OS process table reader / signaller
pub trait ProcessTable: Send {
    /// Re-read the whole table. Per-process read failures are skipped;
    /// only an unreadable table as a whole is an error.
    fn enumerate(&mut self) -> Result<Vec<RawProcess>, ProbeError>;

    /// Re-read one process. `None` when it no longer exists.
    fn query(&mut self, pid: u32) -> Option<RawProcess>;

    fn connections(&mut self, pid: u32) -> Result<Vec<NetConnection>, ProbeError>;
    fn open_files(&mut self, pid: u32) -> Result<Vec<String>, ProbeError>;
    fn executable(&mut self, pid: u32) -> Result<PathBuf, ProbeError>;
    fn working_dir(&mut self, pid: u32) -> Result<PathBuf, ProbeError>;
    fn status(&mut self, pid: u32) -> Result<String, ProbeError>;
    fn memory(&mut self, pid: u32) -> Result<MemoryUsage, ProbeError>;
    fn thread_count(&mut self, pid: u32) -> Result<u64, ProbeError>;

    /// Deliver a signal. `Err(Vanished)` when the process is already gone.
    fn signal(&mut self, pid: u32, signal: TermSignal) -> Result<(), ProbeError>;

    fn is_alive(&mut self, pid: u32) -> bool {
        self.query(pid).is_some()
    }
}

/// Window / display title lookup
pub trait TitleReader: Send {
    fn window_title(&self, pid: u32) -> Option<String>;
}

/// Reverse hostname lookup
pub trait HostnameResolver: Send {
    fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// The three collaborators bundled for one hunter
pub struct Probes {
    pub table: Box<dyn ProcessTable>,
    pub titles: Box<dyn TitleReader>,
    pub resolver: Box<dyn HostnameResolver>,
}

impl Probes {
    /// Live OS probes
    pub fn system(title_timeout: std::time::Duration) -> Self {
        Self {
            table: Box::new(SystemTable::new()),
            titles: Box::new(XdotoolTitleReader::new(title_timeout)),
            resolver: Box::new(GetentResolver::new(title_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_ip_parsing() {
        let conn = NetConnection {
            local: "10.0.0.2:5555".to_string(),
            remote: Some("93.184.216.34:443".to_string()),
            status: "ESTABLISHED".to_string(),
        };
        assert_eq!(conn.remote_ip(), Some("93.184.216.34".parse().unwrap()));
        assert!(conn.is_established());

        let v6 = NetConnection {
            local: "[::1]:80".to_string(),
            remote: Some("[2001:db8::1]:8080".to_string()),
            status: "ESTABLISHED".to_string(),
        };
        assert_eq!(v6.remote_ip(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_listening_has_no_remote() {
        let conn = NetConnection {
            local: "0.0.0.0:22".to_string(),
            remote: None,
            status: "LISTEN".to_string(),
        };
        assert!(conn.remote_ip().is_none());
        assert!(!conn.is_established());
    }
}
