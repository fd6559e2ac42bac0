//! Live process table - sysinfo for the table and signals, procfs (Linux)
//! for file descriptors, sockets and thread counts.

use std::collections::HashMap;
use std::path::PathBuf;

use sysinfo::{Pid, ProcessStatus, Signal, System, Users};

use super::{MemoryUsage, NetConnection, ProbeError, ProcessTable, RawProcess, TermSignal};

pub struct SystemTable {
    system: System,
    users: Users,
    /// socket inode -> connection, rebuilt lazily after each enumerate
    sockets: Option<HashMap<u64, NetConnection>>,
}

impl SystemTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
            sockets: None,
        }
    }

    fn raw(&self, pid: Pid, process: &sysinfo::Process) -> RawProcess {
        RawProcess {
            pid: pid.as_u32(),
            parent_pid: process.parent().map(|p| p.as_u32()),
            name: process.name().to_string(),
            cmd: process.cmd().to_vec(),
            user: process
                .user_id()
                .and_then(|uid| self.users.get_user_by_id(uid))
                .map(|u| u.name().to_string()),
            start_time: process.start_time(),
        }
    }

    /// Refresh a single process; `Vanished` when it is gone
    fn refreshed(&mut self, pid: u32) -> Result<&sysinfo::Process, ProbeError> {
        let sys_pid = Pid::from_u32(pid);
        if !self.system.refresh_process(sys_pid) {
            return Err(ProbeError::Vanished { pid });
        }
        self.system.process(sys_pid).ok_or(ProbeError::Vanished { pid })
    }
}

impl Default for SystemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemTable {
    fn enumerate(&mut self) -> Result<Vec<RawProcess>, ProbeError> {
        self.system.refresh_processes();
        self.users.refresh_list();
        self.sockets = None;

        let processes: Vec<RawProcess> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| self.raw(*pid, process))
            .collect();

        if processes.is_empty() {
            return Err(ProbeError::Other("process table is empty or unreadable".to_string()));
        }
        Ok(processes)
    }

    fn query(&mut self, pid: u32) -> Option<RawProcess> {
        let sys_pid = Pid::from_u32(pid);
        if !self.system.refresh_process(sys_pid) {
            return None;
        }
        self.system.process(sys_pid).map(|p| self.raw(sys_pid, p))
    }

    /// A zombie still has a table entry but is already dead; it stays
    /// listed until its parent reaps it.
    fn is_alive(&mut self, pid: u32) -> bool {
        self.refreshed(pid)
            .map(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .unwrap_or(false)
    }

    fn connections(&mut self, pid: u32) -> Result<Vec<NetConnection>, ProbeError> {
        if self.sockets.is_none() {
            self.sockets = Some(linux::socket_table()?);
        }
        let inodes = linux::socket_inodes(pid)?;
        let table = self.sockets.as_ref().ok_or(ProbeError::Unsupported { what: "sockets" })?;
        Ok(inodes.iter().filter_map(|inode| table.get(inode).cloned()).collect())
    }

    fn open_files(&mut self, pid: u32) -> Result<Vec<String>, ProbeError> {
        linux::open_files(pid)
    }

    fn executable(&mut self, pid: u32) -> Result<PathBuf, ProbeError> {
        match linux::executable(pid) {
            Err(ProbeError::Unsupported { .. }) => self
                .refreshed(pid)?
                .exe()
                .map(|p| p.to_path_buf())
                .ok_or(ProbeError::PermissionDenied { pid, what: "exe" }),
            other => other,
        }
    }

    fn working_dir(&mut self, pid: u32) -> Result<PathBuf, ProbeError> {
        match linux::working_dir(pid) {
            Err(ProbeError::Unsupported { .. }) => self
                .refreshed(pid)?
                .cwd()
                .map(|p| p.to_path_buf())
                .ok_or(ProbeError::PermissionDenied { pid, what: "cwd" }),
            other => other,
        }
    }

    fn status(&mut self, pid: u32) -> Result<String, ProbeError> {
        Ok(self.refreshed(pid)?.status().to_string())
    }

    fn memory(&mut self, pid: u32) -> Result<MemoryUsage, ProbeError> {
        let process = self.refreshed(pid)?;
        Ok(MemoryUsage {
            rss: process.memory(),
            vms: process.virtual_memory(),
        })
    }

    fn thread_count(&mut self, pid: u32) -> Result<u64, ProbeError> {
        match linux::thread_count(pid) {
            Err(ProbeError::Unsupported { .. }) => self
                .refreshed(pid)?
                .tasks()
                .map(|tasks| tasks.len() as u64)
                .ok_or(ProbeError::Unsupported { what: "thread count" }),
            other => other,
        }
    }

    fn signal(&mut self, pid: u32, signal: TermSignal) -> Result<(), ProbeError> {
        let sent = {
            let process = self.refreshed(pid)?;
            match signal {
                TermSignal::Terminate => process.kill_with(Signal::Term),
                TermSignal::Kill => Some(process.kill()),
            }
        };

        match sent {
            Some(true) => Ok(()),
            None => Err(ProbeError::Unsupported { what: "signal" }),
            Some(false) => {
                // Failed delivery: either it just exited or we lack rights
                if !self.is_alive(pid) {
                    Err(ProbeError::Vanished { pid })
                } else {
                    Err(ProbeError::PermissionDenied { pid, what: "signal" })
                }
            }
        }
    }
}

// ============================================================================
// PROCFS (LINUX)
// ============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use procfs::process::{FDTarget, Process};
    use procfs::ProcError;

    use super::super::{NetConnection, ProbeError};

    fn map_err(pid: u32, what: &'static str, err: ProcError) -> ProbeError {
        match err {
            ProcError::PermissionDenied(_) => ProbeError::PermissionDenied { pid, what },
            ProcError::NotFound(_) => ProbeError::Vanished { pid },
            ProcError::Io(e, _) => ProbeError::Io(e),
            other => ProbeError::Other(other.to_string()),
        }
    }

    fn open(pid: u32, what: &'static str) -> Result<Process, ProbeError> {
        Process::new(pid as i32).map_err(|e| map_err(pid, what, e))
    }

    pub fn executable(pid: u32) -> Result<PathBuf, ProbeError> {
        open(pid, "exe")?.exe().map_err(|e| map_err(pid, "exe", e))
    }

    pub fn working_dir(pid: u32) -> Result<PathBuf, ProbeError> {
        open(pid, "cwd")?.cwd().map_err(|e| map_err(pid, "cwd", e))
    }

    pub fn thread_count(pid: u32) -> Result<u64, ProbeError> {
        let stat = open(pid, "stat")?.stat().map_err(|e| map_err(pid, "stat", e))?;
        Ok(stat.num_threads.max(0) as u64)
    }

    pub fn open_files(pid: u32) -> Result<Vec<String>, ProbeError> {
        let fds = open(pid, "fd")?.fd().map_err(|e| map_err(pid, "fd", e))?;
        Ok(fds
            .filter_map(Result::ok)
            .filter_map(|fd| match fd.target {
                FDTarget::Path(path) => Some(path.to_string_lossy().to_string()),
                _ => None,
            })
            .collect())
    }

    pub fn socket_inodes(pid: u32) -> Result<Vec<u64>, ProbeError> {
        let fds = open(pid, "fd")?.fd().map_err(|e| map_err(pid, "fd", e))?;
        Ok(fds
            .filter_map(Result::ok)
            .filter_map(|fd| match fd.target {
                FDTarget::Socket(inode) => Some(inode),
                _ => None,
            })
            .collect())
    }

    fn endpoint(addr: SocketAddr) -> Option<String> {
        if addr.ip().is_unspecified() && addr.port() == 0 {
            None
        } else {
            Some(addr.to_string())
        }
    }

    /// All inet TCP sockets on the host keyed by inode
    pub fn socket_table() -> Result<HashMap<u64, NetConnection>, ProbeError> {
        let mut entries = procfs::net::tcp().map_err(|e| ProbeError::Other(e.to_string()))?;
        // IPv6 may be disabled; v4 alone is still useful
        if let Ok(v6) = procfs::net::tcp6() {
            entries.extend(v6);
        }

        Ok(entries
            .into_iter()
            .map(|entry| {
                let conn = NetConnection {
                    local: entry.local_address.to_string(),
                    remote: endpoint(entry.remote_address),
                    status: format!("{:?}", entry.state).to_uppercase(),
                };
                (entry.inode, conn)
            })
            .collect())
    }
}

#[cfg(not(target_os = "linux"))]
mod linux {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::super::{NetConnection, ProbeError};

    pub fn executable(_pid: u32) -> Result<PathBuf, ProbeError> {
        Err(ProbeError::Unsupported { what: "procfs exe" })
    }

    pub fn working_dir(_pid: u32) -> Result<PathBuf, ProbeError> {
        Err(ProbeError::Unsupported { what: "procfs cwd" })
    }

    pub fn thread_count(_pid: u32) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported { what: "procfs stat" })
    }

    pub fn open_files(_pid: u32) -> Result<Vec<String>, ProbeError> {
        Err(ProbeError::Unsupported { what: "open files" })
    }

    pub fn socket_inodes(_pid: u32) -> Result<Vec<u64>, ProbeError> {
        Err(ProbeError::Unsupported { what: "sockets" })
    }

    pub fn socket_table() -> Result<HashMap<u64, NetConnection>, ProbeError> {
        Err(ProbeError::Unsupported { what: "sockets" })
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    #[test]
    fn test_unreaped_child_is_not_alive() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        let mut table = SystemTable::new();
        assert!(table.is_alive(pid));

        // Killed but not waited on: stays in /proc as a zombie
        child.kill().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.is_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!table.is_alive(pid));
        assert!(std::path::Path::new(&format!("/proc/{}", pid)).exists());

        child.wait().unwrap();
        assert!(!table.is_alive(pid));
    }
}
