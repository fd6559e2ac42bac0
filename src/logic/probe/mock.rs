//! Scripted in-memory process table for tests.
//!
//! `MockTable`, `MockTitles` and `MockResolver` share one `MockOs` so a test
//! can change titles or kill processes between cycles while the hunter
//! owns the probes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    HostnameResolver, MemoryUsage, NetConnection, ProbeError, ProcessTable, Probes, RawProcess,
    TermSignal, TitleReader,
};

#[derive(Debug, Clone)]
pub struct MockProcess {
    pub raw: RawProcess,
    pub title: Option<String>,
    pub connections: Vec<NetConnection>,
    pub open_files: Vec<String>,
    pub exe: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub memory: Option<MemoryUsage>,
    pub threads: Option<u64>,
    /// Survives SIGTERM, dies on SIGKILL
    pub ignores_term: bool,
    /// Every signal returns PermissionDenied
    pub unkillable: bool,
    /// Dies but stays listed, as an unreaped zombie
    pub lingers: bool,
    pub zombie: bool,
}

impl MockProcess {
    pub fn new(pid: u32, parent: Option<u32>, name: &str) -> Self {
        Self {
            raw: RawProcess {
                pid,
                parent_pid: parent,
                name: name.to_string(),
                cmd: vec![format!("/usr/bin/{}", name)],
                user: Some("tester".to_string()),
                start_time: 1_000 + pid as u64,
            },
            title: None,
            connections: Vec::new(),
            open_files: Vec::new(),
            exe: Some(PathBuf::from(format!("/usr/bin/{}", name))),
            cwd: Some(PathBuf::from("/tmp")),
            memory: Some(MemoryUsage { rss: 4096, vms: 8192 }),
            threads: Some(1),
            ignores_term: false,
            unkillable: false,
            lingers: false,
            zombie: false,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalCall {
    pub pid: u32,
    pub signal: TermSignal,
    /// Whether a trap file for this pid existed when the signal was issued
    pub trap_on_disk: bool,
}

#[derive(Default)]
pub struct MockState {
    pub processes: BTreeMap<u32, MockProcess>,
    pub signals: Vec<SignalCall>,
    pub hostnames: HashMap<IpAddr, String>,
    pub trap_dir: Option<PathBuf>,
    pub signal_delay: Duration,
    pub signal_started: bool,
    pub fail_enumerate: bool,
    pub denied: HashSet<&'static str>,
}

#[derive(Clone, Default)]
pub struct MockOs {
    pub state: Arc<Mutex<MockState>>,
}

impl MockOs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, process: MockProcess) {
        self.state.lock().processes.insert(process.raw.pid, process);
    }

    pub fn exit(&self, pid: u32) {
        self.state.lock().processes.remove(&pid);
    }

    pub fn set_title(&self, pid: u32, title: &str) {
        if let Some(p) = self.state.lock().processes.get_mut(&pid) {
            p.title = Some(title.to_string());
        }
    }

    pub fn signals(&self) -> Vec<SignalCall> {
        self.state.lock().signals.clone()
    }

    pub fn signalled_pids(&self) -> Vec<u32> {
        self.state.lock().signals.iter().map(|s| s.pid).collect()
    }

    /// Listed and not a zombie
    pub fn alive(&self, pid: u32) -> bool {
        self.state.lock().processes.get(&pid).is_some_and(|p| !p.zombie)
    }

    pub fn is_zombie(&self, pid: u32) -> bool {
        self.state.lock().processes.get(&pid).is_some_and(|p| p.zombie)
    }

    pub fn probes(&self) -> Probes {
        Probes {
            table: Box::new(MockTable { os: self.clone() }),
            titles: Box::new(MockTitles { os: self.clone() }),
            resolver: Box::new(MockResolver { os: self.clone() }),
        }
    }
}

pub struct MockTable {
    os: MockOs,
}

impl MockTable {
    fn with<T>(&self, pid: u32, what: &'static str, f: impl FnOnce(&MockProcess) -> Option<T>) -> Result<T, ProbeError> {
        let state = self.os.state.lock();
        if state.denied.contains(what) {
            return Err(ProbeError::PermissionDenied { pid, what });
        }
        let process = state.processes.get(&pid).ok_or(ProbeError::Vanished { pid })?;
        f(process).ok_or(ProbeError::PermissionDenied { pid, what })
    }
}

fn trap_exists(dir: &Option<PathBuf>, pid: u32) -> bool {
    let Some(dir) = dir else { return false };
    let prefix = format!("trap_pid{}_", pid);
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with(&prefix) && name.ends_with(".json")
            })
        })
        .unwrap_or(false)
}

impl ProcessTable for MockTable {
    fn enumerate(&mut self) -> Result<Vec<RawProcess>, ProbeError> {
        let state = self.os.state.lock();
        if state.fail_enumerate {
            return Err(ProbeError::Other("table unreadable".to_string()));
        }
        Ok(state.processes.values().map(|p| p.raw.clone()).collect())
    }

    fn query(&mut self, pid: u32) -> Option<RawProcess> {
        self.os.state.lock().processes.get(&pid).map(|p| p.raw.clone())
    }

    fn connections(&mut self, pid: u32) -> Result<Vec<NetConnection>, ProbeError> {
        self.with(pid, "connections", |p| Some(p.connections.clone()))
    }

    fn open_files(&mut self, pid: u32) -> Result<Vec<String>, ProbeError> {
        self.with(pid, "open_files", |p| Some(p.open_files.clone()))
    }

    fn executable(&mut self, pid: u32) -> Result<PathBuf, ProbeError> {
        self.with(pid, "exe", |p| p.exe.clone())
    }

    fn working_dir(&mut self, pid: u32) -> Result<PathBuf, ProbeError> {
        self.with(pid, "cwd", |p| p.cwd.clone())
    }

    fn status(&mut self, pid: u32) -> Result<String, ProbeError> {
        self.with(pid, "status", |p| Some(if p.zombie { "Zombie" } else { "Run" }.to_string()))
    }

    fn memory(&mut self, pid: u32) -> Result<MemoryUsage, ProbeError> {
        self.with(pid, "memory", |p| p.memory)
    }

    fn thread_count(&mut self, pid: u32) -> Result<u64, ProbeError> {
        self.with(pid, "threads", |p| p.threads)
    }

    fn signal(&mut self, pid: u32, signal: TermSignal) -> Result<(), ProbeError> {
        let delay = {
            let mut state = self.os.state.lock();
            state.signal_started = true;
            state.signal_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.os.state.lock();
        let trap_on_disk = trap_exists(&state.trap_dir, pid);
        let Some(process) = state.processes.get(&pid).cloned() else {
            return Err(ProbeError::Vanished { pid });
        };
        state.signals.push(SignalCall { pid, signal, trap_on_disk });

        if process.zombie {
            return Ok(());
        }
        if process.unkillable {
            return Err(ProbeError::PermissionDenied { pid, what: "signal" });
        }
        if signal == TermSignal::Kill || !process.ignores_term {
            if process.lingers {
                if let Some(p) = state.processes.get_mut(&pid) {
                    p.zombie = true;
                }
            } else {
                state.processes.remove(&pid);
            }
        }
        Ok(())
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        self.os.alive(pid)
    }
}

pub struct MockTitles {
    os: MockOs,
}

impl TitleReader for MockTitles {
    fn window_title(&self, pid: u32) -> Option<String> {
        self.os.state.lock().processes.get(&pid).and_then(|p| p.title.clone())
    }
}

pub struct MockResolver {
    os: MockOs,
}

impl HostnameResolver for MockResolver {
    fn reverse(&self, ip: IpAddr) -> Option<String> {
        self.os.state.lock().hostnames.get(&ip).cloned()
    }
}
