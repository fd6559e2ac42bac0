//! Sentinel - control surface of the hunt worker
//!
//! start / stop / status / recent hunts. The worker is a dedicated thread
//! running a current-thread tokio runtime; it owns the `Hunter` and all of
//! its state. This side only holds the cancellation token and the shared,
//! read-only status.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::logic::config::SentinelConfig;
use crate::logic::hunt_loop::{HuntShared, HuntStatus, Hunter, SentinelError};
use crate::logic::probe::Probes;
use crate::logic::telemetry::HuntRecord;

type ProbeFactory = Box<dyn Fn() -> Probes + Send + Sync>;

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    /// Disconnects when the worker thread exits
    done: mpsc::Receiver<()>,
}

pub struct Sentinel {
    config: Arc<SentinelConfig>,
    probes: ProbeFactory,
    shared: Arc<HuntShared>,
    worker: Mutex<Option<Worker>>,
}

impl Sentinel {
    /// `probes` is called once per start, so a restarted sentinel begins
    /// with fresh collaborators and empty state.
    pub fn new<F>(config: SentinelConfig, probes: F) -> Self
    where
        F: Fn() -> Probes + Send + Sync + 'static,
    {
        let shared = HuntShared::new(&config);
        Self {
            config: Arc::new(config),
            probes: Box::new(probes),
            shared,
            worker: Mutex::new(None),
        }
    }

    /// Sentinel over the live OS
    pub fn with_system(config: SentinelConfig) -> Self {
        let timeout = config.probe_timeout();
        Self::new(config, move || Probes::system(timeout))
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Start hunting. Returns `Ok(false)` if already running, or if a
    /// stopped worker has not exited yet; at most one worker ever runs.
    pub fn start(&self) -> Result<bool, SentinelError> {
        let mut worker = self.worker.lock();
        if let Some(current) = worker.as_ref() {
            if !current.handle.is_finished() {
                if current.token.is_cancelled() {
                    log::warn!("Previous hunt worker is still shutting down; not starting another");
                } else {
                    log::debug!("Sentinel already hunting");
                }
                return Ok(false);
            }
        }
        if let Some(finished) = worker.take() {
            if finished.handle.join().is_err() {
                log::error!("Previous hunt worker panicked");
            }
        }

        let token = CancellationToken::new();
        let hunter = Hunter::new(self.config.clone(), (self.probes)(), self.shared.clone());
        let (done_tx, done) = mpsc::channel::<()>();

        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("wolf-hunter".to_string())
            .spawn(move || {
                let _done = done_tx;
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to create tokio runtime for hunt loop: {}", e);
                        return;
                    }
                };
                rt.block_on(hunter.run(worker_token));
            })
            .map_err(SentinelError::Spawn)?;

        *worker = Some(Worker { token, handle, done });
        Ok(true)
    }

    /// Request cancellation and wait up to `stop_timeout` for the worker.
    /// Returns true if it exited in time. Otherwise the cancelled worker
    /// stays registered until it finishes, so `start` will not run a
    /// second one beside it and a later `stop` waits again. Stopping a
    /// stopped sentinel is a no-op.
    pub fn stop(&self) -> bool {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return true;
        };
        worker.token.cancel();

        match worker.done.recv_timeout(self.config.stop_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Hunt worker panicked during shutdown");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Hunt worker did not stop within {:?}; it will exit after the current incident",
                    self.config.stop_timeout()
                );
                *slot = Some(worker);
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn status(&self) -> HuntStatus {
        self.shared.status()
    }

    /// Up to `limit` hunt records, most recent first
    pub fn recent_hunts(&self, limit: usize) -> Vec<HuntRecord> {
        self.shared.recent(limit)
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::logic::probe::mock::{MockOs, MockProcess};
    use crate::logic::response::TrapStore;
    use crate::logic::telemetry::HuntResolution;

    fn sentinel(os: &MockOs, dir: &std::path::Path) -> Sentinel {
        let config = SentinelConfig {
            scan_interval_ms: 10,
            trap_dir: dir.join("traps"),
            log_dir: dir.join("logs"),
            child_grace_ms: 0,
            target_grace_ms: 0,
            ..Default::default()
        };
        os.state.lock().trap_dir = Some(config.trap_dir.clone());
        let os = os.clone();
        Sentinel::new(config, move || os.probes())
    }

    fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        let sentinel = sentinel(&os, dir.path());

        assert!(sentinel.stop());
        assert!(sentinel.start().unwrap());
        assert!(!sentinel.start().unwrap());
        assert!(sentinel.is_running());

        wait_for("first cycle", || sentinel.status().cycle_count > 0);
        assert!(sentinel.status().hunting);

        assert!(sentinel.stop());
        assert!(sentinel.stop());
        assert!(!sentinel.is_running());
        assert!(!sentinel.status().hunting);
    }

    #[test]
    fn test_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        let sentinel = sentinel(&os, dir.path());

        assert!(sentinel.start().unwrap());
        assert!(sentinel.stop());
        assert!(sentinel.start().unwrap());
        wait_for("hunting again", || sentinel.status().hunting);
        assert!(sentinel.stop());
    }

    #[test]
    fn test_no_second_worker_after_stop_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        os.spawn(MockProcess::new(45, Some(1), "dropper").titled("a"));
        os.state.lock().signal_delay = Duration::from_millis(1500);
        let config = SentinelConfig {
            scan_interval_ms: 10,
            trap_dir: dir.path().join("traps"),
            log_dir: dir.path().join("logs"),
            child_grace_ms: 0,
            target_grace_ms: 0,
            stop_timeout_secs: 0,
            ..Default::default()
        };
        os.state.lock().trap_dir = Some(config.trap_dir.clone());
        let starts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let factory_os = os.clone();
        let counter = starts.clone();
        let sentinel = Sentinel::new(config, move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            factory_os.probes()
        });

        sentinel.start().unwrap();
        wait_for("title recorded", || sentinel.status().processes_tracked == 1);
        os.set_title(45, "b");
        wait_for("elimination under way", || os.state.lock().signal_started);

        // Worker is mid-incident: stop gives up, restart is refused
        assert!(!sentinel.stop());
        assert!(sentinel.is_running());
        assert!(!sentinel.start().unwrap());
        assert_eq!(starts.load(std::sync::atomic::Ordering::SeqCst), 1);

        wait_for("old worker exit", || !sentinel.is_running());
        assert_eq!(sentinel.recent_hunts(5).len(), 1);
        assert!(!os.alive(45));

        os.state.lock().signal_delay = Duration::ZERO;
        assert!(sentinel.start().unwrap());
        assert_eq!(starts.load(std::sync::atomic::Ordering::SeqCst), 2);
        wait_for("hunting again", || sentinel.status().hunting);

        // Zero timeout: keep asking until the idle worker notices
        wait_for("stopped", || {
            sentinel.stop();
            !sentinel.is_running()
        });
    }

    #[test]
    fn test_hunts_through_control_surface() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        os.spawn(MockProcess::new(40, Some(1), "agent").titled("update-agent"));
        let sentinel = sentinel(&os, dir.path());

        sentinel.start().unwrap();
        wait_for("title recorded", || sentinel.status().processes_tracked == 1);
        os.set_title(40, "svchost-helper");
        wait_for("hunt record", || !sentinel.recent_hunts(5).is_empty());
        sentinel.stop();

        let hunts = sentinel.recent_hunts(5);
        assert_eq!(hunts.len(), 1);
        assert_eq!(hunts[0].pid, 40);
        assert_eq!(hunts[0].resolution, HuntResolution::Eliminated);
        assert!(!os.alive(40));
        assert_eq!(sentinel.status().hunted_count, 1);
    }

    #[test]
    fn test_stop_waits_for_incident_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        os.spawn(MockProcess::new(50, Some(1), "dropper").titled("a"));
        os.spawn(MockProcess::new(51, Some(50), "payload"));
        os.state.lock().signal_delay = Duration::from_millis(200);
        let sentinel = sentinel(&os, dir.path());

        sentinel.start().unwrap();
        wait_for("title recorded", || sentinel.status().processes_tracked == 2);
        os.set_title(50, "b");
        wait_for("elimination under way", || os.state.lock().signal_started);

        assert!(sentinel.stop());

        // The incident ran to completion before the worker exited
        assert!(!os.alive(50) && !os.alive(51));
        let hunts = sentinel.recent_hunts(5);
        assert_eq!(hunts.len(), 1);
        assert_eq!(hunts[0].resolution, HuntResolution::Eliminated);

        let traps = TrapStore::new(dir.path().join("traps")).list().unwrap();
        assert_eq!(traps.len(), 1);
        let record = TrapStore::load(&traps[0]).unwrap();
        assert_eq!(record.pid, 50);
        assert!(os.signals().iter().filter(|s| s.pid == 50).all(|s| s.trap_on_disk));
    }

    #[test]
    fn test_recent_hunts_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let os = MockOs::new();
        for pid in [60, 61, 62] {
            os.spawn(MockProcess::new(pid, Some(1), "agent").titled("a"));
        }
        let sentinel = sentinel(&os, dir.path());

        sentinel.start().unwrap();
        wait_for("titles recorded", || sentinel.status().processes_tracked == 3);
        for pid in [60, 61, 62] {
            let seen = sentinel.status().hunted_count;
            os.set_title(pid, "b");
            wait_for("hunt", || sentinel.status().hunted_count > seen);
        }
        sentinel.stop();

        let pids: Vec<u32> = sentinel.recent_hunts(2).iter().map(|h| h.pid).collect();
        assert_eq!(pids, vec![62, 61]);
    }
}
