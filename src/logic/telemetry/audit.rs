//! Audit Log - append-only text log of hunt state transitions
//!
//! Line format: `[YYYY-MM-DD HH:MM:SS] [LEVEL] WOLF: <message>`.
//! Every line is mirrored to the `log` facade at the same level. The file is
//! a side channel: failing to write it never affects the hunt.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::Level;

pub const AUDIT_LOG_FILE: &str = "sentinel.log";

pub struct AuditLog {
    path: PathBuf,
    file: Option<File>,
    warned: bool,
}

impl AuditLog {
    /// Open `sentinel.log` in `dir`. Never fails: an unwritable directory
    /// leaves the log facade as the only sink.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(AUDIT_LOG_FILE);
        let file = std::fs::create_dir_all(dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));

        match file {
            Ok(file) => Self { path, file: Some(file), warned: false },
            Err(e) => {
                log::warn!("Audit log {:?} unavailable: {}", path, e);
                Self { path, file: None, warned: true }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, level: Level, message: &str) {
        log::log!(level, "{}", message);

        let Some(file) = self.file.as_mut() else { return };
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), level, message);

        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            if !self.warned {
                log::warn!("Audit log write to {:?} failed: {}", self.path, e);
                self.warned = true;
            }
        }
    }

    pub fn info(&mut self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn warning(&mut self, message: &str) {
        self.write(Level::Warn, message);
    }

    pub fn error(&mut self, message: &str) {
        self.write(Level::Error, message);
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn format_line(stamp: &str, level: Level, message: &str) -> String {
    format!("[{}] [{}] WOLF: {}\n", stamp, level_name(level), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_line_format() {
        let line = format_line("2024-01-02 03:04:05", Level::Warn, "Hunt started");
        assert_eq!(line, "[2024-01-02 03:04:05] [WARNING] WOLF: Hunt started\n");
    }

    #[test]
    fn test_lines_appended() {
        let temp_dir = TempDir::new().unwrap();
        let mut audit = AuditLog::open(temp_dir.path());
        audit.warning("SUSPICIOUS: PID 42");
        audit.info("TRAP written");
        audit.error("cycle failed");

        let content = std::fs::read_to_string(audit.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[WARNING] WOLF: SUSPICIOUS: PID 42"));
        assert!(lines[1].contains("[INFO] WOLF: TRAP written"));
        assert!(lines[2].contains("[ERROR]"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        // A regular file where the directory should be
        let mut audit = AuditLog::open(&blocker.join("sub"));
        audit.info("still fine");
        assert!(!audit.path().exists());
    }
}
