//! Command-backed probes: window titles via `xdotool`, reverse DNS via `getent`.
//!
//! Both run an external command with a bounded wait; a missing binary, a
//! non-zero exit or a timeout all read as "no answer".

use std::io::Read;
use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::{HostnameResolver, TitleReader};

const POLL_STEP: Duration = Duration::from_millis(10);

/// Run a command and return trimmed stdout if it exits 0 within `timeout`
pub fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log::debug!("{} timed out after {:?}", program, timeout);
                return None;
            }
            Ok(None) => std::thread::sleep(POLL_STEP),
            Err(_) => return None,
        }
    };

    if !status.success() {
        return None;
    }

    let mut stdout = String::new();
    child.stdout.take()?.read_to_string(&mut stdout).ok()?;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// WINDOW TITLES
// ============================================================================

pub struct XdotoolTitleReader {
    timeout: Duration,
}

impl XdotoolTitleReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TitleReader for XdotoolTitleReader {
    fn window_title(&self, pid: u32) -> Option<String> {
        let pid = pid.to_string();
        let output = run_bounded(
            "xdotool",
            &["search", "--pid", &pid, "getwindowname"],
            self.timeout,
        )?;
        // One line per window; the first one names the process
        output.lines().next().map(|line| line.trim().to_string())
    }
}

// ============================================================================
// REVERSE DNS
// ============================================================================

pub struct GetentResolver {
    timeout: Duration,
}

impl GetentResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HostnameResolver for GetentResolver {
    fn reverse(&self, ip: IpAddr) -> Option<String> {
        let ip = ip.to_string();
        let output = run_bounded("getent", &["hosts", &ip], self.timeout)?;
        parse_getent_hosts(&output)
    }
}

/// `getent hosts` prints `<addr> <canonical> [aliases...]`
fn parse_getent_hosts(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}
