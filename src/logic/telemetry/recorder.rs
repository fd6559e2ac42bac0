//! Hunt Journal
//!
//! Append-only JSONL writer for hunt records (`hunts.jsonl`).
//! Every line is flushed as soon as it is written.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::event::HuntRecord;

/// Hunt log file name inside the log directory
pub const HUNT_LOG_FILE: &str = "hunts.jsonl";

// ============================================================================
// JOURNAL
// ============================================================================

pub struct HuntJournal {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl HuntJournal {
    /// Open (or create) the journal in `dir`
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(HUNT_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        log::debug!("Opened hunt journal: {:?}", path);
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            written: 0,
        })
    }

    pub fn append(&mut self, record: &HuntRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle
    pub fn written(&self) -> u64 {
        self.written
    }
}

// ============================================================================
// QUERY API
// ============================================================================

/// Last `limit` records of a journal file, most recent first.
/// A missing file is an empty journal; unparseable lines are skipped.
pub fn read_recent(path: &Path, limit: usize) -> std::io::Result<Vec<HuntRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HuntRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::debug!("Skipping malformed hunt record: {}", e),
        }
    }

    Ok(records.into_iter().rev().take(limit).collect())
}
