//! Telemetry Module
//!
//! Everything the sentinel leaves behind besides trap files.
//!
//! ## Structure
//! - `event.rs` - HuntRecord (immutable, one per resolved incident)
//! - `recorder.rs` - Append-only JSONL hunt journal
//! - `audit.rs` - Timestamped, leveled text log of state transitions

pub mod audit;
pub mod event;
pub mod recorder;

pub use audit::{AuditLog, AUDIT_LOG_FILE};
pub use event::{HuntRecord, HuntResolution};
pub use recorder::{read_recent, HuntJournal, HUNT_LOG_FILE};
