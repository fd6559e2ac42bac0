//! Logic Module - Business Logic & Engines
//!
//! ## Engines (leaves first)
//! - `probe/` - OS collaborators (process table, window titles, hostnames)
//! - `process_intel/` - snapshots, title history, tracer
//! - `threat/` - suspicion classifier, protected list
//! - `response/` - trap & dissect, eliminator
//! - `telemetry/` - hunt journal, audit log
//! - `hunt_loop/` - the cycle and its owned state
//! - `sentinel` - start / stop / status control surface

pub mod config;
pub mod hunt_loop;
pub mod probe;
pub mod process_intel;
pub mod response;
pub mod sentinel;
pub mod telemetry;
pub mod threat;
