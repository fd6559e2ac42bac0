//! Process Intelligence Module - what the hunter knows about processes
//!
//! # Components
//! - `snapshot.rs`: one pass over the process table -> ProcessSnapshot per pid
//! - `history.rs`: per-process title history, threshold crossing
//! - `tree.rs`: tracer (parent chain, descendants, remote origins)

pub mod history;
pub mod snapshot;
pub mod tree;
pub mod types;

pub use history::{Observation, ProtectedSighting, TitleHistoryTracker};
pub use snapshot::{build_snapshots, resolve_title};
pub use tree::{trace, TraceOptions};
pub use types::{LineageEntry, ProcessKey, ProcessSnapshot, RemoteOrigin, TraceResult};
