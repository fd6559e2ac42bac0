//! Response Module - what happens once a process is flagged
//!
//! # Components
//! - `trap.rs`: dissect a process and persist the record durably (always first)
//! - `actions.rs`: eliminator (children first, graceful then forced)
//! - `types.rs`: elimination results, trap records

pub mod actions;
pub mod trap;
pub mod types;

pub use actions::{eliminate, KillPolicy};
pub use trap::{dissect, trap, TrapStore};
pub use types::{
    ChildTermination, Dissection, EliminationOutcome, EliminationResult, TerminationStatus,
    TrapError, TrapIdentity, TrapReceipt, TrapRecord,
};
