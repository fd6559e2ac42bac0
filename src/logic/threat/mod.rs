//! Threat Module
//!
//! Decides which processes are suspicious.
//!
//! ## Structure
//! - `types`: SuspicionRecord, DetectionReason, ProtectedList
//! - `classifier`: threshold crossing -> SuspicionRecord

pub mod types;
pub mod classifier;

pub use types::{DetectionReason, ProtectedList, SuspicionRecord};
pub use classifier::classify;
