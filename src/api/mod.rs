//! API Module
//!
//! - commands.rs: CLI subcommands over the sentinel control surface

pub mod commands;

pub use commands::{run, Cli};
