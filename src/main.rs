//! Wolf Sentinel - Main Entry Point
//!
//! Watches the process table for windows that keep changing their title,
//! traps them to disk, traces where they came from and eliminates them.

mod api;
mod logic;
pub mod constants;

use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    api::run(api::Cli::parse()).await
}
