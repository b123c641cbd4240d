//! CLI subcommand implementations.

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

pub mod allow;
pub mod check;
pub mod simulate;
pub mod status;
pub mod volume;

/// Builds the single-threaded runtime the engines expect.
fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to initialize tokio runtime")
}
