//! pagewarden CLI library.
//!
//! This crate provides the CLI interface for pagewarden.

mod cli;
pub mod commands;
mod config;

pub use cli::{AllowAction, Cli, Commands, SimulateArgs, VolumeAction};
pub use config::Config;
