//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Synchronized media volume and idle tab termination.
///
/// Manages the persisted state the page engines share (volumes per origin
/// and the idle allow-list) and runs the engines against a simulated page.
#[derive(Debug, Parser)]
#[command(name = "pw", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read or write the persisted media volume of an origin.
    #[command(subcommand)]
    Volume(VolumeAction),

    /// Manage the allow-list of pages exempt from idle termination.
    #[command(subcommand)]
    Allow(AllowAction),

    /// Check whether a URL is exempt from idle termination.
    Check {
        /// The page URL to check.
        url: String,
    },

    /// Show stored volumes and the allow-list size.
    Status,

    /// Run both engines against a simulated page.
    Simulate(SimulateArgs),
}

/// Volume subcommands.
#[derive(Debug, Subcommand)]
pub enum VolumeAction {
    /// Print the persisted volume of an origin.
    Get {
        /// Any URL on the origin (e.g., <https://example.com/watch>).
        #[arg(long)]
        origin: String,
    },
    /// Persist a volume for an origin.
    Set {
        /// Volume between 0.0 and 1.0.
        value: f64,

        /// Any URL on the origin.
        #[arg(long)]
        origin: String,
    },
}

/// Allow-list subcommands.
#[derive(Debug, Subcommand)]
pub enum AllowAction {
    /// List allow-listed base URLs with their index.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add a URL; it is stored as `scheme://host`.
    Add {
        /// The URL to exempt.
        url: String,
    },
    /// Remove the entry at an index shown by `pw allow list`.
    Remove {
        /// Zero-based index.
        index: usize,
    },
}

/// Options for `pw simulate`.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// URL of the simulated page.
    #[arg(long, default_value = "https://example.com/")]
    pub url: String,

    /// Media elements present when the page loads.
    #[arg(long, default_value_t = 2)]
    pub media: usize,

    /// Media elements inserted halfway through, nested in a container.
    #[arg(long, default_value_t = 1)]
    pub late_media: usize,

    /// Volume the simulated user sets on the first element once the
    /// bootstrap phase is over.
    #[arg(long)]
    pub user_volume: Option<f64>,

    /// Have the simulated user interact with the page this often, cycling
    /// through every kind of activity. Without it the user stays idle.
    #[arg(long)]
    pub activity_every_ms: Option<u64>,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 10)]
    pub duration_secs: u64,
}
