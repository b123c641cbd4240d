//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pw_core::{IdleSettings, UnavailablePolicy, VolumeSettings};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// How long volume changes are ignored after a page loads.
    pub settle_delay_ms: u64,

    /// Period between reapplications of the volume to each element.
    pub reapply_interval_ms: u64,

    /// Inactivity after which the tab is closed.
    pub idle_threshold_secs: u64,

    /// How often inactivity is evaluated.
    pub poll_interval_ms: u64,

    /// What to do when the allow-list cannot be read.
    pub on_store_unavailable: UnavailablePolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let volume = VolumeSettings::default();
        let idle = IdleSettings::default();
        Self {
            database_path: data_dir.join("pw.db"),
            settle_delay_ms: millis(volume.settle_delay),
            reapply_interval_ms: millis(volume.reapply_interval),
            idle_threshold_secs: idle.threshold.as_secs(),
            poll_interval_ms: millis(idle.poll_interval),
            on_store_unavailable: idle.on_store_unavailable,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PW_*)
        figment = figment.merge(Env::prefixed("PW_"));

        figment.extract()
    }

    /// Volume settings; the reapply interval is floored at one millisecond.
    pub fn volume_settings(&self) -> VolumeSettings {
        VolumeSettings {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            reapply_interval: Duration::from_millis(self.reapply_interval_ms.max(1)),
        }
    }

    /// Idle settings; intervals are floored at one millisecond.
    pub fn idle_settings(&self) -> IdleSettings {
        IdleSettings {
            threshold: Duration::from_secs(self.idle_threshold_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            on_store_unavailable: self.on_store_unavailable,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returns the platform-specific config directory for pw.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pw"))
}

/// Returns the platform-specific data directory for pw.
///
/// On Linux: `~/.local/share/pw`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pw"))
}
