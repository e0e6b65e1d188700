//! Configuration management for scrim
//!
//! Handles loading, parsing, and validating configuration from TOML files:
//! control socket location, input buffering, and the synthetic geometry the
//! headless host acks configures with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration struct containing all scrim settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScrimConfig {
    /// General daemon settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input routing settings
    #[serde(default)]
    pub input: InputConfig,

    /// Headless host settings (used when no compositor host is attached)
    #[serde(default)]
    pub headless: HeadlessConfig,
}

/// General daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Path of the Unix control socket
    pub socket_path: String,

    /// Enable debug logging
    pub debug: bool,
}

/// Input routing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Bounded per-subscription event buffer; oldest events are dropped on
    /// overflow since live input is best-effort/most-recent
    pub queue_capacity: usize,
}

/// Synthetic configure geometry for the headless host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Width acked on every configure
    pub configure_width: u32,

    /// Height acked on every configure
    pub configure_height: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/scrim-control.sock".to_string(),
            debug: false,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            configure_width: 1920,
            configure_height: 32,
        }
    }
}

impl ScrimConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: ScrimConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.socket_path.is_empty() {
            anyhow::bail!("Invalid socket_path: must not be empty");
        }

        if self.input.queue_capacity == 0 {
            anyhow::bail!("Invalid queue_capacity: must be at least 1");
        }

        if self.headless.configure_width == 0 || self.headless.configure_height == 0 {
            anyhow::bail!("Invalid headless configure geometry: must be non-zero");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
