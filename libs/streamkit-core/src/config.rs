//! Runtime configuration (SPEC_FULL.md §6).
//!
//! Sourcing the file from disk is the CLI's job (an external collaborator,
//! see SPEC_FULL.md §1); this module only defines the recognized shape and
//! its defaults, the way the host project's `ProjectConfig` does for
//! `streamlib.toml`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, StreamError};

/// Minimum log level a deployment wants emitted. Consumed by the CLI binary
/// to configure its `tracing-subscriber` filter — the core library never
/// installs a subscriber itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for SeverityLevel {
    fn default() -> Self {
        SeverityLevel::Info
    }
}

impl SeverityLevel {
    /// Name of the equivalent `tracing` level filter directive.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            SeverityLevel::Trace => "trace",
            SeverityLevel::Debug => "debug",
            SeverityLevel::Info => "info",
            SeverityLevel::Warn => "warn",
            SeverityLevel::Error => "error",
        }
    }
}

fn default_plugin_directory() -> PathBuf {
    PathBuf::from("./plugins")
}

fn default_frame_bin_slot_count() -> usize {
    3
}

/// The three recognized configuration options from SPEC_FULL.md §6.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub severity_level: SeverityLevel,

    #[serde(default = "default_plugin_directory")]
    pub plugin_directory: PathBuf,

    #[serde(default = "default_frame_bin_slot_count")]
    pub frame_bin_slot_count: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            severity_level: SeverityLevel::default(),
            plugin_directory: default_plugin_directory(),
            frame_bin_slot_count: default_frame_bin_slot_count(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from TOML text, validating `frame_bin_slot_count >= 2`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| StreamError::Configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a path, falling back to defaults if the file is missing.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded runtime config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.frame_bin_slot_count < 2 {
            return Err(StreamError::Configuration(format!(
                "frame_bin_slot_count must be >= 2, got {}",
                self.frame_bin_slot_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.frame_bin_slot_count, 3);
        assert!(matches!(config.severity_level, SeverityLevel::Info));
    }

    #[test]
    fn rejects_slot_count_below_two() {
        let err = RuntimeConfig::from_toml_str("frame_bin_slot_count = 1\n").unwrap_err();
        assert!(matches!(err, StreamError::Configuration(_)));
    }

    #[test]
    fn parses_recognized_options() {
        let config = RuntimeConfig::from_toml_str(
            "severity_level = \"debug\"\nplugin_directory = \"/opt/plugins\"\nframe_bin_slot_count = 4\n",
        )
        .unwrap();
        assert!(matches!(config.severity_level, SeverityLevel::Debug));
        assert_eq!(config.plugin_directory, PathBuf::from("/opt/plugins"));
        assert_eq!(config.frame_bin_slot_count, 4);
    }
}
