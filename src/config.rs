//! Application configuration
//!
//! Stored as JSON. Every field has a default, so a partial file (or none at
//! all) is valid.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::playback::{CHUNK_BYTES, PAUSE_POLL};
use crate::engine::{PlaybackOptions, MAX_INPUT_BYTES};
use crate::error::{Result, SlowverbError};
use crate::pipeline::ProcessingParameters;

/// Default file name used when exporting into a directory
pub const DEFAULT_EXPORT_FILE_NAME: &str = "processed_audio.wav";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial processing parameters
    pub defaults: ProcessingParameters,
    pub playback: PlaybackConfig,
    pub limits: LimitsConfig,
    pub export: ExportConfig,
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Bytes written per chunk (rounded down to whole frames)
    pub chunk_bytes: usize,
    /// Upper bound on how long a paused session sleeps between checks
    pub pause_poll_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: CHUNK_BYTES,
            pause_poll_ms: PAUSE_POLL.as_millis() as u64,
        }
    }
}

impl PlaybackConfig {
    pub fn options(&self) -> PlaybackOptions {
        PlaybackOptions {
            chunk_bytes: self.chunk_bytes,
            pause_poll: Duration::from_millis(self.pause_poll_ms),
        }
    }
}

/// Input limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_input_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File name written when the output is a directory
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// `Config` naming the path if the file can't be read, isn't valid
    /// JSON, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SlowverbError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: AppConfig =
            serde_json::from_str(&content).map_err(|e| SlowverbError::Config {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.validate().map_err(|e| SlowverbError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("no configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| SlowverbError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check values the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        if self.playback.chunk_bytes == 0 {
            return Err(SlowverbError::invalid_parameter(
                "playback.chunk_bytes",
                "must be greater than 0",
            ));
        }
        if self.export.file_name.trim().is_empty() {
            return Err(SlowverbError::invalid_parameter(
                "export.file_name",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::ReverbType;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.defaults, ProcessingParameters::default());
        assert_eq!(config.playback.chunk_bytes, 1024);
        assert_eq!(config.playback.pause_poll_ms, 100);
        assert_eq!(config.limits.max_input_bytes, 100 * 1024 * 1024);
        assert_eq!(config.export.file_name, "processed_audio.wav");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slowverb.json");
        fs::write(
            &path,
            r#"{"defaults": {"reverb_type": "silent"}, "playback": {"chunk_bytes": 4096}}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.defaults.reverb_type, ReverbType::Silent);
        assert_eq!(config.defaults.reverb_duration_ms, 1000);
        assert_eq!(config.playback.chunk_bytes, 4096);
        assert_eq!(config.playback.pause_poll_ms, 100);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slowverb.json");
        let mut config = AppConfig::default();
        config.export.file_name = "out.wav".to_string();
        config.defaults.slowdown_factor = 0.8;

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_json_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_out_of_range_defaults_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"defaults": {"slowdown_factor": 3.0}}"#).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap_err().error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/slowverb.json")).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_playback_options() {
        let options = PlaybackConfig::default().options();
        assert_eq!(options.chunk_bytes, 1024);
        assert_eq!(options.pause_poll, Duration::from_millis(100));
    }
}
