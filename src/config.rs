use crate::error::{FaceGateError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Minimum elapsed time between accepted start/stop operations. Protects
    /// the device driver from rapid re-open/close cycles.
    #[serde(default = "default_min_operation_interval")]
    pub min_operation_interval_ms: u64,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_min_operation_interval() -> u64 {
    500
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            min_operation_interval_ms: default_min_operation_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Euclidean distance below which a probe embedding is accepted.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    /// Confidence above which the cross-model evaluation stops searching.
    #[serde(default = "default_high_confidence_cutoff")]
    pub high_confidence_cutoff: f32,
}

fn default_match_threshold() -> f32 {
    0.6
}
fn default_high_confidence_cutoff() -> f32 {
    0.84
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            high_confidence_cutoff: default_high_confidence_cutoff(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Additional provider sockets tried by the cross-model evaluation.
    #[serde(default)]
    pub candidate_sockets: Vec<PathBuf>,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/facegate/provider.sock")
}
fn default_connect_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            candidate_sockets: Vec::new(),
            connect_retries: default_connect_retries(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Override for the enrollment data directory. Defaults to the platform
    /// data dir when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the conventional location relative to the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new("configs/facegate.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceGateError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Camera width must be between 1 and 4096, got {}",
                self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Camera height must be between 1 and 4096, got {}",
                self.camera.height
            )));
        }

        if self.matching.match_threshold <= 0.0 {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Match threshold must be positive, got {}",
                self.matching.match_threshold
            )));
        }
        if self.matching.high_confidence_cutoff <= 0.0 || self.matching.high_confidence_cutoff > 1.0
        {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "High confidence cutoff must be in (0.0, 1.0], got {}",
                self.matching.high_confidence_cutoff
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
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matching.match_threshold, 0.6);
        assert_eq!(config.matching.high_confidence_cutoff, 0.84);
        assert_eq!(config.camera.min_operation_interval_ms, 500);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [camera]
            device_index = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.device_index, 2);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.matching.match_threshold, 0.6);
    }

    #[test]
    fn load_reads_bundled_example_config() {
        // The example config ships with the crate and mirrors the defaults.
        let config = Config::load().unwrap();
        assert_eq!(config.camera.min_operation_interval_ms, 500);
        assert_eq!(config.matching.match_threshold, 0.6);
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let mut config = Config::default();
        config.matching.match_threshold = 0.0;
        assert!(config.validate().is_err());
    }
}
