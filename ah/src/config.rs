//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main askhuman configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Artifact file configuration
    pub artifact: ArtifactConfig,

    /// Input and concurrency ceilings
    pub limits: LimitsConfig,

    /// Wait loop timing
    pub wait: WaitConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.wait.timeout_secs == 0 {
            return Err(eyre::eyre!("wait.timeout-secs must be greater than zero"));
        }
        if self.wait.poll_interval_secs == 0 {
            return Err(eyre::eyre!("wait.poll-interval-secs must be greater than zero"));
        }
        if self.limits.max_pending == 0 {
            return Err(eyre::eyre!("limits.max-pending must be greater than zero"));
        }
        if self.artifact.file.as_os_str().is_empty() {
            return Err(eyre::eyre!("artifact.file must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .askhuman.yml
        let local_config = PathBuf::from(".askhuman.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/askhuman/askhuman.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("askhuman").join("askhuman.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Artifact file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Path to the shared markdown file
    pub file: PathBuf,

    /// Maximum artifact size in bytes before new questions are refused
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            file: default_artifact_path(),
            max_file_size: 104_857_600, // 100MB
        }
    }
}

/// Input and concurrency ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum question length in bytes
    #[serde(rename = "max-question-length")]
    pub max_question_length: usize,

    /// Maximum context length in bytes
    #[serde(rename = "max-context-length")]
    pub max_context_length: usize,

    /// Maximum concurrent pending questions
    #[serde(rename = "max-pending")]
    pub max_pending: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_question_length: 10_240, // 10KB
            max_context_length: 51_200,  // 50KB
            max_pending: 100,
        }
    }
}

/// Wait loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// How long a question waits for an answer, in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Reconciliation poll interval in seconds. This backstops missed
    /// filesystem notifications and must stay shorter than the timeout.
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Interval for the expired-entry sweep, in seconds
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800, // 30 minutes
            poll_interval_secs: 5,
            sweep_interval_secs: 300, // 5 minutes
        }
    }
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Platform-appropriate default location for the ask file
pub fn default_artifact_path() -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from("ask_human.md");
    };

    if cfg!(windows) {
        let documents = home.join("Documents");
        if documents.is_dir() {
            return documents.join("ask_human.md");
        }
    }

    home.join("ask_human.md")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.wait.timeout_secs, 1800);
        assert_eq!(config.wait.poll_interval_secs, 5);
        assert_eq!(config.wait.sweep_interval_secs, 300);
        assert_eq!(config.limits.max_question_length, 10_240);
        assert_eq!(config.limits.max_context_length, 51_200);
        assert_eq!(config.limits.max_pending, 100);
        assert_eq!(config.artifact.max_file_size, 104_857_600);
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.wait.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
wait:
  timeout-secs: 60
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.wait.timeout_secs, 60);
        // untouched sections keep their defaults
        assert_eq!(config.wait.poll_interval_secs, 5);
        assert_eq!(config.limits.max_pending, 100);
    }

    #[test]
    fn test_kebab_case_field_names() {
        let yaml = r#"
limits:
  max-question-length: 512
  max-pending: 3
artifact:
  max-file-size: 1024
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.max_question_length, 512);
        assert_eq!(config.limits.max_pending, 3);
        assert_eq!(config.artifact.max_file_size, 1024);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.wait.timeout_secs, 1800);
    }
}
