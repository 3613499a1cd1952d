use crate::config::types::{ExperimentError, Result};
/// Experiment configuration loading from JSON
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Usual cap on the number of redirects a navigation follows.
pub const DEFAULT_MAX_LEGS: usize = 20;

pub const DEFAULT_METRIC_PREFIX: &str = "LookupRace";

/// Tunables for one lookup race experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Prefix for every emitted metric name
    pub metric_prefix: String,
    /// Maximum legs tracked per navigation
    pub max_legs: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            max_legs: DEFAULT_MAX_LEGS,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ExperimentError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&config_content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: ExperimentConfig = serde_json::from_str(content)
            .map_err(|e| ExperimentError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric_prefix.trim().is_empty() {
            return Err(ExperimentError::Config(
                "metric_prefix must not be empty".to_string(),
            ));
        }
        if self.max_legs == 0 {
            return Err(ExperimentError::Config(
                "max_legs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = ExperimentConfig::from_json(r#"{"max_legs": 5}"#).unwrap();
        assert_eq!(config.max_legs, 5);
        assert_eq!(config.metric_prefix, DEFAULT_METRIC_PREFIX);

        let config = ExperimentConfig::from_json("{}").unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ExperimentConfig::from_json(r#"{"max_legs": 0}"#).unwrap_err();
        assert!(matches!(err, ExperimentError::Config(_)));

        let err = ExperimentConfig::from_json(r#"{"metric_prefix": "  "}"#).unwrap_err();
        assert!(matches!(err, ExperimentError::Config(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = ExperimentConfig::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("lookup-race-does-not-exist.json");
        let err = ExperimentConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = ExperimentConfig::load_or_default(None).unwrap();
        assert_eq!(config.max_legs, DEFAULT_MAX_LEGS);
    }
}
