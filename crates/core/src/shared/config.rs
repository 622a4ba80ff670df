use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_DEGRADED_AFTER_STORE_FAILURES, DEFAULT_DETECTION_CONFIDENCE, DEFAULT_GALLERY_CAP,
    DEFAULT_MATCH_THRESHOLD, DEFAULT_REFRESH_INTERVAL, TRACKER_MAX_LOST,
};
use crate::shared::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Tunables for identity resolution and the scan loop.
///
/// Every field is optional in the JSON form; missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReidConfig {
    /// Cosine distance strictly below which an observation matches an identity.
    pub match_threshold: f64,
    pub gallery_cap: usize,
    pub refresh_interval: usize,
    pub detection_confidence: f64,
    pub degraded_after_store_failures: usize,
    pub tracker_max_lost: usize,
}

impl Default for ReidConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            gallery_cap: DEFAULT_GALLERY_CAP,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            detection_confidence: DEFAULT_DETECTION_CONFIDENCE,
            degraded_after_store_failures: DEFAULT_DEGRADED_AFTER_STORE_FAILURES,
            tracker_max_lost: TRACKER_MAX_LOST,
        }
    }
}

impl ReidConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=2.0).contains(&self.match_threshold) {
            return Err(ValidationError::InvalidThreshold(self.match_threshold));
        }
        if self.gallery_cap == 0 {
            return Err(ValidationError::InvalidCap);
        }
        if self.refresh_interval == 0 {
            return Err(ValidationError::InvalidRefreshInterval);
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(ValidationError::InvalidConfidence(
                self.detection_confidence,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ReidConfig::default();
        assert_eq!(config.match_threshold, 0.3);
        assert_eq!(config.gallery_cap, 5);
        assert_eq!(config.refresh_interval, 10);
        assert_eq!(config.detection_confidence, 0.7);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::negative_threshold(ReidConfig { match_threshold: -0.1, ..Default::default() }, ValidationError::InvalidThreshold(-0.1))]
    #[case::threshold_above_two(ReidConfig { match_threshold: 2.5, ..Default::default() }, ValidationError::InvalidThreshold(2.5))]
    #[case::zero_cap(ReidConfig { gallery_cap: 0, ..Default::default() }, ValidationError::InvalidCap)]
    #[case::zero_interval(ReidConfig { refresh_interval: 0, ..Default::default() }, ValidationError::InvalidRefreshInterval)]
    #[case::confidence_above_one(ReidConfig { detection_confidence: 1.5, ..Default::default() }, ValidationError::InvalidConfidence(1.5))]
    fn test_validate_rejects(#[case] config: ReidConfig, #[case] expected: ValidationError) {
        assert_eq!(config.validate(), Err(expected));
    }

    #[test]
    fn test_load_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reid.json");
        fs::write(&path, r#"{ "gallery_cap": 8, "match_threshold": 0.25 }"#).unwrap();

        let config = ReidConfig::load(&path).unwrap();
        assert_eq!(config.gallery_cap, 8);
        assert_eq!(config.match_threshold, 0.25);
        assert_eq!(config.refresh_interval, 10);
    }

    #[test]
    fn test_load_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reid.json");
        fs::write(&path, r#"{ "gallery_cap": 0 }"#).unwrap();

        assert!(matches!(
            ReidConfig::load(&path),
            Err(ConfigError::Invalid(ValidationError::InvalidCap))
        ));
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reid.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ReidConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ReidConfig::load(Path::new("/nonexistent/reid.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
