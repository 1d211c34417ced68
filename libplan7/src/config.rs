use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::structs::profile::AlignmentMode;

/// Runtime parameters for configuring profiles and running the DP engines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// The search mode profiles are configured in
    pub mode: AlignmentMode,
    /// The target length the length model is configured for when no target is known yet
    pub target_length: usize,
    /// The weight given to match posteriors relative to insert and flank posteriors
    pub gamma: f32,
    /// How far a decoded row's probability mass may drift from 1.0
    pub mass_tolerance: f32,
    /// The tolerance used when validating profile probabilities and matrices
    pub validation_tolerance: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        AlignmentConfig {
            mode: AlignmentMode::Dual,
            target_length: 400,
            gamma: 1.0,
            mass_tolerance: 1e-2,
            validation_tolerance: 1e-4,
        }
    }
}

impl AlignmentConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse alignment config")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read alignment config: {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn test_partial_json_uses_defaults() -> anyhow::Result<()> {
        let config = AlignmentConfig::from_json_str(r#"{ "mode": "UniLocal", "gamma": 2.0 }"#)?;

        assert!(config.mode == AlignmentMode::UniLocal);
        assert!(config.gamma == 2.0);
        assert!(config.target_length == 400);
        assert!(config.mass_tolerance == 1e-2);
        Ok(())
    }

    #[test]
    fn test_from_json_file() -> anyhow::Result<()> {
        let path = std::env::temp_dir()
            .join(format!("libplan7-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "mode": "Glocal", "mass_tolerance": 0.001 }"#)?;
        let config = AlignmentConfig::from_json_file(&path);
        std::fs::remove_file(&path)?;

        let config = config?;
        assert!(config.mode == AlignmentMode::Glocal);
        assert!(config.mass_tolerance == 0.001);
        assert!(config.validation_tolerance == 1e-4);

        let missing = std::env::temp_dir().join("libplan7-missing.json");
        assert!(AlignmentConfig::from_json_file(missing).is_err());
        Ok(())
    }

    #[test]
    fn test_bad_json() {
        assert!(AlignmentConfig::from_json_str(r#"{ "gamma": "high" }"#).is_err());
    }
}
