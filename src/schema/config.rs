//! Top-level scoring configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{MultiObjectiveConfig, NoveltySearchConfig};

/// Top-level configuration for population scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Evaluation strategy and reporting.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Novelty search settings.
    #[serde(default)]
    pub novelty: NoveltySearchConfig,
    /// Multi-objective ranking settings.
    #[serde(default)]
    pub multi_objective: MultiObjectiveConfig,
}

/// Evaluation dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Serial or parallel evaluation.
    #[serde(default)]
    pub strategy: EvaluationStrategy,
    /// Generations between statistics log lines.
    #[serde(default = "default_report_interval")]
    pub report_interval: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            strategy: EvaluationStrategy::default(),
            report_interval: default_report_interval(),
        }
    }
}

fn default_report_interval() -> usize {
    10
}

/// How genomes are dispatched to the fitness function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvaluationStrategy {
    /// One genome at a time on the calling thread, in population order.
    Serial,
    /// Worker pool with one evaluator context per worker.
    Parallel {
        /// Maximum worker count. 0 uses one worker per available core.
        #[serde(default)]
        max_parallelism: usize,
    },
}

impl Default for EvaluationStrategy {
    fn default() -> Self {
        Self::Parallel { max_parallelism: 0 }
    }
}

impl ScoringConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.report_interval == 0 {
            return Err(ConfigError::InvalidReportInterval);
        }
        self.novelty.validate()?;
        self.multi_objective.validate()?;
        Ok(())
    }

    /// Number of objectives for the given toggles.
    ///
    /// Objective fitness is always index 0. Novelty takes index 1 when
    /// enabled; auxiliary scorers follow while multi-objective is enabled.
    pub fn objective_count(&self, novelty_enabled: bool, multi_objective_enabled: bool) -> usize {
        let auxiliary = if multi_objective_enabled {
            self.multi_objective.objective_scorers.len()
        } else {
            0
        };
        1 + usize::from(novelty_enabled) + auxiliary
    }
}

/// Configuration errors. Always fatal before the first generation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("K must be positive")]
    InvalidK,
    #[error("PMin must be positive and finite, got {0}")]
    InvalidPMin(f64),
    #[error("Archive limit must be positive")]
    InvalidArchiveLimit,
    #[error("Invalid PMin adjust factor: {0}")]
    InvalidAdjustFactor(String),
    #[error("Invalid feature bounds: {0}")]
    InvalidBounds(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid objective scorer: {0}")]
    InvalidScorer(String),
    #[error("Report interval must be positive")]
    InvalidReportInterval,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::schema::ObjectiveScorerKind;

    #[test]
    fn test_default_config_valid() {
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "evaluation": { "strategy": { "type": "Serial" }, "report_interval": 5 },
            "novelty": { "enabled": true, "k": 5, "p_min": 2.5, "archive_limit": 50 }
        }"#;
        let config = ScoringConfig::from_json(json).unwrap();
        assert_eq!(config.evaluation.strategy, EvaluationStrategy::Serial);
        assert_eq!(config.evaluation.report_interval, 5);
        assert!(config.novelty.enabled);
        assert_eq!(config.novelty.k, 5);
        assert!(!config.multi_objective.enabled);
    }

    #[test]
    fn test_missing_required_novelty_value() {
        let json = r#"{ "novelty": { "enabled": true, "k": 5, "archive_limit": 50 } }"#;
        assert!(matches!(
            ScoringConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let json = r#"{ "novelty": { "k": 0, "p_min": 1.0, "archive_limit": 5 } }"#;
        assert!(matches!(
            ScoringConfig::from_json(json),
            Err(ConfigError::InvalidK)
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "evaluation": {{ "strategy": {{ "type": "Parallel", "max_parallelism": 2 }} }} }}"#
        )
        .unwrap();

        let config = ScoringConfig::load(file.path()).unwrap();
        assert_eq!(
            config.evaluation.strategy,
            EvaluationStrategy::Parallel { max_parallelism: 2 }
        );

        assert!(matches!(
            ScoringConfig::load("/nonexistent/scoring.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_objective_count() {
        let mut config = ScoringConfig::default();
        config.multi_objective.objective_scorers =
            vec![ObjectiveScorerKind::ConnectionCost, ObjectiveScorerKind::ResourceCost];

        assert_eq!(config.objective_count(false, false), 1);
        assert_eq!(config.objective_count(true, false), 2);
        assert_eq!(config.objective_count(false, true), 3);
        assert_eq!(config.objective_count(true, true), 4);
    }
}
