//! Multi-objective ranking configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Multi-objective (Pareto) ranking configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiObjectiveConfig {
    /// Start with multi-objective ranking enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Auxiliary objectives, in objective index order after novelty.
    #[serde(default)]
    pub objective_scorers: Vec<ObjectiveScorerKind>,
}

/// Auxiliary objective scorers. Every objective is maximized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectiveScorerKind {
    /// Average squared distance to the k nearest genomes in weight space.
    GeneticDiversity {
        #[serde(default = "default_genetic_k")]
        k: usize,
        /// Connection weights are bounded to `[-weight_range, weight_range]`.
        #[serde(default = "default_weight_range")]
        weight_range: f64,
    },
    /// Fewer connections score higher.
    ConnectionCost,
    /// Lower mean resource usage scores higher.
    ResourceCost,
}

fn default_genetic_k() -> usize {
    10
}
fn default_weight_range() -> f64 {
    5.0
}

impl ObjectiveScorerKind {
    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GeneticDiversity { .. } => "genetic_diversity",
            Self::ConnectionCost => "connection_cost",
            Self::ResourceCost => "resource_cost",
        }
    }
}

impl MultiObjectiveConfig {
    /// Validate multi-objective configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for scorer in &self.objective_scorers {
            if let ObjectiveScorerKind::GeneticDiversity { k, weight_range } = scorer {
                if *k == 0 {
                    return Err(ConfigError::InvalidScorer(
                        "genetic diversity k must be positive".into(),
                    ));
                }
                if !(weight_range.is_finite() && *weight_range > 0.0) {
                    return Err(ConfigError::InvalidScorer(format!(
                        "genetic diversity weight range ({}) must be positive",
                        weight_range
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_scorers() {
        let json = r#"{
            "enabled": true,
            "objective_scorers": [
                { "type": "GeneticDiversity", "k": 4 },
                { "type": "ConnectionCost" }
            ]
        }"#;
        let config: MultiObjectiveConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.objective_scorers[0],
            ObjectiveScorerKind::GeneticDiversity {
                k: 4,
                weight_range: 5.0
            }
        );
        assert_eq!(config.objective_scorers[1].name(), "connection_cost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_genetic_diversity() {
        let config = MultiObjectiveConfig {
            enabled: true,
            objective_scorers: vec![ObjectiveScorerKind::GeneticDiversity {
                k: 0,
                weight_range: 1.0,
            }],
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScorer(_))));
    }
}
