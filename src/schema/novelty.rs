//! Novelty search configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Novelty search configuration.
///
/// `k`, `p_min` and `archive_limit` have no defaults: a novelty section
/// without them fails to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltySearchConfig {
    /// Start with novelty search enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Number of nearest neighbours for the novelty score.
    pub k: usize,
    /// Initial sparseness threshold for archive admission.
    pub p_min: f64,
    /// Archive capacity. The oldest entry is evicted on overflow.
    pub archive_limit: usize,
    /// Compare against the archive as well as the current generation.
    #[serde(default = "default_archive_comparison")]
    pub archive_comparison: bool,
    /// Raise PMin when more than this many behaviours are archived in one generation.
    #[serde(default = "default_additions_p_min_adjust_up")]
    pub additions_p_min_adjust_up: usize,
    /// Factor applied to PMin when raising it.
    #[serde(default = "default_p_min_adjust_up")]
    pub p_min_adjust_up: f64,
    /// Lower PMin after more than this many generations without additions.
    #[serde(default = "default_generations_p_min_adjust_down")]
    pub generations_p_min_adjust_down: usize,
    /// Factor applied to PMin when lowering it.
    #[serde(default = "default_p_min_adjust_down")]
    pub p_min_adjust_down: f64,
    /// Novelty search completes once PMin drops below this floor.
    #[serde(default)]
    pub p_min_lower_threshold: Option<f64>,
    /// Novelty search completes once an objective fitness reaches this value.
    #[serde(default)]
    pub objective_score_threshold: Option<f64>,
    /// Novelty search completes after this many generations.
    #[serde(default)]
    pub max_generations: Option<usize>,
    /// Scale novelty by `objective^exponent` when positive. 0 disables.
    #[serde(default)]
    pub objective_factor_exponent: f64,
    /// Upper bound on `redundant_steps / total_steps`. None disables the gate.
    #[serde(default)]
    pub minimum_criteria_threshold: Option<f64>,
    /// Known `(min, max)` bounds per novelty feature dimension.
    #[serde(default)]
    pub feature_bounds: Vec<Option<(f64, f64)>>,
}

impl Default for NoveltySearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            k: 15,
            p_min: 1.0,
            archive_limit: 1000,
            archive_comparison: default_archive_comparison(),
            additions_p_min_adjust_up: default_additions_p_min_adjust_up(),
            p_min_adjust_up: default_p_min_adjust_up(),
            generations_p_min_adjust_down: default_generations_p_min_adjust_down(),
            p_min_adjust_down: default_p_min_adjust_down(),
            p_min_lower_threshold: None,
            objective_score_threshold: None,
            max_generations: None,
            objective_factor_exponent: 0.0,
            minimum_criteria_threshold: None,
            feature_bounds: Vec::new(),
        }
    }
}

fn default_archive_comparison() -> bool {
    true
}
fn default_additions_p_min_adjust_up() -> usize {
    4
}
fn default_p_min_adjust_up() -> f64 {
    1.2
}
fn default_generations_p_min_adjust_down() -> usize {
    5
}
fn default_p_min_adjust_down() -> f64 {
    0.95
}

impl NoveltySearchConfig {
    /// Known bounds for a feature dimension, if any.
    pub fn bounds_for(&self, dimension: usize) -> Option<(f64, f64)> {
        self.feature_bounds.get(dimension).copied().flatten()
    }

    /// Validate novelty search configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::InvalidK);
        }
        if !(self.p_min.is_finite() && self.p_min > 0.0) {
            return Err(ConfigError::InvalidPMin(self.p_min));
        }
        if self.archive_limit == 0 {
            return Err(ConfigError::InvalidArchiveLimit);
        }
        if self.p_min_adjust_up.is_nan() || self.p_min_adjust_up < 1.0 {
            return Err(ConfigError::InvalidAdjustFactor(format!(
                "p_min_adjust_up ({}) must be at least 1",
                self.p_min_adjust_up
            )));
        }
        if !(self.p_min_adjust_down > 0.0 && self.p_min_adjust_down <= 1.0) {
            return Err(ConfigError::InvalidAdjustFactor(format!(
                "p_min_adjust_down ({}) must be in (0, 1]",
                self.p_min_adjust_down
            )));
        }
        if self.objective_factor_exponent < 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "objective_factor_exponent ({}) must be non-negative",
                self.objective_factor_exponent
            )));
        }

        for (dim, bounds) in self.feature_bounds.iter().enumerate() {
            if let Some((min, max)) = bounds
                && (min.is_nan() || max.is_nan() || min > max)
            {
                return Err(ConfigError::InvalidBounds(format!(
                    "feature {} min ({}) > max ({})",
                    dim, min, max
                )));
            }
        }

        Ok(())
    }
}
