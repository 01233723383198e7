//! Per-genome evaluation records.
//!
//! A [`Behaviour`] is created fresh for every genome evaluated in a generation
//! and carried over for elites through the previous-generation cache. It is
//! plain data: ranking scratch state lives in the ranker, never here.

use std::slice;

use serde::{Deserialize, Serialize};

/// Index of the objective fitness in [`Behaviour::objectives`].
pub const OBJECTIVE_FITNESS: usize = 0;

/// Behaviour characterisation reported by the fitness function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values")]
pub enum NoveltyVector {
    /// Flat sequence of values. Treated as a one-feature time series.
    Flat(Vec<f64>),
    /// Time series of feature vectors, one row per timestep.
    Series(Vec<Vec<f64>>),
}

impl Default for NoveltyVector {
    fn default() -> Self {
        Self::Flat(Vec::new())
    }
}

impl NoveltyVector {
    /// Iterate over the rows (timesteps) of the vector.
    pub fn rows(&self) -> Rows<'_> {
        match self {
            Self::Flat(values) => Rows::Flat(values.chunks(1)),
            Self::Series(rows) => Rows::Series(rows.iter()),
        }
    }

    /// Number of rows (timesteps).
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(values) => values.len(),
            Self::Series(rows) => rows.len(),
        }
    }

    /// True if the vector has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widest row in the vector.
    pub fn width(&self) -> usize {
        match self {
            Self::Flat(values) => usize::from(!values.is_empty()),
            Self::Series(rows) => rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// True if every value is finite.
    pub fn is_finite(&self) -> bool {
        self.rows().flatten().all(|v| v.is_finite())
    }
}

/// Row iterator over a [`NoveltyVector`].
pub enum Rows<'a> {
    Flat(slice::Chunks<'a, f64>),
    Series(slice::Iter<'a, Vec<f64>>),
}

impl<'a> Iterator for Rows<'a> {
    type Item = &'a [f64];

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Rows::Flat(chunks) => chunks.next(),
            Rows::Series(rows) => rows.next().map(Vec::as_slice),
        }
    }
}

/// Result of running the external fitness function on one phenome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Objective (task) fitness. Higher is better.
    pub objective_fitness: f64,
    /// Behaviour characterisation used for novelty.
    #[serde(default)]
    pub novelty_vector: NoveltyVector,
    /// Minimum criteria info, `[redundant_steps, total_steps]`.
    #[serde(default)]
    pub minimum_criteria: Vec<f64>,
    /// Resource usage samples (e.g. external memory size per iteration).
    #[serde(default)]
    pub resource_usage: Vec<f64>,
}

impl Evaluation {
    /// Evaluation with only an objective fitness.
    pub fn new(objective_fitness: f64) -> Self {
        Self {
            objective_fitness,
            ..Default::default()
        }
    }

    /// Set the novelty vector.
    pub fn with_novelty(mut self, novelty_vector: NoveltyVector) -> Self {
        self.novelty_vector = novelty_vector;
        self
    }

    /// Set the minimum criteria info.
    pub fn with_minimum_criteria(mut self, redundant_steps: f64, total_steps: f64) -> Self {
        self.minimum_criteria = vec![redundant_steps, total_steps];
        self
    }

    /// Set the resource usage samples.
    pub fn with_resource_usage(mut self, samples: Vec<f64>) -> Self {
        self.resource_usage = samples;
        self
    }

    /// Name of the first field holding a NaN or infinite value, if any.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        if !self.objective_fitness.is_finite() {
            Some("objective_fitness")
        } else if !self.novelty_vector.is_finite() {
            Some("novelty_vector")
        } else if !self.minimum_criteria.iter().all(|v| v.is_finite()) {
            Some("minimum_criteria")
        } else if !self.resource_usage.iter().all(|v| v.is_finite()) {
            Some("resource_usage")
        } else {
            None
        }
    }
}

/// Whether a behaviour takes part in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Viability {
    /// Scored normally.
    #[default]
    Viable,
    /// Failed the novelty minimum-criteria gate this generation.
    /// Still part of the novelty distance population.
    BelowMinimumCriteria,
    /// The decoder produced no phenome.
    DecodeFailed,
    /// The fitness function returned an error or panicked.
    EvaluationFailed,
}

impl Viability {
    /// True if the behaviour carries a real evaluation.
    pub fn has_evaluation(self) -> bool {
        matches!(self, Self::Viable | Self::BelowMinimumCriteria)
    }
}

/// Evaluation record of one genome for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behaviour<Id> {
    /// Identity of the evaluated genome.
    pub genome_id: Id,
    /// Output of the fitness function.
    pub evaluation: Evaluation,
    /// Objective scores. Index 0 is the objective fitness.
    pub objectives: Vec<f64>,
    /// Viability for this generation.
    pub viability: Viability,
    /// Final score assigned by the multi-objective ranker.
    pub multi_objective_score: f64,
    /// Genomic position (innovation id, connection weight), sorted by id.
    #[serde(default)]
    pub genetic_position: Vec<(u64, f64)>,
}

impl<Id> Behaviour<Id> {
    /// Create a behaviour from a successful evaluation.
    pub fn new(genome_id: Id, evaluation: Evaluation, objective_count: usize) -> Self {
        let mut objectives = vec![0.0; objective_count.max(1)];
        objectives[OBJECTIVE_FITNESS] = evaluation.objective_fitness;

        Self {
            genome_id,
            evaluation,
            objectives,
            viability: Viability::Viable,
            multi_objective_score: 0.0,
            genetic_position: Vec::new(),
        }
    }

    /// Zero-value behaviour for a genome that could not be evaluated.
    pub fn placeholder(genome_id: Id, viability: Viability, objective_count: usize) -> Self {
        Self {
            viability,
            ..Self::new(genome_id, Evaluation::default(), objective_count)
        }
    }

    /// Attach the genome's genomic position.
    pub fn with_genetic_position(mut self, position: Vec<(u64, f64)>) -> Self {
        self.genetic_position = position;
        self
    }

    /// True if the behaviour takes part in archive admission and ranking.
    pub fn is_viable(&self) -> bool {
        self.viability == Viability::Viable
    }

    /// Objective fitness reported by the fitness function.
    pub fn objective_fitness(&self) -> f64 {
        self.evaluation.objective_fitness
    }

    /// Prepare a cached elite for scoring against a new generation.
    ///
    /// Comparative scores are cleared and the minimum-criteria verdict is
    /// dropped so the gate runs again.
    pub fn reset_for_rescoring(&mut self, objective_count: usize) {
        self.objectives.clear();
        self.objectives.resize(objective_count.max(1), 0.0);
        self.objectives[OBJECTIVE_FITNESS] = self.evaluation.objective_fitness;
        self.multi_objective_score = 0.0;
        if self.viability == Viability::BelowMinimumCriteria {
            self.viability = Viability::Viable;
        }
    }
}

/// Mutable evaluation slot carried by every genome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInfo {
    fitness: f64,
    evaluation_count: u64,
    evaluation_pass_count: u64,
}

impl EvaluationInfo {
    /// Current fitness.
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Assign a fitness. Marks the genome as evaluated.
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
        self.evaluation_count += 1;
    }

    /// True once a fitness has been assigned.
    pub fn is_evaluated(&self) -> bool {
        self.evaluation_count > 0
    }

    /// Number of times a fitness has been assigned.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    /// Number of generations the genome skipped evaluation as an elite.
    pub fn evaluation_pass_count(&self) -> u64 {
        self.evaluation_pass_count
    }

    /// Register a skipped evaluation.
    pub fn register_pass(&mut self) {
        self.evaluation_pass_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_rows_are_single_values() {
        let v = NoveltyVector::Flat(vec![1.0, 2.0, 3.0]);
        let rows: Vec<&[f64]> = v.rows().collect();
        assert_eq!(rows, vec![&[1.0][..], &[2.0][..], &[3.0][..]]);
        assert_eq!(v.width(), 1);
    }

    #[test]
    fn test_series_width_is_widest_row() {
        let v = NoveltyVector::Series(vec![vec![1.0], vec![1.0, 2.0, 3.0]]);
        assert_eq!(v.width(), 3);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_non_finite_field() {
        assert_eq!(Evaluation::new(1.0).non_finite_field(), None);
        assert_eq!(
            Evaluation::new(f64::INFINITY).non_finite_field(),
            Some("objective_fitness")
        );

        let nan_novelty = Evaluation::new(1.0)
            .with_novelty(NoveltyVector::Series(vec![vec![0.0], vec![1.0, f64::NAN]]));
        assert!(!nan_novelty.novelty_vector.is_finite());
        assert_eq!(nan_novelty.non_finite_field(), Some("novelty_vector"));

        let nan_criteria = Evaluation::new(1.0).with_minimum_criteria(f64::NAN, 4.0);
        assert_eq!(nan_criteria.non_finite_field(), Some("minimum_criteria"));

        let nan_usage = Evaluation::new(1.0).with_resource_usage(vec![1.0, f64::NAN]);
        assert_eq!(nan_usage.non_finite_field(), Some("resource_usage"));
    }

    #[test]
    fn test_behaviour_objective_slot() {
        let b = Behaviour::new(7u64, Evaluation::new(0.75), 3);
        assert_eq!(b.objectives, vec![0.75, 0.0, 0.0]);
        assert!(b.is_viable());
    }

    #[test]
    fn test_reset_for_rescoring() {
        let mut b = Behaviour::new(1u64, Evaluation::new(0.5), 2);
        b.objectives[1] = 4.0;
        b.multi_objective_score = 0.9;
        b.viability = Viability::BelowMinimumCriteria;

        b.reset_for_rescoring(3);
        assert_eq!(b.objectives, vec![0.5, 0.0, 0.0]);
        assert_eq!(b.multi_objective_score, 0.0);
        assert_eq!(b.viability, Viability::Viable);
    }

    #[test]
    fn test_reset_keeps_faults() {
        let mut b = Behaviour::placeholder(1u64, Viability::EvaluationFailed, 2);
        b.reset_for_rescoring(2);
        assert_eq!(b.viability, Viability::EvaluationFailed);
    }

    #[test]
    fn test_evaluation_info() {
        let mut info = EvaluationInfo::default();
        assert!(!info.is_evaluated());
        info.set_fitness(0.3);
        assert!(info.is_evaluated());
        assert_eq!(info.fitness(), 0.3);
        info.register_pass();
        assert_eq!(info.evaluation_pass_count(), 1);
    }
}
