//! Population evaluation.
//!
//! The [`PopulationEvaluator`] drives one scoring pass per generation. It
//! talks to the outside world through three traits:
//!
//! - [`Genome`]: identity, evaluation slot and phenome cache of a candidate
//! - [`GenomeDecoder`]: turns a genome into an executable phenome
//! - [`PhenomeEvaluator`]: the fitness function, with a per-worker context
//!
//! # Example
//!
//! ```rust,no_run
//! use pareto_novelty::compute::{
//!     EvaluationError, Genome, GenerationOutcome, PhenomeEvaluator, PopulationEvaluator,
//! };
//! use pareto_novelty::schema::{Evaluation, EvaluationInfo, NoveltyVector, ScoringConfig};
//!
//! struct Candidate {
//!     id: u64,
//!     weights: Vec<f64>,
//!     info: EvaluationInfo,
//!     phenome: Option<Vec<f64>>,
//! }
//!
//! impl Genome for Candidate {
//!     type Id = u64;
//!     type Phenome = Vec<f64>;
//!
//!     fn id(&self) -> u64 { self.id }
//!     fn evaluation_info(&self) -> &EvaluationInfo { &self.info }
//!     fn evaluation_info_mut(&mut self) -> &mut EvaluationInfo { &mut self.info }
//!     fn cached_phenome(&self) -> Option<&Vec<f64>> { self.phenome.as_ref() }
//!     fn cache_phenome(&mut self, phenome: Vec<f64>) { self.phenome = Some(phenome) }
//! }
//!
//! struct SumTask;
//!
//! impl PhenomeEvaluator<Vec<f64>> for SumTask {
//!     type Context = ();
//!
//!     fn create_context(&self) {}
//!
//!     fn evaluate(&self, phenome: &Vec<f64>, _: &mut ()) -> Result<Evaluation, EvaluationError> {
//!         Ok(Evaluation::new(phenome.iter().sum())
//!             .with_novelty(NoveltyVector::Flat(phenome.clone())))
//!     }
//! }
//!
//! let decoder = |c: &Candidate| Some(c.weights.clone());
//! let mut evaluator = PopulationEvaluator::new(ScoringConfig::default(), decoder, SumTask)?;
//!
//! let mut population: Vec<Candidate> = Vec::new();
//! if let GenerationOutcome::Completed(summary) = evaluator.evaluate(&mut population) {
//!     println!("Evaluated {} genomes", summary.evaluated);
//! }
//! # Ok::<(), pareto_novelty::compute::BuildError>(())
//! ```

mod orchestrator;
mod worker;

use std::fmt::Debug;
use std::hash::Hash;

use crate::schema::{ConfigError, Evaluation, EvaluationInfo};

pub use orchestrator::{GenerationOutcome, GenerationSummary, PopulationEvaluator};

/// A candidate solution as seen by the evaluator.
pub trait Genome: Send {
    /// Identity used to find cached behaviours across generations.
    type Id: Copy + Eq + Hash + Debug + Send + Sync;
    /// Decoded, executable form of the genome.
    type Phenome: Send + Sync;

    fn id(&self) -> Self::Id;

    fn evaluation_info(&self) -> &EvaluationInfo;

    fn evaluation_info_mut(&mut self) -> &mut EvaluationInfo;

    /// Previously decoded phenome, if any.
    fn cached_phenome(&self) -> Option<&Self::Phenome>;

    /// Store a decoded phenome for later generations.
    fn cache_phenome(&mut self, phenome: Self::Phenome);

    /// Connection weights keyed by innovation id, sorted by id.
    /// Only needed by the genetic diversity and connection cost objectives.
    fn genetic_position(&self) -> Vec<(u64, f64)> {
        Vec::new()
    }
}

/// Decodes genomes into phenomes. `None` marks a non-viable encoding.
pub trait GenomeDecoder<G: Genome>: Sync {
    fn decode(&self, genome: &G) -> Option<G::Phenome>;
}

impl<G, F> GenomeDecoder<G> for F
where
    G: Genome,
    F: Fn(&G) -> Option<G::Phenome> + Sync,
{
    fn decode(&self, genome: &G) -> Option<G::Phenome> {
        self(genome)
    }
}

/// The external fitness function.
///
/// `evaluate` may run on several worker threads at once and may use rayon
/// itself. Each worker owns one context, created lazily on its first
/// evaluation and reused for every later one. A nested evaluation picked up
/// by a worker while it waits on its own parallel work gets a fresh context.
/// A context whose evaluation panicked is dropped and recreated.
pub trait PhenomeEvaluator<P>: Sync {
    /// Per-worker mutable state (environment, controller, ...).
    type Context: Send;

    fn create_context(&self) -> Self::Context;

    fn evaluate(&self, phenome: &P, context: &mut Self::Context) -> Result<Evaluation, EvaluationError>;

    /// Objective fitness of a solved task, if the task has one.
    fn max_fitness(&self) -> Option<f64> {
        None
    }
}

/// A contained, per-genome evaluation fault.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Evaluation failed: {0}")]
    Failed(String),
    #[error("Evaluation panicked: {0}")]
    Panicked(String),
    #[error("Objective fitness is not finite")]
    NonFiniteFitness,
    #[error("Non-finite value in {0}")]
    NonFiniteBehaviour(&'static str),
}

/// Errors constructing a [`PopulationEvaluator`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
