//! Compute module - Distances, novelty, Pareto ranking and population evaluation.

mod distance;
mod knn;
mod novelty;
mod objectives;

pub mod evaluation;
pub mod pareto;

pub use distance::*;
pub use evaluation::{
    BuildError, EvaluationError, GenerationOutcome, GenerationSummary, Genome, GenomeDecoder,
    PhenomeEvaluator, PopulationEvaluator,
};
pub use knn::*;
pub use novelty::*;
pub use objectives::*;
pub use pareto::{ParetoRanking, crowding_distances, dominates, non_dominated_fronts};
