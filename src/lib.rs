//! Pareto Novelty - Population scoring for evolutionary search.
//!
//! This crate scores a population of candidate solutions once per generation:
//! it decides which genomes need a fresh run of the fitness function, runs
//! them serially or on a worker pool, and turns the results into a single
//! fitness per genome using objective fitness, an archive-based novelty
//! score and/or a Pareto (NSGA-II style) ranking.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration and evaluation record types
//! - `compute`: Distance engine, novelty scorer, Pareto ranker and the
//!   population evaluator
//!
//! # Example
//!
//! ```rust
//! use pareto_novelty::compute::{Knn, pareto};
//!
//! // Average distance to the nearest neighbour
//! let knn = Knn::new(&[vec![0.0], vec![1.0], vec![3.0]]).unwrap();
//! assert_eq!(knn.average_distance_to_knn(0, 1), 1.0);
//!
//! // Pareto ranking, higher is better on every objective
//! let ranking = pareto::rank(&[vec![1.0, 1.0], vec![2.0, 0.0], vec![0.0, 2.0], vec![1.0, 0.0]]);
//! assert_eq!(ranking.ranks, vec![1, 1, 1, 2]);
//! assert_eq!(ranking.scores[3], 0.0);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{GenerationOutcome, Genome, PhenomeEvaluator, PopulationEvaluator};
pub use schema::{Behaviour, Evaluation, NoveltyVector, ScoringConfig};
