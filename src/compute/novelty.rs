//! Archive-based novelty scoring.
//!
//! A [`NoveltyScorer`] lives for a whole novelty search session. Every call
//! to [`NoveltyScorer::score`] compares the current generation against itself
//! and the archive, admits sufficiently novel behaviours into the archive and
//! adapts the admission threshold (PMin).

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::schema::{Behaviour, Evaluation, NoveltySearchConfig, NoveltyVector, Viability};

use super::knn::Knn;

/// A behaviour stored in the novelty archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedBehaviour<Id> {
    /// Genome the behaviour belongs to.
    pub genome_id: Id,
    /// Behaviour characterisation at admission time.
    pub novelty_vector: NoveltyVector,
    /// Objective fitness at admission time.
    pub objective_fitness: f64,
    /// Novelty score that earned admission.
    pub novelty_score: f64,
    /// Scorer generation of admission.
    pub generation: usize,
}

/// Capacity-bounded FIFO of novel behaviours.
#[derive(Debug, Clone)]
pub struct NoveltyArchive<Id> {
    entries: VecDeque<ArchivedBehaviour<Id>>,
    capacity: usize,
}

impl<Id: Copy + Eq> NoveltyArchive<Id> {
    /// Create an empty archive. Capacity is at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting and returning the oldest one on overflow.
    pub fn push(&mut self, entry: ArchivedBehaviour<Id>) -> Option<ArchivedBehaviour<Id>> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// True if the genome has an entry.
    pub fn contains(&self, genome_id: Id) -> bool {
        self.entries.iter().any(|e| e.genome_id == genome_id)
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ArchivedBehaviour<Id>> {
        self.entries.iter()
    }

    /// Archived genome ids, oldest first.
    pub fn genome_ids(&self) -> Vec<Id> {
        self.entries.iter().map(|e| e.genome_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Statistics of one novelty scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoveltyPass {
    /// Behaviours given a novelty score.
    pub scored: usize,
    /// Behaviours admitted into the archive.
    pub archived: usize,
    /// Behaviours that failed the minimum-criteria gate.
    pub below_minimum_criteria: usize,
    /// Archive size after the pass.
    pub archive_size: usize,
    /// PMin after adaptation.
    pub p_min: f64,
    /// Time spent building the distance engine.
    pub knn_time: Duration,
}

/// Novelty scorer with an adaptive archive.
#[derive(Debug, Clone)]
pub struct NoveltyScorer<Id> {
    config: NoveltySearchConfig,
    archive: NoveltyArchive<Id>,
    p_min: f64,
    generation: usize,
    generations_since_addition: usize,
    max_objective: f64,
    p_min_floor_reached: bool,
    complete: bool,
}

impl<Id: Copy + Eq + Hash + Debug> NoveltyScorer<Id> {
    /// Create a scorer for a new novelty search session.
    pub fn new(config: NoveltySearchConfig) -> Self {
        Self {
            archive: NoveltyArchive::new(config.archive_limit),
            p_min: config.p_min,
            generation: 0,
            generations_since_addition: 0,
            max_objective: 0.0,
            p_min_floor_reached: false,
            complete: false,
            config,
        }
    }

    /// Start a new session: empty archive, initial PMin, cleared latch.
    pub fn reset(&mut self) {
        self.archive.clear();
        self.p_min = self.config.p_min;
        self.generation = 0;
        self.generations_since_addition = 0;
        self.max_objective = 0.0;
        self.p_min_floor_reached = false;
        self.complete = false;
    }

    pub fn config(&self) -> &NoveltySearchConfig {
        &self.config
    }

    pub fn archive(&self) -> &NoveltyArchive<Id> {
        &self.archive
    }

    /// Current archive admission threshold.
    pub fn p_min(&self) -> f64 {
        self.p_min
    }

    /// Generations scored in this session.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Best objective fitness seen in this session.
    pub fn max_objective(&self) -> f64 {
        self.max_objective
    }

    /// One-way latch: the session should hand control back to objective search.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Check a behaviour against the minimum-criteria gate.
    ///
    /// A missing or non-positive step count fails the gate.
    pub fn meets_minimum_criteria(&self, evaluation: &Evaluation) -> bool {
        let Some(threshold) = self.config.minimum_criteria_threshold else {
            return true;
        };

        match evaluation.minimum_criteria.as_slice() {
            [redundant, total, ..] if *total > f64::EPSILON => redundant / total <= threshold,
            _ => false,
        }
    }

    /// Score a generation in place.
    ///
    /// Every behaviour carrying an evaluation takes part in the distance
    /// population. Behaviours that pass the minimum-criteria gate get their
    /// novelty score written to `objectives[objective]` and may be archived;
    /// those that fail are marked [`Viability::BelowMinimumCriteria`] and
    /// score 0. Faulted behaviours are ignored, and a behaviour whose novelty
    /// vector holds a NaN or infinite value is marked
    /// [`Viability::EvaluationFailed`] and ignored with them.
    pub fn score(&mut self, behaviours: &mut [Behaviour<Id>], objective: usize) -> NoveltyPass {
        self.generation += 1;

        for b in behaviours.iter_mut() {
            if b.viability.has_evaluation() && !b.evaluation.novelty_vector.is_finite() {
                log::warn!(
                    "Genome {:?} has a non-finite novelty vector, excluded from novelty",
                    b.genome_id
                );
                b.viability = Viability::EvaluationFailed;
                b.objectives[objective] = 0.0;
            }
        }

        let participants: Vec<usize> = behaviours
            .iter()
            .enumerate()
            .filter(|(_, b)| b.viability.has_evaluation())
            .map(|(i, _)| i)
            .collect();

        let mut pass = NoveltyPass::default();

        for &i in &participants {
            let b = &mut behaviours[i];
            self.max_objective = self.max_objective.max(b.objective_fitness());

            if self.meets_minimum_criteria(&b.evaluation) {
                b.viability = Viability::Viable;
            } else {
                b.viability = Viability::BelowMinimumCriteria;
                pass.below_minimum_criteria += 1;
            }
            b.objectives[objective] = 0.0;
        }

        let started = Instant::now();
        let knn = {
            let current: HashSet<Id> = participants
                .iter()
                .map(|&i| behaviours[i].genome_id)
                .collect();

            let mut pool: Vec<&NoveltyVector> = participants
                .iter()
                .map(|&i| &behaviours[i].evaluation.novelty_vector)
                .collect();
            if self.config.archive_comparison {
                pool.extend(
                    self.archive
                        .iter()
                        .filter(|e| !current.contains(&e.genome_id))
                        .map(|e| &e.novelty_vector),
                );
            }

            Knn::from_novelty_vectors(&pool, |dim| self.config.bounds_for(dim)).ok()
        };
        pass.knn_time = started.elapsed();

        let mut admitted = Vec::new();
        if let Some(knn) = knn {
            for (slot, &i) in participants.iter().enumerate() {
                let b = &mut behaviours[i];
                if !b.is_viable() {
                    continue;
                }

                let mut score = knn.average_distance_to_knn(slot, self.config.k);
                if self.config.objective_factor_exponent > 0.0 {
                    score *= b
                        .objective_fitness()
                        .max(0.0)
                        .powf(self.config.objective_factor_exponent);
                }
                b.objectives[objective] = score;
                pass.scored += 1;

                if score > self.p_min && !self.archive.contains(b.genome_id) {
                    admitted.push(ArchivedBehaviour {
                        genome_id: b.genome_id,
                        novelty_vector: b.evaluation.novelty_vector.clone(),
                        objective_fitness: b.objective_fitness(),
                        novelty_score: score,
                        generation: self.generation,
                    });
                }
            }
        }

        pass.archived = admitted.len();
        for entry in admitted {
            self.archive.push(entry);
        }

        self.adapt_p_min(pass.archived);
        self.update_completion();

        pass.archive_size = self.archive.len();
        pass.p_min = self.p_min;
        pass
    }

    fn adapt_p_min(&mut self, added: usize) {
        if added > 0 {
            self.generations_since_addition = 0;

            if added > self.config.additions_p_min_adjust_up {
                self.p_min *= self.config.p_min_adjust_up;
                log::info!("PMin adjusted up to {:.2}", self.p_min);
            }
        } else {
            self.generations_since_addition += 1;

            if self.generations_since_addition > self.config.generations_p_min_adjust_down {
                self.p_min *= self.config.p_min_adjust_down;
                log::info!("PMin adjusted down to {:.2}", self.p_min);

                if let Some(floor) = self.config.p_min_lower_threshold
                    && self.p_min < floor
                    && !self.p_min_floor_reached
                {
                    log::info!("PMin lower threshold reached");
                    self.p_min_floor_reached = true;
                }
            }
        }
    }

    fn update_completion(&mut self) {
        if self.complete {
            return;
        }

        let objective_reached = self
            .config
            .objective_score_threshold
            .is_some_and(|threshold| self.max_objective >= threshold);
        let budget_spent = self
            .config
            .max_generations
            .is_some_and(|max| self.generation >= max);

        if objective_reached || self.p_min_floor_reached || budget_spent {
            log::info!(
                "Novelty search complete after {} generations (max objective {:.4}, PMin {:.2})",
                self.generation,
                self.max_objective,
                self.p_min
            );
            self.complete = true;
        }
    }
}
