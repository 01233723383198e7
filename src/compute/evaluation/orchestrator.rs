//! Per-generation evaluation driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::compute::novelty::NoveltyScorer;
use crate::compute::objectives::score_objective;
use crate::compute::pareto;
use crate::schema::{Behaviour, EvaluationStrategy, OBJECTIVE_FITNESS, ScoringConfig};

use super::worker::{Evaluated, WorkerContexts, evaluate_parallel, evaluate_serial};
use super::{BuildError, Genome, GenomeDecoder, PhenomeEvaluator};

/// Objective index of the novelty score when novelty search is enabled.
const NOVELTY_OBJECTIVE: usize = 1;

/// Fraction of the declared maximum fitness that counts as solved.
const SOLVED_FRACTION: f64 = 0.999;

/// Outcome of one call to [`PopulationEvaluator::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GenerationOutcome {
    /// Every genome received a fitness.
    Completed(GenerationSummary),
    /// The cancel flag was set. No genome was touched.
    Cancelled,
}

/// Statistics of one scored generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSummary {
    /// Generation number, starting at 1.
    pub generation: usize,
    /// Genomes sent to the fitness function (or decoder) this generation.
    pub evaluated: usize,
    /// Elites whose cached behaviour was reused.
    pub elites: usize,
    /// Behaviours excluded from scoring (faults and minimum-criteria failures).
    pub non_viable: usize,
    /// Behaviours that failed the novelty minimum-criteria gate.
    pub below_minimum_criteria: usize,
    /// Size of the first Pareto front, when ranking ran.
    pub pareto_optimal: Option<usize>,
    /// Archive size after novelty scoring.
    pub archive_size: Option<usize>,
    /// PMin after novelty scoring.
    pub p_min: Option<f64>,
    /// Best value of every objective among evaluated behaviours.
    pub max_objective_scores: Vec<f64>,
    pub evaluation_time: Duration,
    pub novelty_time: Duration,
    pub multi_objective_time: Duration,
}

/// Running totals between report log lines.
#[derive(Debug, Default)]
struct ReportWindow {
    generations: usize,
    evaluation_time: Duration,
    novelty_time: Duration,
    multi_objective_time: Duration,
    knn_time: Duration,
    pareto_optimal: usize,
    below_minimum_criteria: usize,
}

/// Scores a population once per generation.
///
/// Newly created genomes are run through the fitness function; elites reuse
/// their behaviour from the previous generation. The combined set is then
/// scored by novelty and/or Pareto ranking and a single fitness is written
/// back to every genome.
pub struct PopulationEvaluator<G, D, E>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<G::Phenome>,
{
    config: ScoringConfig,
    decoder: D,
    evaluator: E,
    pool: Option<ThreadPool>,
    contexts: WorkerContexts<E::Context>,
    novelty: NoveltyScorer<G::Id>,
    novelty_enabled: bool,
    multi_objective_enabled: bool,
    reevaluate_once: bool,
    previous_generation: HashMap<G::Id, Behaviour<G::Id>>,
    generation: usize,
    evaluation_count: u64,
    stop_condition_satisfied: bool,
    max_objective_scores: Vec<f64>,
    report: ReportWindow,
    cancelled: Arc<AtomicBool>,
}

impl<G, D, E> PopulationEvaluator<G, D, E>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<G::Phenome>,
{
    /// Create an evaluator. Validates the configuration and builds the
    /// worker pool for the parallel strategy.
    pub fn new(config: ScoringConfig, decoder: D, evaluator: E) -> Result<Self, BuildError> {
        config.validate()?;

        let (pool, workers) = match config.evaluation.strategy {
            EvaluationStrategy::Serial => (None, 0),
            EvaluationStrategy::Parallel { max_parallelism } => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(max_parallelism)
                    .thread_name(|i| format!("evaluator-{}", i))
                    .build()?;
                let workers = pool.current_num_threads();
                (Some(pool), workers)
            }
        };

        Ok(Self {
            novelty: NoveltyScorer::new(config.novelty.clone()),
            novelty_enabled: config.novelty.enabled,
            multi_objective_enabled: config.multi_objective.enabled,
            reevaluate_once: false,
            previous_generation: HashMap::new(),
            generation: 0,
            evaluation_count: 0,
            stop_condition_satisfied: false,
            max_objective_scores: Vec::new(),
            report: ReportWindow::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            contexts: WorkerContexts::new(workers),
            pool,
            decoder,
            evaluator,
            config,
        })
    }

    /// Get cancellation handle. Checked before every generation.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn novelty_search_enabled(&self) -> bool {
        self.novelty_enabled
    }

    /// Toggle novelty search. Forces a full re-evaluation next generation.
    pub fn set_novelty_search_enabled(&mut self, enabled: bool) {
        self.novelty_enabled = enabled;
        self.reevaluate_once = true;
    }

    pub fn multi_objective_enabled(&self) -> bool {
        self.multi_objective_enabled
    }

    /// Toggle multi-objective ranking. Forces a full re-evaluation next generation.
    pub fn set_multi_objective_enabled(&mut self, enabled: bool) {
        self.multi_objective_enabled = enabled;
        self.reevaluate_once = true;
    }

    /// Generations between statistics log lines.
    pub fn report_interval(&self) -> usize {
        self.config.evaluation.report_interval
    }

    pub fn set_report_interval(&mut self, interval: usize) {
        self.config.evaluation.report_interval = interval.max(1);
    }

    /// Genomes currently in the novelty archive, oldest first.
    pub fn novelty_archive(&self) -> Vec<G::Id> {
        self.novelty.archive().genome_ids()
    }

    pub fn novelty_scorer(&self) -> &NoveltyScorer<G::Id> {
        &self.novelty
    }

    /// True once the novelty session met its stop condition.
    pub fn novelty_search_complete(&self) -> bool {
        self.novelty.is_complete()
    }

    /// Start a fresh novelty session (empty archive, initial PMin).
    pub fn reset_novelty_search(&mut self) {
        self.novelty.reset();
    }

    /// True once an evaluation reached the fitness function's maximum.
    pub fn stop_condition_satisfied(&self) -> bool {
        self.stop_condition_satisfied
    }

    pub fn reset_stop_condition(&mut self) {
        self.stop_condition_satisfied = false;
    }

    /// Total fitness function invocations.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    /// Generations evaluated so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Best value of every objective in the last generation.
    pub fn max_objective_scores(&self) -> &[f64] {
        &self.max_objective_scores
    }

    /// Objective vector length for the current toggles.
    pub fn objective_count(&self) -> usize {
        self.config
            .objective_count(self.novelty_enabled, self.multi_objective_enabled)
    }

    /// Objective names in index order.
    pub fn objective_names(&self) -> Vec<&'static str> {
        let mut names = vec!["objective"];
        if self.novelty_enabled {
            names.push("novelty");
        }
        if self.multi_objective_enabled {
            names.extend(
                self.config
                    .multi_objective
                    .objective_scorers
                    .iter()
                    .map(|s| s.name()),
            );
        }
        names
    }

    fn strategy_description(&self) -> String {
        match &self.pool {
            Some(pool) => format!("parallel, {} threads", pool.current_num_threads()),
            None => "serial".to_string(),
        }
    }

    /// Score one generation and write a fitness onto every genome.
    pub fn evaluate(&mut self, genomes: &mut [G]) -> GenerationOutcome {
        if self.cancelled.load(Ordering::Relaxed) {
            return GenerationOutcome::Cancelled;
        }

        self.generation += 1;
        if self.generation == 1 {
            log::info!("Evaluation strategy: {}", self.strategy_description());
        }

        let objective_count = self.objective_count();
        let reevaluate = std::mem::take(&mut self.reevaluate_once);

        // Split into elites with a cached behaviour and genomes to evaluate.
        let mut previous = std::mem::take(&mut self.previous_generation);
        let mut elites = Vec::new();
        let mut pending = Vec::new();
        for (position, genome) in genomes.iter_mut().enumerate() {
            if !reevaluate && genome.evaluation_info().is_evaluated() {
                if let Some(mut behaviour) = previous.remove(&genome.id()) {
                    genome.evaluation_info_mut().register_pass();
                    behaviour.reset_for_rescoring(objective_count);
                    elites.push(Evaluated {
                        position,
                        behaviour,
                        invoked: false,
                    });
                    continue;
                }
                log::debug!(
                    "Genome {:?} has no cached behaviour, re-evaluating",
                    genome.id()
                );
            }
            pending.push((position, genome));
        }
        drop(previous);

        let mut summary = GenerationSummary {
            generation: self.generation,
            evaluated: pending.len(),
            elites: elites.len(),
            ..Default::default()
        };

        let started = Instant::now();
        let evaluated = match &self.pool {
            Some(pool) => evaluate_parallel(
                pool,
                pending,
                &self.decoder,
                &self.evaluator,
                &self.contexts,
                objective_count,
            ),
            None => evaluate_serial(
                pending,
                &self.decoder,
                &self.evaluator,
                &self.contexts,
                objective_count,
            ),
        };
        summary.evaluation_time = started.elapsed();

        self.evaluation_count += evaluated.iter().filter(|e| e.invoked).count() as u64;

        if let Some(max_fitness) = self.evaluator.max_fitness() {
            let solved = evaluated.iter().any(|e| {
                e.behaviour.viability.has_evaluation()
                    && e.behaviour.objective_fitness() >= max_fitness * SOLVED_FRACTION
            });
            if solved && !self.stop_condition_satisfied {
                log::info!("Fitness function reported a solved task");
                self.stop_condition_satisfied = true;
            }
        }

        // Combined set in population order.
        let mut combined: Vec<Evaluated<G::Id>> = evaluated.into_iter().chain(elites).collect();
        combined.sort_by_key(|e| e.position);
        let (positions, mut behaviours): (Vec<usize>, Vec<Behaviour<G::Id>>) =
            combined.into_iter().map(|e| (e.position, e.behaviour)).unzip();

        let fitness = self.score(&mut behaviours, &mut summary);

        for (&position, value) in positions.iter().zip(fitness) {
            genomes[position].evaluation_info_mut().set_fitness(value);
        }

        summary.non_viable = behaviours.iter().filter(|b| !b.is_viable()).count();
        summary.max_objective_scores = objective_maxima(&behaviours, objective_count);
        self.max_objective_scores = summary.max_objective_scores.clone();

        self.previous_generation = behaviours
            .into_iter()
            .map(|b| (b.genome_id, b))
            .collect();

        self.record(&summary);

        GenerationOutcome::Completed(summary)
    }

    /// Run the enabled scoring passes and compute each behaviour's fitness.
    fn score(&mut self, behaviours: &mut [Behaviour<G::Id>], summary: &mut GenerationSummary) -> Vec<f64> {
        if self.novelty_enabled {
            let started = Instant::now();
            let pass = self.novelty.score(behaviours, NOVELTY_OBJECTIVE);
            summary.novelty_time = started.elapsed();
            summary.below_minimum_criteria = pass.below_minimum_criteria;
            summary.archive_size = Some(pass.archive_size);
            summary.p_min = Some(pass.p_min);
            self.report.knn_time += pass.knn_time;
        }

        if !self.multi_objective_enabled {
            return behaviours
                .iter()
                .map(|b| {
                    if self.novelty_enabled {
                        if b.is_viable() {
                            b.objectives[NOVELTY_OBJECTIVE]
                        } else {
                            0.0
                        }
                    } else {
                        b.objective_fitness()
                    }
                })
                .collect();
        }

        let started = Instant::now();
        let first_auxiliary = OBJECTIVE_FITNESS + 1 + usize::from(self.novelty_enabled);
        for (offset, kind) in self.config.multi_objective.objective_scorers.iter().enumerate() {
            score_objective(kind, behaviours, first_auxiliary + offset);
        }

        let viable: Vec<usize> = behaviours
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_viable())
            .map(|(i, _)| i)
            .collect();

        if viable.is_empty() {
            log::warn!(
                "No viable behaviours for multi-objective ranking in generation {}, using objective fitness",
                self.generation
            );
            summary.multi_objective_time = started.elapsed();
            return behaviours.iter().map(|b| b.objective_fitness()).collect();
        }

        let objectives: Vec<&[f64]> = viable
            .iter()
            .map(|&i| behaviours[i].objectives.as_slice())
            .collect();
        let ranking = pareto::rank(&objectives);

        for (&i, &score) in viable.iter().zip(&ranking.scores) {
            behaviours[i].multi_objective_score = score;
        }
        summary.pareto_optimal = Some(ranking.pareto_optimal());
        summary.multi_objective_time = started.elapsed();

        behaviours
            .iter()
            .map(|b| if b.is_viable() { b.multi_objective_score } else { 0.0 })
            .collect()
    }

    /// Accumulate statistics and log them every report interval.
    fn record(&mut self, summary: &GenerationSummary) {
        let report = &mut self.report;
        report.generations += 1;
        report.evaluation_time += summary.evaluation_time;
        report.novelty_time += summary.novelty_time;
        report.multi_objective_time += summary.multi_objective_time;
        report.pareto_optimal += summary.pareto_optimal.unwrap_or(0);
        report.below_minimum_criteria += summary.below_minimum_criteria;

        if self.generation % self.config.evaluation.report_interval != 0 {
            return;
        }

        let n = report.generations.max(1) as u32;
        log::info!(
            "Generation {}: avg evaluation {:?}, avg novelty {:?} (knn {:?}), avg multi-objective {:?}",
            self.generation,
            report.evaluation_time / n,
            report.novelty_time / n,
            report.knn_time / n,
            report.multi_objective_time / n,
        );
        if self.multi_objective_enabled {
            log::info!(
                "Average Pareto-optimal behaviours/gen: {:.2}",
                report.pareto_optimal as f64 / n as f64
            );
        }
        if self.novelty_enabled {
            log::info!(
                "Archive size: {}, PMin: {:.2}, average below minimum criteria/gen: {:.2}",
                self.novelty.archive().len(),
                self.novelty.p_min(),
                report.below_minimum_criteria as f64 / n as f64
            );
        }
        log::info!("Max objective scores: {:?}", summary.max_objective_scores);

        self.report = ReportWindow::default();
    }
}

/// Best value of every objective among behaviours carrying an evaluation.
fn objective_maxima<Id>(behaviours: &[Behaviour<Id>], objective_count: usize) -> Vec<f64> {
    let mut max = vec![0.0; objective_count];
    for b in behaviours.iter().filter(|b| b.viability.has_evaluation()) {
        for (m, &v) in max.iter_mut().zip(&b.objectives) {
            *m = f64::max(*m, v);
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Evaluation, Viability};

    #[test]
    fn test_objective_maxima() {
        let mut a = Behaviour::new(1u64, Evaluation::new(0.5), 2);
        a.objectives[1] = 3.0;
        let b = Behaviour::new(2u64, Evaluation::new(0.9), 2);
        let mut failed = Behaviour::placeholder(3u64, Viability::EvaluationFailed, 2);
        failed.objectives[1] = 10.0;

        assert_eq!(objective_maxima(&[a, b, failed], 2), vec![0.9, 3.0]);
    }
}
