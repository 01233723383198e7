//! Evaluation strategies and per-worker evaluator contexts.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::schema::{Behaviour, Viability};

use super::{EvaluationError, Genome, GenomeDecoder, PhenomeEvaluator};

/// Behaviour produced for one pending genome.
pub(super) struct Evaluated<Id> {
    /// Position of the genome in the population.
    pub position: usize,
    pub behaviour: Behaviour<Id>,
    /// Whether the fitness function was invoked.
    pub invoked: bool,
}

/// One lazily created context slot per worker thread, plus one for the
/// calling thread.
pub(super) struct WorkerContexts<C> {
    slots: Vec<Mutex<Option<C>>>,
}

impl<C: Send> WorkerContexts<C> {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers + 1).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Slot used outside the worker pool.
    fn caller_slot(&self) -> usize {
        self.slots.len() - 1
    }

    fn slot(&self, index: usize) -> &Mutex<Option<C>> {
        let index = if index < self.slots.len() {
            index
        } else {
            self.caller_slot()
        };
        &self.slots[index]
    }

    /// Take a slot's context out. The lock is held only for the swap, so a
    /// nested evaluation on the same worker finds the slot empty instead of
    /// blocking on it.
    fn check_out(&self, index: usize) -> Option<C> {
        self.slot(index)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Return a context to its slot unless a nested evaluation already did.
    fn check_in(&self, index: usize, context: Option<C>) {
        let mut slot = self.slot(index).lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = context;
        }
    }
}

/// Evaluate pending genomes one at a time on the calling thread.
pub(super) fn evaluate_serial<G, D, E>(
    pending: Vec<(usize, &mut G)>,
    decoder: &D,
    evaluator: &E,
    contexts: &WorkerContexts<E::Context>,
    objective_count: usize,
) -> Vec<Evaluated<G::Id>>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<G::Phenome>,
{
    let slot = contexts.caller_slot();
    let mut context = contexts.check_out(slot);

    let results = pending
        .into_iter()
        .map(|(position, genome)| {
            evaluate_genome(position, genome, decoder, evaluator, &mut context, objective_count)
        })
        .collect();

    contexts.check_in(slot, context);
    results
}

/// Evaluate pending genomes on the worker pool.
///
/// Results are collected under a single lock in completion order, then
/// sorted back into population order.
pub(super) fn evaluate_parallel<G, D, E>(
    pool: &ThreadPool,
    pending: Vec<(usize, &mut G)>,
    decoder: &D,
    evaluator: &E,
    contexts: &WorkerContexts<E::Context>,
    objective_count: usize,
) -> Vec<Evaluated<G::Id>>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<G::Phenome>,
{
    let results = Mutex::new(Vec::with_capacity(pending.len()));

    pool.install(|| {
        pending.into_par_iter().for_each(|(position, genome)| {
            let slot = rayon::current_thread_index().unwrap_or(contexts.caller_slot());
            let mut context = contexts.check_out(slot);
            let evaluated =
                evaluate_genome(position, genome, decoder, evaluator, &mut context, objective_count);
            contexts.check_in(slot, context);

            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(evaluated);
        });
    });

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|e| e.position);
    results
}

/// Decode (or reuse the cached phenome) and run the fitness function.
///
/// Faults are contained. A decode failure or decoder panic produces a
/// [`Viability::DecodeFailed`] placeholder. An error, a panic or a non-finite
/// value anywhere in the evaluation produces an
/// [`Viability::EvaluationFailed`] placeholder.
fn evaluate_genome<G, D, E>(
    position: usize,
    genome: &mut G,
    decoder: &D,
    evaluator: &E,
    context: &mut Option<E::Context>,
    objective_count: usize,
) -> Evaluated<G::Id>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<G::Phenome>,
{
    let id = genome.id();
    let placeholder = |viability, invoked| Evaluated {
        position,
        behaviour: Behaviour::placeholder(id, viability, objective_count),
        invoked,
    };

    if genome.cached_phenome().is_none() {
        match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(genome))) {
            Ok(Some(phenome)) => genome.cache_phenome(phenome),
            Ok(None) => {
                log::debug!("Genome {:?} decoded to no phenome", id);
                return placeholder(Viability::DecodeFailed, false);
            }
            Err(payload) => {
                log::warn!(
                    "Decoding genome {:?} panicked: {}",
                    id,
                    panic_message(&*payload)
                );
                return placeholder(Viability::DecodeFailed, false);
            }
        }
    }
    let Some(phenome) = genome.cached_phenome() else {
        return placeholder(Viability::DecodeFailed, false);
    };

    let ctx = context.get_or_insert_with(|| evaluator.create_context());
    let result = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(phenome, ctx)))
        .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(&*payload))));

    let result = result.and_then(|evaluation| match evaluation.non_finite_field() {
        None => Ok(evaluation),
        Some("objective_fitness") => Err(EvaluationError::NonFiniteFitness),
        Some(field) => Err(EvaluationError::NonFiniteBehaviour(field)),
    });

    match result {
        Ok(evaluation) => Evaluated {
            position,
            behaviour: Behaviour::new(id, evaluation, objective_count)
                .with_genetic_position(genome.genetic_position()),
            invoked: true,
        },
        Err(err) => {
            if matches!(err, EvaluationError::Panicked(_)) {
                // State of a context that unwound mid-evaluation is unknown.
                *context = None;
            }
            log::warn!("Evaluation of genome {:?} failed: {}", id, err);
            placeholder(Viability::EvaluationFailed, true)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
