//! Pareto (NSGA-II style) multi-objective ranking.
//!
//! Every objective is maximized. Ranking state is built fresh for each call
//! and returned as a [`ParetoRanking`]; nothing is stored on the ranked items.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::Serialize;

/// True if `a` is no worse than `b` on every objective and strictly better
/// on at least one.
#[inline]
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Result of ranking a population. All vectors are indexed by input position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParetoRanking {
    /// Front of each individual, 1 = Pareto-optimal.
    pub ranks: Vec<usize>,
    /// Crowding distance of each individual within its front.
    pub crowding: Vec<f64>,
    /// Final score in `[0, 1]`, higher is better.
    pub scores: Vec<f64>,
    /// Members of each front, ascending index order.
    pub fronts: Vec<Vec<usize>>,
}

impl ParetoRanking {
    /// Size of the first front.
    pub fn pareto_optimal(&self) -> usize {
        self.fronts.first().map_or(0, Vec::len)
    }
}

/// Partition a population into non-dominated fronts.
///
/// Each front is extracted as a batch: members removed in one iteration do
/// not affect who else joins that same front.
pub fn non_dominated_fronts<O: AsRef<[f64]> + Sync>(objectives: &[O]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    if n == 0 {
        return vec![];
    }

    // dominated_set[i] = individuals that i dominates
    let dominated_set: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = objectives[i].as_ref();
            (0..n)
                .filter(|&j| j != i && dominates(a, objectives[j].as_ref()))
                .collect()
        })
        .collect();

    // domination_count[i] = number of individuals that dominate i
    let mut domination_count = vec![0usize; n];
    for dominated in &dominated_set {
        for &j in dominated {
            domination_count[j] += 1;
        }
    }

    let mut fronts = vec![];
    let mut current_front: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current_front.is_empty() {
        let mut next_front = vec![];
        for &i in &current_front {
            for &j in &dominated_set[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next_front.push(j);
                }
            }
        }
        next_front.sort_unstable();

        fronts.push(current_front);
        current_front = next_front;
    }

    fronts
}

/// Crowding distance of each member of a front, in front order.
///
/// An individual holding the minimum or maximum value of any objective with
/// a non-zero span is a boundary individual and gets exactly 1. Interior
/// individuals sum `(next - previous) / span` over objectives, where
/// `previous` and `next` are the nearest strictly smaller and strictly larger
/// values in the front. Zero-span objectives contribute nothing. A singleton
/// front scores 1.
///
/// Boundary individuals are pinned at 1.0, while an interior individual sums
/// over objectives and may exceed it.
pub fn crowding_distances<O: AsRef<[f64]>>(objectives: &[O], front: &[usize]) -> Vec<f64> {
    let n = front.len();
    if n == 1 {
        return vec![1.0];
    }

    let objective_count = front
        .iter()
        .map(|&i| objectives[i].as_ref().len())
        .min()
        .unwrap_or(0);

    let mut distance = vec![0.0; n];
    let mut boundary = vec![false; n];

    for obj in 0..objective_count {
        let values: Vec<f64> = front.iter().map(|&i| objectives[i].as_ref()[obj]).collect();

        let mut distinct = values.clone();
        distinct.sort_unstable_by(f64::total_cmp);
        distinct.dedup();

        let (Some(&min), Some(&max)) = (distinct.first(), distinct.last()) else {
            continue;
        };
        let span = max - min;
        if span.is_nan() || span <= 0.0 {
            continue;
        }

        for (p, &v) in values.iter().enumerate() {
            if v == min || v == max {
                boundary[p] = true;
                continue;
            }
            if let Ok(idx) = distinct.binary_search_by(|x| x.total_cmp(&v)) {
                distance[p] += (distinct[idx + 1] - distinct[idx - 1]) / span;
            }
        }
    }

    for (d, is_boundary) in distance.iter_mut().zip(boundary) {
        if is_boundary {
            *d = 1.0;
        }
    }

    distance
}

/// Rank a population and assign scores.
///
/// Individuals are ordered worst first (rank descending, then crowding
/// ascending) and scored `position / (M - 1)`. Individuals tied on both keys
/// share the score of the first position of their group. A single
/// individual scores 1.
pub fn rank<O: AsRef<[f64]> + Sync>(objectives: &[O]) -> ParetoRanking {
    let m = objectives.len();
    if m == 0 {
        return ParetoRanking::default();
    }

    let fronts = non_dominated_fronts(objectives);

    let mut ranks = vec![0; m];
    let mut crowding = vec![0.0; m];
    for (r, front) in fronts.iter().enumerate() {
        let distances = crowding_distances(objectives, front);
        for (&i, d) in front.iter().zip(distances) {
            ranks[i] = r + 1;
            crowding[i] = d;
        }
    }

    let worst_first = |a: usize, b: usize| -> Ordering {
        ranks[b]
            .cmp(&ranks[a])
            .then_with(|| crowding[a].total_cmp(&crowding[b]))
    };

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| worst_first(a, b).then(a.cmp(&b)));

    let mut scores = vec![1.0; m];
    if m > 1 {
        let denominator = (m - 1) as f64;
        let mut group_start = 0;
        for (pos, &i) in order.iter().enumerate() {
            if pos > 0 && worst_first(order[pos - 1], i) != Ordering::Equal {
                group_start = pos;
            }
            scores[i] = group_start as f64 / denominator;
        }
    }

    ParetoRanking {
        ranks,
        crowding,
        scores,
        fronts,
    }
}
