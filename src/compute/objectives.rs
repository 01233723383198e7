//! Auxiliary objective scorers.
//!
//! Each scorer reads the viable behaviours of a generation and writes one
//! objective index. Non-viable behaviours are left untouched.

use crate::schema::{Behaviour, ObjectiveScorerKind};

use super::knn::Knn;

/// Run an auxiliary scorer over the viable behaviours.
pub fn score_objective<Id>(
    kind: &ObjectiveScorerKind,
    behaviours: &mut [Behaviour<Id>],
    objective: usize,
) {
    let viable: Vec<usize> = behaviours
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_viable())
        .map(|(i, _)| i)
        .collect();

    let scores = match kind {
        ObjectiveScorerKind::GeneticDiversity { k, weight_range } => {
            genetic_diversity(behaviours, &viable, *k, *weight_range)
        }
        ObjectiveScorerKind::ConnectionCost => {
            let counts: Vec<f64> = viable
                .iter()
                .map(|&i| behaviours[i].genetic_position.len() as f64)
                .collect();
            inverted_min_max(&counts)
        }
        ObjectiveScorerKind::ResourceCost => {
            let usage: Vec<f64> = viable
                .iter()
                .map(|&i| mean(&behaviours[i].evaluation.resource_usage))
                .collect();
            inverted_min_max(&usage)
        }
    };

    for (&i, score) in viable.iter().zip(scores) {
        behaviours[i].objectives[objective] = score;
    }
}

/// Average squared distance to the `k` nearest genomes in weight space.
///
/// Weights are normalized with the known bounds `[-weight_range,
/// weight_range]`. An innovation id missing from one genome counts as weight
/// 0 there.
fn genetic_diversity<Id>(
    behaviours: &[Behaviour<Id>],
    viable: &[usize],
    k: usize,
    weight_range: f64,
) -> Vec<f64> {
    let normalize = |w: f64| (w + weight_range) / (2.0 * weight_range);

    let positions: Vec<Vec<(u64, f64)>> = viable
        .iter()
        .map(|&i| {
            let mut position: Vec<(u64, f64)> = behaviours[i]
                .genetic_position
                .iter()
                .map(|&(id, w)| (id, normalize(w)))
                .collect();
            position.sort_by_key(|&(id, _)| id);
            position
        })
        .collect();

    let absent = normalize(0.0);
    let distance = |i: usize, j: usize| sparse_squared_distance(&positions[i], &positions[j], absent);

    match Knn::from_distance(positions.len(), distance) {
        Ok(knn) => (0..positions.len())
            .map(|slot| knn.average_distance_to_knn(slot, k))
            .collect(),
        Err(_) => vec![0.0; positions.len()],
    }
}

/// Squared distance between two id-sorted sparse vectors, where an id present
/// on only one side is compared against `absent`.
fn sparse_squared_distance(a: &[(u64, f64)], b: &[(u64, f64)], absent: f64) -> f64 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        let (x, y) = match (a.get(i), b.get(j)) {
            (Some(&(ida, wa)), Some(&(idb, wb))) if ida == idb => {
                i += 1;
                j += 1;
                (wa, wb)
            }
            (Some(&(ida, wa)), Some(&(idb, _))) if ida < idb => {
                i += 1;
                (wa, absent)
            }
            (Some(&(_, wa)), None) => {
                i += 1;
                (wa, absent)
            }
            (_, Some(&(_, wb))) => {
                j += 1;
                (absent, wb)
            }
            (None, None) => break,
        };
        let d = x - y;
        sum += d * d;
    }

    sum
}

/// Min-max normalize so the smallest value scores 1 and the largest 0.
/// A zero span scores 0 for everyone.
fn inverted_min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    if !span.is_finite() || span <= 0.0 {
        return vec![0.0; values.len()];
    }

    values.iter().map(|v| (max - v) / span).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Evaluation, Viability};

    fn behaviour(id: u64, position: Vec<(u64, f64)>) -> Behaviour<u64> {
        Behaviour::new(id, Evaluation::new(0.0), 2).with_genetic_position(position)
    }

    #[test]
    fn test_connection_cost() {
        let mut behaviours = vec![
            behaviour(1, vec![(0, 1.0)]),
            behaviour(2, vec![(0, 1.0), (1, 1.0), (2, 1.0)]),
            behaviour(3, vec![(0, 1.0), (1, 1.0)]),
        ];
        score_objective(&ObjectiveScorerKind::ConnectionCost, &mut behaviours, 1);

        assert_eq!(behaviours[0].objectives[1], 1.0);
        assert_eq!(behaviours[1].objectives[1], 0.0);
        assert_eq!(behaviours[2].objectives[1], 0.5);
    }

    #[test]
    fn test_zero_span_scores_zero() {
        let mut behaviours = vec![behaviour(1, vec![(0, 1.0)]), behaviour(2, vec![(3, 1.0)])];
        score_objective(&ObjectiveScorerKind::ConnectionCost, &mut behaviours, 1);
        assert_eq!(behaviours[0].objectives[1], 0.0);
        assert_eq!(behaviours[1].objectives[1], 0.0);
    }

    #[test]
    fn test_resource_cost() {
        let mut behaviours = vec![
            Behaviour::new(1u64, Evaluation::new(0.0).with_resource_usage(vec![2.0, 4.0]), 2),
            Behaviour::new(2u64, Evaluation::new(0.0).with_resource_usage(vec![1.0]), 2),
            Behaviour::placeholder(3u64, Viability::DecodeFailed, 2),
        ];
        behaviours[2].objectives[1] = -1.0;
        score_objective(&ObjectiveScorerKind::ResourceCost, &mut behaviours, 1);

        assert_eq!(behaviours[0].objectives[1], 0.0);
        assert_eq!(behaviours[1].objectives[1], 1.0);
        // Non-viable behaviours are not scored.
        assert_eq!(behaviours[2].objectives[1], -1.0);
    }

    #[test]
    fn test_genetic_diversity() {
        let kind = ObjectiveScorerKind::GeneticDiversity {
            k: 1,
            weight_range: 1.0,
        };
        let mut behaviours = vec![
            behaviour(1, vec![(0, 1.0)]),
            behaviour(2, vec![(0, 1.0)]),
            behaviour(3, vec![(0, -1.0), (1, 1.0)]),
        ];
        score_objective(&kind, &mut behaviours, 1);

        assert_eq!(behaviours[0].objectives[1], 0.0);
        assert_eq!(behaviours[1].objectives[1], 0.0);
        // Normalized: [1, 0.5] vs [0, 1]
        assert_eq!(behaviours[2].objectives[1], 1.25);
    }

    #[test]
    fn test_genetic_diversity_sparse_ids() {
        let kind = ObjectiveScorerKind::GeneticDiversity {
            k: 1,
            weight_range: 1.0,
        };
        let mut behaviours = vec![
            behaviour(1, vec![(u64::MAX, 0.5)]),
            behaviour(2, vec![(3, 0.5)]),
            behaviour(3, vec![(3, 0.5), (1_000_000_000, -1.0)]),
        ];
        score_objective(&kind, &mut behaviours, 1);

        // 0.5 normalizes to 0.75, an absent weight to 0.5, -1 to 0.
        // d(1, 2) = 2 * 0.0625, d(2, 3) = 0.25, d(1, 3) = 0.125 + 0.25
        assert_eq!(behaviours[0].objectives[1], 0.125);
        assert_eq!(behaviours[1].objectives[1], 0.125);
        assert_eq!(behaviours[2].objectives[1], 0.25);
    }

    #[test]
    fn test_sparse_distance_matches_dense() {
        let a = [(0, 1.0), (2, 0.25)];
        let b = [(1, 0.75), (2, 0.5), (4, 0.0)];
        // Dense with 0.5 for absent ids: [1, .5, .25, .5, .5] vs [.5, .75, .5, .5, 0]
        let expected = 0.25 + 0.0625 + 0.0625 + 0.0 + 0.25;
        assert_eq!(sparse_squared_distance(&a, &b, 0.5), expected);
        assert_eq!(sparse_squared_distance(&b, &a, 0.5), expected);
        assert_eq!(sparse_squared_distance(&[], &[], 0.5), 0.0);
    }
}
