//! Property-based tests for the distance engine, novelty archive and ranker.

use pareto_novelty::compute::{
    ArchivedBehaviour, Knn, NoveltyArchive, crowding_distances, dominates, non_dominated_fronts,
    pareto, squared_distance,
};
use pareto_novelty::schema::NoveltyVector;
use proptest::prelude::*;

fn objective_population() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..4).prop_flat_map(|k| {
        prop::collection::vec(prop::collection::vec(0.0..10.0f64, k), 1..25)
    })
}

fn integer_population() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..4).prop_flat_map(|k| {
        prop::collection::vec(
            prop::collection::vec((0u8..4).prop_map(f64::from), k),
            1..25,
        )
    })
}

proptest! {
    // ==================== Distance ====================

    #[test]
    fn distance_symmetric(
        a in prop::collection::vec(-10.0..10.0f64, 0..12),
        b in prop::collection::vec(-10.0..10.0f64, 0..12)
    ) {
        prop_assert_eq!(squared_distance(&a, &b), squared_distance(&b, &a));
    }

    #[test]
    fn distance_zero_padding(
        a in prop::collection::vec(-10.0..10.0f64, 0..12),
        pad in 0usize..6
    ) {
        let mut padded = a.clone();
        padded.extend(std::iter::repeat_n(0.0, pad));
        prop_assert_eq!(squared_distance(&a, &padded), 0.0);
    }

    // ==================== KNN ====================

    #[test]
    fn knn_average_non_decreasing_in_k(
        vectors in prop::collection::vec(prop::collection::vec(-5.0..5.0f64, 1..6), 2..20),
        index in 0usize..20
    ) {
        let knn = Knn::new(&vectors).unwrap();
        let index = index % vectors.len();

        let mut previous = 0.0;
        for k in 1..vectors.len() {
            let average = knn.average_distance_to_knn(index, k);
            prop_assert!(average + 1e-9 >= previous);
            previous = average;
        }
    }

    #[test]
    fn knn_novelty_vectors_symmetric(
        series in prop::collection::vec(prop::collection::vec(-5.0..5.0f64, 0..8), 2..10)
    ) {
        let vectors: Vec<NoveltyVector> = series.into_iter().map(NoveltyVector::Flat).collect();
        let refs: Vec<&NoveltyVector> = vectors.iter().collect();
        let knn = Knn::from_novelty_vectors(&refs, |_| None).unwrap();

        let total: f64 = (0..knn.len()).map(|i| knn.neighbourhood(i).iter().sum::<f64>()).sum();
        prop_assert!(total.is_finite());
        for i in 0..knn.len() {
            prop_assert_eq!(knn.neighbourhood(i).len(), knn.len() - 1);
            prop_assert!(knn.neighbourhood(i).windows(2).all(|w| w[0] <= w[1]));
        }
    }

    // ==================== Dominance ====================

    #[test]
    fn dominance_antisymmetric(population in objective_population()) {
        for a in &population {
            prop_assert!(!dominates(a, a));
            for b in &population {
                prop_assert!(!(dominates(a, b) && dominates(b, a)));
            }
        }
    }

    #[test]
    fn fronts_partition_population(population in integer_population()) {
        let fronts = non_dominated_fronts(&population);

        let mut seen = vec![0usize; population.len()];
        for front in &fronts {
            for &i in front {
                seen[i] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&count| count == 1));

        // Front members are mutually non-dominating.
        for front in &fronts {
            for &a in front {
                for &b in front {
                    prop_assert!(!dominates(&population[a], &population[b]));
                }
            }
        }

        // Every member of a later front is dominated by the previous one.
        for pair in fronts.windows(2) {
            for &b in &pair[1] {
                prop_assert!(pair[0].iter().any(|&a| dominates(&population[a], &population[b])));
            }
        }
    }

    // ==================== Crowding and scores ====================

    #[test]
    fn crowding_boundaries_never_below_one(population in objective_population()) {
        for front in non_dominated_fronts(&population) {
            let distances = crowding_distances(&population, &front);
            let objectives = population[front[0]].len();

            for obj in 0..objectives {
                let values: Vec<f64> = front.iter().map(|&i| population[i][obj]).collect();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if max > min {
                    for (p, &v) in values.iter().enumerate() {
                        if v == min || v == max {
                            prop_assert_eq!(distances[p], 1.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn scores_follow_rank_then_crowding(population in integer_population()) {
        let ranking = pareto::rank(&population);
        let n = population.len();

        for a in 0..n {
            prop_assert!((0.0..=1.0).contains(&ranking.scores[a]));
            for b in 0..n {
                let better = ranking.ranks[a] < ranking.ranks[b]
                    || (ranking.ranks[a] == ranking.ranks[b]
                        && ranking.crowding[a] > ranking.crowding[b]);
                if better {
                    prop_assert!(ranking.scores[a] > ranking.scores[b]);
                }
                if ranking.ranks[a] == ranking.ranks[b] && ranking.crowding[a] == ranking.crowding[b] {
                    prop_assert_eq!(ranking.scores[a], ranking.scores[b]);
                }
            }
        }
    }

    // ==================== Archive ====================

    #[test]
    fn archive_never_exceeds_capacity(capacity in 1usize..20, pushes in 0usize..100) {
        let mut archive = NoveltyArchive::new(capacity);
        for id in 0..pushes {
            archive.push(ArchivedBehaviour {
                genome_id: id,
                novelty_vector: NoveltyVector::default(),
                objective_fitness: 0.0,
                novelty_score: 1.0,
                generation: 0,
            });
            prop_assert!(archive.len() <= capacity);
        }
        prop_assert_eq!(archive.len(), pushes.min(capacity));
    }
}
