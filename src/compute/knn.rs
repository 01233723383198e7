//! K-nearest-neighbour distance engine.
//!
//! Every individual gets a sorted list of squared distances to all other
//! individuals. Distances are computed once per unordered pair by a pure
//! function, so the parallel pairwise loop gives the same numbers for any
//! thread count.

use rayon::prelude::*;

use crate::schema::NoveltyVector;

use super::distance::{FeatureBounds, squared_distance};

/// Distance engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KnnError {
    #[error("KNN needs at least 2 individuals, got {0}")]
    TooFewIndividuals(usize),
}

/// Pairwise distances for a population.
#[derive(Debug, Clone)]
pub struct Knn {
    /// Per individual, ascending distances to every other individual.
    neighbourhoods: Vec<Vec<f64>>,
}

impl Knn {
    /// Build from raw vectors. Short vectors are zero-padded.
    pub fn new<V: AsRef<[f64]> + Sync>(vectors: &[V]) -> Result<Self, KnnError> {
        Self::from_distance(vectors.len(), |i, j| {
            squared_distance(vectors[i].as_ref(), vectors[j].as_ref())
        })
    }

    /// Build from a pairwise distance function over `n` individuals.
    ///
    /// `distance(i, j)` is called once per unordered pair with `i < j`.
    pub fn from_distance<F>(n: usize, distance: F) -> Result<Self, KnnError>
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        if n < 2 {
            return Err(KnnError::TooFewIndividuals(n));
        }

        // Upper triangle, one row per individual.
        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i + 1..n).map(|j| distance(i, j)).collect())
            .collect();

        let mut neighbourhoods: Vec<Vec<f64>> = (0..n).map(|_| Vec::with_capacity(n - 1)).collect();
        for (i, row) in upper.iter().enumerate() {
            for (offset, &distance) in row.iter().enumerate() {
                neighbourhoods[i].push(distance);
                neighbourhoods[i + 1 + offset].push(distance);
            }
        }

        neighbourhoods
            .par_iter_mut()
            .for_each(|row| row.sort_unstable_by(f64::total_cmp));

        Ok(Self { neighbourhoods })
    }

    /// Build from novelty vectors.
    ///
    /// Each feature dimension is min/max normalized across every row of
    /// every vector (or with `known_bounds` where given). Inputs are not
    /// mutated. Distance is the sum over timesteps of the per-dimension
    /// squared differences, with short series padded by zero rows.
    pub fn from_novelty_vectors<F>(vectors: &[&NoveltyVector], known_bounds: F) -> Result<Self, KnnError>
    where
        F: Fn(usize) -> Option<(f64, f64)>,
    {
        if vectors.len() < 2 {
            return Err(KnnError::TooFewIndividuals(vectors.len()));
        }

        let width = vectors.iter().map(|v| v.width()).max().unwrap_or(0);
        let bounds = FeatureBounds::fit(width, vectors.iter().flat_map(|v| v.rows()), known_bounds);

        // Row-major flattening at full width turns series distance into flat distance.
        let flattened: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| {
                let mut flat = Vec::with_capacity(v.len() * width);
                for row in v.rows() {
                    bounds.normalize_row_into(row, &mut flat);
                }
                flat
            })
            .collect();

        Self::new(&flattened)
    }

    /// Number of individuals.
    pub fn len(&self) -> usize {
        self.neighbourhoods.len()
    }

    /// Always false for a constructed engine.
    pub fn is_empty(&self) -> bool {
        self.neighbourhoods.is_empty()
    }

    /// Sorted distances from an individual to every other individual.
    pub fn neighbourhood(&self, index: usize) -> &[f64] {
        &self.neighbourhoods[index]
    }

    /// Mean of the `k` smallest distances from an individual.
    ///
    /// `k` larger than the neighbourhood is clamped with a warning.
    pub fn average_distance_to_knn(&self, index: usize, k: usize) -> f64 {
        let neighbourhood = &self.neighbourhoods[index];

        let k = if k > neighbourhood.len() {
            log::warn!(
                "K was larger than neighbourhood size for KNN (K = {}, size = {})",
                k,
                neighbourhood.len()
            );
            neighbourhood.len()
        } else {
            k
        };

        if k == 0 {
            return 0.0;
        }

        neighbourhood[..k].iter().sum::<f64>() / k as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_few_individuals() {
        let vectors: Vec<Vec<f64>> = vec![vec![1.0]];
        assert_eq!(Knn::new(&vectors).unwrap_err(), KnnError::TooFewIndividuals(1));
    }

    #[test]
    fn test_neighbourhoods_sorted() {
        let vectors = vec![vec![0.0], vec![3.0], vec![1.0], vec![10.0]];
        let knn = Knn::new(&vectors).unwrap();

        assert_eq!(knn.len(), 4);
        assert_eq!(knn.neighbourhood(0), &[1.0, 9.0, 100.0]);
        assert_eq!(knn.neighbourhood(1), &[4.0, 9.0, 49.0]);
    }

    #[test]
    fn test_average_distance_to_knn() {
        let vectors = vec![vec![0.0], vec![1.0], vec![2.0]];
        let knn = Knn::new(&vectors).unwrap();

        assert_eq!(knn.average_distance_to_knn(0, 1), 1.0);
        assert_eq!(knn.average_distance_to_knn(0, 2), 2.5);
        // Clamped to 2
        assert_eq!(knn.average_distance_to_knn(0, 10), 2.5);
        assert_eq!(knn.average_distance_to_knn(0, 0), 0.0);
    }

    #[test]
    fn test_zero_padded_vectors() {
        let vectors: Vec<Vec<f64>> = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let knn = Knn::new(&vectors).unwrap();
        assert_eq!(knn.neighbourhood(0), &[0.0]);
    }

    #[test]
    fn test_novelty_vectors_normalized() {
        // Dimension 1 has a much larger scale than dimension 0.
        let a = NoveltyVector::Series(vec![vec![0.0, 0.0]]);
        let b = NoveltyVector::Series(vec![vec![1.0, 0.0]]);
        let c = NoveltyVector::Series(vec![vec![0.0, 1000.0]]);
        let knn = Knn::from_novelty_vectors(&[&a, &b, &c], |_| None).unwrap();

        // a-b and a-c are both one full span apart after normalization.
        assert_eq!(knn.neighbourhood(0), &[1.0, 1.0]);
        assert_eq!(knn.neighbourhood(1), &[1.0, 2.0]);
    }

    #[test]
    fn test_novelty_series_padding() {
        let a = NoveltyVector::Flat(vec![0.0, 1.0]);
        let b = NoveltyVector::Flat(vec![0.0, 1.0, 1.0]);
        let knn = Knn::from_novelty_vectors(&[&a, &b], |_| None).unwrap();

        // Missing third timestep of `a` counts as zero.
        assert_eq!(knn.neighbourhood(0), &[1.0]);
    }

    #[test]
    fn test_known_bounds() {
        let a = NoveltyVector::Flat(vec![0.25]);
        let b = NoveltyVector::Flat(vec![0.75]);
        let knn = Knn::from_novelty_vectors(&[&a, &b], |_| Some((0.0, 1.0))).unwrap();
        assert_eq!(knn.neighbourhood(0), &[0.25]);
    }

    #[test]
    fn test_from_distance() {
        let points: [f64; 3] = [0.0, 2.0, 5.0];
        let knn = Knn::from_distance(3, |i, j| (points[i] - points[j]).abs()).unwrap();

        assert_eq!(knn.neighbourhood(0), &[2.0, 5.0]);
        assert_eq!(knn.neighbourhood(2), &[3.0, 5.0]);
        assert_eq!(
            Knn::from_distance(1, |_, _| 0.0).unwrap_err(),
            KnnError::TooFewIndividuals(1)
        );
    }
}
