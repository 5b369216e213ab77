//! All-pairs NBLAST score matrices over a set of vector clouds.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::instrument;

use super::{NblastError, ScoreTable, VectorCloud};

/// Raw, normalised, and mean NBLAST score matrices.
///
/// Row index is the target cloud, column index the query cloud. The raw
/// matrix is computed for the upper triangle (`query >= target`) and both
/// entries are filled explicitly.
#[derive(Clone, Debug)]
pub struct ScoreMatrix {
    raw: Array2<f32>,
}

impl ScoreMatrix {
    /// Scores every pair of clouds through the supplied table.
    ///
    /// # Errors
    /// Returns [`NblastError::EmptyCloudSet`] when `clouds` is empty.
    #[instrument(name = "nblast.score_matrix", skip_all, fields(clouds = clouds.len()))]
    pub fn new(clouds: &[VectorCloud], table: &ScoreTable) -> Result<Self, NblastError> {
        if clouds.is_empty() {
            return Err(NblastError::EmptyCloudSet);
        }

        let count = clouds.len();
        // One upper-triangle row per target; rows are independent.
        let triangles: Vec<Vec<f32>> = (0..count)
            .into_par_iter()
            .map(|target| {
                (target..count)
                    .map(|query| clouds[target].query_by(&clouds[query], table))
                    .collect()
            })
            .collect();

        let mut raw = Array2::zeros((count, count));
        for (target, triangle) in triangles.into_iter().enumerate() {
            for (offset, score) in triangle.into_iter().enumerate() {
                let query = target + offset;
                raw[[target, query]] = score;
                raw[[query, target]] = score;
            }
        }

        Ok(Self { raw })
    }

    /// Returns the number of clouds the matrix covers.
    #[must_use]
    pub fn cloud_count(&self) -> usize {
        self.raw.nrows()
    }

    /// Returns the raw score matrix.
    #[must_use]
    pub fn raw(&self) -> &Array2<f32> {
        &self.raw
    }

    /// Returns the matrix of raw scores divided by the query's self-score.
    ///
    /// Self-scores sit on the diagonal and are strictly positive for any
    /// well-formed score table, so the division is always defined.
    #[must_use]
    pub fn normalised(&self) -> Array2<f32> {
        let count = self.cloud_count();
        let mut normalised = Array2::zeros((count, count));
        for query in 0..count {
            let self_score = self.raw[[query, query]];
            for target in 0..count {
                normalised[[target, query]] = self.raw[[target, query]] / self_score;
            }
        }
        normalised
    }

    /// Returns the symmetric mean of the normalised matrix with a unit
    /// diagonal.
    #[must_use]
    pub fn mean(&self) -> Array2<f32> {
        let normalised = self.normalised();
        let count = self.cloud_count();
        let mut mean = Array2::ones((count, count));
        for target in 0..count {
            for query in (target + 1)..count {
                let value =
                    (normalised[[target, query]] + normalised[[query, target]]) / 2.0;
                mean[[target, query]] = value;
                mean[[query, target]] = value;
            }
        }
        mean
    }
}
