//! Vector clouds: neuron points annotated with local principal directions.
//!
//! The tangent of a point is the first principal component of its k nearest
//! neighbours (the point itself included). Tangent signs are arbitrary; the
//! NBLAST score only consumes the absolute dot product, so no orientation
//! pass is needed.

use std::num::NonZeroUsize;

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::instrument;

use super::kdtree::point_rows;
use super::{KdTree, NblastError, ScoreTable};

/// Default neighbourhood size for tangent estimation.
pub const DEFAULT_NEIGHBOURHOOD: usize = 20;

/// A point cloud with per-point unit tangents and a k-d tree over the
/// points.
///
/// # Examples
/// ```
/// use ndarray::Array2;
/// use neurite_core::VectorCloud;
///
/// let points = Array2::from_shape_fn((30, 3), |(i, c)| {
///     if c == 0 { i as f32 * 1000.0 } else { 0.0 }
/// });
/// let cloud = VectorCloud::new(points.view())?;
/// // Colinear points: every tangent is the x axis, up to sign.
/// assert!(cloud.tangents().rows().into_iter().all(|t| t[0].abs() > 0.99));
/// # Ok::<(), neurite_core::NblastError>(())
/// ```
#[derive(Clone, Debug)]
pub struct VectorCloud {
    points: Vec<[f32; 3]>,
    tangents: Array2<f32>,
    kdtree: KdTree,
}

impl VectorCloud {
    /// Builds a cloud with the default neighbourhood size.
    ///
    /// # Errors
    /// Returns [`NblastError::EmptyPointSet`] for an empty matrix and
    /// [`NblastError::PointDimension`] when rows have fewer than three
    /// columns.
    pub fn new(points: ArrayView2<'_, f32>) -> Result<Self, NblastError> {
        let k = NonZeroUsize::new(DEFAULT_NEIGHBOURHOOD)
            .expect("default neighbourhood is non-zero");
        Self::with_neighbours(points, k)
    }

    /// Builds a cloud estimating tangents from the `k` nearest neighbours
    /// of each point.
    ///
    /// The k-d tree leaf capacity follows `k` so neighbourhood queries stay
    /// close to a single leaf.
    ///
    /// # Errors
    /// Same conditions as [`VectorCloud::new`].
    #[instrument(
        name = "nblast.vector_cloud",
        skip_all,
        fields(points = points.nrows(), k = k.get()),
    )]
    pub fn with_neighbours(
        points: ArrayView2<'_, f32>,
        k: NonZeroUsize,
    ) -> Result<Self, NblastError> {
        let kdtree = KdTree::with_leaf_capacity(points, k)?;
        let points = point_rows(points)?;

        // Tangents are independent per point; the parallel map observes the
        // same result as a serial pass.
        let rows: Vec<[f32; 3]> = points
            .par_iter()
            .map(|&point| principal_direction(&kdtree, &points, point, k))
            .collect();
        let mut tangents = Array2::zeros((points.len(), 3));
        for (mut row, tangent) in tangents.rows_mut().into_iter().zip(&rows) {
            row[0] = tangent[0];
            row[1] = tangent[1];
            row[2] = tangent[2];
        }

        Ok(Self {
            points,
            tangents,
            kdtree,
        })
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns whether the cloud holds no points. Construction rejects
    /// empty point sets, so this is always `false` on a built cloud.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the `[N, 3]` unit tangent matrix.
    #[must_use]
    pub fn tangents(&self) -> ArrayView2<'_, f32> {
        self.tangents.view()
    }

    /// Accumulates the raw NBLAST score of `query` against this cloud.
    ///
    /// Each query point contributes one table lookup over its distance to
    /// the nearest point of `self` and the absolute dot product of the two
    /// tangents. The raw score is asymmetric: `a.query_by(&b, t)` and
    /// `b.query_by(&a, t)` differ in general.
    #[must_use]
    pub fn query_by(&self, query: &VectorCloud, table: &ScoreTable) -> f32 {
        let mut raw = 0.0_f32;
        for (point, tangent) in query.points.iter().zip(query.tangents.rows()) {
            let nearest = self.kdtree.nearest(*point);
            let matched = self.tangents.row(nearest.index);
            let dot = (tangent[0] * matched[0]
                + tangent[1] * matched[1]
                + tangent[2] * matched[2])
                .abs();
            raw += table.score(nearest.distance, dot);
        }
        raw
    }
}

/// First principal component of a point's k-neighbourhood: eigenvector of
/// the largest eigenvalue of the centred covariance matrix, normalised.
fn principal_direction(
    kdtree: &KdTree,
    points: &[[f32; 3]],
    point: [f32; 3],
    k: NonZeroUsize,
) -> [f32; 3] {
    let neighbours = kdtree.knn(point, k);

    let mut centroid = Vector3::zeros();
    for neighbour in &neighbours {
        centroid += Vector3::from(points[neighbour.index]);
    }
    centroid /= neighbours.len() as f32;

    let mut covariance = Matrix3::zeros();
    for neighbour in &neighbours {
        let offset = Vector3::from(points[neighbour.index]) - centroid;
        covariance += offset * offset.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut largest = 0;
    for axis in 1..3 {
        if eigen.eigenvalues[axis] > eigen.eigenvalues[largest] {
            largest = axis;
        }
    }
    let direction = eigen.eigenvectors.column(largest);

    let norm = direction.norm();
    if norm > 1e-6 {
        [
            direction[0] / norm,
            direction[1] / norm,
            direction[2] / norm,
        ]
    } else {
        // Degenerate neighbourhood (all points coincident).
        [1.0, 0.0, 0.0]
    }
}
