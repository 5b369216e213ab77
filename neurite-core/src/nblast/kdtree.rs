//! Static 3-D k-d tree over point indices.
//!
//! Nodes live in a flat arena and reference each other by index; inner
//! nodes own a pivot point, leaves own a contiguous range of a shared index
//! buffer. Splitting axes cycle x, y, z and the median is selected with
//! `select_nth_unstable_by`, so construction is deterministic for a given
//! point set. Queries are exact: the far subtree is revisited whenever the
//! axis-aligned distance to the splitting plane is below the current best
//! radius.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;

use ndarray::ArrayView2;

use super::NblastError;

const DEFAULT_LEAF_CAPACITY: usize = 20;

#[derive(Clone, Copy, Debug)]
enum Node {
    Inner {
        pivot: usize,
        axis: usize,
        left: usize,
        right: usize,
    },
    Leaf {
        start: usize,
        end: usize,
    },
}

/// A point found by a k-d tree query, with its Euclidean distance from the
/// query position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// Row index of the point within the source point set.
    pub index: usize,
    /// Euclidean distance between the query and [`Neighbour::index`].
    pub distance: f32,
}

impl Eq for Neighbour {}

impl Ord for Neighbour {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Static spatial index over the first three columns of a point matrix.
///
/// # Examples
/// ```
/// use ndarray::array;
/// use neurite_core::KdTree;
///
/// let points = array![[0.0_f32, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 4.0, 0.0]];
/// let tree = KdTree::new(points.view())?;
/// let nearest = tree.nearest([0.0, 3.0, 0.0]);
/// assert_eq!(nearest.index, 2);
/// assert_eq!(nearest.distance, 1.0);
/// # Ok::<(), neurite_core::NblastError>(())
/// ```
#[derive(Clone, Debug)]
pub struct KdTree {
    coords: Vec<[f32; 3]>,
    nodes: Vec<Node>,
    indices: Vec<usize>,
    root: usize,
}

impl KdTree {
    /// Builds a tree with the default leaf capacity.
    ///
    /// # Errors
    /// Returns [`NblastError::EmptyPointSet`] for an empty matrix and
    /// [`NblastError::PointDimension`] when rows have fewer than three
    /// columns.
    pub fn new(points: ArrayView2<'_, f32>) -> Result<Self, NblastError> {
        let capacity = NonZeroUsize::new(DEFAULT_LEAF_CAPACITY)
            .expect("default leaf capacity is non-zero");
        Self::with_leaf_capacity(points, capacity)
    }

    /// Builds a tree whose leaves hold at most `leaf_capacity` points.
    ///
    /// Callers issuing k-nearest-neighbour queries get the best traversal
    /// locality when `leaf_capacity` matches the requested neighbour count.
    ///
    /// # Errors
    /// Same conditions as [`KdTree::new`].
    pub fn with_leaf_capacity(
        points: ArrayView2<'_, f32>,
        leaf_capacity: NonZeroUsize,
    ) -> Result<Self, NblastError> {
        let coords = point_rows(points)?;
        let mut indices: Vec<usize> = (0..coords.len()).collect();
        let mut nodes = Vec::new();
        let root = build_node(
            &coords,
            &mut indices,
            0,
            0,
            leaf_capacity.get(),
            &mut nodes,
        );
        Ok(Self {
            coords,
            nodes,
            indices,
            root,
        })
    }

    /// Returns the number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Returns whether the tree indexes no points. Construction rejects
    /// empty point sets, so this is always `false` on a built tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Returns the nearest indexed point to `query`.
    ///
    /// Exact: the result's squared distance equals the brute-force minimum
    /// over the whole point set. Distance ties resolve to the smaller index.
    #[must_use]
    pub fn nearest(&self, query: [f32; 3]) -> Neighbour {
        let mut best = Neighbour {
            index: usize::MAX,
            distance: f32::INFINITY,
        };
        self.nearest_below(self.root, query, &mut best);
        Neighbour {
            index: best.index,
            distance: best.distance.sqrt(),
        }
    }

    /// Returns the `k` nearest indexed points to `query`, sorted by
    /// ascending distance with ties on the smaller index.
    ///
    /// Fewer than `k` neighbours are returned only when the tree holds
    /// fewer than `k` points.
    #[must_use]
    pub fn knn(&self, query: [f32; 3], k: NonZeroUsize) -> Vec<Neighbour> {
        let mut kept: BinaryHeap<Neighbour> = BinaryHeap::with_capacity(k.get() + 1);
        self.knn_below(self.root, query, k.get(), &mut kept);

        let mut neighbours: Vec<Neighbour> = kept
            .into_vec()
            .into_iter()
            .map(|found| Neighbour {
                index: found.index,
                distance: found.distance.sqrt(),
            })
            .collect();
        neighbours.sort_unstable();
        neighbours
    }

    fn nearest_below(&self, node: usize, query: [f32; 3], best: &mut Neighbour) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.indices[start..end] {
                    consider(&self.coords, index, query, best);
                }
            }
            Node::Inner {
                pivot,
                axis,
                left,
                right,
            } => {
                consider(&self.coords, pivot, query, best);
                let delta = query[axis] - self.coords[pivot][axis];
                let (near, far) = if delta < 0.0 { (left, right) } else { (right, left) };
                self.nearest_below(near, query, best);
                if delta * delta < best.distance {
                    self.nearest_below(far, query, best);
                }
            }
        }
    }

    fn knn_below(&self, node: usize, query: [f32; 3], k: usize, kept: &mut BinaryHeap<Neighbour>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.indices[start..end] {
                    let distance = distance_sq(self.coords[index], query);
                    push_bounded(kept, k, Neighbour { index, distance });
                }
            }
            Node::Inner {
                pivot,
                axis,
                left,
                right,
            } => {
                let distance = distance_sq(self.coords[pivot], query);
                push_bounded(kept, k, Neighbour { index: pivot, distance });
                let delta = query[axis] - self.coords[pivot][axis];
                let (near, far) = if delta < 0.0 { (left, right) } else { (right, left) };
                self.knn_below(near, query, k, kept);
                let revisit = kept.len() < k
                    || kept
                        .peek()
                        .is_some_and(|worst| delta * delta < worst.distance);
                if revisit {
                    self.knn_below(far, query, k, kept);
                }
            }
        }
    }
}

/// Extracts `[x, y, z]` rows from a point matrix; columns past the first
/// three (radius, type tags) are ignored.
pub(super) fn point_rows(points: ArrayView2<'_, f32>) -> Result<Vec<[f32; 3]>, NblastError> {
    if points.nrows() == 0 {
        return Err(NblastError::EmptyPointSet);
    }
    let columns = points.ncols();
    if columns < 3 {
        return Err(NblastError::PointDimension { columns });
    }
    Ok(points
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect())
}

fn build_node(
    coords: &[[f32; 3]],
    indices: &mut [usize],
    offset: usize,
    axis: usize,
    leaf_capacity: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    if indices.len() <= leaf_capacity {
        nodes.push(Node::Leaf {
            start: offset,
            end: offset + indices.len(),
        });
        return nodes.len() - 1;
    }

    let median = indices.len() / 2;
    indices
        .select_nth_unstable_by(median, |&a, &b| coords[a][axis].total_cmp(&coords[b][axis]));
    let pivot = indices[median];
    let next_axis = (axis + 1) % 3;

    let (left_indices, rest) = indices.split_at_mut(median);
    let right_indices = &mut rest[1..];
    let left = build_node(coords, left_indices, offset, next_axis, leaf_capacity, nodes);
    let right = build_node(
        coords,
        right_indices,
        offset + median + 1,
        next_axis,
        leaf_capacity,
        nodes,
    );

    nodes.push(Node::Inner {
        pivot,
        axis,
        left,
        right,
    });
    nodes.len() - 1
}

fn consider(coords: &[[f32; 3]], index: usize, query: [f32; 3], best: &mut Neighbour) {
    let distance = distance_sq(coords[index], query);
    if distance < best.distance || (distance == best.distance && index < best.index) {
        *best = Neighbour { index, distance };
    }
}

fn push_bounded(kept: &mut BinaryHeap<Neighbour>, k: usize, candidate: Neighbour) {
    if kept.len() < k {
        kept.push(candidate);
        return;
    }
    if kept.peek().is_some_and(|worst| candidate < *worst) {
        kept.pop();
        kept.push(candidate);
    }
}

fn distance_sq(point: [f32; 3], query: [f32; 3]) -> f32 {
    let dx = point[0] - query[0];
    let dy = point[1] - query[1];
    let dz = point[2] - query[2];
    dx * dx + dy * dy + dz * dz
}
