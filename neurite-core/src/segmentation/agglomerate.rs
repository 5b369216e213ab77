//! Greedy agglomeration of a region graph.
//!
//! A max-heap is seeded once with every adjacency's mean affinity and never
//! re-scored: edges folded together during a merge keep their snapshot
//! priority, giving single-linkage behaviour. Stale entries whose endpoints
//! have since been absorbed are skipped on pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array2, Array3};
use tracing::{info, instrument};

use super::{DisjointSets, Label, RegionGraph, RegionGraphError};

/// A candidate merge popped from the priority queue.
#[derive(Clone, Copy, Debug, PartialEq)]
struct MergeCandidate {
    source: Label,
    target: Label,
    mean: f32,
}

impl Eq for MergeCandidate {}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher mean pops first; ties pop the smaller endpoint pair so
        // extraction order is deterministic for a given build.
        self.mean
            .total_cmp(&other.mean)
            .then_with(|| other.source.cmp(&self.source))
            .then_with(|| other.target.cmp(&self.target))
    }
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The output of [`RegionGraph::greedy_merge_until`].
#[derive(Clone, Debug)]
pub struct AgglomerationOutcome {
    segmentation: Array3<Label>,
    merge_pairs: Array2<Label>,
    merge_count: usize,
    region_count: usize,
}

impl AgglomerationOutcome {
    /// Returns the relabelled volume. Background voxels stay `0`.
    #[must_use]
    #[rustfmt::skip]
    pub fn segmentation(&self) -> &Array3<Label> { &self.segmentation }

    /// Returns the `[M, 2]` table of `(label, representative)` rows for
    /// every label whose representative differs from itself.
    #[must_use]
    #[rustfmt::skip]
    pub fn merge_pairs(&self) -> &Array2<Label> { &self.merge_pairs }

    /// Returns how many merges were performed.
    #[must_use]
    #[rustfmt::skip]
    pub fn merge_count(&self) -> usize { self.merge_count }

    /// Returns the number of objects remaining after agglomeration.
    #[must_use]
    #[rustfmt::skip]
    pub fn region_count(&self) -> usize { self.region_count }

    /// Consumes the outcome and returns the relabelled volume.
    #[must_use]
    pub fn into_segmentation(self) -> Array3<Label> {
        self.segmentation
    }
}

impl RegionGraph {
    /// Greedily merges regions until the best mean affinity drops below
    /// `threshold`, then relabels `fragments` to the surviving
    /// representatives.
    ///
    /// The stopping rule is strict: a candidate with mean exactly equal to
    /// the threshold still merges. Candidates whose endpoints were absorbed
    /// by an earlier merge are skipped without counting.
    ///
    /// # Errors
    /// Returns [`RegionGraphError::EmptyLabelSet`] when `fragments` contains
    /// no foreground labels.
    ///
    /// # Examples
    /// ```
    /// use ndarray::{Array3, Array4};
    /// use neurite_core::RegionGraph;
    ///
    /// let affinities = Array4::<f32>::ones((3, 2, 2, 2));
    /// let mut fragments = Array3::<u64>::zeros((2, 2, 2));
    /// fragments.slice_mut(ndarray::s![.., .., 0]).fill(1);
    /// fragments.slice_mut(ndarray::s![.., .., 1]).fill(2);
    ///
    /// let mut graph = RegionGraph::new(affinities.view(), fragments.view())?;
    /// let outcome = graph.greedy_merge_until(fragments, 0.5)?;
    /// assert_eq!(outcome.merge_count(), 1);
    /// assert_eq!(outcome.region_count(), 1);
    /// # Ok::<(), neurite_core::RegionGraphError>(())
    /// ```
    #[instrument(
        name = "segmentation.agglomerate",
        skip(self, fragments),
        fields(regions = self.region_count()),
    )]
    pub fn greedy_merge_until(
        &mut self,
        fragments: Array3<Label>,
        threshold: f32,
    ) -> Result<AgglomerationOutcome, RegionGraphError> {
        let mut heap: BinaryHeap<MergeCandidate> = self
            .edges()
            .map(|(source, target, edge)| MergeCandidate {
                source,
                target,
                mean: edge.mean(),
            })
            .collect();

        let mut forest = DisjointSets::from_segmentation(fragments.view());
        if forest.is_empty() {
            return Err(RegionGraphError::EmptyLabelSet);
        }

        let mut merge_count = 0_usize;
        while let Some(candidate) = heap.pop() {
            if candidate.mean < threshold {
                break;
            }
            if !self.contains(candidate.source) || !self.contains(candidate.target) {
                // Stale snapshot entry: an endpoint was absorbed earlier.
                continue;
            }
            let winner = self.merge(candidate.source, candidate.target)?;
            let loser = if winner == candidate.source {
                candidate.target
            } else {
                candidate.source
            };
            // Union winner-first: on fresh labels the representative then
            // matches the absorbing region.
            forest.union_set(winner, loser);
            merge_count += 1;
        }

        let known: Vec<Label> = forest.known_labels().collect();
        forest.compress_sets(known.iter().copied());
        let region_count = forest.count_sets(known.iter().copied());
        let merge_pairs = forest.merge_pairs();
        info!(merge_count, region_count, "agglomeration complete");

        let segmentation = forest.relabel(fragments);
        Ok(AgglomerationOutcome {
            segmentation,
            merge_pairs,
            merge_count,
            region_count,
        })
    }
}
