//! Weighted region adjacency graph over fragment labels.
//!
//! Every adjacency is stored exactly once, at the endpoint with the smaller
//! label, keyed by the larger one. A reverse index (label to the set of
//! smaller labels holding it as a neighbour) lets a merge re-home
//! third-party edges without scanning the whole graph.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{ArrayView3, ArrayView4};
use tracing::{info, instrument};

use super::{Label, RegionGraphError};

/// Accumulated affinity along the contact surface between two regions.
///
/// `count` shares the affinity scalar type so the mean division stays in one
/// type. After absorption into another edge both fields are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RegionEdge {
    count: f32,
    sum: f32,
}

impl RegionEdge {
    /// Returns the number of accumulated voxel edges.
    #[must_use]
    #[rustfmt::skip]
    pub fn count(&self) -> f32 { self.count }

    /// Returns the accumulated affinity sum.
    #[must_use]
    #[rustfmt::skip]
    pub fn sum(&self) -> f32 { self.sum }

    /// Returns the mean affinity. Only defined when `count > 0`.
    #[must_use]
    pub fn mean(&self) -> f32 {
        self.sum / self.count
    }

    fn accumulate(&mut self, affinity: f32) {
        self.count += 1.0;
        self.sum += affinity;
    }

    fn absorb(&mut self, other: &mut RegionEdge) {
        self.count += other.count;
        self.sum += other.sum;
        other.count = 0.0;
        other.sum = 0.0;
    }
}

#[derive(Clone, Debug, Default)]
struct RegionProps {
    voxel_count: usize,
    neighbours: BTreeMap<Label, RegionEdge>,
    live: bool,
}

/// Region adjacency graph built from an affinity map and a fragment volume.
///
/// # Examples
/// ```
/// use ndarray::{Array3, Array4};
/// use neurite_core::RegionGraph;
///
/// // Two fragments split along the x = 1 plane, fully connected affinities.
/// let affinities = Array4::<f32>::ones((3, 2, 2, 2));
/// let mut fragments = Array3::<u64>::zeros((2, 2, 2));
/// fragments.slice_mut(ndarray::s![.., .., 0]).fill(1);
/// fragments.slice_mut(ndarray::s![.., .., 1]).fill(2);
///
/// let graph = RegionGraph::new(affinities.view(), fragments.view())?;
/// let edge = graph.edge(1, 2).expect("fragments touch");
/// assert_eq!(edge.count(), 4.0);
/// assert_eq!(edge.mean(), 1.0);
/// # Ok::<(), neurite_core::RegionGraphError>(())
/// ```
#[derive(Clone, Debug)]
pub struct RegionGraph {
    regions: BTreeMap<Label, RegionProps>,
    /// For each label `m`, the smaller labels `q` storing an edge `{q, m}`.
    referrers: BTreeMap<Label, BTreeSet<Label>>,
}

impl RegionGraph {
    /// Builds the graph from an affinity map and a fragment labelling.
    ///
    /// The affinity map has shape `[3, Z, Y, X]`: channel 0 holds the x-edge
    /// between `(z, y, x)` and `(z, y, x - 1)`, channel 1 the y-edge, and
    /// channel 2 the z-edge. Edges incident to background voxels are
    /// ignored.
    ///
    /// # Errors
    /// Returns [`RegionGraphError::ChannelMismatch`] when the affinity map
    /// does not carry three channels and [`RegionGraphError::ShapeMismatch`]
    /// when the spatial shapes disagree.
    #[instrument(
        name = "segmentation.build_region_graph",
        skip_all,
        fields(shape = ?fragments.dim()),
    )]
    pub fn new(
        affinities: ArrayView4<'_, f32>,
        fragments: ArrayView3<'_, Label>,
    ) -> Result<Self, RegionGraphError> {
        let (channels, az, ay, ax) = affinities.dim();
        let (sz, sy, sx) = fragments.dim();
        if channels != 3 {
            return Err(RegionGraphError::ChannelMismatch { channels });
        }
        if (az, ay, ax) != (sz, sy, sx) {
            return Err(RegionGraphError::ShapeMismatch {
                affinity: [az, ay, ax],
                fragments: [sz, sy, sx],
            });
        }

        let mut graph = Self {
            regions: BTreeMap::new(),
            referrers: BTreeMap::new(),
        };

        for &label in fragments.iter() {
            if label > 0 {
                let props = graph.regions.entry(label).or_default();
                props.voxel_count += 1;
                props.live = true;
            }
        }

        // Each voxel looks backwards along z, y, x so every lattice edge is
        // visited exactly once. The affinity channels are ordered x, y, z
        // even though indexing is C-order z, y, x.
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    let label = fragments[[z, y, x]];
                    if label == 0 {
                        continue;
                    }
                    if z > 0 {
                        graph.accumulate_edge(
                            label,
                            fragments[[z - 1, y, x]],
                            affinities[[2, z, y, x]],
                        );
                    }
                    if y > 0 {
                        graph.accumulate_edge(
                            label,
                            fragments[[z, y - 1, x]],
                            affinities[[1, z, y, x]],
                        );
                    }
                    if x > 0 {
                        graph.accumulate_edge(
                            label,
                            fragments[[z, y, x - 1]],
                            affinities[[0, z, y, x]],
                        );
                    }
                }
            }
        }

        info!(
            regions = graph.region_count(),
            adjacencies = graph.edges().count(),
            "region graph built"
        );
        Ok(graph)
    }

    /// Returns the number of live regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.values().filter(|props| props.live).count()
    }

    /// Returns whether `label` is a live region.
    #[must_use]
    pub fn contains(&self, label: Label) -> bool {
        self.regions.get(&label).is_some_and(|props| props.live)
    }

    /// Returns the voxel count of a live region.
    #[must_use]
    pub fn voxel_count(&self, label: Label) -> Option<usize> {
        self.regions
            .get(&label)
            .filter(|props| props.live)
            .map(|props| props.voxel_count)
    }

    /// Returns the accumulated edge between two regions, if any.
    #[must_use]
    pub fn edge(&self, a: Label, b: Label) -> Option<&RegionEdge> {
        let (u, v) = (a.min(b), a.max(b));
        self.regions.get(&u)?.neighbours.get(&v)
    }

    /// Iterates over the live labels in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.regions
            .iter()
            .filter(|(_, props)| props.live)
            .map(|(&label, _)| label)
    }

    /// Iterates over all stored adjacencies as `(smaller, larger, edge)`.
    pub(super) fn edges(&self) -> impl Iterator<Item = (Label, Label, &RegionEdge)> + '_ {
        self.regions
            .iter()
            .filter(|(_, props)| props.live)
            .flat_map(|(&u, props)| props.neighbours.iter().map(move |(&v, edge)| (u, v, edge)))
    }

    fn accumulate_edge(&mut self, label: Label, neighbour: Label, affinity: f32) {
        if neighbour == 0 || neighbour == label {
            return;
        }
        let (u, v) = (label.min(neighbour), label.max(neighbour));
        let props = self
            .regions
            .get_mut(&u)
            .expect("foreground labels are seeded before edge accumulation");
        props.neighbours.entry(v).or_default().accumulate(affinity);
        self.referrers.entry(v).or_default().insert(u);
    }

    /// Merges two live regions, absorbing the smaller into the larger, and
    /// returns the winning label.
    ///
    /// The region with the larger voxel count wins; ties go to the larger
    /// label so merge order is deterministic. The loser's adjacencies fold
    /// into canonical `{winner, m}` storage and every third-party edge that
    /// referenced the loser is re-homed. Afterwards the loser is dead: no
    /// adjacency references it and it is never revisited.
    pub(super) fn merge(&mut self, a: Label, b: Label) -> Result<Label, RegionGraphError> {
        if a == b {
            return Err(RegionGraphError::SelfMerge { label: a });
        }
        if !self.contains(a) {
            return Err(RegionGraphError::UnknownRegion { label: a });
        }
        if !self.contains(b) {
            return Err(RegionGraphError::UnknownRegion { label: b });
        }

        let a_voxels = self.regions[&a].voxel_count;
        let b_voxels = self.regions[&b].voxel_count;
        let (winner, loser) = if (a_voxels, a) > (b_voxels, b) {
            (a, b)
        } else {
            (b, a)
        };

        let absorbed = {
            let props = self
                .regions
                .get_mut(&loser)
                .expect("loser liveness checked above");
            props.live = false;
            let voxels = props.voxel_count;
            props.voxel_count = 0;
            (voxels, std::mem::take(&mut props.neighbours))
        };
        let (loser_voxels, loser_edges) = absorbed;
        self.regions
            .get_mut(&winner)
            .expect("winner liveness checked above")
            .voxel_count += loser_voxels;

        // Edges the loser stored itself (all keyed by a larger label).
        for (m, mut edge) in loser_edges {
            if let Some(referrers) = self.referrers.get_mut(&m) {
                referrers.remove(&loser);
            }
            if m == winner {
                // The merged pair's own adjacency is consumed by the merge.
                continue;
            }
            self.fold_edge(winner, m, &mut edge);
        }

        // Third-party edges stored at smaller labels pointing at the loser.
        if let Some(referrers) = self.referrers.remove(&loser) {
            for q in referrers {
                let Some(mut edge) = self
                    .regions
                    .get_mut(&q)
                    .and_then(|props| props.neighbours.remove(&loser))
                else {
                    continue;
                };
                if q == winner {
                    continue;
                }
                self.fold_edge(winner, q, &mut edge);
            }
        }

        Ok(winner)
    }

    fn fold_edge(&mut self, winner: Label, other: Label, edge: &mut RegionEdge) {
        let (u, v) = (winner.min(other), winner.max(other));
        self.regions
            .get_mut(&u)
            .expect("canonical endpoint exists for folded edge")
            .neighbours
            .entry(v)
            .or_default()
            .absorb(edge);
        self.referrers.entry(v).or_default().insert(u);
    }
}
