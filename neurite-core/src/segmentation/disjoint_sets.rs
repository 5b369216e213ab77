//! Union-find forest over fragment labels.
//!
//! Labels are interned into a dense arena so `find` and `union` run on flat
//! parent and rank vectors rather than associative maps. Label `0` is
//! background and is never interned; `find_set` on a label the forest has
//! not seen returns the query unchanged, which keeps background voxels fixed
//! through relabelling.

use std::collections::{BTreeSet, HashMap, HashSet};

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use tracing::debug;

use super::Label;

/// Disjoint-set forest tracking which fragment labels have been merged.
///
/// # Examples
/// ```
/// use neurite_core::DisjointSets;
///
/// let mut forest = DisjointSets::new();
/// forest.union_set(1, 2);
/// forest.union_set(2, 3);
/// assert_eq!(forest.find_set(3), forest.find_set(1));
/// assert_eq!(forest.count_sets([1, 2, 3]), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DisjointSets {
    ids: HashMap<Label, usize>,
    labels: Vec<Label>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a forest with every nonzero label of a segmentation volume.
    #[must_use]
    pub fn from_segmentation(segmentation: ArrayView3<'_, Label>) -> Self {
        let mut forest = Self::new();
        for &label in segmentation.iter() {
            forest.make_set(label);
        }
        forest
    }

    /// Returns the number of labels known to the forest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns whether the forest has seen any labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Inserts a label as its own singleton set.
    ///
    /// Idempotent: a label already present is left untouched. Background
    /// (label `0`) is ignored.
    pub fn make_set(&mut self, label: Label) {
        if label > 0 {
            self.intern(label);
        }
    }

    /// Unions the sets containing `left` and `right`.
    ///
    /// Labels not previously seen are inserted silently first, so the call
    /// doubles as `make_and_union`. Uses union by rank.
    pub fn union_set(&mut self, left: Label, right: Label) {
        if left == 0 || right == 0 {
            return;
        }
        let left_id = self.intern(left);
        let right_id = self.intern(right);
        let mut left_root = self.root_id(left_id);
        let mut right_root = self.root_id(right_id);
        if left_root == right_root {
            return;
        }
        if self.rank[left_root] < self.rank[right_root] {
            std::mem::swap(&mut left_root, &mut right_root);
        }
        self.parent[right_root] = left_root;
        if self.rank[left_root] == self.rank[right_root] {
            self.rank[left_root] = self.rank[left_root].saturating_add(1);
        }
    }

    /// Returns the representative label of the set containing `label`.
    ///
    /// A label the forest has not seen (including background) is its own
    /// representative.
    #[must_use]
    pub fn find_set(&self, label: Label) -> Label {
        match self.ids.get(&label) {
            Some(&id) => self.labels[self.root_id(id)],
            None => label,
        }
    }

    /// Flattens the parent chains of the supplied labels.
    ///
    /// Afterwards every listed label known to the forest points directly at
    /// its representative, so subsequent `find_set` calls are O(1).
    pub fn compress_sets<I: IntoIterator<Item = Label>>(&mut self, labels: I) {
        for label in labels {
            if let Some(&id) = self.ids.get(&label) {
                let root = self.root_id(id);
                self.parent[id] = root;
            }
        }
    }

    /// Counts the distinct representatives among the supplied labels.
    #[must_use]
    pub fn count_sets<I: IntoIterator<Item = Label>>(&self, labels: I) -> usize {
        let mut roots = HashSet::new();
        for label in labels {
            roots.insert(self.find_set(label));
        }
        roots.len()
    }

    /// Bulk-unions an `[M, 2]` array of label pairs.
    ///
    /// Pairs are deduplicated through a set first; merge tables exported
    /// from chunked volumes repeat the same pair many times. The second
    /// column is unioned first: replaying a [`Self::merge_pairs`] table of
    /// `(label, representative)` rows then reproduces the representatives
    /// exactly.
    pub fn merge_array(&mut self, pairs: ArrayView2<'_, Label>) {
        let unique: BTreeSet<(Label, Label)> = pairs
            .rows()
            .into_iter()
            .map(|row| (row[0], row[1]))
            .collect();
        for (left, right) in unique {
            self.union_set(right, left);
        }
    }

    /// Exports the `[M, 2]` table of `(label, representative)` rows for every
    /// known label whose representative differs from itself, in ascending
    /// label order.
    #[must_use]
    pub fn merge_pairs(&self) -> Array2<Label> {
        let mut rows: Vec<(Label, Label)> = self
            .labels
            .iter()
            .map(|&label| (label, self.find_set(label)))
            .filter(|&(label, root)| label != root)
            .collect();
        rows.sort_unstable();

        let count = rows.len();
        let mut flat = Vec::with_capacity(count * 2);
        for (label, root) in rows {
            flat.push(label);
            flat.push(root);
        }
        Array2::from_shape_vec((count, 2), flat).expect("row-major pair buffer matches [M, 2]")
    }

    /// Maps every voxel of a segmentation to its representative label.
    ///
    /// Parent chains are compressed over the volume's labels first and the
    /// final object count is logged. Background voxels stay `0`.
    pub fn relabel(&mut self, mut segmentation: Array3<Label>) -> Array3<Label> {
        let labels: BTreeSet<Label> = segmentation.iter().copied().filter(|&l| l > 0).collect();
        self.compress_sets(labels.iter().copied());
        let objects = self.count_sets(labels.iter().copied());
        debug!(objects, "relabelling fragments to a flat segmentation");

        segmentation.mapv_inplace(|label| {
            if label == 0 {
                0
            } else {
                self.find_set(label)
            }
        });
        segmentation
    }

    /// Returns the known labels in insertion order.
    pub(super) fn known_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.iter().copied()
    }

    #[cfg(test)]
    pub(super) fn parent_label(&self, label: Label) -> Option<Label> {
        self.ids.get(&label).map(|&id| self.labels[self.parent[id]])
    }

    fn intern(&mut self, label: Label) -> usize {
        if let Some(&id) = self.ids.get(&label) {
            return id;
        }
        let id = self.labels.len();
        self.ids.insert(label, id);
        self.labels.push(label);
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn root_id(&self, mut id: usize) -> usize {
        while self.parent[id] != id {
            id = self.parent[id];
        }
        id
    }
}
