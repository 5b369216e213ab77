//! Unit tests for region-graph agglomeration.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array2, Array3, Array4, array, s};
use proptest::prelude::*;
use rstest::rstest;

use super::{DisjointSets, Label, RegionGraph, RegionGraphError, RegionGraphErrorCode};

/// Two fragments split along the x = 1 plane of a `[2, 2, 2]` volume.
fn split_fragments() -> Array3<Label> {
    let mut fragments = Array3::zeros((2, 2, 2));
    fragments.slice_mut(s![.., .., 0]).fill(1);
    fragments.slice_mut(s![.., .., 1]).fill(2);
    fragments
}

fn split_graph() -> (RegionGraph, Array3<Label>) {
    let affinities = Array4::ones((3, 2, 2, 2));
    let fragments = split_fragments();
    let graph = RegionGraph::new(affinities.view(), fragments.view())
        .expect("aligned shapes must build");
    (graph, fragments)
}

/// Three mutually adjacent regions in a `[1, 2, 2]` volume:
///
/// ```text
/// y=0:  1 2
/// y=1:  3 2
/// ```
///
/// Edge means: {1,2} = 1.0, {2,3} = 0.9, {1,3} = 0.8.
fn triangle_graph() -> (RegionGraph, Array3<Label>) {
    let fragments: Array3<Label> = array![[[1, 2], [3, 2]]];
    let mut affinities = Array4::zeros((3, 1, 2, 2));
    affinities[[0, 0, 0, 1]] = 1.0;
    affinities[[0, 0, 1, 1]] = 0.9;
    affinities[[1, 0, 1, 0]] = 0.8;
    let graph = RegionGraph::new(affinities.view(), fragments.view())
        .expect("aligned shapes must build");
    (graph, fragments)
}

#[test]
fn build_accumulates_single_canonical_adjacency() {
    let (graph, _) = split_graph();

    assert_eq!(graph.region_count(), 2);
    assert_eq!(graph.voxel_count(1), Some(4));
    assert_eq!(graph.voxel_count(2), Some(4));

    // The four x-crossings are the only stored adjacency, held at the
    // smaller endpoint.
    let edges: Vec<_> = graph.edges().map(|(u, v, e)| (u, v, *e)).collect();
    assert_eq!(edges.len(), 1);
    let (u, v, edge) = edges[0];
    assert_eq!((u, v), (1, 2));
    assert_eq!(edge.count(), 4.0);
    assert_eq!(edge.sum(), 4.0);
    assert_eq!(edge.mean(), 1.0);
}

#[test]
fn build_rejects_wrong_channel_count() {
    let affinities = Array4::<f32>::ones((2, 2, 2, 2));
    let err = RegionGraph::new(affinities.view(), split_fragments().view())
        .expect_err("two-channel affinities must fail");
    assert_eq!(err, RegionGraphError::ChannelMismatch { channels: 2 });
    assert_eq!(err.code(), RegionGraphErrorCode::ChannelMismatch);
    assert_eq!(err.code().as_str(), "CHANNEL_MISMATCH");
}

#[test]
fn build_rejects_mismatched_spatial_shape() {
    let affinities = Array4::<f32>::ones((3, 2, 2, 3));
    let err = RegionGraph::new(affinities.view(), split_fragments().view())
        .expect_err("misaligned shapes must fail");
    assert!(matches!(
        err,
        RegionGraphError::ShapeMismatch {
            affinity: [2, 2, 3],
            fragments: [2, 2, 2],
        }
    ));
}

#[rstest]
#[case::below_mean(0.5)]
#[case::at_mean(1.0)]
fn merge_up_to_threshold_relabels_to_single_object(#[case] threshold: f32) {
    let (mut graph, fragments) = split_graph();
    let outcome = graph
        .greedy_merge_until(fragments, threshold)
        .expect("volume has foreground labels");

    assert_eq!(outcome.merge_count(), 1);
    assert_eq!(outcome.region_count(), 1);
    // Equal voxel counts tie to the larger label.
    assert!(outcome.segmentation().iter().all(|&label| label == 2));
    assert_eq!(outcome.merge_pairs(), &array![[1, 2]]);
}

#[test]
fn threshold_above_best_mean_leaves_volume_untouched() {
    let (mut graph, fragments) = split_graph();
    let expected = fragments.clone();
    let outcome = graph
        .greedy_merge_until(fragments, 1.5)
        .expect("volume has foreground labels");

    assert_eq!(outcome.merge_count(), 0);
    assert_eq!(outcome.region_count(), 2);
    assert_eq!(outcome.segmentation(), &expected);
    assert_eq!(outcome.merge_pairs().dim(), (0, 2));
}

#[test]
fn greedy_merge_rejects_background_only_volume() {
    let (mut graph, _) = split_graph();
    let err = graph
        .greedy_merge_until(Array3::zeros((2, 2, 2)), 0.5)
        .expect_err("background-only volume must fail");
    assert_eq!(err, RegionGraphError::EmptyLabelSet);
    assert_eq!(err.code().as_str(), "EMPTY_LABEL_SET");
}

#[test]
fn stale_heap_entries_are_skipped_without_counting() {
    let (mut graph, fragments) = triangle_graph();
    let outcome = graph
        .greedy_merge_until(fragments, 0.5)
        .expect("volume has foreground labels");

    // {1,2} merges first and absorbs 1, folding {1,3} into {2,3}; {2,3}
    // merges with its snapshot priority; the popped {1,3} entry is stale
    // and must not count a third merge.
    assert_eq!(outcome.merge_count(), 2);
    assert_eq!(outcome.region_count(), 1);
    assert!(outcome.segmentation().iter().all(|&label| label == 2));
}

#[test]
fn merge_folds_loser_edges_into_canonical_storage() {
    let (mut graph, _) = triangle_graph();

    let winner = graph.merge(1, 2).expect("both regions are live");
    assert_eq!(winner, 2);
    assert!(!graph.contains(1));
    assert_eq!(graph.voxel_count(2), Some(3));

    // {1,3} folded into {2,3}: counts and sums add.
    assert!(graph.edge(1, 3).is_none());
    assert!(graph.edge(1, 2).is_none());
    let folded = graph.edge(2, 3).expect("folded adjacency survives");
    assert_eq!(folded.count(), 2.0);
    assert!((folded.sum() - 1.7).abs() < 1e-6);
}

#[test]
fn merge_conserves_total_voxel_count() {
    let (mut graph, _) = triangle_graph();
    let total: usize = graph.labels().filter_map(|l| graph.voxel_count(l)).sum();
    assert_eq!(total, 4);

    graph.merge(1, 2).expect("both regions are live");
    let after_first: usize = graph.labels().filter_map(|l| graph.voxel_count(l)).sum();
    assert_eq!(after_first, total);

    graph.merge(2, 3).expect("both regions are live");
    let after_second: usize = graph.labels().filter_map(|l| graph.voxel_count(l)).sum();
    assert_eq!(after_second, total);
}

#[test]
fn merge_rejects_self_and_dead_regions() {
    let (mut graph, _) = triangle_graph();

    let err = graph.merge(2, 2).expect_err("self merge must fail");
    assert_eq!(err, RegionGraphError::SelfMerge { label: 2 });
    assert_eq!(err.code().as_str(), "SELF_MERGE");

    graph.merge(1, 2).expect("both regions are live");
    let err = graph.merge(1, 3).expect_err("absorbed region must fail");
    assert_eq!(err, RegionGraphError::UnknownRegion { label: 1 });

    let err = graph.merge(2, 9).expect_err("unseen region must fail");
    assert_eq!(err, RegionGraphError::UnknownRegion { label: 9 });
}

#[test]
fn union_find_counts_a_single_set_after_chained_unions() {
    let mut forest = DisjointSets::new();
    for label in 1..=4 {
        forest.make_set(label);
    }
    forest.union_set(1, 2);
    forest.union_set(3, 4);
    forest.union_set(2, 3);

    assert_eq!(forest.count_sets(1..=4), 1);
}

#[test]
fn make_set_is_idempotent() {
    let mut forest = DisjointSets::new();
    forest.make_set(7);
    forest.make_set(7);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest.find_set(7), 7);
}

#[test]
fn find_set_returns_unknown_labels_unchanged() {
    let forest = DisjointSets::new();
    assert_eq!(forest.find_set(0), 0);
    assert_eq!(forest.find_set(42), 42);
}

#[test]
fn union_set_inserts_unknown_labels_silently() {
    let mut forest = DisjointSets::new();
    forest.union_set(5, 6);
    assert_eq!(forest.len(), 2);
    assert_eq!(forest.find_set(5), forest.find_set(6));
}

#[test]
fn compress_sets_flattens_parent_chains() {
    let mut forest = DisjointSets::new();
    for label in 1..=5 {
        forest.make_set(label);
    }
    forest.union_set(1, 2);
    forest.union_set(3, 4);
    forest.union_set(1, 3);
    forest.union_set(1, 5);

    forest.compress_sets(1..=5);
    for label in 1..=5 {
        assert_eq!(
            forest.parent_label(label),
            Some(forest.find_set(label)),
            "parent of {label} must be its representative after compression",
        );
    }
}

#[test]
fn merge_pairs_lists_changed_labels_in_ascending_order() {
    let mut forest = DisjointSets::new();
    forest.union_set(4, 2);
    forest.union_set(9, 4);

    let pairs = forest.merge_pairs();
    let root = forest.find_set(4);
    let expected: Vec<[Label; 2]> = [2, 4, 9]
        .into_iter()
        .filter(|&label| label != root)
        .map(|label| [label, root])
        .collect();
    let rows: Vec<[Label; 2]> = pairs
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1]])
        .collect();
    assert_eq!(rows, expected);
}

#[test]
fn merge_array_deduplicates_pairs() {
    let mut forest = DisjointSets::new();
    let pairs: Array2<Label> = array![[1, 2], [1, 2], [3, 4], [1, 2]];
    forest.merge_array(pairs.view());

    assert_eq!(forest.len(), 4);
    assert_eq!(forest.count_sets([1, 2, 3, 4]), 2);
}

#[test]
fn relabel_preserves_background() {
    let mut forest = DisjointSets::new();
    forest.union_set(2, 1);
    let volume: Array3<Label> = array![[[0, 1], [2, 0]]];
    let relabelled = forest.relabel(volume);

    let root = forest.find_set(1);
    assert_eq!(relabelled, array![[[0, root], [root, 0]]]);
}

#[test]
fn from_segmentation_skips_background() {
    let volume: Array3<Label> = array![[[0, 3], [3, 7]]];
    let forest = DisjointSets::from_segmentation(volume.view());
    assert_eq!(forest.len(), 2);
}

proptest! {
    /// Agglomeration at an arbitrary threshold never loses or invents
    /// foreground: the output is exactly a per-label remapping of the input
    /// described by the merge-pair table.
    #[test]
    fn agglomeration_is_a_label_remapping(
        labels in prop::collection::vec(0_u64..5, 18),
        affinities in prop::collection::vec(0.0_f32..1.0, 3 * 18),
        threshold in 0.0_f32..1.0,
    ) {
        let fragments = Array3::from_shape_vec((2, 3, 3), labels)
            .expect("shape matches generated length");
        prop_assume!(fragments.iter().any(|&l| l > 0));
        let affinities = Array4::from_shape_vec((3, 2, 3, 3), affinities)
            .expect("shape matches generated length");

        let mut graph = RegionGraph::new(affinities.view(), fragments.view())
            .expect("aligned shapes must build");
        let initial_regions = graph.region_count();
        let outcome = graph
            .greedy_merge_until(fragments.clone(), threshold)
            .expect("volume has foreground labels");

        prop_assert!(outcome.region_count() <= initial_regions);
        prop_assert_eq!(
            outcome.region_count() + outcome.merge_count(),
            initial_regions,
        );

        let mapping: BTreeMap<Label, Label> = outcome
            .merge_pairs()
            .rows()
            .into_iter()
            .map(|row| (row[0], row[1]))
            .collect();
        let expected = fragments.mapv(|label| *mapping.get(&label).unwrap_or(&label));
        prop_assert_eq!(outcome.segmentation(), &expected);

        // Voxel counts per representative are conserved.
        let mut input_counts: HashMap<Label, usize> = HashMap::new();
        for &label in fragments.iter().filter(|&&l| l > 0) {
            *input_counts.entry(*mapping.get(&label).unwrap_or(&label)).or_default() += 1;
        }
        let mut output_counts: HashMap<Label, usize> = HashMap::new();
        for &label in outcome.segmentation().iter().filter(|&&l| l > 0) {
            *output_counts.entry(label).or_default() += 1;
        }
        prop_assert_eq!(input_counts, output_counts);
    }
}
