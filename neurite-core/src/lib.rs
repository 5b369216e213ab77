//! Neurite core library.
//!
//! Algorithmic core of a connectomics post-processing toolkit. Two
//! subsystems are provided:
//!
//! - Segmentation: [`RegionGraph`] builds a weighted region adjacency graph
//!   from a per-voxel affinity map and a fragment labelling, then greedily
//!   merges regions in decreasing mean-affinity order while a
//!   [`DisjointSets`] forest tracks label equivalences, producing a
//!   relabelled volume.
//! - NBLAST: [`VectorCloud`] wraps neuron point clouds with per-point
//!   principal directions and a [`KdTree`], and [`ScoreMatrix`] scores cloud
//!   pairs through a [`ScoreTable`] lookup over nearest-neighbour distance
//!   and tangent alignment.
//!
//! The crate is a pure library of in-memory transforms: volume and skeleton
//! I/O, bindings, and command-line drivers are external collaborators.

mod nblast;
mod segmentation;

pub use crate::{
    nblast::{
        KdTree, NblastError, NblastErrorCode, Neighbour, ScoreMatrix, ScoreTable, VectorCloud,
    },
    segmentation::{
        AgglomerationOutcome, DisjointSets, Label, RegionEdge, RegionGraph, RegionGraphError,
        RegionGraphErrorCode,
    },
};
