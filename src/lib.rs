//! Neurite library.
//!
//! Facade crate re-exporting the post-processing core: region-graph
//! agglomeration of over-segmented volumes and NBLAST similarity scoring of
//! neuron point clouds. See `neurite-core` for the implementation.

pub use neurite_core::*;
