//! A shared-memory parallel multilevel hypergraph partitioning library.
//!
//! Given a hypergraph with vertex and hyperedge weights, a number of blocks
//! `k` and a balance tolerance `epsilon`, [`Multilevel`] computes a
//! partition of the vertices into `k` non-empty blocks that minimizes either
//! the hyperedge cut or the connectivity metric (km1) while keeping every
//! block weight within `(1 + epsilon) * ceil(W / k)`.
//!
//! # Crate layout
//!
//! The multilevel engine is built from three data structures and a set of
//! composable phases:
//!
//! - [`StaticHypergraph`]: immutable CSR-like pin/incidence storage with a
//!   parallel [`contract`][StaticHypergraph::contract] operator,
//! - [`PartitionedHypergraph`]: a concurrent overlay tracking per-edge pin
//!   counts per block, connectivity sets and block weights,
//! - [`coarsening`], [`initial`] and [`refinement`]: the phases the
//!   [`Multilevel`] driver runs through the hierarchy.
//!
//! Refinement algorithms (label propagation, localized multi-try k-way FM,
//! quotient-graph flow scheduling) are selected through [`Context`] and
//! instantiated by enum-keyed factories in [`refinement`].
//!
//! # Example
//!
//! ```rust
//! use hyperpart::{Context, Multilevel, Objective, Partition as _};
//! use hyperpart::hypergraph::HypergraphBuilder;
//!
//! // Two triangles with no hyperedge between them.
//! let hg = HypergraphBuilder::new(6)
//!     .add_edge(1, &[0, 1, 2])
//!     .add_edge(1, &[3, 4, 5])
//!     .build()
//!     .unwrap();
//!
//! let mut context = Context::new(2, 0.0, Objective::Cut);
//! context.seed = 42;
//!
//! let mut partition = vec![-1; 6];
//! let metadata = Multilevel { context }
//!     .partition(&mut partition, &hg)
//!     .unwrap();
//!
//! assert_eq!(metadata.objective, 0);
//! assert_eq!(partition[0], partition[1]);
//! assert_eq!(partition[3], partition[4]);
//! ```

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    rust_2018_idioms
)]

mod bitset;
pub mod coarsening;
mod context;
mod error;
pub mod hypergraph;
pub mod initial;
pub mod metrics;
mod multilevel;
mod prefix_sum;
pub mod refinement;

pub use crate::context::CoarseningContext;
pub use crate::context::Context;
pub use crate::context::FlowContext;
pub use crate::context::FmContext;
pub use crate::context::InitialContext;
pub use crate::context::LpContext;
pub use crate::context::Objective;
pub use crate::error::Error;
pub use crate::hypergraph::PartitionedHypergraph;
pub use crate::hypergraph::StaticHypergraph;
pub use crate::multilevel::Metadata as MultilevelMetadata;
pub use crate::multilevel::Multilevel;

pub use rayon;

use std::mem;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;

/// Identifier of a vertex (hypernode).
pub type HypernodeId = u32;
/// Identifier of a hyperedge (net).
pub type HyperedgeId = u32;
/// Identifier of a block of the partition.
pub type PartitionId = i32;
/// Weight of a vertex.
pub type HypernodeWeight = i64;
/// Weight of a hyperedge.
pub type HyperedgeWeight = i64;

/// Marks the absence of a vertex.
pub const INVALID_HYPERNODE: HypernodeId = u32::MAX;
/// Marks the absence of a hyperedge.
pub const INVALID_HYPEREDGE: HyperedgeId = u32::MAX;
/// Marks an unassigned block.
pub const INVALID_PARTITION: PartitionId = -1;

/// The `Partition` trait allows for partitioning hypergraphs.
///
/// The generic argument `M` defines the input of the algorithm (e.g. a
/// borrowed [`StaticHypergraph`]).
///
/// The input `part_ids` must have one entry per vertex; its contents may or
/// may not be used by the algorithm. Part IDs are contiguous and start from
/// zero.
pub trait Partition<M> {
    /// Diagnostic data returned for a specific run of the algorithm.
    type Metadata;

    /// Error details, should the algorithm fail to run.
    type Error;

    /// Partition the given data and output the part ID of each vertex in
    /// `part_ids`.
    fn partition(&mut self, part_ids: &mut [PartitionId], data: M)
    -> Result<Self::Metadata, Self::Error>;
}

/// Transmute a mutable slice of [`u32`] into an immutable slice of
/// [`AtomicU32`], for parallel scatter phases.
///
/// # Panics
///
/// Panics on platforms where `u32` and `AtomicU32` do not have the same
/// byte representation (size and alignment).
fn as_atomic_u32(p: &mut [u32]) -> &[AtomicU32] {
    assert_eq!(mem::size_of::<u32>(), mem::size_of::<AtomicU32>());
    assert_eq!(mem::align_of::<u32>(), mem::align_of::<AtomicU32>());

    // While we could use [slice::align_to], their doc says:
    //
    // > The method may make the middle slice the greatest length possible
    // > for a given type and input slice, but only your algorithm's
    // > performance should depend on that, not its correctness.
    //
    // So we have to use [mem::transmute] to ensure all the slice is
    // converted.
    unsafe { mem::transmute::<&mut [u32], &[AtomicU32]>(p) }
}

/// Same as [`as_atomic_u32`], for `usize`.
fn as_atomic_usize(p: &mut [usize]) -> &[AtomicUsize] {
    assert_eq!(mem::size_of::<usize>(), mem::size_of::<AtomicUsize>());
    assert_eq!(mem::align_of::<usize>(), mem::align_of::<AtomicUsize>());

    unsafe { mem::transmute::<&mut [usize], &[AtomicUsize]>(p) }
}
