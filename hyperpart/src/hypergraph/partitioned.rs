use rayon::prelude::*;

use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use super::connectivity::ConnectivitySetIter;
use super::connectivity::ConnectivitySets;
use super::StaticHypergraph;
use crate::Error;
use crate::HyperedgeId;
use crate::HyperedgeWeight;
use crate::HypernodeId;
use crate::HypernodeWeight;
use crate::PartitionId;
use crate::INVALID_PARTITION;

/// Per-edge payload handed to the hook of
/// [`PartitionedHypergraph::change_part`], once per hyperedge incident to
/// the moved vertex. Pin counts are the values *after* the move.
#[derive(Debug, Clone, Copy)]
pub struct SyncUpdate {
    pub he: HyperedgeId,
    pub edge_weight: HyperedgeWeight,
    pub edge_size: u32,
    pub pin_count_in_from_after: u32,
    pub pin_count_in_to_after: u32,
    pub from: PartitionId,
    pub to: PartitionId,
}

/// A k-way partition overlaid on a borrowed [`StaticHypergraph`].
///
/// Tracks, for every hyperedge and block, how many of the edge's pins lie
/// in the block, the set of blocks the edge touches, and every block's
/// weight. After [`initialize_partition`][Self::initialize_partition] the
/// only mutator is [`change_part`][Self::change_part], which maintains all
/// three incrementally and concurrently.
#[derive(Debug)]
pub struct PartitionedHypergraph<'a> {
    hg: &'a StaticHypergraph,
    k: PartitionId,
    max_part_weight: HypernodeWeight,
    part: Vec<AtomicI32>,
    part_weights: Vec<AtomicI64>,
    pin_counts: Vec<AtomicU32>,
    connectivity_sets: ConnectivitySets,
    initialized: bool,
}

impl<'a> PartitionedHypergraph<'a> {
    pub fn new(hg: &'a StaticHypergraph, k: PartitionId, max_part_weight: HypernodeWeight) -> Self {
        assert!(k >= 2);
        let part = (0..hg.num_nodes())
            .map(|_| AtomicI32::new(INVALID_PARTITION))
            .collect();
        let part_weights = (0..k).map(|_| AtomicI64::new(0)).collect();
        let pin_counts = (0..hg.num_edges() * k as usize)
            .map(|_| AtomicU32::new(0))
            .collect();
        Self {
            hg,
            k,
            max_part_weight,
            part,
            part_weights,
            pin_counts,
            connectivity_sets: ConnectivitySets::new(hg.num_edges(), k),
            initialized: false,
        }
    }

    #[inline]
    pub fn hypergraph(&self) -> &'a StaticHypergraph {
        self.hg
    }

    #[inline]
    pub fn k(&self) -> PartitionId {
        self.k
    }

    #[inline]
    pub fn max_part_weight(&self) -> HypernodeWeight {
        self.max_part_weight
    }

    #[inline]
    pub fn part_of(&self, v: HypernodeId) -> PartitionId {
        self.part[v as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn part_weight(&self, block: PartitionId) -> HypernodeWeight {
        self.part_weights[block as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pin_count(&self, e: HyperedgeId, block: PartitionId) -> u32 {
        self.pin_counts[e as usize * self.k as usize + block as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn connectivity(&self, e: HyperedgeId) -> u32 {
        self.connectivity_sets.connectivity(e)
    }

    #[inline]
    pub fn connectivity_set(&self, e: HyperedgeId) -> ConnectivitySetIter<'_> {
        self.connectivity_sets.iter(e)
    }

    /// Whether `v` has an incident edge spanning more than one block.
    pub fn is_boundary(&self, v: HypernodeId) -> bool {
        self.hg
            .incident_edges(v)
            .iter()
            .any(|&he| self.connectivity(he) > 1)
    }

    /// Assign `v` to `block` before the partition is initialized. The bulk
    /// counters are not touched; call
    /// [`initialize_partition`][Self::initialize_partition] afterwards.
    pub fn set_only_part(&self, v: HypernodeId, block: PartitionId) {
        debug_assert!(!self.initialized);
        debug_assert!(block >= 0 && block < self.k);
        self.part[v as usize].store(block, Ordering::Relaxed);
    }

    /// Recompute pin counts, connectivity sets and block weights from the
    /// current assignment; afterwards incremental maintenance is active.
    pub fn initialize_partition(&mut self) {
        let k = self.k as usize;
        self.connectivity_sets.clear();
        for pc in &self.pin_counts {
            pc.store(0, Ordering::Relaxed);
        }

        (0..self.hg.num_edges() as HyperedgeId)
            .into_par_iter()
            .for_each(|he| {
                for &pin in self.hg.pins(he) {
                    let block = self.part_of(pin);
                    debug_assert_ne!(block, INVALID_PARTITION, "vertex {pin} is unassigned");
                    let slot = he as usize * k + block as usize;
                    if self.pin_counts[slot].fetch_add(1, Ordering::Relaxed) == 0 {
                        self.connectivity_sets.add(he, block);
                    }
                }
            });

        let weights = self
            .part
            .par_iter()
            .enumerate()
            .fold(
                || vec![0 as HypernodeWeight; k],
                |mut acc, (v, block)| {
                    acc[block.load(Ordering::Relaxed) as usize] +=
                        self.hg.node_weight(v as HypernodeId);
                    acc
                },
            )
            .reduce(
                || vec![0; k],
                |mut lhs, rhs| {
                    for (l, r) in lhs.iter_mut().zip(rhs) {
                        *l += r;
                    }
                    lhs
                },
            );
        for (slot, weight) in self.part_weights.iter().zip(weights) {
            slot.store(weight, Ordering::Relaxed);
        }
        self.initialized = true;
    }

    /// Move `v` from `from` to `to` if the target block stays within the
    /// maximum block weight. On success the pin counts, connectivity sets
    /// and block weights of every incident edge are updated and `sync` is
    /// invoked once per edge with the counts after the move.
    pub fn change_part<F>(
        &self,
        v: HypernodeId,
        from: PartitionId,
        to: PartitionId,
        sync: F,
    ) -> bool
    where
        F: FnMut(SyncUpdate),
    {
        debug_assert!(self.initialized);
        debug_assert_ne!(from, to);
        let weight = self.hg.node_weight(v);

        let mut current = self.part_weights[to as usize].load(Ordering::Relaxed);
        loop {
            if current + weight > self.max_part_weight {
                return false;
            }
            match self.part_weights[to as usize].compare_exchange_weak(
                current,
                current + weight,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.part_weights[from as usize].fetch_sub(weight, Ordering::Relaxed);
        self.apply_move(v, from, to, sync);
        true
    }

    /// Move `v` without the block-weight check. Used by rollback, whose
    /// inverse moves restore an earlier (feasible) state, and by refiners
    /// that arbitrate weights externally.
    pub fn change_part_unchecked<F>(
        &self,
        v: HypernodeId,
        from: PartitionId,
        to: PartitionId,
        sync: F,
    ) where
        F: FnMut(SyncUpdate),
    {
        debug_assert!(self.initialized);
        debug_assert_ne!(from, to);
        let weight = self.hg.node_weight(v);
        self.part_weights[to as usize].fetch_add(weight, Ordering::Relaxed);
        self.part_weights[from as usize].fetch_sub(weight, Ordering::Relaxed);
        self.apply_move(v, from, to, sync);
    }

    fn apply_move<F>(&self, v: HypernodeId, from: PartitionId, to: PartitionId, mut sync: F)
    where
        F: FnMut(SyncUpdate),
    {
        let k = self.k as usize;
        self.part[v as usize].store(to, Ordering::Relaxed);
        for &he in self.hg.incident_edges(v) {
            // The fetch return value makes exactly one thread observe each
            // 1 -> 0 and 0 -> 1 transition; that thread owns the
            // connectivity-set flip for (he, block).
            let slot_from = he as usize * k + from as usize;
            let before_from = self.pin_counts[slot_from].fetch_sub(1, Ordering::Relaxed);
            debug_assert!(before_from > 0);
            if before_from == 1 {
                self.connectivity_sets.remove(he, from);
            }
            let slot_to = he as usize * k + to as usize;
            let before_to = self.pin_counts[slot_to].fetch_add(1, Ordering::Relaxed);
            if before_to == 0 {
                self.connectivity_sets.add(he, to);
            }
            sync(SyncUpdate {
                he,
                edge_weight: self.hg.edge_weight(he),
                edge_size: self.hg.edge_size(he),
                pin_count_in_from_after: before_from - 1,
                pin_count_in_to_after: before_to + 1,
                from,
                to,
            });
        }
    }

    /// Reduction of the connectivity metric if `v` moved from `from` to
    /// `to`: an incident edge whose only `from`-pin is `v` loses a block,
    /// one with no pin in `to` yet gains one.
    pub fn km1_gain(&self, v: HypernodeId, from: PartitionId, to: PartitionId) -> i64 {
        let mut gain = 0;
        for &he in self.hg.incident_edges(v) {
            let weight = self.hg.edge_weight(he);
            if self.pin_count(he, from) == 1 {
                gain += weight;
            }
            if self.pin_count(he, to) == 0 {
                gain -= weight;
            }
        }
        gain
    }

    /// Reduction of the cut metric if `v` moved from `from` to `to`.
    pub fn cut_gain(&self, v: HypernodeId, from: PartitionId, to: PartitionId) -> i64 {
        let mut gain = 0;
        for &he in self.hg.incident_edges(v) {
            let size = self.hg.edge_size(he);
            if size < 2 {
                continue;
            }
            let weight = self.hg.edge_weight(he);
            if self.pin_count(he, from) == size {
                // Until now uncut; v leaving makes it span two blocks.
                gain -= weight;
            } else if self.pin_count(he, from) == 1 && self.pin_count(he, to) == size - 1 {
                gain += weight;
            }
        }
        gain
    }

    /// Copy the assignment out.
    pub fn extract_partition(&self, out: &mut [PartitionId]) {
        assert_eq!(out.len(), self.hg.num_nodes());
        out.par_iter_mut()
            .zip(&self.part)
            .for_each(|(slot, block)| *slot = block.load(Ordering::Relaxed));
    }

    /// Full consistency check of the incremental bookkeeping; quadratic-ish
    /// and meant for tests and debug assertions between rounds.
    pub fn check_integrity(&self) -> Result<(), Error> {
        for he in 0..self.hg.num_edges() as HyperedgeId {
            let total: u32 = (0..self.k).map(|b| self.pin_count(he, b)).sum();
            if total != self.hg.edge_size(he) {
                return Err(Error::InvariantViolated(format!(
                    "edge {he}: pin counts sum to {total}, size is {}",
                    self.hg.edge_size(he)
                )));
            }
            let from_bits = self.connectivity_set(he).count() as u32;
            let from_counts = (0..self.k).filter(|&b| self.pin_count(he, b) > 0).count() as u32;
            if from_bits != from_counts || from_bits != self.connectivity(he) {
                return Err(Error::InvariantViolated(format!(
                    "edge {he}: connectivity set does not match pin counts"
                )));
            }
        }
        for block in 0..self.k {
            let weight: HypernodeWeight = (0..self.hg.num_nodes() as HypernodeId)
                .filter(|&v| self.part_of(v) == block)
                .map(|v| self.hg.node_weight(v))
                .sum();
            if weight != self.part_weight(block) {
                return Err(Error::InvariantViolated(format!(
                    "block {block}: tracked weight {} differs from recomputed {weight}",
                    self.part_weight(block)
                )));
            }
            if self.part_weight(block) < 0 {
                return Err(Error::InvariantViolated(format!(
                    "block {block} has negative weight"
                )));
            }
        }
        Ok(())
    }
}
