use std::time::Duration;

use crate::refinement::FlowAlgorithm;
use crate::refinement::FmAlgorithm;
use crate::refinement::FmGainPolicy;
use crate::refinement::LpAlgorithm;
use crate::Error;
use crate::HypernodeWeight;
use crate::PartitionId;

/// The objective function minimized by the partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Total weight of hyperedges spanning more than one block.
    Cut,
    /// Sum over all hyperedges of `(connectivity - 1) * weight`.
    Km1,
}

impl std::str::FromStr for Objective {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "cut" => Ok(Self::Cut),
            "km1" => Ok(Self::Km1),
            _ => Err(Error::InvalidInput(format!("unknown objective {s:?}"))),
        }
    }
}

/// Coarsening phase parameters.
#[derive(Debug, Clone, Copy)]
pub struct CoarseningContext {
    /// Coarsening stops once the vertex count drops below
    /// `contraction_limit_multiplier * k`.
    pub contraction_limit_multiplier: u32,
    /// Coarsening stops when a round shrinks the vertex count by less than
    /// this factor.
    pub minimum_shrink_factor: f64,
    /// No cluster may grow heavier than
    /// `max_allowed_weight_multiplier * W / k`.
    pub max_allowed_weight_multiplier: f64,
    /// Hyperedges above this size do not contribute to ratings.
    pub rating_size_limit: usize,
}

impl Default for CoarseningContext {
    fn default() -> Self {
        Self {
            contraction_limit_multiplier: 160,
            minimum_shrink_factor: 1.01,
            max_allowed_weight_multiplier: 1.0 / 32.0,
            rating_size_limit: 1000,
        }
    }
}

/// Initial partitioning parameters.
#[derive(Debug, Clone, Copy)]
pub struct InitialContext {
    /// Number of multi-seed BFS attempts; the best feasible one is kept.
    pub num_attempts: usize,
}

impl Default for InitialContext {
    fn default() -> Self {
        Self { num_attempts: 20 }
    }
}

/// Label propagation refinement parameters.
#[derive(Debug, Clone, Copy)]
pub struct LpContext {
    pub algorithm: LpAlgorithm,
    pub max_rounds: usize,
}

impl Default for LpContext {
    fn default() -> Self {
        Self {
            algorithm: LpAlgorithm::Km1,
            max_rounds: 5,
        }
    }
}

/// FM refinement parameters.
#[derive(Debug, Clone, Copy)]
pub struct FmContext {
    pub algorithm: FmAlgorithm,
    pub gain_policy: FmGainPolicy,
    /// Boundary vertices claimed by a search on setup.
    pub num_seeds: usize,
    /// Localized searches spawned per round.
    pub num_searches_per_thread: usize,
    /// A search stops after this many consecutive moves without a new best
    /// prefix.
    pub max_non_improving_moves: usize,
    /// Moves applied before a search yields back to the scheduler.
    pub resume_batch: usize,
    /// Upper bound on finalized searches per round.
    pub finished_tasks_limit_factor: usize,
    pub max_rounds: usize,
}

impl Default for FmContext {
    fn default() -> Self {
        Self {
            algorithm: FmAlgorithm::Multitry,
            gain_policy: FmGainPolicy::Cache,
            num_seeds: 25,
            num_searches_per_thread: 4,
            max_non_improving_moves: 32,
            resume_batch: 64,
            finished_tasks_limit_factor: 4,
            max_rounds: 10,
        }
    }
}

/// Flow refinement parameters.
#[derive(Debug, Clone, Copy)]
pub struct FlowContext {
    pub algorithm: FlowAlgorithm,
    /// Upper bound on vertices extracted into one block-pair subproblem.
    pub max_region_size: usize,
    /// Concurrent tasks allowed on one block under the most-independent
    /// policy.
    pub max_tasks_per_block: usize,
    pub max_rounds: usize,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self {
            algorithm: FlowAlgorithm::DoNothing,
            max_region_size: 5000,
            max_tasks_per_block: 2,
            max_rounds: 3,
        }
    }
}

/// All knobs of a partitioner run.
///
/// `max_part_weight` is derived, not set: `(1 + epsilon) * ceil(W / k)`,
/// computed once the total vertex weight is known.
#[derive(Debug, Clone)]
pub struct Context {
    pub k: PartitionId,
    pub epsilon: f64,
    pub objective: Objective,
    pub seed: u64,
    /// Forces stable sorts, deterministic tie breaks and a fixed random
    /// stream; runs on identical inputs then produce identical partitions.
    pub deterministic: bool,
    /// Cooperative wall-clock limit for the refinement phases.
    pub time_limit: Option<Duration>,
    pub coarsening: CoarseningContext,
    pub initial: InitialContext,
    pub lp: LpContext,
    pub fm: FmContext,
    pub flow: FlowContext,
}

impl Context {
    pub fn new(k: PartitionId, epsilon: f64, objective: Objective) -> Self {
        Self {
            k,
            epsilon,
            objective,
            seed: 0,
            deterministic: false,
            time_limit: None,
            coarsening: CoarseningContext::default(),
            initial: InitialContext::default(),
            lp: LpContext::default(),
            fm: FmContext::default(),
            flow: FlowContext::default(),
        }
    }

    /// Rejects configurations no partitioner run can satisfy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.k < 2 {
            return Err(Error::InvalidInput(format!(
                "number of blocks must be at least 2, got {}",
                self.k
            )));
        }
        if !(self.epsilon >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "imbalance tolerance must be non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }

    /// The block weight bound `(1 + epsilon) * ceil(W / k)`.
    pub fn max_part_weight(&self, total_weight: HypernodeWeight) -> HypernodeWeight {
        let ideal = (total_weight + self.k as HypernodeWeight - 1) / self.k as HypernodeWeight;
        ((1.0 + self.epsilon) * ideal as f64).floor() as HypernodeWeight
    }

    /// The cluster weight cap used during coarsening.
    pub fn max_cluster_weight(&self, total_weight: HypernodeWeight) -> HypernodeWeight {
        let cap = self.coarsening.max_allowed_weight_multiplier * total_weight as f64
            / self.k as f64;
        (cap.ceil() as HypernodeWeight).max(1)
    }
}
