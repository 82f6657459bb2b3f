//! Refinement algorithms: label propagation, localized multi-try k-way FM
//! and quotient-graph flow scheduling, all behind the [`Refiner`] trait.

pub mod flow;
pub mod fm;
mod label_propagation;
mod rebalance;

pub use flow::FlowRefiner;
pub use fm::MultitryFmRefiner;
pub use label_propagation::LabelPropagationRefiner;
pub use rebalance::rebalance;

use std::time::Instant;

use crate::Context;
use crate::Error;
use crate::Objective;
use crate::PartitionId;
use crate::PartitionedHypergraph;
use crate::HypernodeId;

/// Label propagation flavor; `Cut` and `Km1` pick the gain function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpAlgorithm {
    DoNothing,
    Cut,
    Km1,
}

impl std::str::FromStr for LpAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "do_nothing" => Ok(Self::DoNothing),
            "cut" => Ok(Self::Cut),
            "km1" => Ok(Self::Km1),
            _ => Err(Error::InvalidInput(format!(
                "unknown label propagation algorithm {s:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmAlgorithm {
    DoNothing,
    /// Localized multi-try searches grown from few seeds each.
    Multitry,
    /// One search per thread, seeded with the whole boundary, single round.
    Boundary,
}

impl std::str::FromStr for FmAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "do_nothing" => Ok(Self::DoNothing),
            "multitry" => Ok(Self::Multitry),
            "boundary" => Ok(Self::Boundary),
            _ => Err(Error::InvalidInput(format!("unknown FM algorithm {s:?}"))),
        }
    }
}

/// How an FM search obtains move gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmGainPolicy {
    /// Read gains from the pin counts at pop time.
    Recompute,
    /// Maintain global benefit/penalty arrays through the move hook.
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAlgorithm {
    DoNothing,
    /// Most-independent block-pair scheduling.
    Opt,
    /// Maximal-matching block-pair scheduling.
    Match,
}

impl std::str::FromStr for FlowAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "do_nothing" => Ok(Self::DoNothing),
            "opt" => Ok(Self::Opt),
            "match" => Ok(Self::Match),
            _ => Err(Error::InvalidInput(format!("unknown flow algorithm {s:?}"))),
        }
    }
}

/// Diagnostic data for one refiner run on one level.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct Metadata {
    /// By how much the objective has been reduced. Positive values mean an
    /// improved partition.
    pub improvement: i64,
    /// Number of applied (and kept) vertex moves.
    pub move_count: usize,
    pub round_count: usize,
}

impl Metadata {
    pub(crate) fn merge(self, other: Self) -> Self {
        Self {
            improvement: self.improvement + other.improvement,
            move_count: self.move_count + other.move_count,
            round_count: self.round_count + other.round_count,
        }
    }
}

/// A partition improvement pass bound to one level of the hierarchy.
///
/// `initialize` is called once per level before any `refine` call;
/// refiners size their scratch state there. `refine` never fails: inability
/// to improve is a normal terminal state, and an expired deadline means the
/// best state found so far is kept.
pub trait Refiner: Send {
    fn initialize(&mut self, phg: &PartitionedHypergraph<'_>);

    fn refine(&mut self, phg: &PartitionedHypergraph<'_>, deadline: Option<Instant>) -> Metadata;
}

/// A refiner that does nothing, for configurations that switch a phase
/// off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNothingRefiner;

impl Refiner for DoNothingRefiner {
    fn initialize(&mut self, _phg: &PartitionedHypergraph<'_>) {}

    fn refine(
        &mut self,
        _phg: &PartitionedHypergraph<'_>,
        _deadline: Option<Instant>,
    ) -> Metadata {
        Metadata::default()
    }
}

pub fn lp_refiner_from(context: &Context) -> Box<dyn Refiner> {
    match context.lp.algorithm {
        LpAlgorithm::DoNothing => Box::new(DoNothingRefiner),
        LpAlgorithm::Cut => Box::new(LabelPropagationRefiner::new(Objective::Cut, context)),
        LpAlgorithm::Km1 => Box::new(LabelPropagationRefiner::new(Objective::Km1, context)),
    }
}

pub fn fm_refiner_from(context: &Context) -> Box<dyn Refiner> {
    match context.fm.algorithm {
        FmAlgorithm::DoNothing => Box::new(DoNothingRefiner),
        FmAlgorithm::Multitry | FmAlgorithm::Boundary => {
            Box::new(MultitryFmRefiner::new(context))
        }
    }
}

pub fn flow_refiner_from(context: &Context) -> Box<dyn Refiner> {
    match context.flow.algorithm {
        FlowAlgorithm::DoNothing => Box::new(DoNothingRefiner),
        FlowAlgorithm::Opt | FlowAlgorithm::Match => Box::new(FlowRefiner::new(context)),
    }
}

/// The target block maximizing the move gain of `v`, restricted to moves
/// that respect the maximum block weight. Ties go to the lighter block.
pub(crate) fn best_target(
    phg: &PartitionedHypergraph<'_>,
    objective: Objective,
    v: HypernodeId,
) -> Option<(PartitionId, i64)> {
    let from = phg.part_of(v);
    let weight = phg.hypergraph().node_weight(v);
    let mut best: Option<(PartitionId, i64)> = None;
    for to in 0..phg.k() {
        if to == from || phg.part_weight(to) + weight > phg.max_part_weight() {
            continue;
        }
        let gain = match objective {
            Objective::Cut => phg.cut_gain(v, from, to),
            Objective::Km1 => phg.km1_gain(v, from, to),
        };
        let better = match best {
            None => true,
            Some((current, best_gain)) => {
                gain > best_gain
                    || (gain == best_gain && phg.part_weight(to) < phg.part_weight(current))
            }
        };
        if better {
            best = Some((to, gain));
        }
    }
    best
}

pub(crate) fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
