use std::fmt;

use crate::HypernodeWeight;
use crate::PartitionId;

/// Common errors thrown by the partitioner.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input: pin id out of range, empty hyperedge, `k < 2`,
    /// `epsilon < 0`, or mismatched array lengths.
    InvalidInput(String),

    /// No initial partition respecting the maximum block weight could be
    /// found on the coarsest level.
    BalanceInfeasible {
        block: PartitionId,
        weight: HypernodeWeight,
        max_part_weight: HypernodeWeight,
    },

    /// An internal consistency check failed. Non-recoverable, indicates a
    /// bug.
    InvariantViolated(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::BalanceInfeasible {
                block,
                weight,
                max_part_weight,
            } => write!(
                f,
                "no feasible initial partition: block {block} has weight {weight} > {max_part_weight}",
            ),
            Self::InvariantViolated(msg) => write!(f, "internal invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
