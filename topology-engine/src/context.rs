use crate::cancellation::CancellationToken;
use std::time::Duration;

/// Capacity assumed for links whose endpoints declare none, in Mbps
pub const DEFAULT_LINK_CAPACITY_MBPS: f64 = 1000.0;

pub const DEFAULT_SOLVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings threaded through every stage of a compilation run
#[derive(Clone)]
pub struct RunContext {
    pub default_capacity_mbps: f64,
    pub solver_timeout: Duration,
    pub tie_break: TieBreak,
    /// Checked right before and right after the solver is invoked
    pub cancellation: Option<CancellationToken>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            default_capacity_mbps: DEFAULT_LINK_CAPACITY_MBPS,
            solver_timeout: DEFAULT_SOLVER_TIMEOUT,
            tie_break: TieBreak::default(),
            cancellation: None,
        }
    }
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// How the routing engine chooses between equal-cost next hops
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Smallest local interface name first, then smallest neighbour name
    #[default]
    InterfaceFirst,
    /// Smallest neighbour name first, then smallest local interface name
    NeighbourFirst,
}
