//! # maxhs-core – Implicit Hitting Set MaxSAT Solving
//!
//! This is the core library of the MaxHS solver. It implements weighted partial MaxSAT solving
//! in the implicit hitting set paradigm: a SAT oracle refutes candidate assignments and yields
//! unsatisfiable cores over the blocking variables of the soft clauses, while a hitting set
//! solver computes minimum-weight hitting sets of the accumulated cores. The cost of an optimal
//! hitting set bounds the optimum from below, the cost of any oracle model bounds it from above,
//! and the two meet at the optimum.

use rustsat::solvers::SolverStats;

pub mod algs;
pub mod instance;
pub mod options;
pub mod prepro;
pub mod termination;
pub mod types;

pub use algs::MaxHs;
pub use instance::Problem;
pub use options::{EnumOptions, KernelOptions, Limits, NonOptAlg, ReductionAlg};
pub use termination::{MaybeTerminated, MaybeTerminatedError, Termination};
pub use types::{Bounds, InternalError, SolverStatus};

/// Access to the solver's interruption and statistics functionality
pub trait KernelFunctions {
    /// Gets the solve statistics accumulated so far
    fn stats(&self) -> Stats;
    /// Attaches a logger to the solver
    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L);
    /// Detaches the attached logger, if any
    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>>;
    /// Gets an interrupter that can asynchronously stop the solve
    fn interrupter(&mut self) -> Interrupter;
}

pub use algs::Interrupter;

/// Solving an instance to optimality or to a limit
pub trait Solve: KernelFunctions {
    /// Solves the instance under the given limits
    fn solve(&mut self, limits: Limits) -> MaybeTerminatedError<SolverStatus>;
    /// All solutions found so far, with their true costs
    fn solutions(&self) -> &[(usize, rustsat::types::Assignment)];
}

/// The phases of the solving process, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Disjoint core accumulation before the main loop
    Presolve,
    /// The exact hitting set / oracle alternation
    OuterLoop,
    /// Reducing a discovered core
    Reduction,
    /// Non-optimal hitting set heuristics
    NonOpt,
    /// Enumerating further solutions after the first optimum
    Enumeration,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Presolve => write!(f, "presolve"),
            Phase::OuterLoop => write!(f, "outer-loop"),
            Phase::Reduction => write!(f, "reduction"),
            Phase::NonOpt => write!(f, "non-opt"),
            Phase::Enumeration => write!(f, "enumeration"),
        }
    }
}

/// Statistics of the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// The number of calls to [`Solve::solve`]
    pub n_solve_calls: usize,
    /// The number of SAT oracle calls
    pub n_oracle_calls: usize,
    /// The number of exact hitting set computations
    pub n_hs_calls: usize,
    /// The number of non-optimal hitting set computations
    pub n_nonopt_calls: usize,
    /// The number of cores registered
    pub n_cores: usize,
    /// The number of solutions found
    pub n_sols: usize,
    /// The number of hard clauses in the parsed instance
    pub n_orig_hards: usize,
    /// The number of soft clauses in the parsed instance
    pub n_orig_softs: usize,
    /// The summed length of all cores as returned by the oracle
    pub sum_core_len: usize,
    /// The summed length of all cores after reduction
    pub sum_reduced_len: usize,
    /// The length of the longest core registered
    pub max_core_len: usize,
}

/// Additional statistics of the internal subsolvers
pub trait ExtendedSolveStats {
    /// Gets statistics from the internal SAT oracle
    fn oracle_stats(&self) -> SolverStats;
}

/// A logger to attach to a solver
pub trait WriteSolverLog {
    /// Logs a new candidate assignment with its true cost
    fn log_candidate(&mut self, cost: usize, phase: Phase) -> anyhow::Result<()>;
    /// Logs an oracle call
    fn log_oracle_call(&mut self, result: rustsat::solvers::SolverResult) -> anyhow::Result<()>;
    /// Logs a solution
    fn log_solution(&mut self, cost: usize) -> anyhow::Result<()>;
    /// Logs a registered core with its original and reduced length
    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> anyhow::Result<()>;
    /// Logs a hitting set computation
    fn log_hitting_set(&mut self, cost: usize, optimal: bool) -> anyhow::Result<()>;
    /// Logs an update of the bounds
    fn log_bounds(&mut self, lower: usize, upper: usize) -> anyhow::Result<()>;
    /// Logs the start of a solver routine
    fn log_routine_start(&mut self, routine: &'static str) -> anyhow::Result<()>;
    /// Logs the end of the innermost running solver routine
    fn log_routine_end(&mut self) -> anyhow::Result<()>;
    /// Logs the end of the solving process
    fn log_end_solve(&mut self, status: SolverStatus) -> anyhow::Result<()>;
}
