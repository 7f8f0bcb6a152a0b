//! # Hitting Set Solvers
//!
//! This crate contains a uniform interface to hitting set solvers intended to be used in
//! IHS-style MaxSAT algorithms.

use std::time::Duration;

use rustsat::types::{Cl, Lit};

mod map;
use map::VarMap;

pub mod bnb;
pub use bnb::{Builder as BnbBuilder, Solver as BnbSolver};

#[cfg(feature = "highs")]
mod highs;
#[cfg(feature = "highs")]
pub use highs::{Builder as HighsBuilder, Solver as HighsSolver};

pub const EPSILON: f64 = 0.05;
pub const TRUE: f64 = 1. - EPSILON;
pub const FALSE: f64 = 0. + EPSILON;

/// Result of a solver call that is required to prove optimality or infeasibility
#[derive(Debug, PartialEq)]
pub enum CompleteSolveResult {
    Optimal(f64, Vec<Lit>),
    Infeasible,
}

impl From<IncompleteSolveResult> for CompleteSolveResult {
    fn from(value: IncompleteSolveResult) -> Self {
        match value {
            IncompleteSolveResult::Optimal(cost, hs) => CompleteSolveResult::Optimal(cost, hs),
            IncompleteSolveResult::Infeasible => CompleteSolveResult::Infeasible,
            IncompleteSolveResult::Feasible(_, _) | IncompleteSolveResult::Unknown => {
                panic!("cannot convert incomplete result to complete")
            }
        }
    }
}

/// Result of a solver call that may stop at a feasible but not proven optimal solution
#[derive(Debug, PartialEq)]
pub enum IncompleteSolveResult {
    Optimal(f64, Vec<Lit>),
    Infeasible,
    Feasible(f64, Vec<Lit>),
    Unknown,
}

impl From<CompleteSolveResult> for IncompleteSolveResult {
    fn from(value: CompleteSolveResult) -> Self {
        match value {
            CompleteSolveResult::Optimal(cost, hs) => IncompleteSolveResult::Optimal(cost, hs),
            CompleteSolveResult::Infeasible => IncompleteSolveResult::Infeasible,
        }
    }
}

/// Trait specifying the unified interface to hitting set solvers
///
/// The solver maintains one binary decision variable per objective literal and a growing set of
/// "hit at least one" constraints. Solutions are returned as full polarity vectors over the
/// objective variables: a positive literal means the variable is part of the hitting set.
pub trait HittingSetSolver {
    /// The type that can be used to build a solver of this type
    type Builder: BuildSolver<Solver = Self>;

    /// Adds a new core to the solver
    fn add_core(&mut self, core: &Cl);

    /// Computes an optimal hitting set for the currently given cores
    fn optimal_hitting_set(&mut self) -> CompleteSolveResult;

    /// Computes a hitting set for the currently given cores under a time limit
    fn hitting_set(&mut self, time_limit: Duration) -> IncompleteSolveResult;

    /// Excludes the last returned hitting set, as well as all its supersets and subsets, from
    /// future solutions
    ///
    /// Has no effect if no hitting set has been returned yet.
    fn forbid_last_solution(&mut self);

    /// Solves the continuous relaxation of the current constraint system
    ///
    /// Returns a lower bound on the optimal hitting set cost and a candidate hitting set
    /// containing every variable whose relaxed value exceeds `1 / |largest core|`. Returns
    /// [`None`] if the backend does not support relaxation solving.
    fn lp_relaxation(&mut self) -> Option<(f64, Vec<Lit>)>;

    /// Permanently fixes a decision variable to the polarity of the given literal
    fn force(&mut self, lit: Lit);

    /// The number of cores added so far
    fn n_cores(&self) -> usize;
}

/// Trait for initializing a new solver
pub trait BuildSolver {
    /// The solver type that can be initialized with this builder
    type Solver: HittingSetSolver;

    /// Initializes a new solver builder with default options and the given objective
    fn new<I>(objective: I) -> Self
    where
        I: IntoIterator<Item = (Lit, usize)>;

    /// Initializes a solver from the given builder
    fn init(self) -> Self::Solver;

    /// Sets the number of threads to solve with
    ///
    /// # Default
    ///
    /// The default value shall be `1`
    fn threads(&mut self, threads: u32) -> &mut Self;
}
