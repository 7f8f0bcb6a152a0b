//! # Solver Options

use std::fmt;

/// Configuration options for the solver kernel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelOptions {
    /// The core reduction performed on every discovered core
    pub reduction: ReductionAlg,
    /// Re-refute every core once before handing it to the configured reduction
    pub rerefute_prepass: bool,
    /// The non-optimal hitting set heuristics interleaved with exact computations
    pub nonopt: NonOptOptions,
    /// Accumulate disjoint cores before the main loop starts
    pub disjoint_presolve: bool,
    /// Seed blocking-variable equivalences derived from unit soft clauses
    pub equivalence_seeding: bool,
    /// Tighten the lower bound with the LP relaxation of the hitting set problem
    pub lp_bounding: bool,
    /// Harden blocking variables whose weight can no longer be paid
    pub hardening: bool,
    /// Enumerate optimal (or near-optimal) solutions instead of stopping at the first
    pub enumeration: EnumOptions,
    /// Time limit per exact hitting set computation; when hit, the solver continues with the
    /// best feasible hitting set without updating the lower bound
    pub hs_time_limit: Option<std::time::Duration>,
    /// Seed for all randomized literal orders
    pub seed: u64,
    /// Conflict budget for each oracle call inside core reduction
    #[cfg(feature = "limit-conflicts")]
    pub reduction_conflicts: Option<u32>,
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            reduction: ReductionAlg::default(),
            rerefute_prepass: false,
            nonopt: NonOptOptions::default(),
            disjoint_presolve: true,
            equivalence_seeding: true,
            lp_bounding: false,
            hardening: true,
            enumeration: EnumOptions::default(),
            hs_time_limit: None,
            seed: 9,
            #[cfg(feature = "limit-conflicts")]
            reduction_conflicts: Some(1000),
        }
    }
}

impl KernelOptions {
    pub fn set_enumeration(&mut self, enumeration: EnumOptions) {
        self.enumeration = enumeration;
    }
}

/// Core reduction algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ReductionAlg {
    /// Do not reduce cores
    None,
    /// Re-refute the core under its own assumptions until it stops shrinking
    ReRefute,
    /// Drop literals one at a time, keeping the drop if the rest still conflicts
    #[default]
    Destructive,
    /// Grow a minimal core by confirming one critical literal per insertion round
    Constructive,
    /// Grow a minimal core by binary-searching one critical literal per round
    Binary,
    /// Extract a minimal core via an at-most-one counter over the members
    Cardinality,
}

impl fmt::Display for ReductionAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionAlg::None => write!(f, "none"),
            ReductionAlg::ReRefute => write!(f, "re-refute"),
            ReductionAlg::Destructive => write!(f, "destructive"),
            ReductionAlg::Constructive => write!(f, "constructive"),
            ReductionAlg::Binary => write!(f, "binary"),
            ReductionAlg::Cardinality => write!(f, "cardinality"),
        }
    }
}

/// Non-optimal hitting set heuristics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum NonOptAlg {
    /// Hit every stored core in its most frequent literal
    Common,
    /// Greedy weighted set cover over the unhit cores
    Greedy,
    /// Extend the hitting set with entire freshly found disjoint cores
    Disjoint,
    /// Hit every stored core in a fraction of its least frequent literals
    Fractional,
}

impl fmt::Display for NonOptAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonOptAlg::Common => write!(f, "common"),
            NonOptAlg::Greedy => write!(f, "greedy"),
            NonOptAlg::Disjoint => write!(f, "disjoint"),
            NonOptAlg::Fractional => write!(f, "fractional"),
        }
    }
}

/// Options for the non-optimal hitting set stage
///
/// The primary heuristic runs until it stops yielding new cores, then the secondary heuristic is
/// tried once before falling back to an exact hitting set computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NonOptOptions {
    pub primary: Option<NonOptAlg>,
    pub secondary: Option<NonOptAlg>,
    /// Maximum number of consecutive non-optimal iterations before an exact computation is forced
    pub iter_limit: Option<usize>,
    /// The fraction of a core the fractional heuristic hits
    pub frac_size: f64,
}

impl Default for NonOptOptions {
    fn default() -> Self {
        NonOptOptions {
            primary: Some(NonOptAlg::Disjoint),
            secondary: Some(NonOptAlg::Greedy),
            iter_limit: None,
            frac_size: 0.1,
        }
    }
}

/// Possible solution enumeration variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EnumOptions {
    #[default]
    /// Stop after the first optimal solution
    NoEnum,
    /// Enumerate distinct solutions within `tolerance` of the optimal cost
    Solutions {
        /// Maximum number of solutions to enumerate, or no limit
        limit: Option<usize>,
        /// Absolute cost tolerance over the optimum
        tolerance: usize,
    },
}

/// Limits on a solve call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Limits {
    /// The maximum number of SAT oracle calls
    pub oracle_calls: Option<usize>,
    /// The maximum number of exact hitting set computations
    pub hs_calls: Option<usize>,
    /// The maximum number of solutions to discover
    pub sols: Option<usize>,
}

impl Limits {
    /// No limits set
    pub fn none() -> Limits {
        Limits {
            oracle_calls: None,
            hs_calls: None,
            sols: None,
        }
    }
}
