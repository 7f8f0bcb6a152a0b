//! Core solver functionality shared between the solving phases

use std::{
    marker::PhantomData,
    ops::Not,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

#[cfg(feature = "interrupt-oracle")]
use std::sync::Mutex;

use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use rustsat::{
    instances::ManageVars,
    solvers::{DefaultInitializer, Initialize, SolveIncremental, SolverResult},
    types::{Assignment, Clause, Lit},
};

use crate::{
    instance::Problem,
    options::{KernelOptions, Limits},
    termination::Termination,
    types::{Bounds, InternalError},
    Phase, Stats, WriteSolverLog,
};

mod maxhs;
mod nonopt;
mod reduce;

pub use maxhs::MaxHs;

/// Handle for asynchronously interrupting a running solve
pub struct Interrupter {
    /// Termination flag of the solver
    term_flag: Arc<AtomicBool>,
    /// The terminator of the underlying SAT oracle
    #[cfg(feature = "interrupt-oracle")]
    oracle_interrupter: Arc<Mutex<Box<dyn rustsat::solvers::InterruptSolver + Send>>>,
}

#[cfg(feature = "interrupt-oracle")]
impl Interrupter {
    /// Interrupts the solver asynchronously
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
        self.oracle_interrupter.lock().unwrap().interrupt();
    }
}

#[cfg(not(feature = "interrupt-oracle"))]
impl Interrupter {
    /// Interrupts the solver asynchronously
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
    }
}

/// Kernel struct shared between the solving phases
///
/// # Generics
///
/// - `O`: the SAT solver oracle
/// - `OInit`: the oracle initializer
/// - `BCG`: the blocking clause generator
pub(crate) struct SolverKernel<O, OInit = DefaultInitializer, BCG = fn(Assignment) -> Clause> {
    /// The SAT solver backend
    oracle: O,
    /// The problem state: clauses, blocking variables and registered cores
    problem: Problem,
    /// The bounds on the optimal cost
    bounds: Bounds,
    /// The best model found so far, justifying the upper bound
    best_sol: Option<Assignment>,
    /// Generator of blocking clauses
    block_clause_gen: BCG,
    /// Configuration options
    opts: KernelOptions,
    /// Running statistics
    stats: Stats,
    /// Limits for the current solving run
    lims: Limits,
    /// Source of all randomized literal orders
    rng: StdRng,
    /// Logger to log with
    logger: Option<Box<dyn WriteSolverLog>>,
    /// Termination flag
    term_flag: Arc<AtomicBool>,
    /// The oracle interrupter
    #[cfg(feature = "interrupt-oracle")]
    oracle_interrupter: Arc<Mutex<Box<dyn rustsat::solvers::InterruptSolver + Send>>>,
    /// Phantom marker for oracle factory
    _factory: PhantomData<OInit>,
}

impl<O, OInit, BCG> SolverKernel<O, OInit, BCG>
where
    O: SolveIncremental,
    OInit: Initialize<O>,
    BCG: Fn(Assignment) -> Clause,
{
    #[cfg(feature = "interrupt-oracle")]
    pub fn new(problem: Problem, bcg: BCG, opts: KernelOptions) -> anyhow::Result<Self>
    where
        O: rustsat::solvers::Interrupt,
    {
        let (mut oracle, bounds, stats) = Self::init_oracle(&problem)?;
        let interrupter = oracle.interrupter();
        Ok(Self {
            oracle,
            problem,
            bounds,
            best_sol: None,
            block_clause_gen: bcg,
            stats,
            lims: Limits::none(),
            rng: StdRng::seed_from_u64(opts.seed),
            opts,
            logger: None,
            term_flag: Arc::new(AtomicBool::new(false)),
            oracle_interrupter: Arc::new(Mutex::new(Box::new(interrupter))),
            _factory: PhantomData,
        })
    }

    #[cfg(not(feature = "interrupt-oracle"))]
    pub fn new(problem: Problem, bcg: BCG, opts: KernelOptions) -> anyhow::Result<Self> {
        let (oracle, bounds, stats) = Self::init_oracle(&problem)?;
        Ok(Self {
            oracle,
            problem,
            bounds,
            best_sol: None,
            block_clause_gen: bcg,
            stats,
            lims: Limits::none(),
            rng: StdRng::seed_from_u64(opts.seed),
            opts,
            logger: None,
            term_flag: Arc::new(AtomicBool::new(false)),
            _factory: PhantomData,
        })
    }

    /// Initializes the oracle with the hard clauses and the relaxed soft clauses
    fn init_oracle(problem: &Problem) -> anyhow::Result<(O, Bounds, Stats)> {
        let stats = Stats {
            n_orig_hards: problem.n_hards(),
            n_orig_softs: problem.n_softs(),
            ..Default::default()
        };
        let mut oracle = OInit::init();
        if let Some(max_var) = problem.var_manager.max_var() {
            oracle.reserve(max_var)?;
        }
        for cl in problem.oracle_clauses() {
            oracle.add_clause(cl)?;
        }
        let bounds = Bounds::new(problem.total_weight());
        Ok((oracle, bounds, stats))
    }
}

impl<O, OInit, BCG> SolverKernel<O, OInit, BCG> {
    fn start_solving(&mut self, limits: Limits) {
        self.stats.n_solve_calls += 1;
        self.lims = limits;
    }

    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.logger = Some(Box::new(logger));
    }

    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.logger.take()
    }

    /// Checks the termination flag and errors a [`Termination`] if it is set
    fn check_termination(&self) -> anyhow::Result<()> {
        if self.term_flag.load(Ordering::Relaxed) {
            anyhow::bail!(Termination::Interrupted)
        }
        Ok(())
    }

    /// Logs a candidate assignment with its true cost
    fn log_candidate(&mut self, cost: usize, phase: Phase) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_candidate(cost, phase).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs an oracle call. Errors a termination if the oracle call limit is reached.
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        self.stats.n_oracle_calls += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_oracle_call(result).context("logger failed")?;
        }
        if let Some(oracle_calls) = &mut self.lims.oracle_calls {
            *oracle_calls -= 1;
            if *oracle_calls == 0 {
                anyhow::bail!(Termination::OracleCallsLimit);
            }
        }
        Ok(())
    }

    /// Logs a solution. Errors a termination if the solution limit is reached.
    fn log_solution(&mut self, cost: usize) -> anyhow::Result<()> {
        self.stats.n_sols += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_solution(cost).context("logger failed")?;
        }
        if let Some(sols) = &mut self.lims.sols {
            *sols -= 1;
            if *sols == 0 {
                anyhow::bail!(Termination::SolsLimit);
            }
        }
        Ok(())
    }

    /// Logs an exact hitting set computation. Errors a termination if the limit is reached.
    fn log_exact_hitting_set(&mut self, cost: usize) -> anyhow::Result<()> {
        self.stats.n_hs_calls += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_hitting_set(cost, true).context("logger failed")?;
        }
        if let Some(hs_calls) = &mut self.lims.hs_calls {
            *hs_calls -= 1;
            if *hs_calls == 0 {
                anyhow::bail!(Termination::HsCallsLimit);
            }
        }
        Ok(())
    }

    /// Logs a non-optimal hitting set computation
    fn log_nonopt_hitting_set(&mut self, cost: usize) -> anyhow::Result<()> {
        self.stats.n_nonopt_calls += 1;
        if let Some(logger) = &mut self.logger {
            logger
                .log_hitting_set(cost, false)
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a registered core and updates the core statistics
    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> anyhow::Result<()> {
        self.stats.n_cores += 1;
        self.stats.sum_core_len += len;
        self.stats.sum_reduced_len += red_len;
        self.stats.max_core_len = std::cmp::max(self.stats.max_core_len, red_len);
        if let Some(logger) = &mut self.logger {
            logger
                .log_core(weight, len, red_len)
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs the current bounds
    fn log_bounds(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger
                .log_bounds(self.bounds.lower(), self.bounds.upper())
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine start
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_start(desc).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine end
    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_end().context("logger failed")?;
        }
        Ok(())
    }

    /// Logs the end of the solving process
    fn log_end_solve(&mut self, status: crate::types::SolverStatus) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_end_solve(status).context("logger failed")?;
        }
        Ok(())
    }
}

#[cfg(feature = "interrupt-oracle")]
impl<O, OInit, BCG> SolverKernel<O, OInit, BCG>
where
    O: rustsat::solvers::Interrupt,
{
    fn interrupter(&mut self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
            oracle_interrupter: self.oracle_interrupter.clone(),
        }
    }
}

#[cfg(not(feature = "interrupt-oracle"))]
impl<O, OInit, BCG> SolverKernel<O, OInit, BCG> {
    fn interrupter(&mut self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
        }
    }
}

impl<O, OInit, BCG> SolverKernel<O, OInit, BCG>
where
    O: SolveIncremental,
{
    /// Wrapper around the oracle with call logging and interrupt detection.
    /// Assumes that the oracle is unlimited.
    fn solve_assumps(&mut self, assumps: &[Lit]) -> anyhow::Result<SolverResult> {
        self.log_routine_start("oracle call")?;
        let res = self.oracle.solve_assumps(assumps)?;
        self.log_routine_end()?;
        self.check_termination()?;
        self.log_oracle_call(res)?;
        Ok(res)
    }

    /// Extracts the core of the last failed oracle call in terms of positive blocking-variable
    /// literals
    ///
    /// The oracle reports the failed assumptions negated, so the relevant literals are exactly
    /// the positive ones; auxiliary assumption literals of reduction gadgets are filtered out. An
    /// empty filtered core means the hard clauses alone are conflicting under no assumptions,
    /// which the callers must have excluded beforehand.
    fn extract_core(&mut self) -> anyhow::Result<Vec<Lit>> {
        let raw = self.oracle.core()?;
        let mut core: Vec<Lit> = raw
            .into_iter()
            .filter(|l| l.is_pos() && self.problem.weights().contains_key(l))
            .collect();
        if core.is_empty() {
            anyhow::bail!(InternalError::EmptyCore);
        }
        core.sort_unstable();
        core.dedup();
        Ok(core)
    }

    /// Reads the current oracle model, computes its true cost and updates the incumbent if the
    /// model improves the upper bound. Returns whether it did.
    fn update_incumbent(&mut self, phase: Phase) -> anyhow::Result<bool> {
        let sol = self.get_solution()?;
        let cost = self.problem.solution_cost(&sol);
        self.log_candidate(cost, phase)?;
        if self.bounds.improve_upper(cost)? {
            self.best_sol = Some(sol);
            self.log_bounds()?;
            return Ok(true);
        }
        // a model matching the initial upper bound does not improve it but still justifies it
        if self.best_sol.is_none() && cost <= self.bounds.upper() {
            self.best_sol = Some(sol);
        }
        Ok(false)
    }

    /// Gets the current oracle model over all managed variables
    fn get_solution(&mut self) -> anyhow::Result<Assignment> {
        let max_var = self
            .problem
            .var_manager
            .max_var()
            .context("no variables in the oracle")?;
        Ok(self.oracle.solution(max_var)?)
    }
}

/// The default blocking clause generator
pub fn default_blocking_clause(sol: Assignment) -> Clause {
    Clause::from_iter(sol.into_iter().map(Lit::not))
}
