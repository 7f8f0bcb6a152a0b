//! # The MaxHS Solving Loop
//!
//! Alternates a SAT oracle and a hitting set solver. The oracle refutes candidate relaxation
//! sets and yields cores over the blocking variables, the hitting set solver computes
//! minimum-weight hitting sets of the accumulated cores. The cost of an optimal hitting set
//! bounds the optimum from below; when the oracle finds a model under an optimal hitting set,
//! that model is optimal since its true cost cannot exceed the hitting set's.

use anyhow::Context;
use hitting_sets::{BuildSolver, CompleteSolveResult, HittingSetSolver, IncompleteSolveResult};
use rustsat::{
    clause,
    solvers::{
        DefaultInitializer, Initialize, Interrupt, LimitConflicts, SolveIncremental, SolveStats,
        SolverResult, SolverStats,
    },
    types::{Assignment, Clause, Lit, RsHashMap, RsHashSet, Var},
};

use crate::{
    instance::Problem,
    options::{EnumOptions, KernelOptions, Limits, NonOptAlg},
    termination::{MaybeTerminatedError, Termination},
    types::{Bounds, InternalError, SolverStatus},
    ExtendedSolveStats, KernelFunctions, Phase, Solve, Stats, WriteSolverLog,
};

use super::{default_blocking_clause, nonopt, Interrupter, SolverKernel};

/// The implicit hitting set MaxSAT solver
///
/// # Generics
///
/// - `O`: the SAT solver oracle
/// - `Hs`: the hitting set solver backend
/// - `OInit`: the oracle initializer
/// - `BCG`: the blocking clause generator
pub struct MaxHs<O, Hs, OInit = DefaultInitializer, BCG = fn(Assignment) -> Clause> {
    /// The shared solver kernel
    kernel: SolverKernel<O, OInit, BCG>,
    /// The hitting set solver over the blocking variables
    hs_solver: Hs,
    /// The solutions found so far with their costs
    sols: Vec<(usize, Assignment)>,
    /// Variables occurring in seeded hitting set constraints
    seeded: RsHashSet<Var>,
    /// Whether the presolve phases have run
    presolved: bool,
    /// Whether the solver is past the first optimum of an enumeration run
    enum_rounds: bool,
    /// The status reached by the last solve call
    status: SolverStatus,
}

impl<O, Hs, OInit> MaxHs<O, Hs, OInit>
where
    O: SolveIncremental + Interrupt,
    Hs: HittingSetSolver,
    OInit: Initialize<O>,
{
    /// Initializes the solver for a problem, with the default blocking clause generator
    pub fn new(problem: Problem, opts: KernelOptions) -> anyhow::Result<Self> {
        let builder =
            <Hs::Builder as BuildSolver>::new(problem.weights().iter().map(|(&l, &w)| (l, w)));
        let hs_solver = builder.init();
        let kernel = SolverKernel::new(
            problem,
            default_blocking_clause as fn(Assignment) -> Clause,
            opts,
        )?;
        Ok(Self {
            kernel,
            hs_solver,
            sols: Vec::new(),
            seeded: RsHashSet::default(),
            presolved: false,
            enum_rounds: false,
            status: SolverStatus::Unknown,
        })
    }
}

impl<O, Hs, OInit, BCG> KernelFunctions for MaxHs<O, Hs, OInit, BCG>
where
    O: Interrupt,
{
    fn stats(&self) -> Stats {
        self.kernel.stats
    }

    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.kernel.attach_logger(logger)
    }

    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.kernel.detach_logger()
    }

    fn interrupter(&mut self) -> Interrupter {
        self.kernel.interrupter()
    }
}

impl<O, Hs, OInit, BCG> Solve for MaxHs<O, Hs, OInit, BCG>
where
    O: SolveIncremental + LimitConflicts + Interrupt + SolveStats,
    Hs: HittingSetSolver,
    OInit: Initialize<O>,
    BCG: Fn(Assignment) -> Clause,
{
    fn solve(&mut self, limits: Limits) -> MaybeTerminatedError<SolverStatus> {
        MaybeTerminatedError::capture(self.solve_inner(limits))
    }

    fn solutions(&self) -> &[(usize, Assignment)] {
        &self.sols
    }
}

impl<O, Hs, OInit, BCG> ExtendedSolveStats for MaxHs<O, Hs, OInit, BCG>
where
    O: SolveStats,
{
    fn oracle_stats(&self) -> SolverStats {
        self.kernel.oracle.stats()
    }
}

impl<O, Hs, OInit, BCG> MaxHs<O, Hs, OInit, BCG> {
    /// The current bounds on the optimal cost
    pub fn bounds(&self) -> Bounds {
        self.kernel.bounds
    }

    /// The status reached by the last solve call
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// The best model found so far with its cost, restricted to the original variables
    ///
    /// Present whenever some oracle call was satisfiable, in particular after an interrupted
    /// solve that got past the hard clause check. The cost matches the current upper bound.
    pub fn best_solution(&self) -> Option<(usize, Assignment)> {
        let sol = self.kernel.best_sol.clone()?;
        Some((
            self.kernel.bounds.upper(),
            sol.truncate(self.kernel.problem.var_manager.max_orig_var()),
        ))
    }
}

impl<O, Hs, OInit, BCG> MaxHs<O, Hs, OInit, BCG>
where
    O: SolveIncremental + LimitConflicts + SolveStats,
    Hs: HittingSetSolver,
    OInit: Initialize<O>,
    BCG: Fn(Assignment) -> Clause,
{
    /// Registers an externally known core over blocking variables
    ///
    /// The core must be non-empty and only contain known blocking variables. Injected cores
    /// constrain the hitting set problem exactly like oracle-discovered ones.
    pub fn add_core(&mut self, core: Vec<Lit>) -> anyhow::Result<()> {
        anyhow::ensure!(!core.is_empty(), InternalError::EmptyCore);
        for l in &core {
            anyhow::ensure!(
                self.kernel.problem.weights().contains_key(l),
                "unknown blocking variable {l}"
            );
        }
        let len = core.len();
        self.register_core(core, len)
    }

    fn solve_inner(&mut self, limits: Limits) -> anyhow::Result<SolverStatus> {
        self.kernel.start_solving(limits);
        if !self.presolved {
            if !self.pre_check()? {
                self.status = SolverStatus::Unsat;
                self.kernel.log_end_solve(SolverStatus::Unsat)?;
                return Ok(SolverStatus::Unsat);
            }
            if self.kernel.opts.disjoint_presolve {
                self.disjoint_presolve()?;
            }
            if self.kernel.opts.equivalence_seeding {
                self.seed_equivalences()?;
            }
            self.presolved = true;
        }
        let mut first_cost: Option<usize> = None;
        loop {
            if !self.run_ihs_loop()? {
                // the hitting set problem has become infeasible; during enumeration this means
                // all solutions are found, otherwise it is a defect
                if self.sols.is_empty() {
                    anyhow::bail!(InternalError::InfeasibleHittingSet);
                }
                break;
            }
            let cost = self.kernel.bounds.upper();
            let sol = self
                .kernel
                .best_sol
                .clone()
                .context("no model justifying the upper bound")?;
            // only the original variables are part of the reported model
            let sol = sol.truncate(self.kernel.problem.var_manager.max_orig_var());
            match self.kernel.opts.enumeration {
                EnumOptions::NoEnum => {
                    self.sols.push((cost, sol));
                    self.kernel.log_solution(cost)?;
                    break;
                }
                EnumOptions::Solutions { limit, tolerance } => {
                    match first_cost {
                        None => first_cost = Some(cost),
                        Some(first) if cost > first + tolerance => break,
                        Some(_) => (),
                    }
                    self.sols.push((cost, sol.clone()));
                    self.kernel.log_solution(cost)?;
                    if let Some(limit) = limit {
                        if self.sols.len() >= limit {
                            break;
                        }
                    }
                    // exclude this hitting set and this model, then go again
                    self.hs_solver.forbid_last_solution();
                    let block = (self.kernel.block_clause_gen)(sol);
                    self.kernel.oracle.add_clause(block)?;
                    self.kernel
                        .bounds
                        .reset_upper(self.kernel.problem.total_weight());
                    self.kernel.best_sol = None;
                    self.enum_rounds = true;
                }
            }
        }
        self.status = SolverStatus::Optimal;
        self.kernel.log_end_solve(SolverStatus::Optimal)?;
        Ok(SolverStatus::Optimal)
    }

    /// Checks that the hard clauses on their own are satisfiable
    ///
    /// Every blocking variable is left free, so any model gives a first upper bound.
    fn pre_check(&mut self) -> anyhow::Result<bool> {
        self.kernel.log_routine_start("hard clause check")?;
        let res = self.kernel.solve_assumps(&[])?;
        self.kernel.log_routine_end()?;
        match res {
            SolverResult::Sat => {
                if self.kernel.update_incumbent(Phase::Presolve)? {
                    self.harden()?;
                }
                Ok(true)
            }
            SolverResult::Unsat => Ok(false),
            SolverResult::Interrupted => anyhow::bail!(Termination::Interrupted),
        }
    }

    /// Accumulates pairwise disjoint cores before the first hitting set computation
    ///
    /// Since the cores share no members, the sum of their minimum weights is a valid lower
    /// bound. The final satisfiable call updates the incumbent.
    fn disjoint_presolve(&mut self) -> anyhow::Result<()> {
        self.kernel.log_routine_start("disjoint presolve")?;
        let mut relaxed: Vec<Lit> = Vec::new();
        let mut lb = 0;
        loop {
            let assumps = self.enforcing_assumps(&relaxed);
            match self.kernel.solve_assumps(&assumps)? {
                SolverResult::Sat => {
                    if self.kernel.update_incumbent(Phase::Presolve)? {
                        self.harden()?;
                    }
                    break;
                }
                SolverResult::Unsat => {
                    let core = self.kernel.extract_core()?;
                    let orig_len = core.len();
                    let core = self.kernel.reduce_core(core)?;
                    lb += core
                        .iter()
                        .map(|l| self.kernel.problem.weights()[l])
                        .min()
                        .context("empty core after reduction")?;
                    self.register_core(core.clone(), orig_len)?;
                    relaxed.extend(core);
                    if self.kernel.bounds.improve_lower(lb)? {
                        self.kernel.log_bounds()?;
                    }
                }
                SolverResult::Interrupted => anyhow::bail!(Termination::Interrupted),
            }
        }
        self.kernel.log_routine_end()?;
        Ok(())
    }

    /// Seeds the hitting set solver with constraints derived from blocking-variable
    /// equivalences
    ///
    /// The blocking variable of a unit soft clause `(l)` is equivalent to `¬l` in any
    /// cost-minimal solution. Every hard clause whose literals all map into blocking-variable
    /// space under these equivalences is a valid constraint on hitting sets and is seeded as
    /// such.
    fn seed_equivalences(&mut self) -> anyhow::Result<()> {
        self.kernel.log_routine_start("equivalence seeding")?;
        let problem = &self.kernel.problem;
        let weights = problem.weights();
        let mut eqs: RsHashMap<Var, Lit> = RsHashMap::default();
        for &b in weights.keys() {
            eqs.insert(b.var(), b);
        }
        let mut seeds: Vec<Clause> = Vec::new();
        let mut hardened: Vec<Clause> = Vec::new();
        for (b, l) in problem.bvar_equivalences() {
            if weights.contains_key(&l.var().pos_lit()) {
                continue;
            }
            // the bvar of a unit soft mirrors the negated unit literal in any cost-minimal
            // model, so the reverse direction can be hardened in the oracle
            hardened.push(clause![!b, !l]);
            let e = if l.is_pos() { !b } else { b };
            if let Some(&other) = eqs.get(&l.var()) {
                if other != e {
                    // complementary unit softs, exactly one of the two bvars is paid
                    seeds.push(clause![!other, e]);
                    seeds.push(clause![other, !e]);
                }
                continue;
            }
            eqs.insert(l.var(), e);
        }
        'clauses: for clause in problem.hard_clauses() {
            let mut constr = Clause::new();
            for &l in clause.iter() {
                let Some(&e) = eqs.get(&l.var()) else {
                    continue 'clauses;
                };
                constr.add(if l.is_pos() { e } else { !e });
            }
            if constr.len() == 2 && constr[0] == !constr[1] {
                // tautological under the equivalence, carries no information
                continue;
            }
            seeds.push(constr);
        }
        for cl in &seeds {
            for &l in cl.iter() {
                self.seeded.insert(l.var());
            }
            self.hs_solver.add_core(cl);
        }
        for cl in hardened {
            self.kernel.oracle.add_clause(cl)?;
        }
        self.kernel.log_routine_end()?;
        Ok(())
    }

    /// Runs the hitting set / oracle alternation until an optimal model is found
    ///
    /// Returns `false` if the hitting set problem is infeasible, which only happens once
    /// enumeration has excluded all solutions.
    fn run_ihs_loop(&mut self) -> anyhow::Result<bool> {
        let mut need_exact = false;
        loop {
            let result = match self.kernel.opts.hs_time_limit {
                Some(limit) if !need_exact => self.hs_solver.hitting_set(limit),
                _ => self.hs_solver.optimal_hitting_set().into(),
            };
            let (cost, hs, optimal) = match result {
                IncompleteSolveResult::Optimal(cost, hs) => (cost, hs, true),
                IncompleteSolveResult::Feasible(cost, hs) => (cost, hs, false),
                IncompleteSolveResult::Infeasible => return Ok(false),
                IncompleteSolveResult::Unknown => {
                    // inconclusive timed attempt, redo exactly
                    match self.hs_solver.optimal_hitting_set() {
                        CompleteSolveResult::Optimal(cost, hs) => (cost, hs, true),
                        CompleteSolveResult::Infeasible => return Ok(false),
                    }
                }
            };
            let cost = cost.round() as usize;
            self.kernel.log_exact_hitting_set(cost)?;
            self.kernel.check_termination()?;
            if optimal && !self.enum_rounds && self.kernel.bounds.improve_lower(cost)? {
                self.kernel.log_bounds()?;
                self.harden()?;
            }
            // refute the hitting set: enforce everything it does not relax
            let assumps: Vec<Lit> = hs.iter().filter(|l| l.is_neg()).copied().collect();
            match self.kernel.solve_assumps(&assumps)? {
                SolverResult::Sat => {
                    let phase = if self.enum_rounds {
                        Phase::Enumeration
                    } else {
                        Phase::OuterLoop
                    };
                    if self.kernel.update_incumbent(phase)? {
                        self.harden()?;
                    }
                    if optimal {
                        // the model's cost cannot exceed the optimal hitting set's, so it is
                        // itself optimal
                        return Ok(true);
                    }
                    if self.kernel.bounds.converged() {
                        return Ok(true);
                    }
                    need_exact = true;
                }
                SolverResult::Unsat => {
                    let core = match self.kernel.extract_core() {
                        Ok(core) => core,
                        Err(err)
                            if self.enum_rounds
                                && matches!(
                                    err.downcast_ref(),
                                    Some(InternalError::EmptyCore)
                                ) =>
                        {
                            // the blocking clauses alone conflict, no models remain
                            return Ok(false);
                        }
                        Err(err) => return Err(err),
                    };
                    let orig_len = core.len();
                    let core = self.kernel.reduce_core(core)?;
                    self.register_core(core.clone(), orig_len)?;
                    if self.drive_nonopt(hs, core)? {
                        return Ok(true);
                    }
                }
                SolverResult::Interrupted => anyhow::bail!(Termination::Interrupted),
            }
        }
    }

    /// Interleaves non-optimal hitting sets between exact computations
    ///
    /// The primary heuristic runs until it stops yielding cores, then the secondary heuristic
    /// gets one attempt before control returns to the primary. Any satisfiable call updates the
    /// incumbent; if that makes the bounds meet, the incumbent is optimal. Returns whether the
    /// instance was solved this way.
    fn drive_nonopt(&mut self, hs: Vec<Lit>, last_core: Vec<Lit>) -> anyhow::Result<bool> {
        let Some(primary) = self.kernel.opts.nonopt.primary else {
            return Ok(false);
        };
        let mut hs: Vec<Lit> = hs.into_iter().filter(|l| l.is_pos()).collect();
        let mut last_core = last_core;
        let mut iters = 0;
        self.kernel.log_routine_start("nonopt")?;
        'outer: loop {
            // primary heuristic until it stops yielding cores
            loop {
                self.apply_heuristic(primary, &mut hs, &last_core);
                self.kernel.log_nonopt_hitting_set(self.hs_cost(&hs))?;
                match self.refute_nonopt(&hs)? {
                    NonOptOutcome::Solved => {
                        self.kernel.log_routine_end()?;
                        return Ok(true);
                    }
                    NonOptOutcome::Sat => break,
                    NonOptOutcome::Core(core) => {
                        last_core = core;
                        iters += 1;
                        if self.nonopt_exhausted(iters) {
                            break 'outer;
                        }
                    }
                }
            }
            let Some(secondary) = self.kernel.opts.nonopt.secondary else {
                break;
            };
            // one attempt with the secondary heuristic
            self.apply_heuristic(secondary, &mut hs, &last_core);
            self.kernel.log_nonopt_hitting_set(self.hs_cost(&hs))?;
            match self.refute_nonopt(&hs)? {
                NonOptOutcome::Solved => {
                    self.kernel.log_routine_end()?;
                    return Ok(true);
                }
                NonOptOutcome::Sat => break,
                NonOptOutcome::Core(core) => {
                    last_core = core;
                    iters += 1;
                    if self.nonopt_exhausted(iters) {
                        break 'outer;
                    }
                }
            }
        }
        self.kernel.log_routine_end()?;
        if self.kernel.opts.lp_bounding && !self.enum_rounds {
            if let Some((bound, candidate)) = self.hs_solver.lp_relaxation() {
                let lb = (bound - hitting_sets::EPSILON).ceil() as usize;
                if self.kernel.bounds.improve_lower(lb)? {
                    self.kernel.log_bounds()?;
                    self.harden()?;
                    if self.kernel.bounds.converged() && self.kernel.best_sol.is_some() {
                        return Ok(true);
                    }
                }
                // the rounded relaxation is a hitting set candidate like any other
                let lp_hs: Vec<Lit> = candidate.into_iter().filter(|l| l.is_pos()).collect();
                if !lp_hs.is_empty() {
                    self.kernel.log_nonopt_hitting_set(self.hs_cost(&lp_hs))?;
                    if matches!(self.refute_nonopt(&lp_hs)?, NonOptOutcome::Solved) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Refutes a non-optimal hitting set with the oracle
    fn refute_nonopt(&mut self, hs: &[Lit]) -> anyhow::Result<NonOptOutcome> {
        let assumps = self.enforcing_assumps(hs);
        match self.kernel.solve_assumps(&assumps)? {
            SolverResult::Sat => {
                if self.kernel.update_incumbent(Phase::NonOpt)? {
                    self.harden()?;
                }
                if self.kernel.bounds.converged() {
                    return Ok(NonOptOutcome::Solved);
                }
                Ok(NonOptOutcome::Sat)
            }
            SolverResult::Unsat => {
                let core = self.kernel.extract_core()?;
                let orig_len = core.len();
                let core = self.kernel.reduce_core(core)?;
                self.register_core(core.clone(), orig_len)?;
                Ok(NonOptOutcome::Core(core))
            }
            SolverResult::Interrupted => anyhow::bail!(Termination::Interrupted),
        }
    }

    fn nonopt_exhausted(&self, iters: usize) -> bool {
        match self.kernel.opts.nonopt.iter_limit {
            Some(limit) => iters >= limit,
            None => false,
        }
    }

    /// Applies a non-optimal hitting set heuristic to the current hitting set
    fn apply_heuristic(&mut self, alg: NonOptAlg, hs: &mut Vec<Lit>, last_core: &[Lit]) {
        let problem = &self.kernel.problem;
        match alg {
            NonOptAlg::Common => {
                nonopt::common(hs, last_core, problem.cores().occurrence_map());
            }
            NonOptAlg::Greedy => *hs = nonopt::greedy(problem.cores(), problem.weights()),
            NonOptAlg::Disjoint => nonopt::disjoint(hs, last_core),
            NonOptAlg::Fractional => nonopt::fractional(
                self.kernel.opts.nonopt.frac_size,
                hs,
                last_core,
                problem.cores().occurrence_map(),
            ),
        }
    }

    /// Registers a reduced core with the problem state and the hitting set solver
    fn register_core(&mut self, core: Vec<Lit>, orig_len: usize) -> anyhow::Result<()> {
        let weight = core
            .iter()
            .map(|l| self.kernel.problem.weights()[l])
            .min()
            .context("empty core")?;
        self.kernel.log_core(weight, orig_len, core.len())?;
        let cl: Clause = core.iter().copied().collect();
        self.hs_solver.add_core(&cl);
        self.kernel.problem.register_core(core);
        Ok(())
    }

    /// Builds the assumptions enforcing every soft clause except the given relaxed ones
    fn enforcing_assumps(&self, relaxed: &[Lit]) -> Vec<Lit> {
        let relaxed: RsHashSet<Lit> = relaxed.iter().copied().collect();
        self.kernel
            .problem
            .bvars()
            .into_iter()
            .filter(|b| !relaxed.contains(b) && self.kernel.problem.forced_value(*b).is_none())
            .map(|b| !b)
            .collect()
    }

    /// The summed weight of a set of relaxed blocking variables
    fn hs_cost(&self, hs: &[Lit]) -> usize {
        hs.iter().map(|l| self.kernel.problem.weights()[l]).sum()
    }

    /// Permanently enforces soft clauses whose weight can no longer be paid
    ///
    /// A blocking variable is hardened when its weight alone exceeds the upper bound, since any
    /// model relaxing it already costs more than the incumbent. On top of the lower bound, the
    /// same argument only holds for variables outside every stored core and seeded constraint,
    /// where the hitting set bound cannot already account for them. Disabled while enumerating,
    /// since enumeration must not cut off equal-cost solutions, and once the bounds have met.
    fn harden(&mut self) -> anyhow::Result<()> {
        if !self.kernel.opts.hardening
            || matches!(self.kernel.opts.enumeration, EnumOptions::Solutions { .. })
            || self.kernel.bounds.converged()
        {
            return Ok(());
        }
        let lb = self.kernel.bounds.lower();
        let ub = self.kernel.bounds.upper();
        let cores = self.kernel.problem.cores();
        let to_force: Vec<Lit> = self
            .kernel
            .problem
            .weights()
            .iter()
            .filter(|&(b, &w)| {
                if self.kernel.problem.forced_value(*b).is_some() {
                    return false;
                }
                if w > ub {
                    return true;
                }
                cores.occurrences(*b) == 0 && !self.seeded.contains(&b.var()) && lb + w > ub
            })
            .map(|(&b, _)| b)
            .collect();
        for b in to_force {
            self.kernel.oracle.add_clause(clause![!b])?;
            self.hs_solver.force(!b);
            self.kernel.problem.force_bvar(!b)?;
        }
        Ok(())
    }
}

/// Outcome of refuting a non-optimal hitting set
enum NonOptOutcome {
    /// The bounds met, the incumbent is optimal
    Solved,
    /// Satisfiable without closing the bounds, the heuristic run is over
    Sat,
    /// A new core was found and registered
    Core(Vec<Lit>),
}
