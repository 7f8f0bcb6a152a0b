//! # Exact Branch-and-Bound Hitting Set Solver
//!
//! A pure-Rust backend that solves the minimum-cost hitting set problem by depth-first branch
//! and bound over the objective variables. Intended for small instances and as a stand-in where
//! the MIP backend is unavailable; constraint systems with thousands of variables should use the
//! `highs` backend instead.

use std::time::{Duration, Instant};

use rustsat::types::{Cl, Lit, RsHashMap};

use crate::{CompleteSolveResult, IncompleteSolveResult};

use super::{BuildSolver, HittingSetSolver, VarMap};

/// A linear "hit at least one" constraint: satisfied if any member literal is satisfied
///
/// Members are internal variable indices paired with the satisfying polarity.
#[derive(Debug, Clone)]
struct Constraint {
    lits: Vec<(usize, bool)>,
}

pub struct Solver {
    /// Cost of assigning each internal variable true resp. false
    costs: Vec<(usize, usize)>,
    map: VarMap<usize>,
    constraints: Vec<Constraint>,
    /// Per-variable index into the constraints it appears in
    occurrences: Vec<Vec<usize>>,
    last_solution: Option<Vec<bool>>,
    n_cores: usize,
}

impl Solver {
    fn add_constraint(&mut self, lits: Vec<(usize, bool)>) {
        let cid = self.constraints.len();
        for &(var, _) in &lits {
            self.occurrences[var].push(cid);
        }
        self.constraints.push(Constraint { lits });
    }

    fn internalize(&mut self, core: &Cl) -> Vec<(usize, bool)> {
        core.iter()
            .map(|lit| (self.map[lit.var()], lit.is_pos()))
            .collect()
    }

    fn externalize(&self, assignment: &[bool]) -> Vec<Lit> {
        assignment
            .iter()
            .enumerate()
            .map(|(idx, &val)| {
                if val {
                    self.map[idx].pos_lit()
                } else {
                    self.map[idx].neg_lit()
                }
            })
            .collect()
    }

    fn solve(&mut self, deadline: Option<Instant>) -> IncompleteSolveResult {
        let mut search = Search::new(self, deadline);
        search.run();
        let timed_out = search.timed_out;
        match search.best.take() {
            Some((cost, assignment)) => {
                let hs = self.externalize(&assignment);
                self.last_solution = Some(assignment);
                if timed_out {
                    IncompleteSolveResult::Feasible(cost as f64, hs)
                } else {
                    IncompleteSolveResult::Optimal(cost as f64, hs)
                }
            }
            None if timed_out => IncompleteSolveResult::Unknown,
            None => IncompleteSolveResult::Infeasible,
        }
    }
}

/// State of one depth-first branch and bound run
struct Search<'a> {
    slv: &'a Solver,
    deadline: Option<Instant>,
    timed_out: bool,
    /// Number of satisfied literals per constraint
    satisfied: Vec<usize>,
    /// Number of unassigned literals per constraint
    open: Vec<usize>,
    assignment: Vec<bool>,
    best: Option<(usize, Vec<bool>)>,
}

impl<'a> Search<'a> {
    fn new(slv: &'a Solver, deadline: Option<Instant>) -> Self {
        Search {
            slv,
            deadline,
            timed_out: false,
            satisfied: vec![0; slv.constraints.len()],
            open: slv.constraints.iter().map(|c| c.lits.len()).collect(),
            assignment: vec![false; slv.costs.len()],
            best: None,
        }
    }

    fn run(&mut self) {
        self.descend(0, 0);
    }

    /// Assigns variable `var` to `val`, updating constraint counters. Returns `false` if some
    /// constraint became unsatisfiable.
    fn assign(&mut self, var: usize, val: bool) -> bool {
        self.assignment[var] = val;
        let mut feasible = true;
        for &cid in &self.slv.occurrences[var] {
            self.open[cid] -= 1;
            if self.slv.constraints[cid]
                .lits
                .iter()
                .any(|&(v, pol)| v == var && pol == val)
            {
                self.satisfied[cid] += 1;
            }
            if self.satisfied[cid] == 0 && self.open[cid] == 0 {
                feasible = false;
            }
        }
        feasible
    }

    fn unassign(&mut self, var: usize, val: bool) {
        for &cid in &self.slv.occurrences[var] {
            self.open[cid] += 1;
            if self.slv.constraints[cid]
                .lits
                .iter()
                .any(|&(v, pol)| v == var && pol == val)
            {
                self.satisfied[cid] -= 1;
            }
        }
    }

    fn descend(&mut self, var: usize, cost: usize) {
        if self.timed_out {
            return;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.timed_out = true;
                return;
            }
        }
        if let Some((best_cost, _)) = &self.best {
            if cost >= *best_cost {
                return;
            }
        }
        if var >= self.slv.costs.len() {
            if self.satisfied.iter().all(|&s| s > 0) {
                self.best = Some((cost, self.assignment.clone()));
            }
            return;
        }
        let (cost_true, cost_false) = self.slv.costs[var];
        // try the cheaper polarity first
        let order = if cost_false <= cost_true {
            [(false, cost_false), (true, cost_true)]
        } else {
            [(true, cost_true), (false, cost_false)]
        };
        for (val, val_cost) in order {
            if self.assign(var, val) {
                self.descend(var + 1, cost + val_cost);
            }
            self.unassign(var, val);
        }
    }
}

impl HittingSetSolver for Solver {
    type Builder = Builder;

    fn add_core(&mut self, core: &Cl) {
        let lits = self.internalize(core);
        self.add_constraint(lits);
        self.n_cores += 1;
    }

    fn optimal_hitting_set(&mut self) -> CompleteSolveResult {
        self.solve(None).into()
    }

    fn hitting_set(&mut self, time_limit: Duration) -> IncompleteSolveResult {
        self.solve(Some(Instant::now() + time_limit))
    }

    fn forbid_last_solution(&mut self) {
        let Some(last) = self.last_solution.take() else {
            return;
        };
        let chosen: Vec<_> = (0..last.len()).filter(|&idx| last[idx]).collect();
        if !chosen.is_empty() {
            // exclude the set itself and all supersets
            self.add_constraint(chosen.iter().map(|&idx| (idx, false)).collect());
        }
        let complement: Vec<_> = (0..last.len()).filter(|&idx| !last[idx]).collect();
        if !complement.is_empty() {
            // exclude the set itself and all subsets
            self.add_constraint(complement.into_iter().map(|idx| (idx, true)).collect());
        }
    }

    fn lp_relaxation(&mut self) -> Option<(f64, Vec<Lit>)> {
        None
    }

    fn force(&mut self, lit: Lit) {
        let idx = self.map[lit.var()];
        self.add_constraint(vec![(idx, lit.is_pos())]);
    }

    fn n_cores(&self) -> usize {
        self.n_cores
    }
}

/// The [`BuildSolver`] type for the branch and bound solver
pub struct Builder {
    objective: RsHashMap<Lit, usize>,
}

impl BuildSolver for Builder {
    type Solver = Solver;

    fn new<I>(objective: I) -> Self
    where
        I: IntoIterator<Item = (Lit, usize)>,
    {
        Builder {
            objective: objective.into_iter().collect(),
        }
    }

    fn init(self) -> Self::Solver {
        let mut vars: Vec<_> = self.objective.keys().copied().map(Lit::var).collect();
        vars.sort_unstable();
        vars.dedup();
        let mut map = VarMap::new(vars.last().map_or(0, |var| var.idx() + 1), vars.len());
        let mut costs = Vec::with_capacity(vars.len());
        for var in vars {
            let cost_true = self.objective.get(&var.pos_lit()).copied().unwrap_or(0);
            let cost_false = self.objective.get(&var.neg_lit()).copied().unwrap_or(0);
            let next = costs.len();
            map.get_or_insert(var, || next);
            costs.push((cost_true, cost_false));
        }
        let occurrences = vec![Vec::new(); costs.len()];
        Solver {
            costs,
            map,
            constraints: Vec::new(),
            occurrences,
            last_solution: None,
            n_cores: 0,
        }
    }

    fn threads(&mut self, _threads: u32) -> &mut Self {
        // single-threaded backend
        self
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{clause, lit};

    use super::*;

    fn build(weights: &[(Lit, usize)]) -> Solver {
        Builder::new(weights.iter().copied()).init()
    }

    #[test]
    fn no_cores_is_free() {
        let mut slv = build(&[(lit![0], 2), (lit![1], 3)]);
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!(cost, 0.);
        assert_eq!(hs, vec![!lit![0], !lit![1]]);
    }

    #[test]
    fn picks_cheapest_member() {
        let mut slv = build(&[(lit![0], 5), (lit![1], 1), (lit![2], 3)]);
        slv.add_core(&clause![lit![0], lit![1], lit![2]]);
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!(cost, 1.);
        assert_eq!(hs, vec![!lit![0], lit![1], !lit![2]]);
    }

    #[test]
    fn overlapping_cores() {
        // {0,1}, {1,2}, {0,2} with unit weights: any two variables hit all cores
        let mut slv = build(&[(lit![0], 1), (lit![1], 1), (lit![2], 1)]);
        slv.add_core(&clause![lit![0], lit![1]]);
        slv.add_core(&clause![lit![1], lit![2]]);
        slv.add_core(&clause![lit![0], lit![2]]);
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!(cost, 2.);
        assert_eq!(hs.iter().filter(|l| l.is_pos()).count(), 2);
    }

    #[test]
    fn weighted_prefers_single_expensive() {
        // hitting both cores through the shared variable costs 3, separate picks cost 2
        let mut slv = build(&[(lit![0], 1), (lit![1], 3), (lit![2], 1)]);
        slv.add_core(&clause![lit![0], lit![1]]);
        slv.add_core(&clause![lit![1], lit![2]]);
        let CompleteSolveResult::Optimal(cost, _) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!(cost, 2.);
    }

    #[test]
    fn forbid_yields_next_best() {
        let mut slv = build(&[(lit![0], 1), (lit![1], 2)]);
        slv.add_core(&clause![lit![0], lit![1]]);
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!((cost, &hs[..]), (1., &[lit![0], !lit![1]][..]));
        slv.forbid_last_solution();
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!((cost, &hs[..]), (2., &[!lit![0], lit![1]][..]));
        slv.forbid_last_solution();
        assert_eq!(slv.optimal_hitting_set(), CompleteSolveResult::Infeasible);
    }

    #[test]
    fn forced_variable_is_respected() {
        let mut slv = build(&[(lit![0], 1), (lit![1], 2)]);
        slv.add_core(&clause![lit![0], lit![1]]);
        slv.force(!lit![0]);
        let CompleteSolveResult::Optimal(cost, hs) = slv.optimal_hitting_set() else {
            panic!("expected optimal result");
        };
        assert_eq!((cost, &hs[..]), (2., &[!lit![0], lit![1]][..]));
    }

    #[test]
    fn contradictory_forces_are_infeasible() {
        let mut slv = build(&[(lit![0], 1)]);
        slv.force(lit![0]);
        slv.force(!lit![0]);
        assert_eq!(slv.optimal_hitting_set(), CompleteSolveResult::Infeasible);
    }
}
