//! # Hitting Set Solver Interface for the HiGHS Solver

use std::{
    ops,
    time::Duration,
};

use highs::{Col, HighsModelStatus, Model, RowProblem, Sense, Solution};
use rustsat::types::{Cl, Lit, RsHashMap, Var};

use crate::{CompleteSolveResult, IncompleteSolveResult};

use super::{BuildSolver, HittingSetSolver, VarMap};

pub struct Solver {
    objective: RsHashMap<Lit, usize>,
    map: VarMap<Col>,
    state: State,
    /// All cores added so far, kept for rebuilding the continuous relaxation
    cores: Vec<Vec<Lit>>,
    /// Permanently fixed variables, kept for rebuilding the continuous relaxation
    fixed: Vec<Lit>,
    largest_core: usize,
    last_solution: Option<Vec<Lit>>,
    threads: i32,
}

#[derive(Default)]
enum State {
    Init(RowProblem),
    Main(Model),
    #[default]
    Working,
}

impl HittingSetSolver for Solver {
    type Builder = Builder;

    fn add_core(&mut self, core: &Cl) {
        let bound = core
            .iter()
            .fold(1, |b, lit| if lit.is_neg() { b - 1 } else { b });
        self.state.add_row(
            bound..,
            core.iter()
                .map(|lit| (self.map[lit.var()], if lit.is_pos() { 1. } else { -1. })),
        );
        self.largest_core = std::cmp::max(self.largest_core, core.len());
        self.cores.push(core.iter().copied().collect());
    }

    fn optimal_hitting_set(&mut self) -> CompleteSolveResult {
        self.solve(None).into()
    }

    fn hitting_set(&mut self, time_limit: Duration) -> IncompleteSolveResult {
        self.solve(Some(time_limit))
    }

    fn forbid_last_solution(&mut self) {
        let Some(last) = self.last_solution.take() else {
            return;
        };
        let chosen: Vec<_> = last.iter().filter(|lit| lit.is_pos()).collect();
        if !chosen.is_empty() {
            // exclude the set itself and all supersets
            self.state.add_row(
                ..=chosen.len() as f64 - 1.,
                chosen.iter().map(|lit| (self.map[lit.var()], 1.)),
            );
        }
        let complement: Vec<_> = last.iter().filter(|lit| lit.is_neg()).collect();
        if !complement.is_empty() {
            // exclude the set itself and all subsets
            self.state.add_row(
                1..,
                complement.iter().map(|lit| (self.map[lit.var()], 1.)),
            );
        }
    }

    fn lp_relaxation(&mut self) -> Option<(f64, Vec<Lit>)> {
        if self.cores.is_empty() {
            return Some((0., Vec::new()));
        }
        // Rebuild the constraint system with continuous columns
        let mut problem = RowProblem::default();
        let mut relaxed = VarMap::new(self.map.len(), self.map.len());
        for (var, _) in self.map.iter() {
            let weight = self.column_weight(var);
            relaxed.get_or_insert(var, || problem.add_column(weight, 0..=1));
        }
        for core in &self.cores {
            let bound = core
                .iter()
                .fold(1, |b, lit| if lit.is_neg() { b - 1 } else { b });
            problem.add_row(
                bound..,
                core.iter()
                    .map(|lit| (relaxed[lit.var()], if lit.is_pos() { 1. } else { -1. })),
            );
        }
        for lit in &self.fixed {
            let col = relaxed[lit.var()];
            if lit.is_pos() {
                problem.add_row(1.., [(col, 1.)]);
            } else {
                problem.add_row(..=0., [(col, 1.)]);
            }
        }
        let solved = problem.optimise(Sense::Minimise).solve();
        if solved.status() != HighsModelStatus::Optimal {
            return None;
        }
        let bound = solved.get_objective_value();
        let threshold = 1. / self.largest_core as f64;
        let solution = solved.get_solution();
        let candidate = solution
            .columns()
            .iter()
            .enumerate()
            .take(relaxed.len())
            .map(|(idx, &val)| {
                if val > threshold {
                    relaxed[idx].pos_lit()
                } else {
                    relaxed[idx].neg_lit()
                }
            })
            .collect();
        Some((bound, candidate))
    }

    fn force(&mut self, lit: Lit) {
        let col = self.map[lit.var()];
        if lit.is_pos() {
            self.state.add_row(1.., [(col, 1.)]);
        } else {
            self.state.add_row(..=0., [(col, 1.)]);
        }
        self.fixed.push(lit);
    }

    fn n_cores(&self) -> usize {
        self.cores.len()
    }
}

#[inline]
fn collect_hitting_set(sol: &Solution, map: &VarMap<Col>) -> Vec<Lit> {
    // only the first `map.len()` columns belong to objective variables, the rest are aux columns
    sol.columns()
        .iter()
        .enumerate()
        .take(map.len())
        .map(|(idx, val)| {
            if *val >= super::TRUE {
                map[idx].pos_lit()
            } else if *val <= super::FALSE {
                map[idx].neg_lit()
            } else {
                panic!("variable assigned to non-integer value");
            }
        })
        .collect()
}

impl Solver {
    fn column_weight(&self, var: Var) -> f64 {
        if let Some(&weight) = self.objective.get(&var.pos_lit()) {
            return weight as f64;
        }
        if let Some(&weight) = self.objective.get(&var.neg_lit()) {
            return -(weight as f64);
        }
        0.
    }

    fn transition_to_main(&mut self) {
        let State::Init(problem) = std::mem::take(&mut self.state) else {
            panic!("`transition_to_main` must be called in `State::Init`")
        };
        let mut model = problem.optimise(Sense::Minimise);
        model.set_option("threads", self.threads);
        self.state = State::Main(model);
    }

    fn solve(&mut self, time_limit: Option<Duration>) -> IncompleteSolveResult {
        if matches!(self.state, State::Init(_)) {
            self.transition_to_main();
        }
        let State::Main(mut model) = std::mem::take(&mut self.state) else {
            unreachable!();
        };
        if let Some(time_limit) = time_limit {
            model.set_option("time_limit", time_limit.as_secs_f64());
        }
        let solved = model.solve();
        let status = solved.status();
        if status != HighsModelStatus::Optimal {
            let mut model = Model::from(solved);
            if time_limit.is_some() {
                model.set_option("time_limit", f64::INFINITY);
            }
            self.state = State::Main(model);
            return if status == HighsModelStatus::Infeasible {
                IncompleteSolveResult::Infeasible
            } else {
                IncompleteSolveResult::Unknown
            };
        }
        let solution = solved.get_solution();
        let cost = solved.get_objective_value();
        let mut model = Model::from(solved);
        if time_limit.is_some() {
            model.set_option("time_limit", f64::INFINITY);
        }
        self.state = State::Main(model);
        let hitting_set = collect_hitting_set(&solution, &self.map);
        self.last_solution = Some(hitting_set.clone());
        IncompleteSolveResult::Optimal(cost, hitting_set)
    }
}

impl State {
    fn add_row<N, B>(&mut self, bounds: B, row_factors: impl IntoIterator<Item = (Col, f64)>)
    where
        N: Into<f64> + Copy,
        B: ops::RangeBounds<N>,
    {
        match self {
            State::Init(problem) => {
                problem.add_row(bounds, row_factors);
            }
            State::Main(model) => {
                model.add_row(bounds, row_factors);
            }
            State::Working => unreachable!("cannot add row in working state"),
        }
    }
}

/// The [`BuildSolver`] type for the HiGHS solver
pub struct Builder {
    objective: RsHashMap<Lit, usize>,
    threads: i32,
}

impl BuildSolver for Builder {
    type Solver = Solver;

    fn new<I>(objective: I) -> Self
    where
        I: IntoIterator<Item = (Lit, usize)>,
    {
        Builder {
            objective: objective.into_iter().collect(),
            threads: 1,
        }
    }

    fn init(self) -> Self::Solver {
        // Initialize the problem with all objective variables
        let mut problem = RowProblem::default();
        let mut vars: Vec<Var> = self.objective.keys().copied().map(Lit::var).collect();
        vars.sort_unstable();
        vars.dedup();
        let mut map = VarMap::new(vars.last().map_or(0, |var| var.idx() + 1), vars.len());
        for var in vars {
            let weight = if let Some(&weight) = self.objective.get(&var.pos_lit()) {
                weight as f64
            } else if let Some(&weight) = self.objective.get(&var.neg_lit()) {
                -(weight as f64)
            } else {
                0.
            };
            map.get_or_insert(var, || problem.add_integer_column(weight, 0..=1));
        }
        Solver {
            objective: self.objective,
            map,
            state: State::Init(problem),
            cores: Vec::new(),
            fixed: Vec::new(),
            largest_core: 1,
            last_solution: None,
            threads: self.threads,
        }
    }

    fn threads(&mut self, threads: u32) -> &mut Self {
        self.threads = i32::try_from(threads).expect("`threads` must be at most `i32::MAX`");
        self
    }
}

impl crate::map::AsIndex for Col {
    fn as_index(&self) -> usize {
        Col::index(*self)
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{clause, lit};

    use super::*;

    #[test]
    fn relaxation_bound_and_candidate() {
        let mut solver = Builder::new([(lit![0], 1), (lit![1], 3)]).init();
        solver.add_core(&clause![lit![0], lit![1]]);
        let (bound, candidate) = solver.lp_relaxation().unwrap();
        // the relaxation puts all weight on the cheaper variable
        assert!((bound - 1.).abs() < crate::EPSILON);
        assert!(candidate.contains(&lit![0]));
        assert!(candidate.contains(&!lit![1]));
    }

    #[test]
    fn relaxation_respects_forced_variables() {
        let mut solver = Builder::new([(lit![0], 1), (lit![1], 3)]).init();
        solver.add_core(&clause![lit![0], lit![1]]);
        solver.force(!lit![0]);
        let (bound, candidate) = solver.lp_relaxation().unwrap();
        assert!((bound - 3.).abs() < crate::EPSILON);
        assert!(candidate.contains(&!lit![0]));
        assert!(candidate.contains(&lit![1]));
    }
}
