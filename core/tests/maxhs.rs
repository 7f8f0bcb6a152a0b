use std::sync::{Arc, Mutex};

use hitting_sets::BnbSolver;
use maxhs_core::{
    options::NonOptOptions, EnumOptions, KernelFunctions, KernelOptions, Limits, MaxHs,
    MaybeTerminated, NonOptAlg, Phase, Problem, ReductionAlg, Solve, SolverStatus, Termination,
    WriteSolverLog,
};
use rustsat::{
    clause, lit,
    solvers::SolverResult,
    types::{Assignment, Clause, TernaryVal, Var},
};
use rustsat_cadical::CaDiCaL;

type Solver = MaxHs<CaDiCaL<'static, 'static>, BnbSolver>;

fn build_problem(n_vars: u32, hards: &[Clause], softs: &[(Clause, usize)]) -> Problem {
    let mut problem = Problem::new(Var::new(n_vars.saturating_sub(1)));
    for cl in hards {
        problem.add_hard_clause(cl.clone());
    }
    for (cl, w) in softs {
        problem.add_soft_clause(cl.clone(), *w);
    }
    problem
}

fn solve_with(problem: Problem, opts: KernelOptions) -> (SolverStatus, Vec<(usize, Assignment)>) {
    let mut solver: Solver = MaxHs::new(problem, opts).unwrap();
    let status = solver.solve(Limits::none()).unwrap();
    (status, solver.solutions().to_vec())
}

fn satisfies(sol: &Assignment, cl: &Clause) -> bool {
    cl.iter().any(|&l| sol.lit_value(l) == TernaryVal::True)
}

/// Reference optimum by exhaustive search over the original variables
fn brute_force(n_vars: u32, hards: &[Clause], softs: &[(Clause, usize)]) -> Option<usize> {
    let mut best = None;
    for bits in 0..1u32 << n_vars {
        let assign: Assignment = (0..n_vars)
            .map(|idx| {
                let v = Var::new(idx);
                if bits & (1 << idx) != 0 {
                    v.pos_lit()
                } else {
                    v.neg_lit()
                }
            })
            .collect();
        if hards.iter().any(|cl| !satisfies(&assign, cl)) {
            continue;
        }
        let cost = softs
            .iter()
            .filter(|(cl, _)| !satisfies(&assign, cl))
            .map(|(_, w)| *w)
            .sum();
        best = Some(best.map_or(cost, |b: usize| b.min(cost)));
    }
    best
}

/// A small instance where the optimum pays the cheaper of two conflicting softs
fn two_softs() -> (u32, Vec<Clause>, Vec<(Clause, usize)>) {
    (
        2,
        vec![clause![lit![0], lit![1]]],
        vec![(clause![!lit![0]], 3), (clause![!lit![1]], 2)],
    )
}

/// A chain of overlapping hard clauses with weighted unit softs
fn chain() -> (u32, Vec<Clause>, Vec<(Clause, usize)>) {
    (
        4,
        vec![
            clause![lit![0], lit![1]],
            clause![lit![1], lit![2]],
            clause![lit![2], lit![3]],
            clause![!lit![0], !lit![2]],
        ],
        vec![
            (clause![!lit![0]], 1),
            (clause![!lit![1]], 2),
            (clause![!lit![2]], 3),
            (clause![!lit![3]], 4),
        ],
    )
}

#[test]
fn small_weighted_optimum() {
    let (n, hards, softs) = two_softs();
    let (status, sols) = solve_with(
        build_problem(n, &hards, &softs),
        KernelOptions::default(),
    );
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(sols.len(), 1);
    let (cost, sol) = &sols[0];
    assert_eq!(*cost, 2);
    assert!(hards.iter().all(|cl| satisfies(sol, cl)));
}

#[test]
fn unsat_hard_clauses_are_detected() {
    let hards = vec![clause![lit![0]], clause![!lit![0]]];
    let (status, sols) = solve_with(
        build_problem(2, &hards, &[(clause![lit![1]], 1)]),
        KernelOptions::default(),
    );
    assert_eq!(status, SolverStatus::Unsat);
    assert!(sols.is_empty());
}

#[test]
fn all_reductions_find_the_optimum() {
    let (n, hards, softs) = chain();
    let expected = brute_force(n, &hards, &softs).unwrap();
    for reduction in [
        ReductionAlg::None,
        ReductionAlg::ReRefute,
        ReductionAlg::Destructive,
        ReductionAlg::Constructive,
        ReductionAlg::Binary,
        ReductionAlg::Cardinality,
    ] {
        let opts = KernelOptions {
            reduction,
            rerefute_prepass: reduction == ReductionAlg::Destructive,
            ..KernelOptions::default()
        };
        let (status, sols) = solve_with(build_problem(n, &hards, &softs), opts);
        assert_eq!(status, SolverStatus::Optimal, "reduction {reduction}");
        assert_eq!(sols[0].0, expected, "reduction {reduction}");
        assert!(hards.iter().all(|cl| satisfies(&sols[0].1, cl)));
    }
}

#[test]
fn all_nonopt_configs_find_the_optimum() {
    let (n, hards, softs) = chain();
    let expected = brute_force(n, &hards, &softs).unwrap();
    let configs = [
        (None, None),
        (Some(NonOptAlg::Common), None),
        (Some(NonOptAlg::Greedy), None),
        (Some(NonOptAlg::Fractional), Some(NonOptAlg::Common)),
        (Some(NonOptAlg::Disjoint), Some(NonOptAlg::Greedy)),
    ];
    for (primary, secondary) in configs {
        let opts = KernelOptions {
            nonopt: NonOptOptions {
                primary,
                secondary,
                ..NonOptOptions::default()
            },
            ..KernelOptions::default()
        };
        let (status, sols) = solve_with(build_problem(n, &hards, &softs), opts);
        assert_eq!(status, SolverStatus::Optimal);
        assert_eq!(sols[0].0, expected);
    }
}

#[test]
fn presolve_and_bounding_toggles_agree() {
    let (n, hards, softs) = chain();
    let expected = brute_force(n, &hards, &softs).unwrap();
    let variants = [
        KernelOptions {
            disjoint_presolve: false,
            ..KernelOptions::default()
        },
        KernelOptions {
            equivalence_seeding: false,
            ..KernelOptions::default()
        },
        KernelOptions {
            hardening: false,
            ..KernelOptions::default()
        },
        KernelOptions {
            lp_bounding: true,
            ..KernelOptions::default()
        },
    ];
    for opts in variants {
        let (status, sols) = solve_with(build_problem(n, &hards, &softs), opts);
        assert_eq!(status, SolverStatus::Optimal);
        assert_eq!(sols[0].0, expected);
    }
}

#[test]
fn enumeration_finds_all_optimal_models() {
    let hards = vec![clause![lit![0], lit![1]], clause![!lit![0], !lit![1]]];
    let softs = vec![(clause![!lit![0]], 1), (clause![!lit![1]], 1)];
    let mut opts = KernelOptions::default();
    opts.set_enumeration(EnumOptions::Solutions {
        limit: None,
        tolerance: 0,
    });
    let (status, sols) = solve_with(build_problem(2, &hards, &softs), opts);
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(sols.len(), 2);
    for (cost, sol) in &sols {
        assert_eq!(*cost, 1);
        assert!(hards.iter().all(|cl| satisfies(sol, cl)));
    }
    assert_ne!(
        sols[0].1.var_value(Var::new(0)),
        sols[1].1.var_value(Var::new(0))
    );
}

#[test]
fn enumeration_limit_is_respected() {
    let hards = vec![clause![lit![0], lit![1]], clause![!lit![0], !lit![1]]];
    let softs = vec![(clause![!lit![0]], 1), (clause![!lit![1]], 1)];
    let mut opts = KernelOptions::default();
    opts.set_enumeration(EnumOptions::Solutions {
        limit: Some(1),
        tolerance: 0,
    });
    let (status, sols) = solve_with(build_problem(2, &hards, &softs), opts);
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(sols.len(), 1);
}

#[test]
fn oracle_call_limit_terminates_early() {
    let (n, hards, softs) = chain();
    let mut solver: Solver =
        MaxHs::new(build_problem(n, &hards, &softs), KernelOptions::default()).unwrap();
    let ret = solver
        .solve(Limits {
            oracle_calls: Some(1),
            ..Limits::none()
        })
        .expect_no_error();
    assert_eq!(
        ret,
        MaybeTerminated::Terminated(Termination::OracleCallsLimit)
    );
}

#[test]
fn injected_cores_are_respected() {
    let mut problem = Problem::new(Var::new(1));
    problem.add_hard_clause(clause![lit![0], lit![1]]);
    let b0 = problem.add_soft_clause(clause![!lit![0]], 3);
    let b1 = problem.add_soft_clause(clause![!lit![1]], 2);
    let mut solver: Solver = MaxHs::new(problem, KernelOptions::default()).unwrap();
    // one of the two softs must be violated under the hard clause, so this is a valid core
    solver.add_core(vec![b0, b1]).unwrap();
    let status = solver.solve(Limits::none()).unwrap();
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(solver.solutions()[0].0, 2);
    // literals that are no blocking variables are rejected
    assert!(solver.add_core(vec![lit![0]]).is_err());
}

#[test]
fn hardening_preserves_solvability_near_convergence() {
    // bare alternation without presolve, seeding, reduction, or heuristics, where the bounds
    // tighten to within the smallest soft weight before converging
    let (n, hards, softs) = two_softs();
    let opts = KernelOptions {
        reduction: ReductionAlg::None,
        disjoint_presolve: false,
        equivalence_seeding: false,
        nonopt: NonOptOptions {
            primary: None,
            secondary: None,
            ..NonOptOptions::default()
        },
        ..KernelOptions::default()
    };
    let (status, sols) = solve_with(build_problem(n, &hards, &softs), opts);
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(sols[0].0, 2);
}

#[test]
fn overlapping_soft_clauses_pay_the_lighter() {
    let hards = vec![clause![lit![0], lit![1]], clause![!lit![0], lit![1]]];
    let softs = vec![
        (clause![lit![0], !lit![1]], 2),
        (clause![!lit![0], !lit![1]], 1),
    ];
    let (status, sols) = solve_with(build_problem(2, &hards, &softs), KernelOptions::default());
    assert_eq!(status, SolverStatus::Optimal);
    let (cost, sol) = &sols[0];
    assert_eq!(*cost, 1);
    assert_eq!(sol.var_value(Var::new(0)), TernaryVal::True);
    assert_eq!(sol.var_value(Var::new(1)), TernaryVal::True);
}

#[test]
fn soft_conflict_cycles_match_brute_force() {
    for k in 3..=6u32 {
        let mut softs: Vec<(Clause, usize)> = (0..k)
            .map(|i| (std::iter::once(Var::new(i).pos_lit()).collect(), 1))
            .collect();
        for i in 0..k {
            let cl: Clause = [Var::new(i).neg_lit(), Var::new((i + 1) % k).neg_lit()]
                .into_iter()
                .collect();
            softs.push((cl, 1));
        }
        let expected = brute_force(k, &[], &softs).unwrap();
        let (status, sols) = solve_with(build_problem(k, &[], &softs), KernelOptions::default());
        assert_eq!(status, SolverStatus::Optimal, "cycle length {k}");
        assert_eq!(sols[0].0, expected, "cycle length {k}");
    }
}

#[test]
fn interrupted_solve_reports_incumbent() {
    let (n, hards, softs) = two_softs();
    let mut solver: Solver =
        MaxHs::new(build_problem(n, &hards, &softs), KernelOptions::default()).unwrap();
    let ret = solver
        .solve(Limits {
            oracle_calls: Some(2),
            ..Limits::none()
        })
        .expect_no_error();
    assert!(matches!(ret, MaybeTerminated::Terminated(_)));
    // the hard clause check was satisfiable, so an incumbent must be available
    let (cost, sol) = solver.best_solution().unwrap();
    assert!(hards.iter().all(|cl| satisfies(&sol, cl)));
    assert_eq!(cost, solver.bounds().upper());
    assert!(cost >= 2);
}

/// Records every bound update the solver logs
struct BoundTrace(Arc<Mutex<Vec<(usize, usize)>>>);

impl WriteSolverLog for BoundTrace {
    fn log_candidate(&mut self, _cost: usize, _phase: Phase) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_oracle_call(&mut self, _result: SolverResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_solution(&mut self, _cost: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_core(&mut self, _weight: usize, _len: usize, _red_len: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_hitting_set(&mut self, _cost: usize, _optimal: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_bounds(&mut self, lower: usize, upper: usize) -> anyhow::Result<()> {
        self.0.lock().unwrap().push((lower, upper));
        Ok(())
    }

    fn log_routine_start(&mut self, _routine: &'static str) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_end_solve(&mut self, _status: SolverStatus) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn bounds_evolve_monotonically() {
    let (n, hards, softs) = chain();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut solver: Solver =
        MaxHs::new(build_problem(n, &hards, &softs), KernelOptions::default()).unwrap();
    solver.attach_logger(BoundTrace(trace.clone()));
    solver.solve(Limits::none()).unwrap();
    let trace = trace.lock().unwrap();
    assert!(!trace.is_empty());
    for &(lower, upper) in trace.iter() {
        assert!(lower <= upper);
    }
    for pair in trace.windows(2) {
        assert!(pair[1].0 >= pair[0].0, "lower bound decreased");
        assert!(pair[1].1 <= pair[0].1, "upper bound increased");
    }
}

#[cfg(feature = "highs")]
#[test]
fn lp_bounding_with_mip_backend_finds_the_optimum() {
    let (n, hards, softs) = chain();
    let expected = brute_force(n, &hards, &softs).unwrap();
    let opts = KernelOptions {
        lp_bounding: true,
        ..KernelOptions::default()
    };
    let mut solver: MaxHs<CaDiCaL<'static, 'static>, hitting_sets::HighsSolver> =
        MaxHs::new(build_problem(n, &hards, &softs), opts).unwrap();
    let status = solver.solve(Limits::none()).unwrap();
    assert_eq!(status, SolverStatus::Optimal);
    assert_eq!(solver.solutions()[0].0, expected);
}
