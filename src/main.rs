use std::thread;

use maxhs_core::{
    prepro, ExtendedSolveStats, KernelFunctions, MaxHs, MaybeTerminatedError, Problem, Solve,
    SolverStatus,
};
use rustsat::solvers::Initialize;
use rustsat_cadical::CaDiCaL;

mod cli;
use cli::{CadicalConfig, Cli};

/// The SAT solver used
type Oracle = CaDiCaL<'static, 'static>;

/// The hitting set backend used
#[cfg(feature = "highs")]
type HsBackend = hitting_sets::HighsSolver;
#[cfg(not(feature = "highs"))]
type HsBackend = hitting_sets::BnbSolver;

/// Solver instantiation used
type Solver<OInit = CaDiCaLDefaultInit> = MaxHs<Oracle, HsBackend, OInit>;

macro_rules! run {
    ($init:ty, $problem:expr, $offset:expr, $cli:expr) => {{
        let mut solver: Solver<$init> = setup_solver($problem, $cli)?;
        let ret = solver.solve($cli.limits);
        post_solve(solver, ret, $offset, $cli)?;
    }};
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::init();

    match sub_main(&cli) {
        Ok(_) => (),
        Err(err) => {
            cli.error(&format!("{err}"))?;
        }
    };

    Ok(())
}

fn sub_main(cli: &Cli) -> anyhow::Result<()> {
    cli.print_header()?;
    cli.print_solver_config()?;

    cli.info(&format!("solving instance {:?}", cli.inst_path))?;

    let parsed = prepro::parse(cli.inst_path.clone(), cli.file_format, cli.opb_options)?;
    let (problem, offset) = prepro::build_problem(parsed);

    match cli.cadical_config {
        CadicalConfig::Default => run!(CaDiCaLDefaultInit, problem, offset, cli),
        CadicalConfig::Plain => run!(CaDiCaLPlainInit, problem, offset, cli),
        CadicalConfig::Sat => run!(CaDiCaLSatInit, problem, offset, cli),
        CadicalConfig::Unsat => run!(CaDiCaLUnsatInit, problem, offset, cli),
    }
    Ok(())
}

fn setup_solver<OInit: Initialize<Oracle>>(
    problem: Problem,
    cli: &Cli,
) -> anyhow::Result<Solver<OInit>> {
    let mut solver = Solver::<OInit>::new(problem, cli.opts)?;

    // === Set up CLI interaction ===
    // Set up signal handling
    let mut interrupter = solver.interrupter();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGXCPU,
        signal_hook::consts::SIGABRT,
    ])?;
    // Thread for catching incoming signals
    thread::spawn(move || {
        for _ in signals.forever() {
            interrupter.interrupt();
        }
    });

    solver.attach_logger(cli.new_cli_logger());

    Ok(solver)
}

fn post_solve<OInit: Initialize<Oracle>>(
    solver: Solver<OInit>,
    ret: MaybeTerminatedError<SolverStatus>,
    offset: isize,
    cli: &Cli,
) -> anyhow::Result<()> {
    let mut best_effort = Vec::new();
    let status = match ret {
        MaybeTerminatedError::Done(status) => status,
        MaybeTerminatedError::Terminated(term) => {
            cli.log_termination(&term)?;
            let bounds = solver.bounds();
            cli.info(&format!(
                "bounds at termination: {} <= o <= {}",
                bounds.lower(),
                bounds.upper()
            ))?;
            if !solver.solutions().is_empty() {
                SolverStatus::Feasible
            } else if let Some(best) = solver.best_solution() {
                // an interrupted run still reports its incumbent
                best_effort.push(best);
                SolverStatus::Feasible
            } else {
                SolverStatus::Unknown
            }
        }
        MaybeTerminatedError::Error(err) => return Err(err),
    };

    let sols = if best_effort.is_empty() {
        solver.solutions()
    } else {
        &best_effort[..]
    };
    cli.print_outcome(status, sols, offset)?;
    cli.print_stats(solver.stats())?;
    cli.print_oracle_stats(solver.oracle_stats())?;

    Ok(())
}

struct CaDiCaLDefaultInit;

impl Initialize<CaDiCaL<'static, 'static>> for CaDiCaLDefaultInit {
    fn init() -> CaDiCaL<'static, 'static> {
        let mut slv = CaDiCaL::default();
        // ILB interacts badly with the heavy assumption use of IHS search
        slv.set_option("ilb", 0).unwrap();
        slv
    }
}

struct CaDiCaLPlainInit;

impl Initialize<CaDiCaL<'static, 'static>> for CaDiCaLPlainInit {
    fn init() -> CaDiCaL<'static, 'static> {
        let mut slv = CaDiCaL::default();
        slv.set_configuration(rustsat_cadical::Config::Plain)
            .expect("failed to set cadical config");
        // ILB interacts badly with the heavy assumption use of IHS search
        slv.set_option("ilb", 0).unwrap();
        slv
    }
}

struct CaDiCaLSatInit;

impl Initialize<CaDiCaL<'static, 'static>> for CaDiCaLSatInit {
    fn init() -> CaDiCaL<'static, 'static> {
        let mut slv = CaDiCaL::default();
        slv.set_configuration(rustsat_cadical::Config::Sat)
            .expect("failed to set cadical config");
        // ILB interacts badly with the heavy assumption use of IHS search
        slv.set_option("ilb", 0).unwrap();
        slv
    }
}

struct CaDiCaLUnsatInit;

impl Initialize<CaDiCaL<'static, 'static>> for CaDiCaLUnsatInit {
    fn init() -> CaDiCaL<'static, 'static> {
        let mut slv = CaDiCaL::default();
        slv.set_configuration(rustsat_cadical::Config::Unsat)
            .expect("failed to set cadical config");
        // ILB interacts badly with the heavy assumption use of IHS search
        slv.set_option("ilb", 0).unwrap();
        slv
    }
}
