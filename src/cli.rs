//! # Command Line Interface for the Solver Binary

use std::io::Error as IOError;
use std::path::PathBuf;
use std::time::Duration;
use std::{
    fmt::{self},
    io::Write,
};

use clap::{crate_authors, crate_name, crate_version, Args, Parser, ValueEnum};
use cpu_time::ProcessTime;
use maxhs_core::{
    options::{NonOptAlg, NonOptOptions},
    prepro::FileFormat,
    EnumOptions, KernelOptions, Limits, Phase, ReductionAlg, SolverStatus, Stats, Termination,
    WriteSolverLog,
};
use rustsat::{
    instances::fio,
    solvers::{SolverResult, SolverStats},
    types::Assignment,
};
use termcolor::{Buffer, BufferWriter, Color, ColorSpec, WriteColor};

macro_rules! none_if_zero {
    ($val:expr) => {
        if $val == 0 {
            None
        } else {
            Some($val)
        }
    };
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// The core reduction performed on every discovered core
    #[arg(long, default_value_t = KernelOptions::default().reduction)]
    reduction: ReductionAlg,
    /// Re-refute every core once before the configured reduction runs
    #[arg(long)]
    rerefute_prepass: bool,
    /// Conflict budget for each oracle call inside core reduction (0 for no budget)
    #[arg(long, default_value_t = 1000)]
    reduction_conflicts: u32,
    /// The primary non-optimal hitting set heuristic
    #[arg(long, default_value_t = NonOptArg::Disjoint)]
    nonopt_primary: NonOptArg,
    /// The secondary non-optimal hitting set heuristic
    #[arg(long, default_value_t = NonOptArg::Greedy)]
    nonopt_secondary: NonOptArg,
    /// Limit the number of consecutive non-optimal iterations (0 for no limit)
    #[arg(long, default_value_t = 0)]
    nonopt_limit: usize,
    /// The fraction of a core the fractional heuristic hits
    #[arg(long, default_value_t = NonOptOptions::default().frac_size)]
    frac_size: f64,
    /// Accumulate disjoint cores before the main loop starts
    #[arg(long, default_value_t = Bool::from(KernelOptions::default().disjoint_presolve))]
    disjoint_presolve: Bool,
    /// Seed blocking-variable equivalences derived from unit soft clauses
    #[arg(long, default_value_t = Bool::from(KernelOptions::default().equivalence_seeding))]
    equivalence_seeding: Bool,
    /// Tighten the lower bound with the LP relaxation of the hitting set problem
    #[arg(long)]
    lp_bounding: bool,
    /// Harden blocking variables whose weight can no longer be paid
    #[arg(long, default_value_t = Bool::from(KernelOptions::default().hardening))]
    hardening: Bool,
    /// Time limit per exact hitting set computation in seconds (0 for no limit)
    #[arg(long, default_value_t = 0.)]
    hs_time_limit: f64,
    /// Seed for all randomized literal orders
    #[arg(long, default_value_t = KernelOptions::default().seed)]
    seed: u64,
    /// The CaDiCaL profile to use
    #[arg(long, default_value_t = CadicalConfig::Default)]
    cadical_config: CadicalConfig,
    #[command(flatten)]
    enumeration: EnumArgs,
    #[command(flatten)]
    limits: LimitArgs,
    #[command(flatten)]
    file: FileArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct EnumArgs {
    /// The type of solution enumeration to perform
    #[arg(long, default_value_t = EnumOptionsArg::NoEnum)]
    enumeration: EnumOptionsArg,
    /// The limit for solution enumeration (0 for no limit)
    #[arg(long, default_value_t = 0)]
    enumeration_limit: usize,
    /// Absolute cost tolerance over the optimum for enumerated solutions
    #[arg(long, default_value_t = 0)]
    enumeration_tolerance: usize,
}

#[derive(Args)]
struct LimitArgs {
    /// Limit the number of solutions to discover (0 is no limit)
    #[arg(long, default_value_t = 0)]
    sol_limit: usize,
    /// Limit the number of SAT oracle calls (0 is no limit)
    #[arg(long, default_value_t = 0)]
    oracle_call_limit: usize,
    /// Limit the number of exact hitting set computations (0 is no limit)
    #[arg(long, default_value_t = 0)]
    hs_call_limit: usize,
}

impl From<&LimitArgs> for Limits {
    fn from(args: &LimitArgs) -> Limits {
        Limits {
            sols: none_if_zero!(args.sol_limit),
            oracle_calls: none_if_zero!(args.oracle_call_limit),
            hs_calls: none_if_zero!(args.hs_call_limit),
        }
    }
}

#[derive(Args)]
struct FileArgs {
    /// The file format of the input file. With infer, the file format is
    /// inferred from the file extension.
    #[arg(long, value_enum, default_value_t = FileFormat::Infer)]
    file_format: FileFormat,
    /// The index in the OPB file to treat as the lowest variable
    #[arg(long, default_value_t = 0)]
    first_var_idx: u32,
    /// The path to the instance file to load. Compressed files with an
    /// extension like `.bz2` or `.gz` can be read.
    inst_path: PathBuf,
}

#[derive(Args)]
struct LogArgs {
    #[command(flatten)]
    color: concolor_clap::Color,
    /// Print the solver configuration
    #[arg(long)]
    print_solver_config: bool,
    /// Don't print the model of the optimal solution
    #[arg(long)]
    no_print_solutions: bool,
    /// Don't print statistics
    #[arg(long)]
    no_print_stats: bool,
    /// Verbosity of the solver output
    #[arg(short, long, default_value_t = 0)]
    verbosity: u8,
    /// Log candidates along the search trace
    #[arg(long)]
    log_candidates: bool,
    /// Log found solutions as they are discovered
    #[arg(long)]
    log_solutions: bool,
    /// Log SAT oracle calls
    #[arg(long)]
    log_oracle_calls: bool,
    /// Log extracted cores
    #[arg(long)]
    log_cores: bool,
    /// Log hitting set computations
    #[arg(long)]
    log_hitting_sets: bool,
    /// Log updates of the cost bounds
    #[arg(long)]
    log_bounds: bool,
    /// Log routine starts and ends till a given depth
    #[arg(long, default_value_t = 0)]
    log_routines: usize,
}

impl From<&LogArgs> for LoggerConfig {
    fn from(args: &LogArgs) -> LoggerConfig {
        LoggerConfig {
            log_candidates: args.log_candidates || args.verbosity >= 2,
            log_solutions: args.log_solutions || args.verbosity >= 1,
            log_oracle_calls: args.log_oracle_calls || args.verbosity >= 3,
            log_cores: args.log_cores || args.verbosity >= 2,
            log_hitting_sets: args.log_hitting_sets || args.verbosity >= 2,
            log_bounds: args.log_bounds || args.verbosity >= 1,
            log_routines: std::cmp::max(args.log_routines, args.verbosity as usize * 2),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Bool {
    /// Turn on feature
    True,
    /// Turn off feature
    False,
}

impl From<Bool> for bool {
    fn from(val: Bool) -> bool {
        val == Bool::True
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool::True => write!(f, "true"),
            Bool::False => write!(f, "false"),
        }
    }
}

impl From<bool> for Bool {
    fn from(val: bool) -> Self {
        if val {
            Bool::True
        } else {
            Bool::False
        }
    }
}

/// A non-optimal hitting set heuristic slot, which may be left empty
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum NonOptArg {
    /// Do not run a heuristic in this slot
    None,
    /// Hit every stored core in its most frequent literal
    Common,
    /// Greedy weighted set cover over the unhit cores
    Greedy,
    /// Extend the hitting set with entire freshly found disjoint cores
    Disjoint,
    /// Hit every stored core in a fraction of its least frequent literals
    Fractional,
}

impl From<NonOptArg> for Option<NonOptAlg> {
    fn from(arg: NonOptArg) -> Self {
        match arg {
            NonOptArg::None => None,
            NonOptArg::Common => Some(NonOptAlg::Common),
            NonOptArg::Greedy => Some(NonOptAlg::Greedy),
            NonOptArg::Disjoint => Some(NonOptAlg::Disjoint),
            NonOptArg::Fractional => Some(NonOptAlg::Fractional),
        }
    }
}

impl fmt::Display for NonOptArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonOptArg::None => write!(f, "none"),
            NonOptArg::Common => write!(f, "common"),
            NonOptArg::Greedy => write!(f, "greedy"),
            NonOptArg::Disjoint => write!(f, "disjoint"),
            NonOptArg::Fractional => write!(f, "fractional"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CadicalConfig {
    /// Set default advanced internal options
    Default,
    /// Disable all internal preprocessing options
    Plain,
    /// Set internal options to target satisfiable instances
    Sat,
    /// Set internal options to target unsatisfiable instances
    Unsat,
}

impl fmt::Display for CadicalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CadicalConfig::Default => write!(f, "default"),
            CadicalConfig::Plain => write!(f, "plain"),
            CadicalConfig::Sat => write!(f, "sat"),
            CadicalConfig::Unsat => write!(f, "unsat"),
        }
    }
}

#[derive(Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum EnumOptionsArg {
    #[default]
    /// Stop after the first optimal solution
    NoEnum,
    /// Enumerate distinct solutions within the tolerance of the optimal cost
    Solutions,
}

impl fmt::Display for EnumOptionsArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumOptionsArg::NoEnum => write!(f, "no-enum"),
            EnumOptionsArg::Solutions => write!(f, "solutions"),
        }
    }
}

pub struct Cli {
    pub opts: KernelOptions,
    pub limits: Limits,
    pub file_format: FileFormat,
    pub opb_options: fio::opb::Options,
    pub inst_path: PathBuf,
    pub cadical_config: CadicalConfig,
    stdout: BufferWriter,
    stderr: BufferWriter,
    print_solver_config: bool,
    print_solutions: bool,
    print_stats: bool,
    color: concolor_clap::Color,
    logger_config: LoggerConfig,
}

impl Cli {
    pub fn init() -> Self {
        let writer = |stream: atty::Stream, color: concolor_clap::Color| {
            let choice = match color.color {
                concolor_clap::ColorChoice::Always => termcolor::ColorChoice::Always,
                concolor_clap::ColorChoice::Never => termcolor::ColorChoice::Never,
                concolor_clap::ColorChoice::Auto => {
                    if atty::is(stream) {
                        termcolor::ColorChoice::Auto
                    } else {
                        termcolor::ColorChoice::Never
                    }
                }
            };
            match stream {
                atty::Stream::Stdout => BufferWriter::stdout(choice),
                _ => BufferWriter::stderr(choice),
            }
        };
        let args = CliArgs::parse();
        let opts = KernelOptions {
            reduction: args.reduction,
            rerefute_prepass: args.rerefute_prepass,
            nonopt: NonOptOptions {
                primary: args.nonopt_primary.into(),
                secondary: args.nonopt_secondary.into(),
                iter_limit: none_if_zero!(args.nonopt_limit),
                frac_size: args.frac_size,
            },
            disjoint_presolve: args.disjoint_presolve.into(),
            equivalence_seeding: args.equivalence_seeding.into(),
            lp_bounding: args.lp_bounding,
            hardening: args.hardening.into(),
            enumeration: match args.enumeration.enumeration {
                EnumOptionsArg::NoEnum => EnumOptions::NoEnum,
                EnumOptionsArg::Solutions => EnumOptions::Solutions {
                    limit: none_if_zero!(args.enumeration.enumeration_limit),
                    tolerance: args.enumeration.enumeration_tolerance,
                },
            },
            hs_time_limit: if args.hs_time_limit > 0. {
                Some(Duration::from_secs_f64(args.hs_time_limit))
            } else {
                None
            },
            seed: args.seed,
            reduction_conflicts: none_if_zero!(args.reduction_conflicts),
        };
        Cli {
            opts,
            limits: (&args.limits).into(),
            file_format: args.file.file_format,
            opb_options: fio::opb::Options {
                first_var_idx: args.file.first_var_idx,
                ..Default::default()
            },
            inst_path: args.file.inst_path,
            cadical_config: args.cadical_config,
            stdout: writer(atty::Stream::Stdout, args.log.color),
            stderr: writer(atty::Stream::Stderr, args.log.color),
            print_solver_config: args.log.print_solver_config,
            print_solutions: !args.log.no_print_solutions,
            print_stats: !args.log.no_print_stats,
            color: args.log.color,
            logger_config: (&args.log).into(),
        }
    }

    pub fn new_cli_logger(&self) -> CliLogger {
        CliLogger {
            stdout: BufferWriter::stdout(match self.color.color {
                concolor_clap::ColorChoice::Always => termcolor::ColorChoice::Always,
                concolor_clap::ColorChoice::Never => termcolor::ColorChoice::Never,
                concolor_clap::ColorChoice::Auto => {
                    if atty::is(atty::Stream::Stdout) {
                        termcolor::ColorChoice::Auto
                    } else {
                        termcolor::ColorChoice::Never
                    }
                }
            }),
            config: self.logger_config.clone(),
            routine_stack: vec![],
        }
    }

    pub fn warning(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Yellow)))?;
        write!(buffer, "warning")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn error(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Red)))?;
        write!(buffer, "error")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn info(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "info")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn log_termination(&self, term: &Termination) -> Result<(), IOError> {
        self.warning(&format!("{}", term))
    }

    pub fn print_header(&self) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Green)))?;
        write!(buffer, "c {}", crate_name!())?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, " ({})", crate_version!())?;
        buffer.reset()?;
        writeln!(buffer, "c {}", crate_authors!("\nc "))?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, "c ==============================")?;
        buffer.reset()?;
        writeln!(buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_solver_config(&self) -> Result<(), IOError> {
        if self.print_solver_config {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
            write!(buffer, "Solver Config")?;
            buffer.reset()?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": ")?;
            buffer.reset()?;
            Self::print_parameter(&mut buffer, "reduction", self.opts.reduction)?;
            Self::print_parameter(&mut buffer, "rerefute-prepass", self.opts.rerefute_prepass)?;
            Self::print_parameter(
                &mut buffer,
                "reduction-conflicts",
                OptVal::new(self.opts.reduction_conflicts),
            )?;
            Self::print_parameter(
                &mut buffer,
                "nonopt-primary",
                OptVal::new(self.opts.nonopt.primary),
            )?;
            Self::print_parameter(
                &mut buffer,
                "nonopt-secondary",
                OptVal::new(self.opts.nonopt.secondary),
            )?;
            Self::print_parameter(
                &mut buffer,
                "nonopt-limit",
                OptVal::new(self.opts.nonopt.iter_limit),
            )?;
            Self::print_parameter(&mut buffer, "frac-size", self.opts.nonopt.frac_size)?;
            Self::print_parameter(
                &mut buffer,
                "disjoint-presolve",
                self.opts.disjoint_presolve,
            )?;
            Self::print_parameter(
                &mut buffer,
                "equivalence-seeding",
                self.opts.equivalence_seeding,
            )?;
            Self::print_parameter(&mut buffer, "lp-bounding", self.opts.lp_bounding)?;
            Self::print_parameter(&mut buffer, "hardening", self.opts.hardening)?;
            Self::print_parameter(
                &mut buffer,
                "enumeration",
                EnumPrinter::new(self.opts.enumeration),
            )?;
            Self::print_parameter(
                &mut buffer,
                "hs-time-limit",
                OptVal::new(self.opts.hs_time_limit.map(DurPrinter::new)),
            )?;
            Self::print_parameter(&mut buffer, "seed", self.opts.seed)?;
            Self::print_parameter(&mut buffer, "cadical-config", self.cadical_config)?;
            Self::print_parameter(&mut buffer, "sol-limit", OptVal::new(self.limits.sols))?;
            Self::print_parameter(
                &mut buffer,
                "oracle-call-limit",
                OptVal::new(self.limits.oracle_calls),
            )?;
            Self::print_parameter(
                &mut buffer,
                "hs-call-limit",
                OptVal::new(self.limits.hs_calls),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    /// Prints the solve outcome in the MaxSAT evaluation format
    ///
    /// `offset` is the constant cost offset introduced when the objective was converted to soft
    /// clauses.
    pub fn print_outcome(
        &self,
        status: SolverStatus,
        sols: &[(usize, Assignment)],
        offset: isize,
    ) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        match status {
            SolverStatus::Unsat => {
                buffer.set_color(ColorSpec::new().set_bold(true))?;
                writeln!(buffer, "s UNSATISFIABLE")?;
                buffer.reset()?;
            }
            SolverStatus::Optimal => {
                for (cost, sol) in sols {
                    writeln!(buffer, "o {}", *cost as isize + offset)?;
                    if self.print_solutions {
                        writeln!(buffer, "v {}", sol)?;
                    }
                }
                buffer.set_color(ColorSpec::new().set_bold(true))?;
                writeln!(buffer, "s OPTIMUM FOUND")?;
                buffer.reset()?;
            }
            SolverStatus::Feasible => {
                if let Some((cost, sol)) = sols.first() {
                    writeln!(buffer, "o {}", *cost as isize + offset)?;
                    if self.print_solutions {
                        writeln!(buffer, "v {}", sol)?;
                    }
                }
                buffer.set_color(ColorSpec::new().set_bold(true))?;
                writeln!(buffer, "s UNKNOWN")?;
                buffer.reset()?;
            }
            SolverStatus::Unknown => {
                buffer.set_color(ColorSpec::new().set_bold(true))?;
                writeln!(buffer, "s UNKNOWN")?;
                buffer.reset()?;
            }
        }
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_stats(&self, stats: Stats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
            write!(buffer, "Solver Stats")?;
            buffer.reset()?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": ")?;
            buffer.reset()?;
            Self::print_parameter(&mut buffer, "n-solve-calls", stats.n_solve_calls)?;
            Self::print_parameter(&mut buffer, "n-solutions", stats.n_sols)?;
            Self::print_parameter(&mut buffer, "n-oracle-calls", stats.n_oracle_calls)?;
            Self::print_parameter(&mut buffer, "n-hs-calls", stats.n_hs_calls)?;
            Self::print_parameter(&mut buffer, "n-nonopt-calls", stats.n_nonopt_calls)?;
            Self::print_parameter(&mut buffer, "n-cores", stats.n_cores)?;
            Self::print_parameter(&mut buffer, "n-orig-hard-clauses", stats.n_orig_hards)?;
            Self::print_parameter(&mut buffer, "n-orig-soft-clauses", stats.n_orig_softs)?;
            if stats.n_cores > 0 {
                Self::print_parameter(
                    &mut buffer,
                    "avg-core-len",
                    stats.sum_core_len as f64 / stats.n_cores as f64,
                )?;
                Self::print_parameter(
                    &mut buffer,
                    "avg-reduced-core-len",
                    stats.sum_reduced_len as f64 / stats.n_cores as f64,
                )?;
                Self::print_parameter(&mut buffer, "max-core-len", stats.max_core_len)?;
            }
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    pub fn print_oracle_stats(&self, stats: SolverStats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
            write!(buffer, "Oracle Stats")?;
            buffer.reset()?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": ")?;
            buffer.reset()?;
            Self::print_parameter(&mut buffer, "n-sat-solves", stats.n_sat)?;
            Self::print_parameter(&mut buffer, "n-unsat-solves", stats.n_unsat)?;
            Self::print_parameter(&mut buffer, "n-clauses", stats.n_clauses)?;
            Self::print_parameter(&mut buffer, "max-var", OptVal::new(stats.max_var))?;
            Self::print_parameter(&mut buffer, "avg-clause-len", stats.avg_clause_len)?;
            Self::print_parameter(
                &mut buffer,
                "cpu-solve-time",
                DurPrinter::new(stats.cpu_solve_time),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn print_parameter<V: fmt::Display>(
        buffer: &mut Buffer,
        name: &str,
        val: V,
    ) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(buffer, "c {}", name)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", val)?;
        Ok(())
    }

    fn start_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "c >>>>>")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }

    fn end_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "c <<<<<")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }
}

#[derive(Clone)]
struct LoggerConfig {
    log_candidates: bool,
    log_solutions: bool,
    log_oracle_calls: bool,
    log_cores: bool,
    log_hitting_sets: bool,
    log_bounds: bool,
    log_routines: usize,
}

pub struct CliLogger {
    stdout: BufferWriter,
    config: LoggerConfig,
    routine_stack: Vec<(&'static str, ProcessTime)>,
}

impl WriteSolverLog for CliLogger {
    fn log_candidate(&mut self, cost: usize, phase: Phase) -> anyhow::Result<()> {
        if self.config.log_candidates {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(buffer, "c candidate")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": cost: {}; phase: {}; cpu-time: {}",
                cost,
                phase,
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        if self.config.log_oracle_calls {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(buffer, "c oracle call")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": result: {}; cpu-time: {}",
                result,
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_solution(&mut self, cost: usize) -> anyhow::Result<()> {
        if self.config.log_solutions {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(buffer, "c solution")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": cost: {}; cpu-time: {}",
                cost,
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> anyhow::Result<()> {
        if self.config.log_cores {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(buffer, "c extracted core")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": weight: {}; original-len: {}; reduced-len: {}",
                weight, len, red_len,
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_hitting_set(&mut self, cost: usize, optimal: bool) -> anyhow::Result<()> {
        if self.config.log_hitting_sets {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(buffer, "c hitting set")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": cost: {}; kind: {}; cpu-time: {}",
                cost,
                if optimal { "exact" } else { "non-optimal" },
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_bounds(&mut self, lower: usize, upper: usize) -> anyhow::Result<()> {
        if self.config.log_bounds {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(buffer, "c bounds")?;
            buffer.reset()?;
            writeln!(
                buffer,
                ": lb: {}; ub: {}; cpu-time: {}",
                lower,
                upper,
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        self.routine_stack.push((desc, ProcessTime::now()));

        if self.config.log_routines >= self.routine_stack.len() {
            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(buffer, "c >>> routine start")?;
            buffer.reset()?;
            writeln!(buffer, ": {}", desc)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        let (desc, start) = self.routine_stack.pop().expect("routine stack out of sync");

        if self.config.log_routines > self.routine_stack.len() {
            let duration = ProcessTime::now().duration_since(start);

            let mut buffer = self.stdout.buffer();
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
            write!(buffer, "c <<< routine end")?;
            buffer.reset()?;
            writeln!(buffer, ": {}; duration: {}", desc, DurPrinter::new(duration))?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn log_end_solve(&mut self, _status: SolverStatus) -> anyhow::Result<()> {
        while !self.routine_stack.is_empty() {
            self.log_routine_end()?;
        }
        Ok(())
    }
}

struct OptVal<T> {
    val: Option<T>,
}

impl<T> OptVal<T> {
    fn new(val: Option<T>) -> Self {
        OptVal { val }
    }
}

impl<T: fmt::Display> fmt::Display for OptVal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.val {
            Some(t) => fmt::Display::fmt(&t, f),
            None => write!(f, "none"),
        }
    }
}

struct DurPrinter {
    dur: Duration,
}

impl DurPrinter {
    fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

impl fmt::Display for DurPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dur)
    }
}

struct EnumPrinter {
    enumeration: EnumOptions,
}

impl EnumPrinter {
    fn new(enumeration: EnumOptions) -> Self {
        Self { enumeration }
    }
}

impl fmt::Display for EnumPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.enumeration {
            EnumOptions::NoEnum => write!(f, "none"),
            EnumOptions::Solutions {
                limit: None,
                tolerance,
            } => write!(f, "all solutions (tolerance {})", tolerance),
            EnumOptions::Solutions {
                limit: Some(limit),
                tolerance,
            } => write!(f, "{} solutions (tolerance {})", limit, tolerance),
        }
    }
}

#[test]
fn verify_cli_args() {
    use clap::CommandFactory;
    CliArgs::command().debug_assert()
}
