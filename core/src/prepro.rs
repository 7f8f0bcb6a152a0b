//! # Instance Processing Happening _Before_ It's Being Passed To The Actual Solver

use std::{ffi::OsString, fmt, path::Path};

use rustsat::instances::{fio, ManageVars, OptInstance};

use crate::instance::Problem;

#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FileFormat {
    /// Infer the file format from the file extension. `.cnf`, `.wcnf` or `.dimacs` are
    /// interpreted as DIMACS files and `.opb` as an OPB file. All file extensions can also be
    /// prepended with `.bz2`, `.gz` or `.xz` if compression is used.
    Infer,
    /// A DIMACS WCNF file
    Dimacs,
    /// An OPB file with an objective
    Opb,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Infer => write!(f, "infer"),
            FileFormat::Dimacs => write!(f, "dimacs"),
            FileFormat::Opb => write!(f, "opb"),
        }
    }
}

macro_rules! is_one_of {
    ($a:expr, $($b:expr),*) => {
        $( $a == $b || )* false
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cannot infer file format from extension {0:?}")]
    UnknownFileExtension(OsString),
    #[error("To infer the file format, the file needs to have a file extension")]
    NoFileExtension,
}

pub fn parse<P: AsRef<Path>>(
    inst_path: P,
    file_format: FileFormat,
    opb_opts: fio::opb::Options,
) -> anyhow::Result<OptInstance> {
    let inst_path = inst_path.as_ref();
    let inst: OptInstance = match file_format {
        FileFormat::Infer => {
            if let Some(ext) = inst_path.extension() {
                let path_without_compr = inst_path.with_extension("");
                let ext = if is_one_of!(ext, "gz", "bz2", "xz") {
                    // Strip compression extension
                    match path_without_compr.extension() {
                        Some(ext) => ext,
                        None => anyhow::bail!(Error::NoFileExtension),
                    }
                } else {
                    ext
                };
                if is_one_of!(ext, "wcnf", "cnf", "dimacs") {
                    OptInstance::from_dimacs_path(inst_path)?
                } else if is_one_of!(ext, "opb") {
                    OptInstance::from_opb_path(inst_path, opb_opts)?
                } else {
                    anyhow::bail!(Error::UnknownFileExtension(OsString::from(ext)))
                }
            } else {
                anyhow::bail!(Error::NoFileExtension)
            }
        }
        FileFormat::Dimacs => OptInstance::from_dimacs_path(inst_path)?,
        FileFormat::Opb => OptInstance::from_opb_path(inst_path, opb_opts)?,
    };
    Ok(inst)
}

/// Converts a parsed instance into the solver's problem state
///
/// Every soft clause gets a blocking variable; identical soft clauses are merged with their
/// weights summed. Returns the problem together with the constant objective offset the parser
/// extracted, which needs to be added to every reported cost.
pub fn build_problem(inst: OptInstance) -> (Problem, isize) {
    let (constr, obj) = inst.decompose();
    let max_orig_var = constr.max_var().unwrap_or(rustsat::types::Var::new(0));
    let (cnf, vm) = constr.into_cnf();
    let mut problem = Problem::new(max_orig_var);
    if let Some(max_var) = vm.max_var() {
        problem.var_manager.increase_next_free(max_var + 1);
    }
    for clause in cnf {
        problem.add_hard_clause(clause);
    }
    let (soft_cls, offset) = obj.into_soft_cls();
    for (cl, w) in soft_cls {
        problem.add_soft_clause(cl, w);
    }
    (problem, offset)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_wcnf_and_builds_problem() {
        let mut file = tempfile::Builder::new()
            .suffix(".wcnf")
            .tempfile()
            .unwrap();
        writeln!(file, "h 1 2 0").unwrap();
        writeln!(file, "3 -1 0").unwrap();
        writeln!(file, "2 -2 0").unwrap();
        file.flush().unwrap();
        let inst = parse(file.path(), FileFormat::Infer, fio::opb::Options::default()).unwrap();
        let (problem, offset) = build_problem(inst);
        assert_eq!(offset, 0);
        assert_eq!(problem.n_hards(), 1);
        assert_eq!(problem.n_softs(), 2);
        assert_eq!(problem.total_weight(), 5);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();
        let res = parse(file.path(), FileFormat::Infer, fio::opb::Options::default());
        let err = res.unwrap_err().downcast::<Error>().unwrap();
        assert!(matches!(err, Error::UnknownFileExtension(_)));
    }
}
