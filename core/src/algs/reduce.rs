//! # Core Reduction
//!
//! Algorithms that shrink a discovered core before it is registered. A smaller core constrains
//! the hitting set problem more tightly, at the price of additional oracle calls. All reductions
//! work on the invariant that enforcing exactly the core's soft clauses (assuming the negation of
//! every member) is unsatisfiable, so every subset returned here must preserve that property.

use rand::seq::SliceRandom;
use rustsat::{
    encodings::card::{BoundUpper, BoundUpperIncremental, Totalizer},
    solvers::{LimitConflicts, SolveIncremental, SolveStats, SolverResult},
    types::{Lit, TernaryVal},
};

use crate::{options::ReductionAlg, Phase};

use super::SolverKernel;

impl<O, OInit, BCG> SolverKernel<O, OInit, BCG>
where
    O: SolveIncremental + LimitConflicts + SolveStats,
{
    /// Reduces a core with the configured algorithm, preceded by the re-refutation pre-pass if
    /// enabled
    pub(super) fn reduce_core(&mut self, mut core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if self.opts.rerefute_prepass && self.opts.reduction != ReductionAlg::ReRefute {
            core = self.rerefute_core(core)?;
        }
        core = match self.opts.reduction {
            ReductionAlg::None => core,
            ReductionAlg::ReRefute => self.rerefute_core(core)?,
            ReductionAlg::Destructive => self.destructive_reduce(core)?,
            ReductionAlg::Constructive => self.constructive_reduce(core)?,
            ReductionAlg::Binary => self.binary_reduce(core)?,
            ReductionAlg::Cardinality => self.cardinality_reduce(core)?,
        };
        Ok(core)
    }

    /// Re-refutes the core under its own assumptions until it stops shrinking
    ///
    /// Cheap compared to the other reductions since every call must be unsatisfiable and usually
    /// conflicts quickly.
    fn rerefute_core(&mut self, mut core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("rerefute")?;
        loop {
            let size_before = core.len();
            let assumps: Vec<_> = core.iter().map(|&b| !b).collect();
            let ret = self.solve_assumps(&assumps)?;
            anyhow::ensure!(
                ret == SolverResult::Unsat,
                "re-refuting a core did not conflict"
            );
            core = self.extract_core()?;
            if core.len() >= size_before || core.len() <= 1 {
                break;
            }
        }
        self.log_routine_end()?;
        Ok(core)
    }

    /// Drops literals one at a time, keeping the drop whenever the rest still conflicts
    ///
    /// Every conflicting oracle call returns a fresh subcore which may remove further literals at
    /// once; the scan resumes at the same position over the shrunk core.
    fn destructive_reduce(&mut self, mut core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("destructive reduction")?;
        // drop candidates in decreasing weight order so that expensive members go first
        self.sort_by_weight(&mut core);
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(self.opts.reduction_conflicts)?;
        let mut idx = 0;
        while idx < core.len() && core.len() > 1 {
            let assumps: Vec<_> = core
                .iter()
                .enumerate()
                .filter_map(|(i, &b)| if i == idx { None } else { Some(!b) })
                .collect();
            match self.solve_assumps(&assumps)? {
                SolverResult::Unsat => {
                    let sub = self.extract_core()?;
                    core.retain(|b| sub.contains(b));
                }
                SolverResult::Sat => {
                    self.update_incumbent(Phase::Reduction)?;
                    idx += 1;
                }
                SolverResult::Interrupted => {
                    // conflict budget exceeded, abandon the reduction
                    break;
                }
            }
        }
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(None)?;
        self.log_routine_end()?;
        Ok(core)
    }

    /// Builds a minimal core from confirmed critical literals in a random insertion order
    ///
    /// Grows a prefix of the remaining candidates on top of the confirmed set until the oracle
    /// conflicts; the literal tipping the prefix into conflict is critical and joins the
    /// confirmed set, the candidates behind it are dropped. Once the confirmed set conflicts on
    /// its own, it is a minimal core.
    fn constructive_reduce(&mut self, core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("constructive reduction")?;
        let mut candidates = core;
        candidates.shuffle(&mut self.rng);
        let mut confirmed: Vec<Lit> = Vec::new();
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(self.opts.reduction_conflicts)?;
        let reduced = 'outer: loop {
            if candidates.is_empty() {
                break confirmed;
            }
            let mut assumps: Vec<Lit> = confirmed.iter().map(|&b| !b).collect();
            if !confirmed.is_empty() {
                match self.solve_assumps(&assumps)? {
                    SolverResult::Unsat => break confirmed,
                    SolverResult::Sat => {
                        self.update_incumbent(Phase::Reduction)?;
                    }
                    SolverResult::Interrupted => {
                        confirmed.extend(candidates);
                        break confirmed;
                    }
                }
            }
            let mut i = 0;
            while i < candidates.len() {
                let cand = candidates[i];
                assumps.push(!cand);
                match self.solve_assumps(&assumps)? {
                    SolverResult::Unsat => {
                        confirmed.push(cand);
                        candidates.truncate(i);
                        continue 'outer;
                    }
                    SolverResult::Sat => {
                        self.update_incumbent(Phase::Reduction)?;
                    }
                    SolverResult::Interrupted => {
                        confirmed.extend(candidates);
                        break 'outer confirmed;
                    }
                }
                i += 1;
            }
            confirmed.extend(candidates);
            break confirmed;
        };
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(None)?;
        self.log_routine_end()?;
        Ok(reduced)
    }

    /// Builds a minimal core by binary-searching one critical literal per round
    ///
    /// For a random candidate order, binary search finds the shortest prefix that conflicts
    /// together with the confirmed set; its last literal is critical and joins the confirmed
    /// set, the candidates behind it are dropped. Repeats until the confirmed set conflicts on
    /// its own, confirming one literal in logarithmically many oracle calls per round.
    fn binary_reduce(&mut self, core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("binary reduction")?;
        let mut candidates = core;
        candidates.shuffle(&mut self.rng);
        let mut confirmed: Vec<Lit> = Vec::new();
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(self.opts.reduction_conflicts)?;
        let reduced = 'outer: loop {
            if candidates.is_empty() {
                break confirmed;
            }
            if !confirmed.is_empty() {
                let assumps: Vec<Lit> = confirmed.iter().map(|&b| !b).collect();
                match self.solve_assumps(&assumps)? {
                    SolverResult::Unsat => break confirmed,
                    SolverResult::Sat => {
                        self.update_incumbent(Phase::Reduction)?;
                    }
                    SolverResult::Interrupted => {
                        confirmed.extend(candidates);
                        break confirmed;
                    }
                }
            }
            // prefixes of length `sat` leave the oracle satisfiable, the one of length `unsat`
            // conflicts together with the confirmed set
            let mut sat = 0;
            let mut unsat = candidates.len();
            while unsat - sat > 1 {
                let mid = sat + (unsat - sat) / 2;
                let assumps: Vec<Lit> = confirmed
                    .iter()
                    .chain(&candidates[..mid])
                    .map(|&b| !b)
                    .collect();
                match self.solve_assumps(&assumps)? {
                    SolverResult::Unsat => unsat = mid,
                    SolverResult::Sat => {
                        self.update_incumbent(Phase::Reduction)?;
                        sat = mid;
                    }
                    SolverResult::Interrupted => {
                        confirmed.extend(candidates);
                        break 'outer confirmed;
                    }
                }
            }
            confirmed.push(candidates[unsat - 1]);
            candidates.truncate(unsat - 1);
        };
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(None)?;
        self.log_routine_end()?;
        Ok(reduced)
    }

    /// Extracts a minimal core by restricting how many candidates may be relaxed
    ///
    /// With the confirmed members enforced and at most one candidate left free by a totalizer
    /// counter, a model pinpoints the single candidate whose clause cannot be enforced; that
    /// candidate lies in every core within the current set and is confirmed. A conflict that
    /// does not involve the counter proves the confirmed set conflicts on its own, and since
    /// every member was confirmed critical, it is a minimal core. A conflict through the counter
    /// drops the lightest candidate and rebuilds it. The result is a minimal core within the
    /// input, not necessarily the smallest one.
    fn cardinality_reduce(&mut self, mut core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("cardinality reduction")?;
        self.sort_by_weight(&mut core);
        let mut candidates = core;
        let mut confirmed: Vec<Lit> = Vec::new();
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(self.opts.reduction_conflicts)?;
        let reduced = loop {
            if candidates.is_empty() {
                break confirmed;
            }
            let mut tot: Totalizer = candidates.iter().copied().collect();
            tot.encode_ub_change(1..2, &mut self.oracle, &mut self.problem.var_manager)?;
            let mut assumps = tot.enforce_ub(1)?;
            assumps.extend(confirmed.iter().map(|&b| !b));
            match self.solve_assumps(&assumps)? {
                SolverResult::Sat => {
                    self.update_incumbent(Phase::Reduction)?;
                    let sol = self.get_solution()?;
                    // the counter admits a single relaxed candidate, and some candidate clause
                    // must be violated since the full set is a core
                    let Some(pos) = candidates
                        .iter()
                        .position(|&b| sol.lit_value(b) == TernaryVal::True)
                    else {
                        confirmed.extend(candidates);
                        break confirmed;
                    };
                    confirmed.push(candidates.remove(pos));
                }
                SolverResult::Unsat => {
                    let raw = self.oracle.core()?;
                    let counter_conflict = raw
                        .iter()
                        .any(|l| !self.problem.weights().contains_key(&l.var().pos_lit()));
                    if !counter_conflict {
                        break confirmed;
                    }
                    // the counter itself is in conflict, retry with one candidate fewer
                    candidates.pop();
                }
                SolverResult::Interrupted => {
                    confirmed.extend(candidates);
                    break confirmed;
                }
            }
        };
        #[cfg(feature = "limit-conflicts")]
        self.oracle.limit_conflicts(None)?;
        self.log_routine_end()?;
        Ok(reduced)
    }

    /// Sorts core literals by decreasing weight, breaking ties towards higher variable indices
    fn sort_by_weight(&self, core: &mut [Lit]) {
        let weights = self.problem.weights();
        core.sort_unstable_by(|a, b| weights[b].cmp(&weights[a]).then(b.cmp(a)));
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{
        clause, lit,
        types::{Assignment, Clause, Lit},
        var,
    };
    use rustsat_cadical::CaDiCaL;

    use crate::{
        algs::{default_blocking_clause, SolverKernel},
        instance::Problem,
        options::KernelOptions,
    };

    type Kernel = SolverKernel<CaDiCaL<'static, 'static>>;

    /// Four unit softs of which only the first two conflict under the hard clause
    fn conflict_kernel() -> (Kernel, Vec<Lit>) {
        let mut problem = Problem::new(var![3]);
        problem.add_hard_clause(clause![!lit![0], !lit![1]]);
        let bvars = vec![
            problem.add_soft_clause(clause![lit![0]], 1),
            problem.add_soft_clause(clause![lit![1]], 2),
            problem.add_soft_clause(clause![lit![2]], 3),
            problem.add_soft_clause(clause![lit![3]], 4),
        ];
        let kernel = SolverKernel::new(
            problem,
            default_blocking_clause as fn(Assignment) -> Clause,
            KernelOptions::default(),
        )
        .unwrap();
        (kernel, bvars)
    }

    fn sorted(mut lits: Vec<Lit>) -> Vec<Lit> {
        lits.sort_unstable();
        lits
    }

    #[test]
    fn destructive_finds_the_minimal_subset() {
        let (mut kernel, bvars) = conflict_kernel();
        let reduced = kernel.destructive_reduce(bvars.clone()).unwrap();
        assert_eq!(sorted(reduced), vec![bvars[0], bvars[1]]);
    }

    #[test]
    fn constructive_and_binary_certify_minimality() {
        let (mut kernel, bvars) = conflict_kernel();
        let reduced = kernel.constructive_reduce(bvars.clone()).unwrap();
        assert_eq!(sorted(reduced), vec![bvars[0], bvars[1]]);
        let reduced = kernel.binary_reduce(bvars.clone()).unwrap();
        assert_eq!(sorted(reduced), vec![bvars[0], bvars[1]]);
    }

    #[test]
    fn cardinality_returns_a_minimal_core() {
        let (mut kernel, bvars) = conflict_kernel();
        let reduced = kernel.cardinality_reduce(bvars.clone()).unwrap();
        assert_eq!(sorted(reduced), vec![bvars[0], bvars[1]]);
    }

    #[test]
    fn reducing_a_minimal_core_changes_nothing() {
        let (mut kernel, bvars) = conflict_kernel();
        let minimal = vec![bvars[0], bvars[1]];
        let reduced = kernel.destructive_reduce(minimal.clone()).unwrap();
        assert_eq!(sorted(reduced), minimal);
        let reduced = kernel.constructive_reduce(minimal.clone()).unwrap();
        assert_eq!(sorted(reduced), minimal);
        let reduced = kernel.binary_reduce(minimal.clone()).unwrap();
        assert_eq!(sorted(reduced), minimal);
        let reduced = kernel.cardinality_reduce(minimal.clone()).unwrap();
        assert_eq!(sorted(reduced), minimal);
    }
}
