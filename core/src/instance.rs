//! # Problem State
//!
//! The [`Problem`] is the single owner of all clauses, the blocking-variable bookkeeping and the
//! registered cores. Clauses and blocking variables are created once and are immutable
//! afterwards, except that a blocking variable may be permanently forced to a polarity, which
//! prunes it from all stored cores.

use anyhow::Context;
use rustsat::{
    instances::{Cnf, ManageVars},
    types::{Assignment, Clause, Lit, RsHashMap, TernaryVal},
};

use crate::types::{CoreSet, InternalError, VarManager};

/// A soft clause together with the blocking variable relaxing it
#[derive(Debug, Clone)]
pub struct SoftClause {
    pub lits: Clause,
    pub bvar: Lit,
}

/// The problem state of one solve session
#[derive(Debug, Default)]
pub struct Problem {
    hards: Cnf,
    softs: Vec<SoftClause>,
    /// Weight of each blocking variable (as its positive literal)
    weights: RsHashMap<Lit, usize>,
    /// Blocking variables of soft clauses seen so far, for deduplication
    blits: RsHashMap<Clause, Lit>,
    /// Number of soft clauses guarded by each blocking variable
    group_sizes: RsHashMap<Lit, usize>,
    /// Polarity each forced blocking variable is fixed to
    forced: RsHashMap<Lit, bool>,
    cores: CoreSet,
    pub(crate) var_manager: VarManager,
    total_weight: usize,
}

impl Problem {
    /// Creates an empty problem whose original variables end at `max_orig_var`
    pub fn new(max_orig_var: rustsat::types::Var) -> Self {
        Problem {
            var_manager: VarManager::new(max_orig_var),
            ..Default::default()
        }
    }

    /// Adds a hard clause that every solution must satisfy
    pub fn add_hard_clause(&mut self, clause: Clause) {
        self.hards.add_clause(clause);
    }

    /// Adds a soft clause with the given weight, returning its blocking variable
    ///
    /// A duplicate of a previously added soft clause reuses the existing blocking variable and
    /// accumulates the weight.
    pub fn add_soft_clause(&mut self, clause: Clause, weight: usize) -> Lit {
        debug_assert!(weight > 0);
        self.total_weight += weight;
        if let Some(&bvar) = self.blits.get(&clause) {
            *self.weights.get_mut(&bvar).expect("blit without weight") += weight;
            return bvar;
        }
        let bvar = self.var_manager.new_var().pos_lit();
        self.blits.insert(clause.clone(), bvar);
        self.weights.insert(bvar, weight);
        self.group_sizes.insert(bvar, 1);
        self.softs.push(SoftClause { lits: clause, bvar });
        bvar
    }

    /// Adds a soft clause jointly relaxed by an existing blocking variable
    ///
    /// The weight of the group is the one registered when the blocking variable was created; the
    /// group counts it once no matter how many of its clauses are violated.
    pub fn add_grouped_soft_clause(&mut self, bvar: Lit, clause: Clause) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.weights.contains_key(&bvar),
            "unknown blocking variable {bvar}"
        );
        *self
            .group_sizes
            .get_mut(&bvar)
            .context("blit without group size")? += 1;
        self.softs.push(SoftClause { lits: clause, bvar });
        Ok(())
    }

    pub fn n_hards(&self) -> usize {
        self.hards.len()
    }

    pub fn n_softs(&self) -> usize {
        self.softs.len()
    }

    /// The blocking variables with their weights
    pub fn weights(&self) -> &RsHashMap<Lit, usize> {
        &self.weights
    }

    /// The sum of all soft clause weights
    pub fn total_weight(&self) -> usize {
        self.total_weight
    }

    pub fn cores(&self) -> &CoreSet {
        &self.cores
    }

    /// Registers a discovered core over blocking variables
    pub fn register_core(&mut self, lits: Vec<Lit>) {
        self.cores.add(lits, &self.weights);
    }

    /// Iterates over the hard clauses
    pub fn hard_clauses(&self) -> impl Iterator<Item = &Clause> + '_ {
        self.hards.iter()
    }

    /// All blocking variables as positive literals, in increasing variable order
    pub fn bvars(&self) -> Vec<Lit> {
        let mut bvars: Vec<_> = self.weights.keys().copied().collect();
        bvars.sort_unstable();
        bvars
    }

    /// The polarity a blocking variable is forced to, if any
    pub fn forced_value(&self, bvar: Lit) -> Option<bool> {
        self.forced.get(&bvar).copied()
    }

    /// Iterates over the clauses the SAT oracle is loaded with: the hard clauses followed by the
    /// relaxed soft clauses
    pub fn oracle_clauses(&self) -> impl Iterator<Item = Clause> + '_ {
        self.hards.iter().cloned().chain(self.softs.iter().map(|soft| {
            let mut relaxed = soft.lits.clone();
            relaxed.add(soft.bvar);
            relaxed
        }))
    }

    /// Derives blocking-variable equivalences from unit soft clauses
    ///
    /// For a unit soft clause `(l)` guarded by a dedicated blocking variable `b`, the value of
    /// `b` in any cost-minimal solution equals `¬l`. Returns `(b, l)` pairs; blocking variables
    /// shared by a group are skipped since their value is not uniquely determined by one clause.
    pub fn bvar_equivalences(&self) -> Vec<(Lit, Lit)> {
        self.softs
            .iter()
            .filter(|soft| {
                soft.lits.len() == 1 && self.group_sizes.get(&soft.bvar) == Some(&1)
            })
            .map(|soft| (soft.bvar, soft.lits[0]))
            .collect()
    }

    /// Computes the true violated weight of a model, independently of any blocking-variable
    /// assignment
    ///
    /// A blocking variable's weight counts only if at least one of the clauses it guards is
    /// actually falsified, even if the variable itself was assumed relaxed.
    pub fn solution_cost(&self, sol: &Assignment) -> usize {
        let mut violated: RsHashMap<Lit, bool> = RsHashMap::default();
        for soft in &self.softs {
            let satisfied = soft
                .lits
                .iter()
                .any(|&l| sol.lit_value(l) == TernaryVal::True);
            let entry = violated.entry(soft.bvar).or_insert(false);
            *entry |= !satisfied;
        }
        violated
            .into_iter()
            .filter(|&(_, viol)| viol)
            .map(|(bvar, _)| self.weights[&bvar])
            .sum()
    }

    /// Permanently forces a blocking variable to the polarity of `lit`
    ///
    /// Forcing true invalidates every core containing the variable; forcing false prunes the
    /// variable from all cores, which must stay non-empty.
    pub fn force_bvar(&mut self, lit: Lit) -> Result<(), InternalError> {
        let bvar = lit.var().pos_lit();
        self.forced.insert(bvar, lit.is_pos());
        if lit.is_pos() {
            self.cores.force_true(bvar);
            Ok(())
        } else {
            self.cores.force_false(bvar)
        }
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{clause, lit};

    use super::*;

    #[test]
    fn fresh_bvars_are_disjoint() {
        let mut prob = Problem::new(rustsat::var![1]);
        let b1 = prob.add_soft_clause(clause![lit![0]], 1);
        let b2 = prob.add_soft_clause(clause![lit![1]], 2);
        assert_ne!(b1, b2);
        assert!(b1.var() > rustsat::var![1]);
        assert!(b2.var() > rustsat::var![1]);
        assert_eq!(prob.total_weight(), 3);
    }

    #[test]
    fn duplicate_softs_accumulate() {
        let mut prob = Problem::new(rustsat::var![1]);
        let b1 = prob.add_soft_clause(clause![lit![0], lit![1]], 1);
        let b2 = prob.add_soft_clause(clause![lit![0], lit![1]], 2);
        assert_eq!(b1, b2);
        assert_eq!(prob.weights()[&b1], 3);
        assert_eq!(prob.n_softs(), 1);
    }

    #[test]
    fn equivalences_skip_groups() {
        let mut prob = Problem::new(rustsat::var![2]);
        let b1 = prob.add_soft_clause(clause![lit![0]], 1);
        let b2 = prob.add_soft_clause(clause![!lit![1]], 1);
        prob.add_grouped_soft_clause(b2, clause![lit![2]]).unwrap();
        let equivs = prob.bvar_equivalences();
        assert_eq!(equivs, vec![(b1, lit![0])]);
    }

    #[test]
    fn solution_cost_counts_groups_once() {
        let mut prob = Problem::new(rustsat::var![2]);
        let b = prob.add_soft_clause(clause![lit![0]], 3);
        prob.add_grouped_soft_clause(b, clause![lit![1]]).unwrap();
        prob.add_soft_clause(clause![lit![2]], 1);
        // both clauses of the group violated, the singleton satisfied
        let sol: Assignment = vec![!lit![0], !lit![1], lit![2]].into_iter().collect();
        assert_eq!(prob.solution_cost(&sol), 3);
    }

    #[test]
    fn forcing_is_recorded() {
        let mut prob = Problem::new(rustsat::var![0]);
        let b = prob.add_soft_clause(clause![lit![0]], 1);
        prob.force_bvar(!b).unwrap();
        assert_eq!(prob.forced_value(b), Some(false));
    }
}
