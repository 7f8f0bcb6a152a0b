//! # Shared Types for the MaxHS Solver

use std::fmt;

use rustsat::{
    instances::ManageVars,
    types::{Lit, RsHashMap, Var},
};

/// Internal-consistency errors
///
/// These indicate a bug in the solver or a misbehaving oracle backend and are never recovered
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error("the SAT oracle returned an empty core")]
    EmptyCore,
    #[error("the hitting set solver reported infeasibility although the hard clauses are satisfiable")]
    InfeasibleHittingSet,
    #[error("forcing variable {0} emptied a stored core")]
    EmptiedCore(Var),
    #[error("lower bound {0} exceeds upper bound {1}")]
    BoundCrossing(usize, usize),
}

/// Status of a solve session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SolverStatus {
    /// The optimum has been found and proven
    Optimal,
    /// A solution is known but not proven optimal
    Feasible,
    /// The hard clauses are unsatisfiable
    Unsat,
    /// Nothing is known about the instance
    #[default]
    Unknown,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Optimal => write!(f, "optimal"),
            SolverStatus::Feasible => write!(f, "feasible"),
            SolverStatus::Unsat => write!(f, "unsatisfiable"),
            SolverStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The lower/upper bound pair on the optimal cost
///
/// The lower bound only ever increases, the upper bound only ever decreases (except for an
/// explicit reset when enumerating solutions). `lower <= upper` holds at all times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    lower: usize,
    upper: usize,
}

impl Bounds {
    pub fn new(upper: usize) -> Self {
        Bounds { lower: 0, upper }
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }

    /// Raises the lower bound. Returns whether the bound improved.
    pub fn improve_lower(&mut self, lower: usize) -> Result<bool, InternalError> {
        if lower <= self.lower {
            return Ok(false);
        }
        if lower > self.upper {
            return Err(InternalError::BoundCrossing(lower, self.upper));
        }
        self.lower = lower;
        Ok(true)
    }

    /// Lowers the upper bound. Returns whether the bound improved.
    pub fn improve_upper(&mut self, upper: usize) -> Result<bool, InternalError> {
        if upper >= self.upper {
            return Ok(false);
        }
        if upper < self.lower {
            return Err(InternalError::BoundCrossing(self.lower, upper));
        }
        self.upper = upper;
        Ok(true)
    }

    /// Resets the upper bound for the next enumeration round
    pub fn reset_upper(&mut self, upper: usize) {
        debug_assert!(upper >= self.lower);
        self.upper = upper;
    }

    /// Whether the bounds have met, proving optimality
    pub fn converged(&self) -> bool {
        self.lower == self.upper
    }
}

/// A discovered core with its validity flag
///
/// A core is invalidated when one of its members is permanently forced true, as the constraint it
/// represents is then trivially hit.
#[derive(Debug, Clone)]
pub struct StoredCore {
    pub lits: Vec<Lit>,
    /// The minimum weight over the members at discovery time
    pub weight: usize,
    valid: bool,
}

impl StoredCore {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// The collection of all registered cores with per-variable occurrence bookkeeping
#[derive(Debug, Default)]
pub struct CoreSet {
    cores: Vec<StoredCore>,
    occurrences: RsHashMap<Lit, usize>,
    largest: usize,
}

impl CoreSet {
    /// Registers a new core. Panics in debug builds if the core is empty; callers must catch
    /// empty cores at the oracle boundary.
    pub fn add(&mut self, lits: Vec<Lit>, weights: &RsHashMap<Lit, usize>) {
        debug_assert!(!lits.is_empty());
        let weight = lits
            .iter()
            .map(|l| weights.get(l).copied().unwrap_or(usize::MAX))
            .min()
            .unwrap_or(usize::MAX);
        for &lit in &lits {
            *self.occurrences.entry(lit).or_insert(0) += 1;
        }
        self.largest = std::cmp::max(self.largest, lits.len());
        self.cores.push(StoredCore {
            lits,
            weight,
            valid: true,
        });
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// The size of the largest core ever registered
    pub fn largest(&self) -> usize {
        self.largest
    }

    /// Iterates over all cores that are still valid constraints
    pub fn iter_valid(&self) -> impl Iterator<Item = &StoredCore> + '_ {
        self.cores.iter().filter(|core| core.valid)
    }

    /// The number of valid cores a literal occurs in
    pub fn occurrences(&self, lit: Lit) -> usize {
        self.occurrences.get(&lit).copied().unwrap_or(0)
    }

    pub fn occurrence_map(&self) -> &RsHashMap<Lit, usize> {
        &self.occurrences
    }

    /// Handles a variable being permanently forced true (always relaxed): every core containing
    /// it is trivially hit and gets invalidated.
    pub fn force_true(&mut self, lit: Lit) {
        for core in &mut self.cores {
            if core.valid && core.lits.contains(&lit) {
                core.valid = false;
                for &member in &core.lits {
                    if let Some(cnt) = self.occurrences.get_mut(&member) {
                        *cnt -= 1;
                    }
                }
            }
        }
    }

    /// Handles a variable being permanently forced false (never relaxed): it is pruned from
    /// every core it occurs in. A core emptied by pruning signals that the forcing step pruned a
    /// load-bearing literal, which is fatal.
    pub fn force_false(&mut self, lit: Lit) -> Result<(), InternalError> {
        for core in &mut self.cores {
            if !core.valid {
                continue;
            }
            let len_before = core.lits.len();
            core.lits.retain(|&l| l != lit);
            if core.lits.len() < len_before {
                if let Some(cnt) = self.occurrences.get_mut(&lit) {
                    *cnt -= 1;
                }
                if core.lits.is_empty() {
                    return Err(InternalError::EmptiedCore(lit.var()));
                }
            }
        }
        Ok(())
    }
}

/// Variable manager keeping track of the boundary between original instance variables and
/// auxiliary variables (blocking variables, gadget variables)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarManager {
    next_var: Var,
    max_orig_var: Var,
}

impl VarManager {
    /// Creates a new variable manager for an instance whose original variables end at
    /// `max_orig_var`
    pub fn new(max_orig_var: Var) -> Self {
        VarManager {
            max_orig_var,
            next_var: max_orig_var + 1,
        }
    }

    pub fn max_orig_var(&self) -> Var {
        self.max_orig_var
    }
}

impl Default for VarManager {
    fn default() -> Self {
        Self {
            next_var: Var::new(0),
            max_orig_var: Var::new(0),
        }
    }
}

impl ManageVars for VarManager {
    fn new_var(&mut self) -> Var {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    fn max_var(&self) -> Option<Var> {
        if self.next_var == Var::new(0) {
            None
        } else {
            Some(self.next_var - 1)
        }
    }

    fn increase_next_free(&mut self, v: Var) -> bool {
        if v > self.next_var {
            self.next_var = v;
            return true;
        };
        false
    }

    fn combine(&mut self, other: Self) {
        if other.next_var > self.next_var {
            self.next_var = other.next_var;
        };
    }

    fn n_used(&self) -> u32 {
        self.next_var.idx32()
    }

    fn forget_from(&mut self, min_var: Var) {
        self.next_var = std::cmp::min(self.next_var, min_var);
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::*;

    #[test]
    fn bounds_stay_ordered() {
        let mut bounds = Bounds::new(10);
        assert!(bounds.improve_lower(3).unwrap());
        assert!(bounds.improve_upper(7).unwrap());
        // non-improving updates are ignored
        assert!(!bounds.improve_lower(2).unwrap());
        assert!(!bounds.improve_upper(8).unwrap());
        assert_eq!((bounds.lower(), bounds.upper()), (3, 7));
        assert_eq!(
            bounds.improve_lower(8),
            Err(InternalError::BoundCrossing(8, 7))
        );
        assert!(bounds.improve_lower(7).unwrap());
        assert!(bounds.converged());
    }

    #[test]
    fn core_set_occurrences() {
        let mut weights = RsHashMap::default();
        weights.insert(lit![0], 2);
        weights.insert(lit![1], 5);
        weights.insert(lit![2], 1);
        let mut cores = CoreSet::default();
        cores.add(vec![lit![0], lit![1]], &weights);
        cores.add(vec![lit![1], lit![2]], &weights);
        assert_eq!(cores.occurrences(lit![1]), 2);
        assert_eq!(cores.iter_valid().map(|c| c.weight).collect::<Vec<_>>(), [2, 1]);
    }

    #[test]
    fn forcing_true_invalidates() {
        let mut weights = RsHashMap::default();
        weights.insert(lit![0], 1);
        weights.insert(lit![1], 1);
        let mut cores = CoreSet::default();
        cores.add(vec![lit![0], lit![1]], &weights);
        cores.force_true(lit![1]);
        assert_eq!(cores.iter_valid().count(), 0);
        assert_eq!(cores.occurrences(lit![0]), 0);
    }

    #[test]
    fn forcing_false_prunes_and_detects_emptiness() {
        let mut weights = RsHashMap::default();
        weights.insert(lit![0], 1);
        weights.insert(lit![1], 1);
        let mut cores = CoreSet::default();
        cores.add(vec![lit![0], lit![1]], &weights);
        cores.force_false(lit![1]).unwrap();
        assert_eq!(cores.iter_valid().next().unwrap().lits, [lit![0]]);
        assert_eq!(
            cores.force_false(lit![0]),
            Err(InternalError::EmptiedCore(lit![0].var()))
        );
    }
}
