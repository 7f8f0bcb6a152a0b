//! # Non-Optimal Hitting Set Heuristics
//!
//! Cheap replacements for an exact hitting set computation. A heuristic hitting set does not
//! yield a lower bound, but refuting it with the oracle can still produce new cores, so a run of
//! heuristic iterations saves expensive exact computations. The primary heuristic extends the
//! hitting set of the last exact computation; only `greedy` rebuilds it from scratch.

use rustsat::types::{Lit, RsHashMap};

use crate::types::CoreSet;

/// Extends the hitting set to hit the new core in its most frequent literal
///
/// Does nothing if the core is already hit. Ties are broken towards the lowest variable index.
pub(super) fn common(hs: &mut Vec<Lit>, new_core: &[Lit], occurrences: &RsHashMap<Lit, usize>) {
    if new_core.iter().any(|l| hs.contains(l)) {
        return;
    }
    let pick = new_core
        .iter()
        .copied()
        .max_by_key(|l| (occurrences.get(l).copied().unwrap_or(0), std::cmp::Reverse(*l)));
    if let Some(pick) = pick {
        hs.push(pick);
    }
}

/// Extends the hitting set with every member of the new core
///
/// After an exact computation, consecutive cores found this way are disjoint from each other,
/// which makes each of them raise the optimal hitting set cost.
pub(super) fn disjoint(hs: &mut Vec<Lit>, new_core: &[Lit]) {
    for &l in new_core {
        if !hs.contains(&l) {
            hs.push(l);
        }
    }
}

/// Extends the hitting set with a fraction of the new core, least frequent literals first
pub(super) fn fractional(
    frac_size: f64,
    hs: &mut Vec<Lit>,
    new_core: &[Lit],
    occurrences: &RsHashMap<Lit, usize>,
) {
    if new_core.iter().any(|l| hs.contains(l)) {
        return;
    }
    let mut take = (new_core.len() as f64 * frac_size).ceil() as usize;
    let mut by_count: Vec<_> = new_core
        .iter()
        .map(|&l| (occurrences.get(&l).copied().unwrap_or(0), l))
        .collect();
    by_count.sort_unstable();
    for (_, l) in by_count {
        if take == 0 {
            break;
        }
        hs.push(l);
        take -= 1;
    }
}

/// Computes a fresh hitting set of all valid cores with the greedy set cover heuristic
///
/// Repeatedly picks the literal minimizing weight per newly hit core. Ties are broken towards
/// the lowest variable index.
pub(super) fn greedy(cores: &CoreSet, weights: &RsHashMap<Lit, usize>) -> Vec<Lit> {
    let cores: Vec<&[Lit]> = cores.iter_valid().map(|c| c.lits.as_slice()).collect();
    // per-literal occurrence counts restricted to the unhit cores
    let mut counts: RsHashMap<Lit, usize> = RsHashMap::default();
    let mut lit_cores: RsHashMap<Lit, Vec<usize>> = RsHashMap::default();
    for (idx, core) in cores.iter().enumerate() {
        for &l in *core {
            *counts.entry(l).or_insert(0) += 1;
            lit_cores.entry(l).or_default().push(idx);
        }
    }
    let mut hit = vec![false; cores.len()];
    let mut unhit = cores.len();
    let mut hs = Vec::new();
    while unhit > 0 {
        let mut lits: Vec<_> = counts
            .iter()
            .filter(|(_, &cnt)| cnt > 0)
            .map(|(&l, &cnt)| (l, cnt))
            .collect();
        lits.sort_unstable();
        let mut best: Option<(f64, Lit)> = None;
        for (l, cnt) in lits {
            let ratio = weights[&l] as f64 / cnt as f64;
            if best.map_or(true, |(b, _)| ratio < b) {
                best = Some((ratio, l));
            }
        }
        let (_, pick) = best.expect("unhit cores but no occurring literal");
        for &cidx in &lit_cores[&pick] {
            if !hit[cidx] {
                hit[cidx] = true;
                unhit -= 1;
                for &member in cores[cidx] {
                    *counts.get_mut(&member).expect("member without count") -= 1;
                }
            }
        }
        hs.push(pick);
    }
    hs
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::*;

    fn weights(pairs: &[(Lit, usize)]) -> RsHashMap<Lit, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn common_picks_most_frequent() {
        let occ = weights(&[(lit![0], 1), (lit![1], 3), (lit![2], 2)]);
        let mut hs = vec![];
        common(&mut hs, &[lit![0], lit![1], lit![2]], &occ);
        assert_eq!(hs, vec![lit![1]]);
        // already hit, nothing added
        common(&mut hs, &[lit![1], lit![2]], &occ);
        assert_eq!(hs, vec![lit![1]]);
    }

    #[test]
    fn disjoint_adds_whole_core() {
        let mut hs = vec![lit![0]];
        disjoint(&mut hs, &[lit![0], lit![1], lit![2]]);
        assert_eq!(hs, vec![lit![0], lit![1], lit![2]]);
    }

    #[test]
    fn fractional_takes_least_frequent_part() {
        let occ = weights(&[(lit![0], 5), (lit![1], 1), (lit![2], 3), (lit![3], 2)]);
        let mut hs = vec![];
        fractional(0.5, &mut hs, &[lit![0], lit![1], lit![2], lit![3]], &occ);
        assert_eq!(hs, vec![lit![1], lit![3]]);
    }

    #[test]
    fn greedy_covers_all_cores() {
        let w = weights(&[(lit![0], 2), (lit![1], 2), (lit![2], 3)]);
        let mut cores = CoreSet::default();
        cores.add(vec![lit![0], lit![2]], &w);
        cores.add(vec![lit![1], lit![2]], &w);
        // lit 2 hits both cores at ratio 1.5, cheaper than two singles
        let hs = greedy(&cores, &w);
        assert_eq!(hs, vec![lit![2]]);
    }

    #[test]
    fn greedy_breaks_ties_towards_low_index() {
        let w = weights(&[(lit![3], 1), (lit![5], 1)]);
        let mut cores = CoreSet::default();
        cores.add(vec![lit![3], lit![5]], &w);
        assert_eq!(greedy(&cores, &w), vec![lit![3]]);
    }
}
