//! Maximal-only enumeration via Bron–Kerbosch.
//!
//! Builds a conflict graph over (process, alternative) options —
//! conflict iff same process or shared resource — and reports every
//! maximal independent set. Independent sets in the conflict graph are
//! cliques in its complement, so this runs the standard R/P/X
//! Bron–Kerbosch recursion with pivot selection on the compatibility
//! (complement) adjacency.
//!
//! Only maximal combinations are returned, not all feasible ones; that
//! is the contract callers opt into above the exact threshold.
//!
//! # Reference
//! Bron & Kerbosch (1973), "Finding All Cliques of an Undirected Graph"

use std::collections::BTreeSet;

use crate::models::Allocation;

use super::{compatible, sort_by_consumed_desc, Option_};

/// Enumerates every maximal feasible assignment, merged with the
/// carry-over.
pub fn enumerate_maximal(carried: &Allocation, options: &[Option_]) -> Vec<Allocation> {
    let n = options.len();
    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if compatible(&options[i], &options[j]) {
                adjacency[i].insert(j);
                adjacency[j].insert(i);
            }
        }
    }

    let mut sets: Vec<Vec<usize>> = Vec::new();
    let mut r = Vec::new();
    let p: BTreeSet<usize> = (0..n).collect();
    let x = BTreeSet::new();
    bron_kerbosch(&adjacency, &mut r, p, x, &mut sets);

    let mut results = Vec::new();
    for set in sets {
        let assignment: Allocation = set
            .iter()
            .map(|&i| (options[i].process.clone(), options[i].element.clone()))
            .collect();
        let merged = carried.merged(&assignment);
        if !merged.is_empty() {
            results.push(merged);
        }
    }

    sort_by_consumed_desc(&mut results);
    results
}

/// Standard Bron–Kerbosch with pivoting: R grows toward a maximal
/// clique, P holds candidates, X holds excluded vertices.
fn bron_kerbosch(
    adjacency: &[BTreeSet<usize>],
    r: &mut Vec<usize>,
    p: BTreeSet<usize>,
    x: BTreeSet<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if p.is_empty() && x.is_empty() {
        if !r.is_empty() {
            out.push(r.clone());
        }
        return;
    }

    // Pivot: the vertex of P ∪ X with the most neighbors in P, so the
    // branch loop skips as many candidates as possible.
    let pivot = p
        .iter()
        .chain(x.iter())
        .copied()
        .max_by_key(|&u| adjacency[u].intersection(&p).count())
        .unwrap_or(0);

    let branch: Vec<usize> = p.difference(&adjacency[pivot]).copied().collect();
    let mut p = p;
    let mut x = x;
    for v in branch {
        r.push(v);
        let np: BTreeSet<usize> = p.intersection(&adjacency[v]).copied().collect();
        let nx: BTreeSet<usize> = x.intersection(&adjacency[v]).copied().collect();
        bron_kerbosch(adjacency, r, np, nx, out);
        r.pop();
        p.remove(&v);
        x.insert(v);
    }
}
