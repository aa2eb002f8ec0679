//! Exact enumeration: every feasible combination of options.
//!
//! Depth-first search over candidate processes: at each process either
//! skip it or take one of its alternatives that is resource-disjoint
//! from everything already chosen. Pairwise disjointness is precomputed
//! into a matrix so the inner check is an index lookup.

use crate::models::{Allocation, ProcessId};

use super::{compatible, sort_by_consumed_desc, Option_};

/// Enumerates every feasible assignment, merged with the carry-over.
pub fn enumerate_exact(carried: &Allocation, options: &[Option_]) -> Vec<Allocation> {
    // Group option indices by process, preserving id order.
    let mut process_options: Vec<(&ProcessId, Vec<usize>)> = Vec::new();
    for (i, opt) in options.iter().enumerate() {
        match process_options.last_mut() {
            Some((p, idxs)) if *p == &opt.process => idxs.push(i),
            _ => process_options.push((&opt.process, vec![i])),
        }
    }

    let disjoint = disjointness_matrix(options);

    let mut results = Vec::new();
    let mut chosen: Vec<usize> = Vec::new();
    descend(
        carried,
        options,
        &process_options,
        &disjoint,
        0,
        &mut chosen,
        &mut results,
    );

    sort_by_consumed_desc(&mut results);
    results
}

fn disjointness_matrix(options: &[Option_]) -> Vec<Vec<bool>> {
    let n = options.len();
    let mut matrix = vec![vec![false; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let ok = compatible(&options[i], &options[j]);
            matrix[i][j] = ok;
            matrix[j][i] = ok;
        }
    }
    matrix
}

#[allow(clippy::too_many_arguments)]
fn descend(
    carried: &Allocation,
    options: &[Option_],
    process_options: &[(&ProcessId, Vec<usize>)],
    disjoint: &[Vec<bool>],
    depth: usize,
    chosen: &mut Vec<usize>,
    results: &mut Vec<Allocation>,
) {
    if depth == process_options.len() {
        let assignment: Allocation = chosen
            .iter()
            .map(|&i| (options[i].process.clone(), options[i].element.clone()))
            .collect();
        let merged = carried.merged(&assignment);
        // Empty merges would be no-op self-transitions.
        if !merged.is_empty() {
            results.push(merged);
        }
        return;
    }

    // Skip this process.
    descend(
        carried,
        options,
        process_options,
        disjoint,
        depth + 1,
        chosen,
        results,
    );

    // Or take one of its alternatives compatible with the choices so far.
    for &i in &process_options[depth].1 {
        if chosen.iter().all(|&j| disjoint[i][j]) {
            chosen.push(i);
            descend(
                carried,
                options,
                process_options,
                disjoint,
                depth + 1,
                chosen,
                results,
            );
            chosen.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AllocationElement;

    fn opt(process: &str, resources: &[&str], consumed: f64) -> Option_ {
        Option_ {
            process: ProcessId::new(process),
            element: AllocationElement::new(resources.iter().copied(), consumed),
        }
    }

    #[test]
    fn test_shared_resource_never_double_allocated() {
        let options = vec![opt("p1", &["r1"], 1.0), opt("p2", &["r1"], 1.0)];
        let results = enumerate_exact(&Allocation::new(), &options);

        // {p1} and {p2}; never both.
        assert_eq!(results.len(), 2);
        for alloc in &results {
            assert_eq!(alloc.len(), 1);
            let total_resources: usize = alloc.iter().map(|(_, e)| e.resources.len()).sum();
            assert_eq!(alloc.resources().len(), total_resources);
        }
    }

    #[test]
    fn test_pairwise_disjoint_across_entries() {
        let options = vec![
            opt("p1", &["r1", "r2"], 1.0),
            opt("p1", &["r3"], 0.5),
            opt("p2", &["r2", "r3"], 2.0),
            opt("p3", &["r4"], 1.0),
        ];
        let results = enumerate_exact(&Allocation::new(), &options);

        for alloc in &results {
            let per_entry: usize = alloc.iter().map(|(_, e)| e.resources.len()).sum();
            assert_eq!(alloc.resources().len(), per_entry, "overlap in {alloc:?}");
        }
        // p1 never appears with two alternatives at once.
        for alloc in &results {
            assert!(alloc.len() <= 3);
        }
    }

    #[test]
    fn test_empty_assignment_discarded_without_carry_over() {
        let options = vec![opt("p1", &["r1"], 1.0)];
        let results = enumerate_exact(&Allocation::new(), &options);
        // Only {p1}; the all-skip assignment merged to empty and was dropped.
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_empty());
    }

    #[test]
    fn test_all_skip_with_carry_over_is_kept() {
        let carried = Allocation::new()
            .with_entry("busy", AllocationElement::new(["r9"], 1.0));
        let options = vec![opt("p1", &["r1"], 1.0)];
        let results = enumerate_exact(&carried, &options);

        // {busy,p1} and the continue-only {busy}.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), 2);
        assert_eq!(results[1].len(), 1);
        assert!(results[1].contains(&ProcessId::new("busy")));
    }

    #[test]
    fn test_ordered_by_total_consumed_descending() {
        let options = vec![
            opt("p1", &["r1"], 1.0),
            opt("p2", &["r2"], 3.0),
            opt("p3", &["r3"], 2.0),
        ];
        let results = enumerate_exact(&Allocation::new(), &options);
        let totals: Vec<f64> = results.iter().map(|a| a.total_consumed().get()).collect();
        let mut sorted = totals.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(totals, sorted);
        assert_eq!(totals[0], 6.0); // all three together
    }

    #[test]
    fn test_no_options_no_carry_over() {
        let results = enumerate_exact(&Allocation::new(), &[]);
        assert!(results.is_empty());
    }
}
