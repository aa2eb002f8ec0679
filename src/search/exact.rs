//! Exact search: every globally time-optimal plan.
//!
//! Uniform-cost (Dijkstra-style) search over the implicit transition
//! graph, keyed by the topology digest (state hash excluding time) so
//! that equal configurations reached at different simulated times
//! collapse — the termination guarantee on an otherwise time-unbounded
//! graph. Every tied-shortest incoming edge per node is retained, so
//! memoized backtracking from each goal materializes *all* optimal
//! plans, not just one.
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 24.3 (Dijkstra)

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::engine::Env;
use crate::error::SearchError;
use crate::models::{Plan, Trans, Volume};

use super::SearchStrategy;

/// Arrival times within this tolerance count as equal.
const TIME_EPS: f64 = 1e-9;

/// Uniform-cost search returning the full set of time-optimal plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSearch;

impl ExactSearch {
    /// Creates the strategy.
    pub fn new() -> Self {
        ExactSearch
    }
}

/// Priority-queue key: ascending arrival time, then descending total
/// consumed volume of the incoming edge, then insertion order.
struct Entry {
    time: f64,
    consumed: Volume,
    seq: u64,
    digest: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| other.consumed.cmp(&self.consumed))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl SearchStrategy for ExactSearch {
    fn search(&self, env: &Env) -> Result<Vec<Plan>, SearchError> {
        let initial = env.initial_state();
        let start = initial.topology_digest();

        let mut states = FxHashMap::default();
        let mut dist: FxHashMap<u64, f64> = FxHashMap::default();
        let mut preds: FxHashMap<u64, Vec<(u64, Trans)>> = FxHashMap::default();
        let mut settled = FxHashSet::default();
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;

        states.insert(start, initial.clone());
        dist.insert(start, 0.0);
        heap.push(Reverse(Entry {
            time: 0.0,
            consumed: Volume::ZERO,
            seq,
            digest: start,
        }));

        let mut best_time: Option<f64> = None;
        let mut goals: Vec<u64> = Vec::new();

        while let Some(Reverse(entry)) = heap.pop() {
            // Keys pop in ascending time; past the best goal time
            // nothing better or tied can remain.
            if let Some(best) = best_time {
                if entry.time > best + TIME_EPS {
                    break;
                }
            }
            if !settled.insert(entry.digest) {
                continue;
            }

            let state = states
                .get(&entry.digest)
                .expect("queued digest has a state")
                .clone();

            if env.is_completed(&state) {
                match best_time {
                    None => {
                        best_time = Some(entry.time);
                        goals.push(entry.digest);
                    }
                    Some(best) if entry.time < best - TIME_EPS => {
                        best_time = Some(entry.time);
                        goals.clear();
                        goals.push(entry.digest);
                    }
                    Some(best) if (entry.time - best).abs() <= TIME_EPS => {
                        if !goals.contains(&entry.digest) {
                            goals.push(entry.digest);
                        }
                    }
                    Some(_) => {}
                }
                // Completed states are never expanded further.
                continue;
            }

            for trans in env.transitions(&state)? {
                let digest = trans.state.topology_digest();
                let time = trans.state.time;
                match dist.get(&digest).copied() {
                    Some(known) if time < known - TIME_EPS => {
                        dist.insert(digest, time);
                        states.insert(digest, trans.state.clone());
                        let consumed = trans.allocation.total_consumed();
                        preds.insert(digest, vec![(entry.digest, trans)]);
                        seq += 1;
                        heap.push(Reverse(Entry {
                            time,
                            consumed,
                            seq,
                            digest,
                        }));
                    }
                    Some(known) if (time - known).abs() <= TIME_EPS => {
                        // A tied-shortest incoming edge; keep it so
                        // backtracking can enumerate every optimal plan.
                        preds
                            .get_mut(&digest)
                            .expect("known distance has predecessors")
                            .push((entry.digest, trans));
                    }
                    Some(_) => {}
                    None => {
                        dist.insert(digest, time);
                        states.insert(digest, trans.state.clone());
                        let consumed = trans.allocation.total_consumed();
                        preds.insert(digest, vec![(entry.digest, trans)]);
                        seq += 1;
                        heap.push(Reverse(Entry {
                            time,
                            consumed,
                            seq,
                            digest,
                        }));
                    }
                }
            }
        }

        debug!(
            explored = settled.len(),
            goals = goals.len(),
            best_time = best_time.unwrap_or(f64::NAN),
            "exact search finished"
        );

        let mut memo: FxHashMap<u64, Vec<Vec<Trans>>> = FxHashMap::default();
        let mut plans = Vec::new();
        for goal in &goals {
            for steps in backtrack(*goal, start, &preds, &mut memo) {
                plans.push(Plan::new(initial.clone(), steps));
            }
        }
        Ok(plans)
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Enumerates every shortest path from `start` to `node`, memoized per
/// node. Predecessor edges form a DAG because every transition strictly
/// advances time.
fn backtrack(
    node: u64,
    start: u64,
    preds: &FxHashMap<u64, Vec<(u64, Trans)>>,
    memo: &mut FxHashMap<u64, Vec<Vec<Trans>>>,
) -> Vec<Vec<Trans>> {
    if node == start {
        return vec![Vec::new()];
    }
    if let Some(paths) = memo.get(&node) {
        return paths.clone();
    }

    let mut paths = Vec::new();
    if let Some(edges) = preds.get(&node) {
        for (parent, trans) in edges {
            for mut path in backtrack(*parent, start, preds, memo) {
                path.push(trans.clone());
                paths.push(path);
            }
        }
    }
    memo.insert(node, paths.clone());
    paths
}
