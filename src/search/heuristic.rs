//! Weighted A* under an explicit quality budget.
//!
//! Trades optimality for speed: node priority is `g + weight * h` where
//! `g` is the arrival time and `h` the admissible remaining lower bound
//! from the environment. With `weight > 1` the frontier greedily favors
//! states close to completion, bounded by an expansion budget and a
//! per-node fan-out cap. A completed state yields its plan immediately
//! and the run keeps popping within budget, so one run can collect up
//! to `max_results` distinct plans; seeded restarts perturb only the
//! fan-out tie-breaking and add further diversity. Repeated runs with
//! the same [`Quality`] are reproducible.
//!
//! # Reference
//! Pohl (1970), "Heuristic search viewed as path finding in a graph"

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::engine::Env;
use crate::error::SearchError;
use crate::models::{Plan, Trans};

use super::SearchStrategy;

/// The search budget and inexactness knobs.
///
/// The default is a moderate budget suited to models of a few dozen
/// processes; raise `expansions` and `restarts` before touching
/// `weight` when plans come back too long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    /// Hard cap on node expansions per restart.
    pub expansions: usize,
    /// Successors kept per expanded node, largest consumption first.
    pub fan_out: usize,
    /// Heuristic inflation factor; 1.0 degrades to plain A*. Values
    /// below 1.0 are clamped to 1.0 (deflating an admissible bound
    /// only re-orders the frontier toward uniform-cost).
    pub weight: f64,
    /// Plans retained per run and after merging all restarts.
    pub max_results: usize,
    /// Base seed for tie-break jitter.
    pub seed: u64,
    /// Independent runs whose results are merged and deduplicated.
    pub restarts: usize,
}

impl Default for Quality {
    fn default() -> Self {
        Quality {
            expansions: 10_000,
            fan_out: 8,
            weight: 1.5,
            max_results: 4,
            seed: 0x5EED,
            restarts: 1,
        }
    }
}

/// Weighted A* returning up to `max_results` distinct good plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSearch {
    quality: Quality,
}

impl HeuristicSearch {
    /// Creates the strategy with the default [`Quality`].
    pub fn new() -> Self {
        HeuristicSearch::default()
    }

    /// Creates the strategy with an explicit budget.
    pub fn with_quality(quality: Quality) -> Self {
        HeuristicSearch { quality }
    }
}

struct Node {
    f: f64,
    g: f64,
    seq: u64,
    digest: u64,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .total_cmp(&other.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl SearchStrategy for HeuristicSearch {
    fn search(&self, env: &Env) -> Result<Vec<Plan>, SearchError> {
        let q = &self.quality;
        let mut plans: Vec<Plan> = Vec::new();
        for restart in 0..q.restarts.max(1) {
            let seed = q.seed.wrapping_add(restart as u64);
            for plan in run_once(env, q, seed)? {
                if !plans
                    .iter()
                    .any(|p| p.sequence_digest() == plan.sequence_digest())
                {
                    plans.push(plan);
                }
            }
        }
        plans.sort_by(|a, b| a.leadtime().total_cmp(&b.leadtime()));
        plans.truncate(q.max_results);
        Ok(plans)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// One weighted-A* run. Every completed state popped yields its plan
/// immediately (goals are never expanded) and the run keeps popping, so
/// up to `max_results` plans come out of a single run; the run ends
/// when the heap empties, the expansion budget runs out, or enough
/// plans are collected.
fn run_once(env: &Env, q: &Quality, seed: u64) -> Result<Vec<Plan>, SearchError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let weight = q.weight.max(1.0);
    let initial = env.initial_state();
    let start = initial.topology_digest();

    let mut states = FxHashMap::default();
    let mut best_g: FxHashMap<u64, f64> = FxHashMap::default();
    let mut parents: FxHashMap<u64, (u64, Trans)> = FxHashMap::default();
    let mut goals = FxHashSet::default();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    states.insert(start, initial.clone());
    best_g.insert(start, 0.0);
    heap.push(Reverse(Node {
        f: weight * env.remaining_lower_bound(&initial),
        g: 0.0,
        seq,
        digest: start,
    }));

    let mut plans = Vec::new();
    let mut expanded = 0usize;
    while let Some(Reverse(node)) = heap.pop() {
        // Stale heap entry for a node already reached cheaper.
        if best_g
            .get(&node.digest)
            .is_some_and(|&g| node.g > g + 1e-12)
        {
            continue;
        }
        let state = states
            .get(&node.digest)
            .expect("queued digest has a state")
            .clone();

        if env.is_completed(&state) {
            if goals.insert(node.digest) {
                debug!(seed, expanded, leadtime = state.time, "heuristic goal");
                plans.push(reconstruct(node.digest, start, &initial, &parents));
                if plans.len() >= q.max_results {
                    break;
                }
            }
            continue;
        }
        if expanded >= q.expansions {
            debug!(seed, expanded, "expansion budget exhausted");
            break;
        }
        expanded += 1;

        let mut successors: Vec<(Trans, u64)> = env
            .transitions(&state)?
            .into_iter()
            .map(|t| (t, rng.random::<u64>()))
            .collect();
        // Transitions arrive sorted by consumption; the jitter only
        // breaks ties among equal-consumption successors.
        successors.sort_by(|(a, ja), (b, jb)| {
            b.allocation
                .total_consumed()
                .cmp(&a.allocation.total_consumed())
                .then_with(|| ja.cmp(jb))
        });
        successors.truncate(q.fan_out);

        for (trans, _) in successors {
            let digest = trans.state.topology_digest();
            let g = trans.state.time;
            if best_g.get(&digest).is_some_and(|&known| g >= known - 1e-12) {
                continue;
            }
            best_g.insert(digest, g);
            states.insert(digest, trans.state.clone());
            let h = env.remaining_lower_bound(&trans.state);
            parents.insert(digest, (node.digest, trans));
            seq += 1;
            heap.push(Reverse(Node {
                f: g + weight * h,
                g,
                seq,
                digest,
            }));
        }
    }
    Ok(plans)
}

fn reconstruct(
    goal: u64,
    start: u64,
    initial: &crate::models::State,
    parents: &FxHashMap<u64, (u64, Trans)>,
) -> Plan {
    let mut steps = Vec::new();
    let mut cursor = goal;
    while cursor != start {
        let (parent, trans) = parents
            .get(&cursor)
            .expect("every non-start node has a parent");
        steps.push(trans.clone());
        cursor = *parent;
    }
    steps.reverse();
    Plan::new(initial.clone(), steps)
}
