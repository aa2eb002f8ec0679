//! Explicit state-transition graphs and deadlock discovery.
//!
//! [`build_graph`] materializes the reachable transition system up to a
//! depth bound, deduplicating states by their exact digest (time
//! included, so revisits at different times stay distinct nodes).
//! [`find_deadlocks`] walks the same space without materializing it,
//! streaming every reachable dead end through a rendezvous channel so
//! the consumer sees deadlocks as they are found instead of after the
//! whole walk.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

use crate::engine::Env;
use crate::error::EngineError;
use crate::models::{Allocation, State};

/// Node key: the state's exact digest.
pub type StateId = u64;

/// A materialized, depth-bounded transition system.
///
/// `edges` is a nested adjacency: source, then target, then every
/// allocation labeling an edge between the two (distinct allocations
/// can reach the same successor).
#[derive(Debug, Clone, Serialize)]
pub struct StateTransitionGraph {
    pub initial: StateId,
    pub states: BTreeMap<StateId, State>,
    pub edges: BTreeMap<StateId, BTreeMap<StateId, Vec<Allocation>>>,
    /// States cut off by the depth bound: present in `states` but never
    /// expanded, so their outgoing edges are unknown.
    pub boundary: BTreeSet<StateId>,
}

impl StateTransitionGraph {
    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Total number of labeled edges.
    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(|targets| targets.values())
            .map(Vec::len)
            .sum()
    }

    /// States that are incomplete yet have no outgoing edge. Boundary
    /// states cut off by the depth bound are not counted: their
    /// transitions were never computed, so their status is unknown.
    pub fn dead_ends(&self, env: &Env) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|(id, state)| {
                !self.boundary.contains(id)
                    && !env.is_completed(state)
                    && self.edges.get(id).map_or(true, BTreeMap::is_empty)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Materializes the transition system reachable within `max_depth`
/// steps of the initial state.
pub fn build_graph(env: &Env, max_depth: usize) -> Result<StateTransitionGraph, EngineError> {
    let initial = env.initial_state();
    let root = initial.exact_digest();

    let mut states = BTreeMap::new();
    let mut edges: BTreeMap<StateId, BTreeMap<StateId, Vec<Allocation>>> = BTreeMap::new();
    let mut boundary = BTreeSet::new();
    let mut stack = vec![(root, initial.clone(), 0usize)];
    states.insert(root, initial);

    while let Some((id, state, depth)) = stack.pop() {
        if depth >= max_depth {
            boundary.insert(id);
            continue;
        }
        for trans in env.transitions(&state)? {
            let target = trans.state.exact_digest();
            if !states.contains_key(&target) {
                states.insert(target, trans.state.clone());
                stack.push((target, trans.state, depth + 1));
            }
            edges
                .entry(id)
                .or_default()
                .entry(target)
                .or_default()
                .push(trans.allocation);
        }
    }

    debug!(
        states = states.len(),
        boundary = boundary.len(),
        max_depth,
        "transition graph materialized"
    );
    Ok(StateTransitionGraph {
        initial: root,
        states,
        edges,
        boundary,
    })
}

/// A reachable incomplete state with no way out, plus one path to it.
#[derive(Debug, Clone, Serialize)]
pub struct Deadlock {
    pub state: State,
    /// The transitions taken from the initial state; each entry is the
    /// state left and the allocation that left it.
    pub path: Vec<(StateId, Allocation)>,
}

/// Depth-first walk streaming every reachable deadlock through `tx`.
///
/// The channel is expected to be a rendezvous (`sync_channel(0)`): the
/// walk blocks on each deadlock until the consumer takes it, so
/// discovery and consumption stay in lockstep and nothing buffers.
/// Each deadlock state is reported once, with the first path that
/// reached it. Returns early (without error) if the consumer hangs up.
pub fn find_deadlocks(
    env: &Env,
    max_depth: usize,
    tx: SyncSender<Deadlock>,
) -> Result<(), EngineError> {
    let initial = env.initial_state();
    let mut visited = FxHashSet::default();
    visited.insert(initial.exact_digest());
    let mut path = Vec::new();
    walk(env, &initial, max_depth, &tx, &mut visited, &mut path)?;
    Ok(())
}

fn walk(
    env: &Env,
    state: &State,
    budget: usize,
    tx: &SyncSender<Deadlock>,
    visited: &mut FxHashSet<StateId>,
    path: &mut Vec<(StateId, Allocation)>,
) -> Result<bool, EngineError> {
    let transitions = env.transitions(state)?;

    if transitions.is_empty() {
        if !env.is_completed(state) {
            let deadlock = Deadlock {
                state: state.clone(),
                path: path.clone(),
            };
            // A closed receiver means the consumer stopped caring.
            if tx.send(deadlock).is_err() {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if budget == 0 {
        return Ok(true);
    }

    let id = state.exact_digest();
    for trans in transitions {
        if !visited.insert(trans.state.exact_digest()) {
            continue;
        }
        path.push((id, trans.allocation));
        let keep_going = walk(env, &trans.state, budget - 1, tx, visited, path)?;
        path.pop();
        if !keep_going {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Runs [`find_deadlocks`] on a background thread and drains the stream.
pub fn collect_deadlocks(env: &Env, max_depth: usize) -> Result<Vec<Deadlock>, EngineError> {
    let (tx, rx) = sync_channel(0);
    let producer_env = env.clone();
    let producer = thread::spawn(move || find_deadlocks(&producer_env, max_depth, tx));

    let deadlocks: Vec<Deadlock> = rx.iter().collect();
    match producer.join() {
        Ok(result) => result.map(|()| deadlocks),
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowModel, ProcessSpec};
    use crate::models::AllocationElement;
    use crate::precondition::Precondition;

    /// Two unit processes contending for one resource; completable.
    fn contended_env() -> Env {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("a")
            .with_deliverable("b")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("a"))
            .with_process("p2", ProcessSpec::new().with_input("spec").with_output("b"))
            .build()
            .unwrap();
        Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .build()
            .unwrap()
    }

    /// p1 offers a fast and a slow alternative; p2 can never start, so
    /// both branches dead-end at distinct times.
    fn forked_dead_end_env() -> Env {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("x")
            .with_deliverable("y")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("x"))
            .with_process("p2", ProcessSpec::new().with_input("x").with_output("y"))
            .build()
            .unwrap();
        Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|p| {
                if p.as_str() == "p1" {
                    vec![
                        AllocationElement::new(["r1"], 1.0),
                        AllocationElement::new(["r2"], 0.5),
                    ]
                } else {
                    vec![AllocationElement::new(["r1"], 1.0)]
                }
            })
            .with_precondition("p2", Precondition::Or(vec![]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_graph_diamond() {
        let env = contended_env();
        let graph = build_graph(&env, 16).unwrap();
        // initial, p1-first, p2-first, and a shared terminal state.
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.dead_ends(&env).is_empty());
    }

    #[test]
    fn test_build_graph_depth_bound() {
        let graph = build_graph(&contended_env(), 1).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 2);
        // The two depth-1 states were never expanded.
        assert_eq!(graph.boundary.len(), 2);
        assert!(!graph.boundary.contains(&graph.initial));
    }

    #[test]
    fn test_boundary_states_are_not_dead_ends() {
        // Truncation leaves edge-less states on a completable model;
        // their status is unknown, not deadlocked.
        let env = contended_env();
        let graph = build_graph(&env, 1).unwrap();
        assert!(graph.dead_ends(&env).is_empty());
    }

    #[test]
    fn test_no_deadlocks_on_completable_model() {
        let deadlocks = collect_deadlocks(&contended_env(), 16).unwrap();
        assert!(deadlocks.is_empty());
    }

    #[test]
    fn test_two_branch_dead_ends() {
        let env = forked_dead_end_env();
        let deadlocks = collect_deadlocks(&env, 16).unwrap();
        // Fast and slow alternatives drain at different times, so the
        // two dead ends are distinct states, one step each from start.
        assert_eq!(deadlocks.len(), 2);
        for deadlock in &deadlocks {
            assert_eq!(deadlock.path.len(), 1);
            assert!(!env.is_completed(&deadlock.state));
        }
        let times: Vec<f64> = deadlocks.iter().map(|d| d.state.time).collect();
        assert!(times.contains(&1.0) && times.contains(&2.0));
    }

    #[test]
    fn test_streaming_consumer_drains_in_lockstep() {
        let env = forked_dead_end_env();
        let (tx, rx) = sync_channel(0);
        let consumer = std::thread::spawn(move || rx.iter().count());
        find_deadlocks(&env, 16, tx).unwrap();
        assert_eq!(consumer.join().unwrap(), 2);
    }

    #[test]
    fn test_producer_stops_when_consumer_hangs_up() {
        let env = forked_dead_end_env();
        let (tx, rx) = sync_channel(0);
        let consumer = std::thread::spawn(move || {
            let first = rx.iter().next();
            drop(rx);
            first
        });
        // Must return Ok despite the dropped receiver.
        find_deadlocks(&env, 16, tx).unwrap();
        assert!(consumer.join().unwrap().is_some());
    }

    #[test]
    fn test_graph_reports_same_dead_ends() {
        let env = forked_dead_end_env();
        let graph = build_graph(&env, 16).unwrap();
        assert_eq!(graph.dead_ends(&env).len(), 2);
    }
}
