//! Plans: concrete execution schedules produced by search.

use serde::{Deserialize, Serialize};

use super::allocation::Allocation;
use super::state::State;

/// One transition edge: the allocation chosen and the state it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trans {
    /// The allocation committed at the decision point.
    pub allocation: Allocation,
    /// The resulting state after the time advance.
    pub state: State,
}

impl Trans {
    /// Creates a transition edge.
    pub fn new(allocation: Allocation, state: State) -> Self {
        Self { allocation, state }
    }
}

/// A schedule: the initial state plus the ordered transitions taken to
/// reach a completed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The state the plan starts from.
    pub initial: State,
    /// Transitions in execution order.
    pub steps: Vec<Trans>,
}

impl Plan {
    /// Creates a plan.
    pub fn new(initial: State, steps: Vec<Trans>) -> Self {
        Self { initial, steps }
    }

    /// Total simulated time to reach the final state.
    pub fn leadtime(&self) -> f64 {
        self.final_state().time
    }

    /// The last state of the plan (initial state when there are no steps).
    pub fn final_state(&self) -> &State {
        self.steps.last().map(|t| &t.state).unwrap_or(&self.initial)
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no transitions.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Digest of the transition sequence, used to deduplicate plans
    /// merged from heuristic restarts.
    pub fn sequence_digest(&self) -> u64 {
        use rustc_hash::FxHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = FxHasher::default();
        self.initial.exact_digest().hash(&mut hasher);
        for step in &self.steps {
            step.allocation.hash(&mut hasher);
            step.state.exact_digest().hash(&mut hasher);
        }
        hasher.finish()
    }
}
