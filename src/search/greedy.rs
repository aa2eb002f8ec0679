//! Greedy rollout: commit to the largest transition, never look back.
//!
//! At every state the rollout takes the first transition the engine
//! offers, which is the one with the greatest total consumption. One
//! plan comes out, built in linear time in its length. No backtracking
//! means a dead end is a hard error rather than a reason to explore.

use tracing::debug;

use crate::engine::Env;
use crate::error::SearchError;
use crate::models::Plan;

use super::SearchStrategy;

/// Single committed rollout.
#[derive(Debug, Clone, Copy)]
pub struct GreedySearch {
    max_depth: usize,
}

impl Default for GreedySearch {
    fn default() -> Self {
        GreedySearch { max_depth: 10_000 }
    }
}

impl GreedySearch {
    /// Creates the rollout with the default depth cap.
    pub fn new() -> Self {
        GreedySearch::default()
    }

    /// Overrides the hard cap on rollout length.
    pub fn with_max_depth(max_depth: usize) -> Self {
        GreedySearch { max_depth }
    }
}

impl SearchStrategy for GreedySearch {
    fn search(&self, env: &Env) -> Result<Vec<Plan>, SearchError> {
        let initial = env.initial_state();
        let mut state = initial.clone();
        let mut steps = Vec::new();

        while !env.is_completed(&state) {
            if steps.len() >= self.max_depth {
                return Err(SearchError::DepthExceeded {
                    depth: self.max_depth,
                });
            }
            let mut transitions = env.transitions(&state)?;
            if transitions.is_empty() {
                return Err(SearchError::NoTransitions {
                    diagnostic: env.diagnostic(&state),
                });
            }
            // Transitions are sorted by total consumption, largest first.
            let trans = transitions.swap_remove(0);
            state = trans.state.clone();
            steps.push(trans);
        }

        debug!(steps = steps.len(), leadtime = state.time, "rollout done");
        Ok(vec![Plan::new(initial, steps)])
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}
