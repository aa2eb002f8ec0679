//! Plan-search strategies over the implicit transition graph.
//!
//! Three interchangeable strategies share the [`SearchStrategy`]
//! contract:
//!
//! - [`ExactSearch`]: uniform-cost search returning every globally
//!   time-optimal plan. Complete but unbounded; relies on the model's
//!   feedback revision caps to keep the reachable space finite.
//! - [`HeuristicSearch`]: weighted A* under a [`Quality`] budget.
//!   Fast and tunable; explicitly does not guarantee optimality.
//! - [`GreedySearch`]: single committed rollout. Fastest, may fail on
//!   problems where the largest commitment leads into a dead end.

mod exact;
mod greedy;
mod heuristic;

pub use exact::ExactSearch;
pub use greedy::GreedySearch;
pub use heuristic::{HeuristicSearch, Quality};

use crate::engine::Env;
use crate::error::SearchError;
use crate::models::Plan;

/// A planning algorithm producing schedules from an environment.
pub trait SearchStrategy {
    /// Searches for plans reaching a completed state.
    ///
    /// An empty result set means no completed state was found within
    /// the strategy's bounds; hard failures (deadlock mid-rollout,
    /// exceeded depth cap) are errors.
    fn search(&self, env: &Env) -> Result<Vec<Plan>, SearchError>;

    /// Strategy name for logs and reports.
    fn name(&self) -> &'static str;
}
