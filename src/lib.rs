//! Resource-constrained execution planning over process/deliverable
//! flow models.
//!
//! Models the execution of a flow diagram — processes producing
//! deliverables, resources worked in alternatives, feedback/rework
//! loops — as a finite-state transition system, and searches that
//! space for feasible or optimal schedules ("plans").
//!
//! # Modules
//!
//! - **`models`**: value types — identifiers, `Volume`, `Allocation`,
//!   `State`, `Trans`, `Plan`
//! - **`model`**: the validated `FlowModel` (process/deliverable graph)
//! - **`precondition`**: the boolean start-condition expression language
//! - **`enumerator`**: exact and maximal allocation enumeration
//! - **`engine`**: the transition engine `Env` — allocatability,
//!   successor states, time advance
//! - **`search`**: exact, weighted-A*, and greedy plan search
//! - **`graph`**: explicit state-graph materialization and deadlock
//!   streaming
//! - **`critical_path`**: per-process schedule elasticity by volume
//!   perturbation
//!
//! Callers supply an already-validated model; structural checks,
//! diagram parsing, and report formatting live outside this crate.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Cormen et al. (2009), "Introduction to Algorithms"
//! - Bron & Kerbosch (1973), "Finding All Cliques of an Undirected Graph"

pub mod critical_path;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod graph;
pub mod model;
pub mod models;
pub mod precondition;
pub mod search;

pub use engine::{Allocatability, Env, EnvBuilder};
pub use enumerator::AllocationPolicy;
pub use error::{ConfigError, EngineError, SearchError};
pub use model::{FlowModel, FlowModelBuilder, ProcessSpec};
pub use models::{
    Allocation, AllocationElement, DeliverableId, Plan, ProcessId, ResourceId, State, Trans,
    Volume, MIN_VOLUME,
};
pub use precondition::{Precondition, PreconditionEval};
pub use search::{ExactSearch, GreedySearch, HeuristicSearch, Quality, SearchStrategy};
