//! Core value types of the planning engine.
//!
//! Everything here is an immutable snapshot produced by pure functions
//! of the transition engine; nothing is mutated after construction.
//!
//! # Domain Mappings
//!
//! | flowplan | Manufacturing | Software | Construction |
//! |-------------|--------------|----------|--------------|
//! | Process | Operation | Work item | Trade task |
//! | Deliverable | Part/Batch | Artifact | Inspection sign-off |
//! | Resource | Machine/Worker | Engineer | Crew/Equipment |
//! | Plan | Production plan | Sprint schedule | Build schedule |

mod allocation;
mod ids;
mod plan;
mod state;
mod volume;

pub use allocation::{Allocation, AllocationElement};
pub use ids::{DeliverableId, ProcessId, ResourceId};
pub use plan::{Plan, Trans};
pub use state::State;
pub use volume::{exponential_rework, Volume, MIN_VOLUME};
