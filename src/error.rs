//! Error types.
//!
//! Configuration faults (an identifier missing from a supplied function
//! or mapping) are caught once at build time by validated lookups and
//! surface as [`ConfigError`]; they never occur inside search loops.
//! Structural impossibilities reached through legitimate runtime paths
//! carry a diagnostic dump (serialized state plus per-process
//! allocatability) so the caller can decide whether a deadlock is fatal
//! or merely "no plan at this quality".

use thiserror::Error;

use crate::models::{DeliverableId, ProcessId};

/// A fault in the supplied model or configuration. Raised only while
/// building a [`FlowModel`](crate::FlowModel) or [`Env`](crate::Env).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A process references a deliverable the model does not declare.
    #[error("process '{process}' references unknown deliverable '{deliverable}'")]
    UnknownDeliverable {
        process: ProcessId,
        deliverable: DeliverableId,
    },

    /// A precondition references an identifier the model does not declare.
    #[error("precondition of '{process}' references unknown identifier '{identifier}'")]
    UnknownPreconditionRef {
        process: ProcessId,
        identifier: String,
    },

    /// FeedbackSourceCompleted targets a deliverable that is not a
    /// feedback source.
    #[error("precondition of '{process}' tests '{deliverable}', which is not a feedback source")]
    NotAFeedbackSource {
        process: ProcessId,
        deliverable: DeliverableId,
    },

    /// A process has no declared resource-allocation alternatives.
    #[error("process '{0}' declares no allocation alternatives")]
    NoAlternatives(ProcessId),

    /// An allocation alternative has an empty resource set or a
    /// non-positive consumption rate.
    #[error("process '{0}' declares a degenerate allocation alternative")]
    DegenerateAlternative(ProcessId),

    /// A process's initial volume is not positive.
    #[error("process '{0}' has a non-positive initial volume")]
    NonPositiveVolume(ProcessId),

    /// A feedback-source deliverable has no maximum-revision entry.
    #[error("feedback source '{0}' has no maximum-revision entry")]
    MissingMaxRevision(DeliverableId),

    /// A required configuration function was never supplied.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

/// A structural impossibility inside the transition engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Time cannot advance: no allocated process can complete and no
    /// source deliverable is pending. The successor is never partially
    /// committed.
    #[error("time cannot advance from this state (deadlock)\n{diagnostic}")]
    Stalled { diagnostic: String },
}

/// A failure reported by a search strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    /// An incomplete state offered no transitions.
    #[error("incomplete state has no transitions\n{diagnostic}")]
    NoTransitions { diagnostic: String },

    /// The strategy finished its budget without reaching completion.
    #[error("no plan found within the strategy's bounds")]
    NoPlanFound,

    /// The rollout exceeded its hard depth cap.
    #[error("rollout exceeded the depth cap of {depth} steps")]
    DepthExceeded { depth: usize },

    /// The engine could not advance time.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
