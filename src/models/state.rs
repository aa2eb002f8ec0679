//! Simulation state: an immutable snapshot of execution progress.
//!
//! A [`State`] is Markovian — it alone determines all future
//! transitions. The transition engine never mutates a state; successor
//! states are built as explicit copies.
//!
//! # Digests
//!
//! Two content digests serve two distinct purposes and must not be
//! conflated:
//!
//! - [`State::topology_digest`] excludes simulated time. The exact
//!   search deduplicates on it so that equal configurations reached at
//!   different times collapse; this is what makes the search terminate
//!   on an otherwise time-unbounded graph.
//! - [`State::exact_digest`] includes time. The explicit graph builder
//!   deduplicates on it to produce an exact materialization for
//!   visualization and debugging, not a collapsed one.

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use super::allocation::Allocation;
use super::ids::{DeliverableId, ProcessId};
use super::volume::Volume;

/// An immutable snapshot of simulated execution progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Simulated time since the start of execution.
    pub time: f64,
    /// Remaining volume per process.
    pub remaining: BTreeMap<ProcessId, Volume>,
    /// Revision per deliverable; 0 = never produced.
    pub revisions: BTreeMap<DeliverableId, u32>,
    /// Completed rework iterations per process.
    pub completions: BTreeMap<ProcessId, u32>,
    /// Allocation carried over for processes still mid-execution.
    pub carried: Allocation,
    /// Per process: input deliverables updated but not yet consumed.
    pub unhandled: BTreeMap<ProcessId, BTreeSet<DeliverableId>>,
}

impl State {
    /// Revision of a deliverable (0 when never produced).
    pub fn revision(&self, deliverable: &DeliverableId) -> u32 {
        self.revisions.get(deliverable).copied().unwrap_or(0)
    }

    /// Completion count of a process.
    pub fn completion_count(&self, process: &ProcessId) -> u32 {
        self.completions.get(process).copied().unwrap_or(0)
    }

    /// Updated-but-unconsumed input deliverables of a process.
    pub fn unhandled_inputs(&self, process: &ProcessId) -> Option<&BTreeSet<DeliverableId>> {
        self.unhandled.get(process)
    }

    /// Marks `deliverable` as updated-but-unconsumed for `consumer`.
    pub(crate) fn mark_unhandled(&mut self, consumer: &ProcessId, deliverable: &DeliverableId) {
        self.unhandled
            .entry(consumer.clone())
            .or_default()
            .insert(deliverable.clone());
    }

    /// Content digest excluding time: collapses equal configurations
    /// reached at different simulated times (search deduplication).
    pub fn topology_digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash_without_time(&mut hasher);
        hasher.finish()
    }

    /// Content digest including time: distinguishes the same
    /// configuration at different times (exact graph materialization).
    pub fn exact_digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash_time(&mut hasher);
        self.hash_without_time(&mut hasher);
        hasher.finish()
    }

    fn hash_time<H: Hasher>(&self, hasher: &mut H) {
        let bits = if self.time == 0.0 {
            0u64
        } else {
            self.time.to_bits()
        };
        bits.hash(hasher);
    }

    fn hash_without_time<H: Hasher>(&self, hasher: &mut H) {
        self.remaining.hash(hasher);
        self.revisions.hash(hasher);
        self.completions.hash(hasher);
        self.carried.hash(hasher);
        self.unhandled.hash(hasher);
    }
}
