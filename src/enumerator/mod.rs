//! Allocation enumeration: candidate simultaneous resource commitments.
//!
//! Given the carried-over allocation and, per newly-allocatable
//! process, its declared allocation alternatives, the enumerator
//! produces every candidate [`Allocation`] for the next transition.
//! Two algorithms share the contract:
//!
//! - [`exact`]: depth-first skip/take enumeration of all feasible
//!   combinations.
//! - [`maximal`]: Bron–Kerbosch maximal-independent-set search over the
//!   option conflict graph; returns only maximal combinations. Used
//!   above a configurable option-count threshold to bound the blow-up.
//!
//! Shared postconditions: every result is merged with the carry-over,
//! resource sets are pairwise disjoint, results are ordered by total
//! consumed volume descending, and assignments that merge to an empty
//! allocation are discarded (permitting them would allow true no-op
//! self-transitions, making the reachable state space infinite).

mod exact;
mod maximal;

pub use exact::enumerate_exact;
pub use maximal::enumerate_maximal;

use serde::{Deserialize, Serialize};

use crate::models::{Allocation, AllocationElement, ProcessId};

/// One (process, alternative) option in the flattened universe.
#[derive(Debug, Clone)]
pub(crate) struct Option_ {
    pub process: ProcessId,
    pub element: AllocationElement,
}

/// Which enumeration algorithm the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationPolicy {
    /// Always enumerate every feasible combination.
    Exact,
    /// Always enumerate maximal combinations only.
    MaximalOnly,
    /// Exact up to `max_exact_options` flattened options, maximal-only
    /// above.
    Auto { max_exact_options: usize },
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        AllocationPolicy::Auto {
            max_exact_options: 24,
        }
    }
}

/// Enumerates candidate allocations per the policy.
///
/// `candidates` lists each newly-allocatable process with its declared
/// alternatives, in process-id order.
pub fn enumerate(
    policy: AllocationPolicy,
    carried: &Allocation,
    candidates: &[(ProcessId, Vec<AllocationElement>)],
) -> Vec<Allocation> {
    let options = flatten(carried, candidates);
    match policy {
        AllocationPolicy::Exact => enumerate_exact(carried, &options),
        AllocationPolicy::MaximalOnly => enumerate_maximal(carried, &options),
        AllocationPolicy::Auto { max_exact_options } => {
            if options.len() > max_exact_options {
                enumerate_maximal(carried, &options)
            } else {
                enumerate_exact(carried, &options)
            }
        }
    }
}

/// Flattens alternatives into one option universe, dropping options
/// that conflict with resources the carry-over already ties up.
fn flatten(
    carried: &Allocation,
    candidates: &[(ProcessId, Vec<AllocationElement>)],
) -> Vec<Option_> {
    let mut options = Vec::new();
    for (process, alternatives) in candidates {
        for element in alternatives {
            if carried.accepts(element) {
                options.push(Option_ {
                    process: process.clone(),
                    element: element.clone(),
                });
            }
        }
    }
    options
}

/// Whether two options may coexist: different processes and disjoint
/// resource sets.
pub(crate) fn compatible(a: &Option_, b: &Option_) -> bool {
    a.process != b.process && a.element.is_disjoint(&b.element)
}

/// Sorts results by descending total consumed volume (ties broken by
/// allocation content for determinism).
pub(crate) fn sort_by_consumed_desc(allocations: &mut Vec<Allocation>) {
    allocations.sort_by(|a, b| a.cmp_by_consumed_desc(b));
}
