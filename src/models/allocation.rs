//! Resource allocations: simultaneous commitments of resources to processes.
//!
//! An [`AllocationElement`] is one declared way to work a process (a
//! resource set plus the volume it consumes per unit time). An
//! [`Allocation`] maps processes to elements and represents one
//! decision-point commitment. The enumerator (not the type) enforces
//! that resource sets are pairwise disjoint across entries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{ProcessId, ResourceId};
use super::volume::Volume;

/// One way to work a process: which resources it ties up and how much
/// volume they consume per unit time while allocated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationElement {
    /// Resources tied up while this element is active. Never empty.
    pub resources: BTreeSet<ResourceId>,
    /// Volume consumed per unit time. Always positive.
    pub consumed: Volume,
}

impl AllocationElement {
    /// Creates an element from resource ids and a consumption rate.
    pub fn new<I, R>(resources: I, consumed: f64) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            consumed: Volume::new(consumed),
        }
    }

    /// Whether this element shares no resource with `other`.
    pub fn is_disjoint(&self, other: &AllocationElement) -> bool {
        self.resources.is_disjoint(&other.resources)
    }
}

/// A simultaneous assignment of resources to processes at one decision
/// point. Entries are ordered by process id for deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Allocation {
    entries: BTreeMap<ProcessId, AllocationElement>,
}

impl Allocation {
    /// Creates an empty allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any previous element for the process.
    pub fn with_entry(mut self, process: impl Into<ProcessId>, element: AllocationElement) -> Self {
        self.entries.insert(process.into(), element);
        self
    }

    /// Inserts an entry.
    pub fn insert(&mut self, process: ProcessId, element: AllocationElement) {
        self.entries.insert(process, element);
    }

    /// Removes the entry for `process`, if any.
    pub fn remove(&mut self, process: &ProcessId) -> Option<AllocationElement> {
        self.entries.remove(process)
    }

    /// The element assigned to `process`, if any.
    pub fn get(&self, process: &ProcessId) -> Option<&AllocationElement> {
        self.entries.get(process)
    }

    /// Whether `process` has an entry.
    pub fn contains(&self, process: &ProcessId) -> bool {
        self.entries.contains_key(process)
    }

    /// Whether the allocation has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates entries in process-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProcessId, &AllocationElement)> {
        self.entries.iter()
    }

    /// Allocated process ids in order.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessId> {
        self.entries.keys()
    }

    /// Union of all resources tied up by this allocation.
    pub fn resources(&self) -> BTreeSet<ResourceId> {
        self.entries
            .values()
            .flat_map(|e| e.resources.iter().cloned())
            .collect()
    }

    /// Total volume consumed per unit time across all entries.
    pub fn total_consumed(&self) -> Volume {
        self.entries.values().map(|e| e.consumed).sum()
    }

    /// Whether `element` shares no resource with any entry here.
    pub fn accepts(&self, element: &AllocationElement) -> bool {
        self.entries.values().all(|e| e.is_disjoint(element))
    }

    /// Returns this allocation merged with `other` (other's entries win
    /// on process-id collisions; the enumerator never produces any).
    pub fn merged(&self, other: &Allocation) -> Allocation {
        let mut entries = self.entries.clone();
        for (p, e) in &other.entries {
            entries.insert(p.clone(), e.clone());
        }
        Allocation { entries }
    }

    /// Orders allocations by descending total consumed volume, then by
    /// entry content for determinism. An allocation that consumes more
    /// volume per unit time sorts first.
    pub fn cmp_by_consumed_desc(&self, other: &Allocation) -> Ordering {
        other
            .total_consumed()
            .cmp(&self.total_consumed())
            .then_with(|| self.entries.cmp(&other.entries))
    }
}

impl FromIterator<(ProcessId, AllocationElement)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (ProcessId, AllocationElement)>>(iter: I) -> Self {
        Allocation {
            entries: iter.into_iter().collect(),
        }
    }
}
