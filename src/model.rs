//! The validated flow model: processes, deliverables, and their edges.
//!
//! The core does not validate diagram structure — cycle checks and
//! consistency rules belong to the external checker layer. What the
//! builder does enforce is reference integrity: every deliverable a
//! process names must be declared, so that all later lookups inside the
//! hot transition loops are infallible. Consumer sets, feedback
//! sources, and source deliverables are derived once at build time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;
use crate::models::{DeliverableId, ProcessId};

/// A process declaration: its input, feedback-input, and output
/// deliverables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    inputs: BTreeSet<DeliverableId>,
    feedback_inputs: BTreeSet<DeliverableId>,
    outputs: BTreeSet<DeliverableId>,
}

impl ProcessSpec {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a non-feedback input deliverable.
    pub fn with_input(mut self, deliverable: impl Into<DeliverableId>) -> Self {
        self.inputs.insert(deliverable.into());
        self
    }

    /// Adds a feedback (rework) input deliverable.
    pub fn with_feedback_input(mut self, deliverable: impl Into<DeliverableId>) -> Self {
        self.feedback_inputs.insert(deliverable.into());
        self
    }

    /// Adds an output deliverable.
    pub fn with_output(mut self, deliverable: impl Into<DeliverableId>) -> Self {
        self.outputs.insert(deliverable.into());
        self
    }
}

/// The validated process/deliverable flow diagram the engine runs over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowModel {
    processes: BTreeMap<ProcessId, ProcessSpec>,
    deliverables: BTreeSet<DeliverableId>,
    /// Deliverable → processes consuming it over a non-feedback edge.
    consumers: BTreeMap<DeliverableId, BTreeSet<ProcessId>>,
    /// Deliverable → processes consuming it over a feedback edge.
    feedback_consumers: BTreeMap<DeliverableId, BTreeSet<ProcessId>>,
    /// Deliverable → processes producing it.
    producers: BTreeMap<DeliverableId, BTreeSet<ProcessId>>,
    /// Deliverables consumed over at least one feedback edge.
    feedback_sources: BTreeSet<DeliverableId>,
    /// Deliverables with no producer; they appear at their configured
    /// availability time.
    source_deliverables: BTreeSet<DeliverableId>,
}

impl FlowModel {
    /// Starts a builder.
    pub fn builder() -> FlowModelBuilder {
        FlowModelBuilder::default()
    }

    /// All process ids in order.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessId> {
        self.processes.keys()
    }

    /// All deliverable ids in order.
    pub fn deliverables(&self) -> impl Iterator<Item = &DeliverableId> {
        self.deliverables.iter()
    }

    /// Whether `process` is declared.
    pub fn has_process(&self, process: &ProcessId) -> bool {
        self.processes.contains_key(process)
    }

    /// Non-feedback inputs of a process.
    pub fn inputs(&self, process: &ProcessId) -> &BTreeSet<DeliverableId> {
        &self.spec(process).inputs
    }

    /// Feedback inputs of a process.
    pub fn feedback_inputs(&self, process: &ProcessId) -> &BTreeSet<DeliverableId> {
        &self.spec(process).feedback_inputs
    }

    /// Outputs of a process.
    pub fn outputs(&self, process: &ProcessId) -> &BTreeSet<DeliverableId> {
        &self.spec(process).outputs
    }

    /// Processes consuming `deliverable` over non-feedback edges.
    pub fn consumers(&self, deliverable: &DeliverableId) -> Option<&BTreeSet<ProcessId>> {
        self.consumers.get(deliverable)
    }

    /// Processes consuming `deliverable` over feedback edges.
    pub fn feedback_consumers(&self, deliverable: &DeliverableId) -> Option<&BTreeSet<ProcessId>> {
        self.feedback_consumers.get(deliverable)
    }

    /// Processes producing `deliverable`.
    pub fn producers(&self, deliverable: &DeliverableId) -> Option<&BTreeSet<ProcessId>> {
        self.producers.get(deliverable)
    }

    /// Deliverables consumed over at least one feedback edge.
    pub fn feedback_sources(&self) -> &BTreeSet<DeliverableId> {
        &self.feedback_sources
    }

    /// Deliverables with no producer.
    pub fn source_deliverables(&self) -> &BTreeSet<DeliverableId> {
        &self.source_deliverables
    }

    /// Processes and deliverables backward-reachable from `process`
    /// over non-feedback edges only (feedback edges are not traversed).
    /// The starting process itself is excluded from the process set.
    pub fn backward_reachable(
        &self,
        process: &ProcessId,
    ) -> (BTreeSet<ProcessId>, BTreeSet<DeliverableId>) {
        let mut seen_p = BTreeSet::new();
        let mut seen_d = BTreeSet::new();
        let mut stack: Vec<ProcessId> = vec![process.clone()];
        let mut visited = BTreeSet::new();

        while let Some(p) = stack.pop() {
            if !visited.insert(p.clone()) {
                continue;
            }
            for d in &self.spec(&p).inputs {
                if seen_d.insert(d.clone()) {
                    if let Some(prods) = self.producers.get(d) {
                        for q in prods {
                            if q != process {
                                seen_p.insert(q.clone());
                            }
                            stack.push(q.clone());
                        }
                    }
                }
            }
        }

        (seen_p, seen_d)
    }

    fn spec(&self, process: &ProcessId) -> &ProcessSpec {
        self.processes
            .get(process)
            .unwrap_or_else(|| panic!("unvalidated process id '{process}'"))
    }
}

/// Builder for [`FlowModel`].
#[derive(Debug, Clone, Default)]
pub struct FlowModelBuilder {
    processes: BTreeMap<ProcessId, ProcessSpec>,
    deliverables: BTreeSet<DeliverableId>,
}

impl FlowModelBuilder {
    /// Declares a deliverable.
    pub fn with_deliverable(mut self, deliverable: impl Into<DeliverableId>) -> Self {
        self.deliverables.insert(deliverable.into());
        self
    }

    /// Declares a process with its edges.
    pub fn with_process(mut self, process: impl Into<ProcessId>, spec: ProcessSpec) -> Self {
        self.processes.insert(process.into(), spec);
        self
    }

    /// Validates reference integrity and derives consumer/producer sets.
    pub fn build(self) -> Result<FlowModel, ConfigError> {
        let mut consumers: BTreeMap<DeliverableId, BTreeSet<ProcessId>> = BTreeMap::new();
        let mut feedback_consumers: BTreeMap<DeliverableId, BTreeSet<ProcessId>> = BTreeMap::new();
        let mut producers: BTreeMap<DeliverableId, BTreeSet<ProcessId>> = BTreeMap::new();
        let mut feedback_sources = BTreeSet::new();

        for (p, spec) in &self.processes {
            for d in spec
                .inputs
                .iter()
                .chain(&spec.feedback_inputs)
                .chain(&spec.outputs)
            {
                if !self.deliverables.contains(d) {
                    return Err(ConfigError::UnknownDeliverable {
                        process: p.clone(),
                        deliverable: d.clone(),
                    });
                }
            }
            for d in &spec.inputs {
                consumers.entry(d.clone()).or_default().insert(p.clone());
            }
            for d in &spec.feedback_inputs {
                feedback_consumers
                    .entry(d.clone())
                    .or_default()
                    .insert(p.clone());
                feedback_sources.insert(d.clone());
            }
            for d in &spec.outputs {
                producers.entry(d.clone()).or_default().insert(p.clone());
            }
        }

        let source_deliverables = self
            .deliverables
            .iter()
            .filter(|d| !producers.contains_key(*d))
            .cloned()
            .collect();

        Ok(FlowModel {
            processes: self.processes,
            deliverables: self.deliverables,
            consumers,
            feedback_consumers,
            producers,
            feedback_sources,
            source_deliverables,
        })
    }
}
