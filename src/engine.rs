//! The transition engine: pure functions from state to successor states.
//!
//! [`Env`] is built once per run from a validated [`FlowModel`] and the
//! externally supplied configuration functions, and is the only
//! non-snapshot structure in the crate. All of its operations are pure
//! over immutable [`State`] values: classification
//! ([`Env::allocatability`]), completion ([`Env::is_completed`]), and
//! successor computation ([`Env::transitions`] / [`Env::next_state`]).
//! An `Env` can be cloned with substituted volume functions for
//! perturbation analysis without affecting the original.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::enumerator::{enumerate, AllocationPolicy};
use crate::error::{ConfigError, EngineError};
use crate::model::FlowModel;
use crate::models::{
    Allocation, AllocationElement, DeliverableId, ProcessId, State, Trans, Volume,
};
use crate::precondition::{EvalContext, Precondition};

/// Rework volume of a process after `n` completions; `n = 0` is the
/// initial volume.
pub type ReworkVolumeFn = Arc<dyn Fn(&ProcessId, u32) -> f64 + Send + Sync>;

/// Per-process allocatability in a given state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Allocatability {
    /// The process is mid-execution (present in the carried allocation).
    OkContinue,
    /// The process may start now.
    OkStart,
    /// Some non-feedback input deliverable has never been produced.
    InsufficientInputs { missing: BTreeSet<DeliverableId> },
    /// No input deliverable has been updated since the last consumption.
    NoDeliverableUpdates { inputs: BTreeSet<DeliverableId> },
    /// The process's precondition evaluated to false.
    PreconditionNotMet { trace: String },
}

impl Allocatability {
    /// Whether the process is running or could start.
    pub fn is_ok(&self) -> bool {
        matches!(self, Allocatability::OkContinue | Allocatability::OkStart)
    }
}

/// The execution environment over a validated flow model.
#[derive(Clone)]
pub struct Env {
    model: FlowModel,
    initial_volumes: BTreeMap<ProcessId, Volume>,
    rework_volume: ReworkVolumeFn,
    alternatives: BTreeMap<ProcessId, Vec<AllocationElement>>,
    /// Availability time per source deliverable.
    availability: BTreeMap<DeliverableId, f64>,
    /// Compiled (macro-expanded) precondition per process.
    preconditions: BTreeMap<ProcessId, Precondition>,
    /// Maximum revision per feedback-source deliverable.
    max_revisions: BTreeMap<DeliverableId, u32>,
    policy: AllocationPolicy,
    /// Fastest declared consumption rate per process (heuristic bound).
    fastest_rate: BTreeMap<ProcessId, f64>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("processes", &self.initial_volumes.len())
            .field("feedback_sources", &self.max_revisions.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Env {
    /// Starts a builder over a validated model.
    pub fn builder(model: FlowModel) -> EnvBuilder {
        EnvBuilder::new(model)
    }

    /// The flow model this environment runs over.
    pub fn model(&self) -> &FlowModel {
        &self.model
    }

    /// The configured maximum revision of a feedback source.
    pub fn max_revision(&self, deliverable: &DeliverableId) -> u32 {
        *self
            .max_revisions
            .get(deliverable)
            .unwrap_or_else(|| panic!("unvalidated feedback source '{deliverable}'"))
    }

    /// Declared allocation alternatives of a process.
    pub fn alternatives(&self, process: &ProcessId) -> &[AllocationElement] {
        self.alternatives
            .get(process)
            .unwrap_or_else(|| panic!("unvalidated process id '{process}'"))
    }

    /// Initial volume of a process.
    pub fn initial_volume(&self, process: &ProcessId) -> Volume {
        *self
            .initial_volumes
            .get(process)
            .unwrap_or_else(|| panic!("unvalidated process id '{process}'"))
    }

    /// The state at simulated time zero.
    pub fn initial_state(&self) -> State {
        let mut state = State {
            time: 0.0,
            remaining: self.initial_volumes.clone(),
            revisions: self.model.deliverables().map(|d| (d.clone(), 0)).collect(),
            completions: self.model.processes().map(|p| (p.clone(), 0)).collect(),
            carried: Allocation::new(),
            unhandled: BTreeMap::new(),
        };
        self.apply_availability(&mut state);
        state
    }

    /// Classifies whether one process can run in one state.
    pub fn allocatability(&self, state: &State, process: &ProcessId) -> Allocatability {
        if state.carried.contains(process) {
            return Allocatability::OkContinue;
        }

        let missing: BTreeSet<DeliverableId> = self
            .model
            .inputs(process)
            .iter()
            .filter(|d| state.revision(d) == 0)
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Allocatability::InsufficientInputs { missing };
        }

        let has_updates = state
            .unhandled_inputs(process)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_updates {
            let inputs = self
                .model
                .inputs(process)
                .union(self.model.feedback_inputs(process))
                .cloned()
                .collect();
            return Allocatability::NoDeliverableUpdates { inputs };
        }

        let precondition = self
            .preconditions
            .get(process)
            .unwrap_or_else(|| panic!("unvalidated process id '{process}'"));
        let eval = precondition.eval(&StateContext { env: self, state });
        if !eval.outcome {
            return Allocatability::PreconditionNotMet {
                trace: eval.render(),
            };
        }

        Allocatability::OkStart
    }

    /// All processes classified OkStart, in id order.
    pub fn newly_allocatables(&self, state: &State) -> Vec<ProcessId> {
        self.model
            .processes()
            .filter(|p| self.allocatability(state, p) == Allocatability::OkStart)
            .cloned()
            .collect()
    }

    /// Whether execution is finished: every source deliverable's
    /// availability time has passed and no process is running or
    /// startable. Processes blocked only by missing updates are
    /// tolerated; missing inputs or an unmet precondition block
    /// completion.
    pub fn is_completed(&self, state: &State) -> bool {
        if self.availability.values().any(|&t| t > state.time) {
            return false;
        }
        self.model.processes().all(|p| {
            matches!(
                self.allocatability(state, p),
                Allocatability::NoDeliverableUpdates { .. }
            )
        })
    }

    /// Candidate allocations for the next transition (the
    /// `AvailableAllocationsFunc` contract, dispatched per policy).
    pub fn available_allocations(
        &self,
        state: &State,
        candidates: &[ProcessId],
    ) -> Vec<Allocation> {
        let table: Vec<(ProcessId, Vec<AllocationElement>)> = candidates
            .iter()
            .map(|p| (p.clone(), self.alternatives(p).to_vec()))
            .collect();
        enumerate(self.policy, &state.carried, &table)
    }

    /// All transitions out of `state`, ordered by descending total
    /// consumed volume. Empty when the state is completed, or when it
    /// is an unresolved deadlock (logged).
    ///
    /// When the enumerator offers nothing but carried work or a pending
    /// source-deliverable availability tick exists, the single fallback
    /// candidate "keep the current carry-over" is synthesized; this is
    /// deliberately lenient, since a stalled process may resume once a
    /// source deliverable becomes available.
    pub fn transitions(&self, state: &State) -> Result<Vec<Trans>, EngineError> {
        if self.is_completed(state) {
            return Ok(Vec::new());
        }

        let candidates = self.newly_allocatables(state);
        let mut allocations = self.available_allocations(state, &candidates);

        if allocations.is_empty() {
            let pending_source = self
                .availability
                .keys()
                .any(|d| state.revision(d) == 0);
            if state.carried.is_empty() && !pending_source {
                warn!(
                    time = state.time,
                    "unresolved deadlock: incomplete state with no allocation"
                );
                return Ok(Vec::new());
            }
            allocations = vec![state.carried.clone()];
        }

        let mut transitions = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let next = self.next_state(state, &allocation)?;
            transitions.push(Trans::new(allocation, next));
        }
        Ok(transitions)
    }

    /// Computes the successor of `state` under `allocation`.
    ///
    /// Advances time to the nearest of (a) the earliest allocated
    /// process draining its volume at its current rate, (b) the
    /// earliest pending source-deliverable availability. Returns
    /// [`EngineError::Stalled`] when neither exists; a successor is
    /// never partially committed.
    pub fn next_state(&self, state: &State, allocation: &Allocation) -> Result<State, EngineError> {
        let mut dt: Option<f64> = None;
        for (p, element) in allocation.iter() {
            if let Some(t) = state
                .remaining
                .get(p)
                .and_then(|v| v.time_to_zero(element.consumed.get()))
            {
                dt = Some(dt.map_or(t, |cur: f64| cur.min(t)));
            }
        }
        for (d, &avail) in &self.availability {
            if state.revision(d) == 0 && avail > state.time {
                let t = avail - state.time;
                dt = Some(dt.map_or(t, |cur: f64| cur.min(t)));
            }
        }
        let dt = dt.ok_or_else(|| EngineError::Stalled {
            diagnostic: self.diagnostic(state),
        })?;

        let mut next = state.clone();
        next.time = state.time + dt;

        // Starting a process consumes its pending updates.
        for p in allocation.processes() {
            if !state.carried.contains(p) {
                next.unhandled.remove(p);
            }
        }

        let mut carried = allocation.clone();
        let mut completed = Vec::new();
        for (p, element) in allocation.iter() {
            let remaining = next
                .remaining
                .get(p)
                .copied()
                .unwrap_or(Volume::ZERO)
                .consume(element.consumed.get() * dt);
            next.remaining.insert(p.clone(), remaining);
            if remaining.is_zero() {
                completed.push(p.clone());
            }
        }

        for p in &completed {
            carried.remove(p);
            let count = next.completion_count(p) + 1;
            next.completions.insert(p.clone(), count);
            next.remaining
                .insert(p.clone(), Volume::new((self.rework_volume)(p, count)));

            for d in self.model.outputs(p) {
                let revision = next.revision(d) + 1;
                next.revisions.insert(d.clone(), revision);

                if let Some(consumers) = self.model.consumers(d) {
                    for q in consumers {
                        next.mark_unhandled(q, d);
                    }
                }
                // A feedback source that just hit its revision cap is not
                // re-offered to its feedback consumers; this bounds loop
                // iteration and guarantees termination.
                let capped = self.model.feedback_sources().contains(d)
                    && revision >= self.max_revision(d);
                if !capped {
                    if let Some(consumers) = self.model.feedback_consumers(d) {
                        for q in consumers {
                            next.mark_unhandled(q, d);
                        }
                    }
                }
            }
        }
        next.carried = carried;

        self.apply_availability(&mut next);
        Ok(next)
    }

    /// Lower bound on the remaining time to completion (heuristic `h`).
    pub fn remaining_lower_bound(&self, state: &State) -> f64 {
        let mut bound: f64 = 0.0;
        for (p, &remaining) in &state.remaining {
            if state.completion_count(p) == 0 && !remaining.is_zero() {
                let rate = self.fastest_rate.get(p).copied().unwrap_or(1.0);
                bound = bound.max(remaining.get() / rate);
            }
        }
        for (d, &avail) in &self.availability {
            if state.revision(d) == 0 && avail > state.time {
                bound = bound.max(avail - state.time);
            }
        }
        bound
    }

    /// Serialized state plus per-process allocatability, for error
    /// payloads and logs.
    pub fn diagnostic(&self, state: &State) -> String {
        let mut dumper = Dumper::new();
        dumper.dump(self, state).to_string()
    }

    /// A copy of this environment with `process`'s volume replaced and
    /// its per-unit consumption normalized to 1, for elasticity probes.
    /// The rework-volume function is left untouched (known limitation
    /// of the probe).
    pub fn with_probe_volume(&self, process: &ProcessId, volume: f64) -> Env {
        let mut env = self.clone();
        env.initial_volumes
            .insert(process.clone(), Volume::new(volume));
        let normalized: Vec<AllocationElement> = self
            .alternatives(process)
            .iter()
            .map(|e| AllocationElement {
                resources: e.resources.clone(),
                consumed: Volume::new(1.0),
            })
            .collect();
        env.alternatives.insert(process.clone(), normalized);
        env.fastest_rate.insert(process.clone(), 1.0);
        env
    }

    /// Marks newly available source deliverables (revision 0 whose
    /// availability time has passed) and offers them to their consumers.
    fn apply_availability(&self, state: &mut State) {
        let due: Vec<DeliverableId> = self
            .availability
            .iter()
            .filter(|(d, &t)| state.revision(d) == 0 && t <= state.time)
            .map(|(d, _)| d.clone())
            .collect();
        for d in due {
            state.revisions.insert(d.clone(), 1);
            if let Some(consumers) = self.model.consumers(&d) {
                for q in consumers {
                    state.mark_unhandled(q, &d);
                }
            }
            if let Some(consumers) = self.model.feedback_consumers(&d) {
                for q in consumers {
                    state.mark_unhandled(q, &d);
                }
            }
        }
    }
}

/// Per-state adapter giving precondition leaves access to the engine.
struct StateContext<'a> {
    env: &'a Env,
    state: &'a State,
}

impl EvalContext for StateContext<'_> {
    fn feedback_source_completed(&self, deliverable: &DeliverableId) -> (bool, String) {
        let revision = self.state.revision(deliverable);
        let max = self.env.max_revision(deliverable);
        (revision >= max, format!("revision {revision} of max {max}"))
    }

    fn executable(&self, process: &ProcessId) -> (bool, String) {
        let result = self.env.allocatability(self.state, process);
        let label = match &result {
            Allocatability::OkContinue => "OK_CONTINUE",
            Allocatability::OkStart => "OK_START",
            Allocatability::InsufficientInputs { .. } => "NG_INSUFFICIENT_INPUTS",
            Allocatability::NoDeliverableUpdates { .. } => "NG_NO_DELIVERABLE_UPDATES",
            Allocatability::PreconditionNotMet { .. } => "NG_PRECONDITION_NOT_MET",
        };
        (result.is_ok(), label.to_string())
    }
}

/// Reusable text builder for state diagnostics.
///
/// The buffer is reset at the start of every dump. One `Dumper` must
/// not be shared across uncoordinated threads.
#[derive(Debug, Default)]
pub struct Dumper {
    buf: String,
}

impl Dumper {
    /// Creates a dumper with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders `state` plus per-process allocatability. The returned
    /// slice is valid until the next dump.
    pub fn dump(&mut self, env: &Env, state: &State) -> &str {
        self.buf.clear();
        let _ = writeln!(self.buf, "time: {}", state.time);
        let _ = writeln!(self.buf, "remaining:");
        for (p, v) in &state.remaining {
            let _ = writeln!(self.buf, "  {p}: {}", v.get());
        }
        let _ = writeln!(self.buf, "revisions:");
        for (d, r) in &state.revisions {
            let _ = writeln!(self.buf, "  {d}: {r}");
        }
        let _ = writeln!(self.buf, "carried: {} entries", state.carried.len());
        for (p, e) in state.carried.iter() {
            let _ = writeln!(self.buf, "  {p}: rate {}", e.consumed.get());
        }
        let _ = writeln!(self.buf, "allocatability:");
        for p in env.model().processes() {
            let _ = writeln!(self.buf, "  {p}: {:?}", env.allocatability(state, p));
        }
        &self.buf
    }
}

/// Builder collecting the externally supplied configuration for [`Env`].
pub struct EnvBuilder {
    model: FlowModel,
    initial_volume: Option<Arc<dyn Fn(&ProcessId) -> f64 + Send + Sync>>,
    rework_volume: Option<ReworkVolumeFn>,
    alternatives: Option<Arc<dyn Fn(&ProcessId) -> Vec<AllocationElement> + Send + Sync>>,
    availability: Arc<dyn Fn(&DeliverableId) -> f64 + Send + Sync>,
    preconditions: BTreeMap<ProcessId, Precondition>,
    max_revisions: BTreeMap<DeliverableId, u32>,
    policy: AllocationPolicy,
}

impl EnvBuilder {
    fn new(model: FlowModel) -> Self {
        Self {
            model,
            initial_volume: None,
            rework_volume: None,
            alternatives: None,
            availability: Arc::new(|_| 0.0),
            preconditions: BTreeMap::new(),
            max_revisions: BTreeMap::new(),
            policy: AllocationPolicy::default(),
        }
    }

    /// Sets the initial-volume function (required).
    pub fn with_initial_volume(
        mut self,
        f: impl Fn(&ProcessId) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.initial_volume = Some(Arc::new(f));
        self
    }

    /// Sets the rework-volume function (required).
    pub fn with_rework_volume(
        mut self,
        f: impl Fn(&ProcessId, u32) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.rework_volume = Some(Arc::new(f));
        self
    }

    /// Sets the allocation-alternatives function (required).
    pub fn with_alternatives(
        mut self,
        f: impl Fn(&ProcessId) -> Vec<AllocationElement> + Send + Sync + 'static,
    ) -> Self {
        self.alternatives = Some(Arc::new(f));
        self
    }

    /// Sets the source-deliverable availability-time function
    /// (defaults to 0 for every source).
    pub fn with_availability(
        mut self,
        f: impl Fn(&DeliverableId) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.availability = Arc::new(f);
        self
    }

    /// Sets one process's precondition (defaults to TRUE).
    pub fn with_precondition(
        mut self,
        process: impl Into<ProcessId>,
        precondition: Precondition,
    ) -> Self {
        self.preconditions.insert(process.into(), precondition);
        self
    }

    /// Sets the maximum revision of a feedback-source deliverable
    /// (required for every feedback source).
    pub fn with_max_revision(mut self, deliverable: impl Into<DeliverableId>, max: u32) -> Self {
        self.max_revisions.insert(deliverable.into(), max);
        self
    }

    /// Sets the allocation enumeration policy.
    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates the configuration against the model and builds the
    /// environment. All identifier-keyed lookups are checked here so
    /// the transition loops never see a missing entry.
    pub fn build(self) -> Result<Env, ConfigError> {
        let initial_volume = self
            .initial_volume
            .clone()
            .ok_or(ConfigError::MissingConfig("initial volume function"))?;
        let rework_volume = self
            .rework_volume
            .clone()
            .ok_or(ConfigError::MissingConfig("rework volume function"))?;
        let alternatives_fn = self
            .alternatives
            .clone()
            .ok_or(ConfigError::MissingConfig("alternatives function"))?;

        let mut initial_volumes = BTreeMap::new();
        let mut alternatives = BTreeMap::new();
        let mut fastest_rate = BTreeMap::new();
        for p in self.model.processes() {
            let volume = initial_volume(p);
            if volume <= 0.0 {
                return Err(ConfigError::NonPositiveVolume(p.clone()));
            }
            initial_volumes.insert(p.clone(), Volume::new(volume));

            let alts = alternatives_fn(p);
            if alts.is_empty() {
                return Err(ConfigError::NoAlternatives(p.clone()));
            }
            for alt in &alts {
                if alt.resources.is_empty() || alt.consumed.is_zero() {
                    return Err(ConfigError::DegenerateAlternative(p.clone()));
                }
            }
            let fastest = alts
                .iter()
                .map(|a| a.consumed.get())
                .fold(0.0_f64, f64::max);
            fastest_rate.insert(p.clone(), fastest);
            alternatives.insert(p.clone(), alts);
        }

        for d in self.model.feedback_sources() {
            if !self.max_revisions.contains_key(d) {
                return Err(ConfigError::MissingMaxRevision(d.clone()));
            }
        }

        let mut preconditions = BTreeMap::new();
        for p in self.model.processes() {
            let raw = self
                .preconditions
                .get(p)
                .cloned()
                .unwrap_or(Precondition::True);
            self.check_precondition_refs(p, &raw)?;
            // Compile once; re-expanding the macro per evaluation would
            // walk the model graph inside the hot loop.
            preconditions.insert(p.clone(), raw.compile(&self.model));
        }

        let availability = self
            .model
            .source_deliverables()
            .iter()
            .map(|d| (d.clone(), (self.availability)(d)))
            .collect();

        Ok(Env {
            model: self.model,
            initial_volumes,
            rework_volume,
            alternatives,
            availability,
            preconditions,
            max_revisions: self.max_revisions,
            policy: self.policy,
            fastest_rate,
        })
    }

    fn check_precondition_refs(
        &self,
        owner: &ProcessId,
        precondition: &Precondition,
    ) -> Result<(), ConfigError> {
        let mut bad_deliverable: Option<DeliverableId> = None;
        let mut bad_process: Option<ProcessId> = None;
        precondition.for_each_ref(
            &mut |d| {
                if bad_deliverable.is_none() && !self.model.feedback_sources().contains(d) {
                    bad_deliverable = Some(d.clone());
                }
            },
            &mut |p| {
                if bad_process.is_none() && !self.model.has_process(p) {
                    bad_process = Some(p.clone());
                }
            },
        );
        if let Some(deliverable) = bad_deliverable {
            return Err(ConfigError::NotAFeedbackSource {
                process: owner.clone(),
                deliverable,
            });
        }
        if let Some(process) = bad_process {
            return Err(ConfigError::UnknownPreconditionRef {
                process: owner.clone(),
                identifier: process.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessSpec;
    use crate::models::exponential_rework;

    /// spec → build → bin → test → report, one shared resource.
    fn linear_env() -> Env {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("bin")
            .with_deliverable("report")
            .with_process(
                "build",
                ProcessSpec::new().with_input("spec").with_output("bin"),
            )
            .with_process(
                "test",
                ProcessSpec::new().with_input("bin").with_output("report"),
            )
            .build()
            .unwrap();

        Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, n| exponential_rework(1.0, 0.5, n).get())
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .build()
            .unwrap()
    }

    fn pid(s: &str) -> ProcessId {
        ProcessId::new(s)
    }

    fn did(s: &str) -> DeliverableId {
        DeliverableId::new(s)
    }

    #[test]
    fn test_initial_state_offers_sources() {
        let env = linear_env();
        let s0 = env.initial_state();

        assert_eq!(s0.time, 0.0);
        assert_eq!(s0.revision(&did("spec")), 1);
        assert_eq!(s0.revision(&did("bin")), 0);
        assert_eq!(env.allocatability(&s0, &pid("build")), Allocatability::OkStart);
        assert!(matches!(
            env.allocatability(&s0, &pid("test")),
            Allocatability::InsufficientInputs { .. }
        ));
        assert!(!env.is_completed(&s0));
    }

    #[test]
    fn test_next_state_completes_and_offers_output() {
        let env = linear_env();
        let s0 = env.initial_state();
        let alloc = Allocation::new().with_entry("build", AllocationElement::new(["r1"], 1.0));

        let s1 = env.next_state(&s0, &alloc).unwrap();
        assert_eq!(s1.time, 1.0);
        assert_eq!(s1.completion_count(&pid("build")), 1);
        assert_eq!(s1.revision(&did("bin")), 1);
        // Rework volume replaced the drained volume.
        assert_eq!(s1.remaining[&pid("build")].get(), 0.5);
        assert!(s1.carried.is_empty());
        // test now has an update and can start.
        assert_eq!(env.allocatability(&s1, &pid("test")), Allocatability::OkStart);
        // build consumed its updates and has none pending.
        assert!(matches!(
            env.allocatability(&s1, &pid("build")),
            Allocatability::NoDeliverableUpdates { .. }
        ));
    }

    #[test]
    fn test_partial_progress_carries_allocation() {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("a")
            .with_deliverable("b")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("a"))
            .with_process("p2", ProcessSpec::new().with_input("spec").with_output("b"))
            .build()
            .unwrap();
        let env = Env::builder(model)
            .with_initial_volume(|p| if p.as_str() == "p1" { 1.0 } else { 2.0 })
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|p| {
                if p.as_str() == "p1" {
                    vec![AllocationElement::new(["r1"], 1.0)]
                } else {
                    vec![AllocationElement::new(["r2"], 1.0)]
                }
            })
            .build()
            .unwrap();

        let s0 = env.initial_state();
        let alloc = Allocation::new()
            .with_entry("p1", AllocationElement::new(["r1"], 1.0))
            .with_entry("p2", AllocationElement::new(["r2"], 1.0));
        let s1 = env.next_state(&s0, &alloc).unwrap();

        // p1 drains first at t=1; p2 keeps its allocation with 1.0 left.
        assert_eq!(s1.time, 1.0);
        assert_eq!(s1.completion_count(&pid("p1")), 1);
        assert_eq!(s1.completion_count(&pid("p2")), 0);
        assert!(s1.carried.contains(&pid("p2")));
        assert!(!s1.carried.contains(&pid("p1")));
        assert_eq!(s1.remaining[&pid("p2")].get(), 1.0);
        assert_eq!(env.allocatability(&s1, &pid("p2")), Allocatability::OkContinue);
    }

    #[test]
    fn test_transition_determinism() {
        let env = linear_env();
        let s0 = env.initial_state();
        for trans in env.transitions(&s0).unwrap() {
            let replayed = env.next_state(&s0, &trans.allocation).unwrap();
            assert_eq!(replayed, trans.state);
            assert_eq!(replayed.exact_digest(), trans.state.exact_digest());
        }
    }

    #[test]
    fn test_run_to_completion() {
        let env = linear_env();
        let mut state = env.initial_state();
        let mut guard = 0;
        while !env.is_completed(&state) {
            let transitions = env.transitions(&state).unwrap();
            assert!(!transitions.is_empty(), "deadlock at t={}", state.time);
            state = transitions.into_iter().next().unwrap().state;
            guard += 1;
            assert!(guard < 20);
        }
        // Once completed, no transitions are offered.
        assert!(env.transitions(&state).unwrap().is_empty());
        assert_eq!(state.revision(&did("report")), 1);
        assert_eq!(state.time, 2.0);
    }

    #[test]
    fn test_delayed_source_advances_on_availability_tick() {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("out")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("out"))
            .build()
            .unwrap();
        let env = Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .with_availability(|_| 5.0)
            .build()
            .unwrap();

        let s0 = env.initial_state();
        assert_eq!(s0.revision(&did("spec")), 0);
        assert!(!env.is_completed(&s0));

        // Nothing is allocatable, nothing carried: the fallback empty
        // carry-over advances time to the availability tick.
        let transitions = env.transitions(&s0).unwrap();
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].allocation.is_empty());
        let s1 = &transitions[0].state;
        assert_eq!(s1.time, 5.0);
        assert_eq!(s1.revision(&did("spec")), 1);
        assert_eq!(env.allocatability(s1, &pid("p1")), Allocatability::OkStart);
    }

    #[test]
    fn test_feedback_revision_cap_stops_rework() {
        // design emits draft; review consumes draft and emits doc, which
        // feeds back into design. doc capped at revision 2.
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("draft")
            .with_deliverable("doc")
            .with_process(
                "design",
                ProcessSpec::new()
                    .with_input("spec")
                    .with_feedback_input("doc")
                    .with_output("draft"),
            )
            .with_process(
                "review",
                ProcessSpec::new().with_input("draft").with_output("doc"),
            )
            .build()
            .unwrap();
        let env = Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, n| exponential_rework(1.0, 0.5, n).get())
            .with_alternatives(|p| {
                if p.as_str() == "design" {
                    vec![AllocationElement::new(["r1"], 1.0)]
                } else {
                    vec![AllocationElement::new(["r2"], 1.0)]
                }
            })
            .with_max_revision("doc", 2)
            .build()
            .unwrap();

        let mut state = env.initial_state();
        let mut guard = 0;
        while !env.is_completed(&state) {
            let transitions = env.transitions(&state).unwrap();
            assert!(!transitions.is_empty(), "deadlock at t={}", state.time);
            state = transitions.into_iter().next().unwrap().state;
            guard += 1;
            assert!(guard < 50, "feedback loop did not terminate");
        }
        // doc reached its cap and design was not re-offered the update.
        assert_eq!(state.revision(&did("doc")), 2);
        assert_eq!(state.completion_count(&pid("design")), 2);
    }

    #[test]
    fn test_precondition_blocks_start_and_completion() {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("out")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("out"))
            .build()
            .unwrap();
        let env = Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .with_precondition("p1", Precondition::Or(vec![]))
            .build()
            .unwrap();

        let s0 = env.initial_state();
        match env.allocatability(&s0, &pid("p1")) {
            Allocatability::PreconditionNotMet { trace } => {
                assert!(trace.contains("OR = false"));
            }
            other => panic!("expected PreconditionNotMet, got {other:?}"),
        }
        // An unmet precondition blocks completion.
        assert!(!env.is_completed(&s0));
        // And with nothing else to do, the state is an unresolved deadlock.
        assert!(env.transitions(&s0).unwrap().is_empty());
    }

    #[test]
    fn test_builder_validation() {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("out")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("out"))
            .build()
            .unwrap();

        let err = Env::builder(model.clone())
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfig(_)));

        let err = Env::builder(model.clone())
            .with_initial_volume(|_| 0.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveVolume(pid("p1")));

        let err = Env::builder(model.clone())
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NoAlternatives(pid("p1")));

        let err = Env::builder(model.clone())
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .with_precondition(
                "p1",
                Precondition::FeedbackSourceCompleted(did("out")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAFeedbackSource { .. }));

        let err = Env::builder(model)
            .with_initial_volume(|_| 1.0)
            .with_rework_volume(|_, _| 0.5)
            .with_alternatives(|_| vec![AllocationElement::new(["r1"], 1.0)])
            .with_precondition(
                "p1",
                Precondition::Executable(pid("missing")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreconditionRef { .. }));
    }

    #[test]
    fn test_diagnostic_dump_contents() {
        let env = linear_env();
        let s0 = env.initial_state();
        let mut dumper = Dumper::new();
        let text = dumper.dump(&env, &s0);
        assert!(text.contains("time: 0"));
        assert!(text.contains("build"));
        assert!(text.contains("OkStart"));

        // The buffer is reset between dumps, not appended to.
        let len = text.len();
        let again = dumper.dump(&env, &s0);
        assert_eq!(again.len(), len);
    }

    #[test]
    fn test_probe_env_does_not_affect_original() {
        let env = linear_env();
        let probed = env.with_probe_volume(&pid("build"), 3.0);

        assert_eq!(probed.initial_volume(&pid("build")).get(), 3.0);
        assert_eq!(env.initial_volume(&pid("build")).get(), 1.0);
        assert_eq!(probed.alternatives(&pid("build"))[0].consumed.get(), 1.0);
    }
}
