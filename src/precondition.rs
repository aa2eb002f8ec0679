//! Precondition expressions: a small recursive boolean language over
//! process and deliverable status.
//!
//! A [`Precondition`] gates when a process may start. Leaf predicates
//! query the current state through an [`EvalContext`] (implemented by
//! the engine per state), so the expression tree itself stays a plain
//! serializable value. Evaluation returns a [`PreconditionEval`] tree
//! mirroring the input with an outcome and diagnostic at every node.
//!
//! The macro variant [`Precondition::AllBackwardFeedbackSourcesCompleted`]
//! is expanded exactly once by [`Precondition::compile`] and the result
//! cached per process by the engine; re-expanding it inside the hot
//! evaluation loop would walk the model graph per state.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::model::FlowModel;
use crate::models::{DeliverableId, ProcessId};

/// A boolean expression over process/deliverable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// Always true.
    True,
    /// Logical negation.
    Not(Box<Precondition>),
    /// True iff all operands are true (true when empty).
    And(Vec<Precondition>),
    /// True iff any operand is true (false when empty).
    Or(Vec<Precondition>),
    /// True iff the deliverable's revision has reached its configured
    /// maximum. Valid only for feedback-source deliverables.
    FeedbackSourceCompleted(DeliverableId),
    /// True iff the process's current allocatability is OK (it is
    /// running or could start now).
    Executable(ProcessId),
    /// Macro: "every feedback loop upstream of this process is drained
    /// and not about to refire." Expanded by [`Precondition::compile`]
    /// into an AND of `FeedbackSourceCompleted` for each
    /// backward-reachable feedback-source deliverable (feedback edges
    /// excluded from the traversal) and `Not(Executable(q))` for every
    /// other backward-reachable process.
    AllBackwardFeedbackSourcesCompleted(ProcessId),
}

/// State queries needed by leaf predicates.
pub trait EvalContext {
    /// Outcome and diagnostic for `FeedbackSourceCompleted`.
    fn feedback_source_completed(&self, deliverable: &DeliverableId) -> (bool, String);
    /// Outcome and diagnostic for `Executable`.
    fn executable(&self, process: &ProcessId) -> (bool, String);
}

/// Result tree mirroring the evaluated expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionEval {
    /// Expression label (e.g. `AND`, `EXECUTABLE(p2)`).
    pub label: String,
    /// Outcome at this node.
    pub outcome: bool,
    /// Leaf diagnostic, if any.
    pub detail: Option<String>,
    /// Results of the operand expressions.
    pub children: Vec<PreconditionEval>,
}

impl PreconditionEval {
    fn node(label: impl Into<String>, outcome: bool, children: Vec<PreconditionEval>) -> Self {
        Self {
            label: label.into(),
            outcome,
            detail: None,
            children,
        }
    }

    fn leaf(label: impl Into<String>, outcome: bool, detail: String) -> Self {
        Self {
            label: label.into(),
            outcome,
            detail: Some(detail),
            children: Vec::new(),
        }
    }

    /// Renders the tree as indented text, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        let _ = write!(out, "{} = {}", self.label, self.outcome);
        if let Some(detail) = &self.detail {
            let _ = write!(out, " ({detail})");
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl Precondition {
    /// Expands every macro variant against the model, leaving a tree
    /// that evaluates without graph traversal. Idempotent.
    pub fn compile(&self, model: &FlowModel) -> Precondition {
        match self {
            Precondition::True
            | Precondition::FeedbackSourceCompleted(_)
            | Precondition::Executable(_) => self.clone(),
            Precondition::Not(p) => Precondition::Not(Box::new(p.compile(model))),
            Precondition::And(ps) => {
                Precondition::And(ps.iter().map(|p| p.compile(model)).collect())
            }
            Precondition::Or(ps) => {
                Precondition::Or(ps.iter().map(|p| p.compile(model)).collect())
            }
            Precondition::AllBackwardFeedbackSourcesCompleted(target) => {
                let (processes, deliverables) = model.backward_reachable(target);
                let mut terms = Vec::new();
                for d in &deliverables {
                    if model.feedback_sources().contains(d) {
                        terms.push(Precondition::FeedbackSourceCompleted(d.clone()));
                    }
                }
                for q in &processes {
                    terms.push(Precondition::Not(Box::new(Precondition::Executable(
                        q.clone(),
                    ))));
                }
                if terms.is_empty() {
                    Precondition::True
                } else {
                    Precondition::And(terms)
                }
            }
        }
    }

    /// Evaluates the expression, returning the mirrored result tree.
    ///
    /// Macro variants must have been compiled away; evaluating one is a
    /// programmer error and aborts.
    pub fn eval(&self, cx: &dyn EvalContext) -> PreconditionEval {
        match self {
            Precondition::True => PreconditionEval::node("TRUE", true, Vec::new()),
            Precondition::Not(p) => {
                let inner = p.eval(cx);
                PreconditionEval::node("NOT", !inner.outcome, vec![inner])
            }
            Precondition::And(ps) => {
                let children: Vec<_> = ps.iter().map(|p| p.eval(cx)).collect();
                let outcome = children.iter().all(|c| c.outcome);
                PreconditionEval::node("AND", outcome, children)
            }
            Precondition::Or(ps) => {
                let children: Vec<_> = ps.iter().map(|p| p.eval(cx)).collect();
                let outcome = children.iter().any(|c| c.outcome);
                PreconditionEval::node("OR", outcome, children)
            }
            Precondition::FeedbackSourceCompleted(d) => {
                let (outcome, detail) = cx.feedback_source_completed(d);
                PreconditionEval::leaf(format!("FEEDBACK_SOURCE_COMPLETED({d})"), outcome, detail)
            }
            Precondition::Executable(p) => {
                let (outcome, detail) = cx.executable(p);
                PreconditionEval::leaf(format!("EXECUTABLE({p})"), outcome, detail)
            }
            Precondition::AllBackwardFeedbackSourcesCompleted(p) => {
                panic!("uncompiled precondition macro for process '{p}'; call compile() first")
            }
        }
    }

    /// Visits every leaf identifier (for configuration-time validation).
    pub fn for_each_ref(&self, on_deliverable: &mut dyn FnMut(&DeliverableId), on_process: &mut dyn FnMut(&ProcessId)) {
        match self {
            Precondition::True => {}
            Precondition::Not(p) => p.for_each_ref(on_deliverable, on_process),
            Precondition::And(ps) | Precondition::Or(ps) => {
                for p in ps {
                    p.for_each_ref(on_deliverable, on_process);
                }
            }
            Precondition::FeedbackSourceCompleted(d) => on_deliverable(d),
            Precondition::Executable(p) => on_process(p),
            Precondition::AllBackwardFeedbackSourcesCompleted(p) => on_process(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessSpec;
    use std::collections::BTreeSet;

    /// Fixed-answer context for expression tests.
    struct FixedContext {
        completed: BTreeSet<DeliverableId>,
        executable: BTreeSet<ProcessId>,
    }

    impl EvalContext for FixedContext {
        fn feedback_source_completed(&self, d: &DeliverableId) -> (bool, String) {
            (self.completed.contains(d), format!("lookup {d}"))
        }

        fn executable(&self, p: &ProcessId) -> (bool, String) {
            (self.executable.contains(p), format!("lookup {p}"))
        }
    }

    fn cx(completed: &[&str], executable: &[&str]) -> FixedContext {
        FixedContext {
            completed: completed.iter().map(|s| DeliverableId::new(*s)).collect(),
            executable: executable.iter().map(|s| ProcessId::new(*s)).collect(),
        }
    }

    #[test]
    fn test_boolean_combinators() {
        let cx = cx(&["d1"], &["p1"]);
        let expr = Precondition::And(vec![
            Precondition::True,
            Precondition::Or(vec![
                Precondition::FeedbackSourceCompleted(DeliverableId::new("d2")),
                Precondition::Executable(ProcessId::new("p1")),
            ]),
            Precondition::Not(Box::new(Precondition::Executable(ProcessId::new("p2")))),
        ]);

        let result = expr.eval(&cx);
        assert!(result.outcome);
        assert_eq!(result.children.len(), 3);
        // OR child: d2 not completed, p1 executable.
        let or = &result.children[1];
        assert!(or.outcome);
        assert!(!or.children[0].outcome);
        assert!(or.children[1].outcome);
    }

    #[test]
    fn test_empty_and_or() {
        let cx = cx(&[], &[]);
        assert!(Precondition::And(vec![]).eval(&cx).outcome);
        assert!(!Precondition::Or(vec![]).eval(&cx).outcome);
    }

    #[test]
    fn test_result_tree_mirrors_expression() {
        let cx = cx(&[], &[]);
        let expr = Precondition::Not(Box::new(Precondition::True));
        let result = expr.eval(&cx);
        assert!(!result.outcome);
        assert_eq!(result.label, "NOT");
        assert_eq!(result.children[0].label, "TRUE");

        let text = result.render();
        assert!(text.contains("NOT = false"));
        assert!(text.contains("  TRUE = true"));
    }

    #[test]
    fn test_macro_expansion() {
        // spec → design → draft → review → doc, doc feeds back to design.
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("draft")
            .with_deliverable("doc")
            .with_deliverable("final")
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
            .with_process(
                "publish",
                ProcessSpec::new().with_input("doc").with_output("final"),
            )
            .build()
            .unwrap();

        let compiled = Precondition::AllBackwardFeedbackSourcesCompleted(ProcessId::new(
            "publish",
        ))
        .compile(&model);

        // doc is the only backward-reachable feedback source; design and
        // review are the other backward-reachable processes.
        let Precondition::And(terms) = compiled else {
            panic!("macro must expand to AND");
        };
        assert!(terms.contains(&Precondition::FeedbackSourceCompleted(DeliverableId::new(
            "doc"
        ))));
        assert!(terms.contains(&Precondition::Not(Box::new(Precondition::Executable(
            ProcessId::new("design")
        )))));
        assert!(terms.contains(&Precondition::Not(Box::new(Precondition::Executable(
            ProcessId::new("review")
        )))));
        assert_eq!(terms.len(), 3);
    }

    #[test]
    fn test_macro_with_no_upstream_expands_to_true() {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("out")
            .with_process(
                "p1",
                ProcessSpec::new().with_input("spec").with_output("out"),
            )
            .build()
            .unwrap();
        let compiled =
            Precondition::AllBackwardFeedbackSourcesCompleted(ProcessId::new("p1")).compile(&model);
        assert_eq!(compiled, Precondition::True);
    }

    #[test]
    fn test_compile_is_idempotent_on_plain_trees() {
        let model = FlowModel::builder().build().unwrap();
        let expr = Precondition::And(vec![
            Precondition::True,
            Precondition::Not(Box::new(Precondition::FeedbackSourceCompleted(
                DeliverableId::new("d"),
            ))),
        ]);
        assert_eq!(expr.compile(&model), expr);
    }

    #[test]
    fn test_serde_round_trip() {
        let expr = Precondition::Or(vec![
            Precondition::Executable(ProcessId::new("p1")),
            Precondition::True,
        ]);
        let json = serde_json::to_string(&expr).unwrap();
        let back: Precondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
