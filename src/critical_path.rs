//! Per-process schedule elasticity by volume perturbation.
//!
//! Elasticity is the amount a process's volume can change before the
//! overall leadtime changes. Processes with zero elasticity in both
//! directions sit on the critical path. Each probe substitutes one
//! process's volume (with its per-unit consumption normalized to 1, a
//! documented limitation of [`Env::with_probe_volume`]) and reruns the
//! given search strategy, so the cost is one full search per probe —
//! pair this with a fast strategy on anything beyond toy models.

use serde::Serialize;
use tracing::debug;

use crate::engine::Env;
use crate::error::SearchError;
use crate::models::{ProcessId, MIN_VOLUME};
use crate::search::SearchStrategy;

/// Probe resolution and the leadtime comparison tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticityOptions {
    /// Volume resolution of the bisection; probing stops once the
    /// bracket is narrower than this.
    pub resolution: f64,
    /// Leadtimes within this tolerance count as unchanged.
    pub leadtime_eps: f64,
}

impl Default for ElasticityOptions {
    fn default() -> Self {
        ElasticityOptions {
            resolution: MIN_VOLUME,
            leadtime_eps: 1e-9,
        }
    }
}

/// Elasticity of one process, in volume units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessElasticity {
    pub process: ProcessId,
    /// The unperturbed initial volume.
    pub baseline_volume: f64,
    /// Leadtime of the consumption-normalized reference probe. Probe
    /// leadtimes are compared against this, not the raw baseline, so
    /// the normalization bias cancels out.
    pub reference_leadtime: f64,
    /// Largest volume addable without growing the leadtime.
    pub max_elasticity: f64,
    /// Largest volume removable (down to the volume floor) without
    /// changing the leadtime.
    pub min_elasticity: f64,
}

/// Probes every process of `env` and reports elasticities in the
/// model's process order.
pub fn analyze(
    env: &Env,
    strategy: &dyn SearchStrategy,
    options: ElasticityOptions,
) -> Result<Vec<ProcessElasticity>, SearchError> {
    let baseline = best_leadtime(env, strategy)?.ok_or(SearchError::NoPlanFound)?;
    debug!(strategy = strategy.name(), baseline, "elasticity baseline");

    let mut results = Vec::new();
    for process in env.model().processes() {
        let volume = env.initial_volume(process).get();
        let reference = probe_leadtime(env, strategy, process, volume)?
            .ok_or(SearchError::NoPlanFound)?;

        // Added volume beyond the whole baseline leadtime extends the
        // schedule at rate 1 no matter what; that bounds the doubling.
        let max_elasticity = widest_safe(
            |delta| {
                Ok(probe_leadtime(env, strategy, process, volume + delta)?
                    .is_some_and(|lead| lead <= reference + options.leadtime_eps))
            },
            baseline,
            options.resolution,
        )?;

        let min_elasticity = widest_safe(
            |delta| {
                Ok(probe_leadtime(env, strategy, process, volume - delta)?
                    .is_some_and(|lead| (lead - reference).abs() <= options.leadtime_eps))
            },
            (volume - MIN_VOLUME).max(0.0),
            options.resolution,
        )?;

        debug!(
            %process,
            max_elasticity, min_elasticity, "process probed"
        );
        results.push(ProcessElasticity {
            process: process.clone(),
            baseline_volume: volume,
            reference_leadtime: reference,
            max_elasticity,
            min_elasticity,
        });
    }
    Ok(results)
}

fn best_leadtime(env: &Env, strategy: &dyn SearchStrategy) -> Result<Option<f64>, SearchError> {
    let plans = strategy.search(env)?;
    Ok(plans
        .iter()
        .map(|p| p.leadtime())
        .min_by(f64::total_cmp))
}

fn probe_leadtime(
    env: &Env,
    strategy: &dyn SearchStrategy,
    process: &ProcessId,
    volume: f64,
) -> Result<Option<f64>, SearchError> {
    best_leadtime(&env.with_probe_volume(process, volume), strategy)
}

/// Largest delta in `[0, cap]` for which `is_safe` holds, assuming
/// safety is monotone in delta: doubling to bracket the edge, then
/// bisection down to `resolution`.
fn widest_safe(
    mut is_safe: impl FnMut(f64) -> Result<bool, SearchError>,
    cap: f64,
    resolution: f64,
) -> Result<f64, SearchError> {
    if cap <= 0.0 {
        return Ok(0.0);
    }

    let mut lo = 0.0;
    let mut hi = resolution;
    loop {
        if hi >= cap {
            if is_safe(cap)? {
                return Ok(cap);
            }
            hi = cap;
            break;
        }
        if is_safe(hi)? {
            lo = hi;
            hi *= 2.0;
        } else {
            break;
        }
    }

    while hi - lo > resolution {
        let mid = 0.5 * (lo + hi);
        if is_safe(mid)? {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowModel, ProcessSpec};
    use crate::models::AllocationElement;
    use crate::precondition::Precondition;
    use crate::search::{ExactSearch, GreedySearch};

    /// Two parallel processes on separate resources; p2 (volume 2) is
    /// critical, p1 (volume 1) has a unit of slack.
    fn parallel_env() -> Env {
        let model = FlowModel::builder()
            .with_deliverable("spec")
            .with_deliverable("a")
            .with_deliverable("b")
            .with_process("p1", ProcessSpec::new().with_input("spec").with_output("a"))
            .with_process("p2", ProcessSpec::new().with_input("spec").with_output("b"))
            .build()
            .unwrap();
        Env::builder(model)
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
            .unwrap()
    }

    #[test]
    fn test_slack_process_has_max_elasticity() {
        let env = parallel_env();
        let results = analyze(&env, &ExactSearch::new(), ElasticityOptions::default()).unwrap();
        assert_eq!(results.len(), 2);

        let p1 = results.iter().find(|r| r.process.as_str() == "p1").unwrap();
        // p1 can grow by up to one volume unit before it overtakes p2.
        assert!((p1.max_elasticity - 1.0).abs() < 3.0 * MIN_VOLUME);
        // Shrinking p1 never changes the leadtime.
        assert!(p1.min_elasticity > 1.0 - MIN_VOLUME - 3.0 * MIN_VOLUME);
    }

    #[test]
    fn test_critical_process_has_no_elasticity() {
        let env = parallel_env();
        let results = analyze(&env, &ExactSearch::new(), ElasticityOptions::default()).unwrap();

        let p2 = results.iter().find(|r| r.process.as_str() == "p2").unwrap();
        assert!(p2.max_elasticity < 3.0 * MIN_VOLUME);
        assert!(p2.min_elasticity < 3.0 * MIN_VOLUME);
    }

    #[test]
    fn test_greedy_strategy_agrees_on_parallel_model() {
        // No resource contention, so the greedy rollout is optimal here
        // and the elasticities match the exact strategy's.
        let env = parallel_env();
        let exact = analyze(&env, &ExactSearch::new(), ElasticityOptions::default()).unwrap();
        let greedy = analyze(&env, &GreedySearch::new(), ElasticityOptions::default()).unwrap();
        for (a, b) in exact.iter().zip(&greedy) {
            assert_eq!(a.process, b.process);
            assert!((a.max_elasticity - b.max_elasticity).abs() < 3.0 * MIN_VOLUME);
        }
    }

    #[test]
    fn test_unplannable_model_is_an_error() {
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

        let err = analyze(&env, &ExactSearch::new(), ElasticityOptions::default()).unwrap_err();
        assert_eq!(err, SearchError::NoPlanFound);
    }

    #[test]
    fn test_probe_leaves_original_env_untouched() {
        let env = parallel_env();
        let before = env.initial_state().exact_digest();
        analyze(&env, &ExactSearch::new(), ElasticityOptions::default()).unwrap();
        assert_eq!(env.initial_state().exact_digest(), before);
    }
}
