use crate::behavior::Behavior;
use crate::discovery::{walk_specification, BehaviorCollector};
use crate::introspection::{IntrospectionRegistry, IntrospectionStrategy};
use crate::outcome::Outcome;
use crate::report::{BehaviorReport, ReportSink, SpecReport};
use crate::spec::SpecificationType;
use crate::validation::validate_spec;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Run the behaviors of one specification concurrently.
    #[serde(default)]
    pub parallel: bool,
}

/// A specification whose strategy is resolved and whose behaviors are
/// discovered, ready to execute.
pub struct SpecPlan {
    spec: Arc<SpecificationType>,
    strategy: Option<Arc<dyn IntrospectionStrategy>>,
    behaviors: Vec<Behavior>,
    report: SpecReport,
}

impl SpecPlan {
    pub fn spec(&self) -> &Arc<SpecificationType> {
        &self.spec
    }

    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    /// The description tree node, before any outcome is recorded.
    pub fn description(&self) -> &SpecReport {
        &self.report
    }

    pub fn is_runnable(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Runs the behaviors of one specification.
pub struct SpecRunner<'a> {
    registry: &'a IntrospectionRegistry,
    options: RunOptions,
}

impl<'a> SpecRunner<'a> {
    pub fn new(registry: &'a IntrospectionRegistry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Resolves the strategy and discovers behaviors. A strategy failure is
    /// recorded on the returned plan rather than raised.
    pub fn plan(&self, spec: &Arc<SpecificationType>) -> SpecPlan {
        let mut report = SpecReport::new(spec.name());
        report.groups = spec.groups().to_vec();

        let strategy = match self.registry.resolve(spec) {
            Ok(strategy) => strategy,
            Err(err) => {
                tracing::warn!(specification = spec.name(), %err, "skipping specification");
                report.error = Some(err.to_string());
                return SpecPlan {
                    spec: Arc::clone(spec),
                    strategy: None,
                    behaviors: Vec::new(),
                    report,
                };
            }
        };

        let mut collector = BehaviorCollector::default();
        walk_specification(spec, strategy.as_ref(), &mut collector);
        report.strategy = Some(strategy.name().to_string());
        report.diagnostics = validate_spec(spec, strategy.as_ref());
        report.behaviors = collector
            .behaviors
            .iter()
            .map(|behavior| BehaviorReport::pending(behavior.id().clone()))
            .collect();
        tracing::debug!(
            specification = spec.name(),
            contexts = collector.contexts.len(),
            behaviors = collector.behaviors.len(),
            "planned specification"
        );

        SpecPlan {
            spec: Arc::clone(spec),
            strategy: Some(strategy),
            behaviors: collector.behaviors,
            report,
        }
    }

    pub fn describe(&self, spec: &Arc<SpecificationType>) -> SpecReport {
        self.plan(spec).report
    }

    pub fn run(&self, spec: &Arc<SpecificationType>, sink: &dyn ReportSink) -> SpecReport {
        let plan = self.plan(spec);
        self.execute(plan, sink)
    }

    /// Executes every planned behavior and fills the outcomes in discovery
    /// order, whatever order they complete in.
    pub fn execute(&self, plan: SpecPlan, sink: &dyn ReportSink) -> SpecReport {
        let SpecPlan {
            behaviors,
            mut report,
            ..
        } = plan;

        let results: Vec<(Outcome, u128)> = if self.options.parallel {
            behaviors
                .par_iter()
                .map(|behavior| run_reported(behavior, sink))
                .collect()
        } else {
            behaviors
                .iter()
                .map(|behavior| run_reported(behavior, sink))
                .collect()
        };

        for (entry, (outcome, duration_ms)) in report.behaviors.iter_mut().zip(results) {
            entry.outcome = Some(outcome);
            entry.duration_ms = Some(duration_ms);
        }
        report
    }
}

fn run_reported(behavior: &Behavior, sink: &dyn ReportSink) -> (Outcome, u128) {
    sink.on_behavior_started(behavior.id());
    let timer = Instant::now();
    let outcome = behavior.run();
    let duration_ms = timer.elapsed().as_millis();
    sink.on_behavior_finished(behavior.id(), &outcome);
    (outcome, duration_ms)
}
