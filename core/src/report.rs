use crate::behavior::BehaviorId;
use crate::outcome::{Outcome, OutcomeKind};
use crate::validation::Diagnostic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Receives behavior lifecycle events. Implementations must accept calls
/// from several threads at once.
pub trait ReportSink: Send + Sync {
    fn on_behavior_started(&self, id: &BehaviorId);

    fn on_behavior_finished(&self, id: &BehaviorId, outcome: &Outcome);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Started { id: BehaviorId },
    Finished { id: BehaviorId, outcome: Outcome },
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn started(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Started { .. }))
            .count()
    }

    pub fn finished(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Finished { .. }))
            .count()
    }
}

impl ReportSink for RecordingSink {
    fn on_behavior_started(&self, id: &BehaviorId) {
        self.events.lock().push(SinkEvent::Started { id: id.clone() });
    }

    fn on_behavior_finished(&self, id: &BehaviorId, outcome: &Outcome) {
        self.events.lock().push(SinkEvent::Finished {
            id: id.clone(),
            outcome: outcome.clone(),
        });
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn on_behavior_started(&self, id: &BehaviorId) {
        tracing::info!(behavior = %id, "started");
    }

    fn on_behavior_finished(&self, id: &BehaviorId, outcome: &Outcome) {
        match outcome.kind() {
            OutcomeKind::Passed => tracing::info!(behavior = %id, "passed"),
            OutcomeKind::Failed => tracing::warn!(behavior = %id, %outcome, "failed"),
            OutcomeKind::Errored => tracing::error!(behavior = %id, %outcome, "errored"),
        }
    }
}

/// Fans events out to several sinks in order.
pub struct TeeSink<'a> {
    sinks: Vec<&'a dyn ReportSink>,
}

impl<'a> TeeSink<'a> {
    pub fn new(sinks: Vec<&'a dyn ReportSink>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for TeeSink<'_> {
    fn on_behavior_started(&self, id: &BehaviorId) {
        for sink in &self.sinks {
            sink.on_behavior_started(id);
        }
    }

    fn on_behavior_finished(&self, id: &BehaviorId, outcome: &Outcome) {
        for sink in &self.sinks {
            sink.on_behavior_finished(id, outcome);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorReport {
    pub id: BehaviorId,
    pub display_name: String,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub duration_ms: Option<u128>,
}

impl BehaviorReport {
    pub fn pending(id: BehaviorId) -> Self {
        Self {
            display_name: id.display_name(),
            id,
            outcome: None,
            duration_ms: None,
        }
    }
}

/// One node per specification; contexts are folded into behavior ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecReport {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    pub behaviors: Vec<BehaviorReport>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the specification could not be processed at all.
    #[serde(default)]
    pub error: Option<String>,
}

impl SpecReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            strategy: None,
            behaviors: Vec::new(),
            diagnostics: Vec::new(),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub generated_at: String,
    pub specifications: Vec<SpecReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub specifications: usize,
    pub unprocessed_specifications: usize,
    pub behaviors: usize,
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0 && self.unprocessed_specifications == 0
    }
}

impl RunReport {
    pub fn new(name: impl Into<String>, generated_at: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generated_at: generated_at.into(),
            specifications: Vec::new(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            specifications: self.specifications.len(),
            ..RunSummary::default()
        };
        for spec in &self.specifications {
            if spec.error.is_some() {
                summary.unprocessed_specifications += 1;
            }
            for behavior in &spec.behaviors {
                summary.behaviors += 1;
                let Some(outcome) = &behavior.outcome else {
                    continue;
                };
                summary.executed += 1;
                match outcome.kind() {
                    OutcomeKind::Passed => summary.passed += 1,
                    OutcomeKind::Failed => summary.failed += 1,
                    OutcomeKind::Errored => summary.errored += 1,
                }
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.summary().is_success()
    }

    pub fn find(&self, id: &BehaviorId) -> Option<&BehaviorReport> {
        self.specifications
            .iter()
            .filter(|spec| spec.name == id.specification)
            .flat_map(|spec| spec.behaviors.iter())
            .find(|behavior| &behavior.id == id)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite: {}", self.name)?;
        if self.specifications.is_empty() {
            writeln!(f, "No specifications matched.")?;
            return Ok(());
        }

        for spec in &self.specifications {
            writeln!(f, "  {}", spec.name)?;
            if let Some(error) = &spec.error {
                writeln!(f, "    [error] {}", error)?;
            }
            for diagnostic in &spec.diagnostics {
                let level = if diagnostic.is_error() { "error" } else { "warn" };
                writeln!(f, "    [{}] {}", level, diagnostic.message)?;
            }
            let mut current_context = None;
            for behavior in &spec.behaviors {
                let context = behavior.id.context_path();
                if current_context.as_ref() != Some(&context) {
                    writeln!(f, "    {}", context)?;
                    current_context = Some(context);
                }
                let status = match behavior.outcome.as_ref().map(Outcome::kind) {
                    None => "pending",
                    Some(OutcomeKind::Passed) => "passed",
                    Some(OutcomeKind::Failed) => "failed",
                    Some(OutcomeKind::Errored) => "errored",
                };
                writeln!(f, "      - [{}] {}", status, behavior.display_name)?;
                match &behavior.outcome {
                    Some(Outcome::Failed(detail)) => {
                        for line in detail.to_string().lines() {
                            writeln!(f, "          {}", line)?;
                        }
                    }
                    Some(Outcome::Errored(cause)) => {
                        for line in cause.to_string().lines() {
                            writeln!(f, "          {}", line)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
