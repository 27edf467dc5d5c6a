use crate::report::RunReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure to resolve the introspection strategy of a specification. Fatal
/// for that specification only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("strategy declared by {declared_by} for {specification} could not be instantiated: {reason}")]
    Instantiation {
        specification: String,
        declared_by: String,
        reason: String,
    },
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("failed to scan location '{location}': {reason}")]
    Location { location: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    BeforeRun,
    AfterRun,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::BeforeRun => write!(f, "before-run"),
            HookPhase::AfterRun => write!(f, "after-run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{phase} hook failed: {message}")]
pub struct HookError {
    pub phase: HookPhase,
    pub message: String,
}

impl HookError {
    pub fn before_run(message: impl Into<String>) -> Self {
        Self {
            phase: HookPhase::BeforeRun,
            message: message.into(),
        }
    }

    pub fn after_run(message: impl Into<String>) -> Self {
        Self {
            phase: HookPhase::AfterRun,
            message: message.into(),
        }
    }
}

/// Errors building a group runner. The report tree does not exist yet, so
/// these surface directly to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuiteError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("specification '{0}' is registered more than once")]
    DuplicateSpecification(String),
}

/// Errors escaping a group run. Behavior and specification failures never
/// appear here, they are recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// A lifecycle hook failed. `report` holds every outcome recorded before
    /// the failure surfaced; after a before-run failure it is the unexecuted
    /// description.
    #[error("{source}")]
    Hook {
        source: HookError,
        report: Box<RunReport>,
    },
}

impl RunError {
    pub fn hook(source: HookError, report: RunReport) -> Self {
        RunError::Hook {
            source,
            report: Box::new(report),
        }
    }

    pub fn report(&self) -> &RunReport {
        match self {
            RunError::Hook { report, .. } => report,
        }
    }

    pub fn into_parts(self) -> (HookError, RunReport) {
        match self {
            RunError::Hook { source, report } => (source, *report),
        }
    }
}
