use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an assertion did not hold.
///
/// `Comparison` is produced when two pieces of text were compared for
/// equality; report consumers render it as expected/actual so a diff view can
/// be offered. Everything else is a flat `Message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssertionDetail {
    Comparison { expected: String, actual: String },
    Message { message: String },
}

impl AssertionDetail {
    pub fn comparison(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Comparison {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl fmt::Display for AssertionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionDetail::Comparison { expected, actual } => {
                write!(f, "expected:<{expected}> but was:<{actual}>")
            }
            AssertionDetail::Message { message } => write!(f, "{message}"),
        }
    }
}

/// Failure value returned by context factories and method bodies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("{0}")]
    Mismatch(AssertionDetail),
    #[error("{0}")]
    Error(String),
}

impl Fault {
    pub fn error(message: impl fmt::Display) -> Self {
        Fault::Error(message.to_string())
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Fault::Mismatch(AssertionDetail::message(message))
    }

    pub fn comparison(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Fault::Mismatch(AssertionDetail::comparison(expected, actual))
    }
}

/// Lifecycle step in which an errored behavior stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContextConstruction,
    SubjectCreation,
    Behavior,
    Teardown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ContextConstruction => "context construction",
            Stage::SubjectCreation => "subject creation",
            Stage::Behavior => "behavior",
            Stage::Teardown => "teardown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage.as_str(), self.message)
    }
}

/// Classified result of executing one behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(AssertionDetail),
    Errored(ErrorCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    Failed,
    Errored,
}

impl Outcome {
    pub fn errored(stage: Stage, message: impl Into<String>) -> Self {
        Outcome::Errored(ErrorCause {
            stage,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Passed => OutcomeKind::Passed,
            Outcome::Failed(_) => OutcomeKind::Failed,
            Outcome::Errored(_) => OutcomeKind::Errored,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed(detail) => write!(f, "failed: {detail}"),
            Outcome::Errored(cause) => write!(f, "errored: {cause}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_detail_keeps_both_sides() {
        let outcome = Outcome::Failed(AssertionDetail::comparison("bar", "foo"));
        match &outcome {
            Outcome::Failed(AssertionDetail::Comparison { expected, actual }) => {
                assert_eq!(expected, "bar");
                assert_eq!(actual, "foo");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(outcome.to_string(), "failed: expected:<bar> but was:<foo>");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = Outcome::errored(Stage::SubjectCreation, "boom");
        let value = serde_json::to_value(&outcome).expect("outcome serializes");
        assert_eq!(value["status"], "errored");
        assert_eq!(value["detail"]["stage"], "subject_creation");
        assert_eq!(value["detail"]["message"], "boom");

        let passed = serde_json::to_value(Outcome::Passed).expect("passed serializes");
        assert_eq!(passed["status"], "passed");
    }
}
