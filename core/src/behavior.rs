use crate::outcome::{Fault, Outcome, Stage};
use crate::spec::{MethodDecl, TypeDecl};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Qualified identity of a behavior: specification, enclosing context chain
/// (outermost first) and method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BehaviorId {
    pub specification: String,
    pub contexts: Vec<String>,
    pub method: String,
}

impl BehaviorId {
    /// `pops_the_last_pushed_item` becomes `pops the last pushed item`.
    pub fn display_name(&self) -> String {
        self.method
            .split('_')
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn context_path(&self) -> String {
        self.contexts.join("::")
    }
}

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.specification)?;
        for context in &self.contexts {
            write!(f, "::{context}")?;
        }
        write!(f, "::{}", self.method)
    }
}

/// States a behavior passes through. Terminal states are the [`Outcome`]
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotRun,
    ContextConstructed,
    SubjectCreated,
    BehaviorInvoked,
}

/// One executable behavior bound to its context type and method.
#[derive(Clone)]
pub struct Behavior {
    id: BehaviorId,
    context: Arc<TypeDecl>,
    method: MethodDecl,
    creation: Option<MethodDecl>,
    teardown: Option<MethodDecl>,
}

impl Behavior {
    pub fn new(
        id: BehaviorId,
        context: Arc<TypeDecl>,
        method: MethodDecl,
        creation: Option<MethodDecl>,
        teardown: Option<MethodDecl>,
    ) -> Self {
        Self {
            id,
            context,
            method,
            creation,
            teardown,
        }
    }

    pub fn id(&self) -> &BehaviorId {
        &self.id
    }

    pub fn context(&self) -> &TypeDecl {
        &self.context
    }

    pub fn method(&self) -> &MethodDecl {
        &self.method
    }

    pub fn creation(&self) -> Option<&MethodDecl> {
        self.creation.as_ref()
    }

    /// Runs construct -> create -> invoke -> teardown on a fresh context
    /// instance and classifies the result. Always yields exactly one
    /// outcome; panics in user code are caught and reported as errors.
    pub fn run(&self) -> Outcome {
        let mut state = LifecycleState::NotRun;
        tracing::debug!(behavior = %self.id, ?state, "running behavior");

        let mut instance = match guarded(|| self.context.instantiate()) {
            Ok(instance) => instance,
            Err(fault) => return self.finish(Outcome::errored(Stage::ContextConstruction, fault.to_string())),
        };
        state = LifecycleState::ContextConstructed;
        tracing::trace!(behavior = %self.id, ?state);

        if let Some(creation) = &self.creation {
            if let Err(fault) = guarded(|| creation.invoke(instance.as_mut())) {
                return self.finish(Outcome::errored(Stage::SubjectCreation, fault.to_string()));
            }
        }
        state = LifecycleState::SubjectCreated;
        tracing::trace!(behavior = %self.id, ?state);

        let outcome = match guarded(|| self.method.invoke(instance.as_mut())) {
            Ok(()) => Outcome::Passed,
            Err(Fault::Mismatch(detail)) => Outcome::Failed(detail),
            Err(Fault::Error(message)) => Outcome::errored(Stage::Behavior, message),
        };
        state = LifecycleState::BehaviorInvoked;
        tracing::trace!(behavior = %self.id, ?state);

        let outcome = self.tear_down(instance.as_mut(), outcome);
        self.finish(outcome)
    }

    fn tear_down(&self, instance: &mut (dyn Any + Send), outcome: Outcome) -> Outcome {
        let Some(teardown) = &self.teardown else {
            return outcome;
        };
        match guarded(|| teardown.invoke(instance)) {
            Ok(()) => outcome,
            Err(fault) if outcome.is_success() => Outcome::errored(Stage::Teardown, fault.to_string()),
            Err(fault) => {
                tracing::warn!(behavior = %self.id, %fault, "teardown failed after an unsuccessful behavior");
                outcome
            }
        }
    }

    fn finish(&self, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Passed => tracing::debug!(behavior = %self.id, "passed"),
            Outcome::Failed(detail) => tracing::debug!(behavior = %self.id, %detail, "failed"),
            Outcome::Errored(cause) => tracing::warn!(behavior = %self.id, %cause, "errored"),
        }
        outcome
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("id", &self.id)
            .field("creation", &self.creation.as_ref().map(MethodDecl::name))
            .field("teardown", &self.teardown.as_ref().map(MethodDecl::name))
            .finish()
    }
}

fn guarded<R>(step: impl FnOnce() -> Result<R, Fault>) -> Result<R, Fault> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(Fault::Error(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{equal_text, specify};
    use crate::outcome::{AssertionDetail, OutcomeKind};
    use crate::spec::ContextBuilder;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Stack {
        items: Vec<u32>,
    }

    fn behavior_for(context: TypeDecl, method: &str) -> Behavior {
        let context = Arc::new(context);
        let find = |name: &str| {
            context
                .methods()
                .iter()
                .find(|candidate| candidate.name() == name)
                .cloned()
        };
        let method = find(method).expect("method declared");
        let creation = find("create");
        let teardown = find("destroy");
        Behavior::new(
            BehaviorId {
                specification: "demo::StackSpec".to_string(),
                contexts: vec![context.name().to_string()],
                method: method.name().to_string(),
            },
            Arc::clone(&context),
            method,
            creation,
            teardown,
        )
    }

    #[test]
    fn display_name_and_qualified_id() {
        let id = BehaviorId {
            specification: "demo::StackSpec".to_string(),
            contexts: vec!["FullStack".to_string(), "AfterPop".to_string()],
            method: "pops_the_last_item".to_string(),
        };
        assert_eq!(id.display_name(), "pops the last item");
        assert_eq!(id.to_string(), "demo::StackSpec::FullStack::AfterPop::pops_the_last_item");
    }

    #[test]
    fn passes_when_creation_and_behavior_succeed() {
        let context = ContextBuilder::<Stack>::with_default("FullStack")
            .method("create", |stack| {
                stack.items.extend([1, 2, 3]);
                Ok(())
            })
            .method("has_three_items", |stack| {
                if stack.items.len() == 3 {
                    Ok(())
                } else {
                    Err(Fault::mismatch("expected three items"))
                }
            })
            .build();
        assert_eq!(behavior_for(context, "has_three_items").run(), Outcome::Passed);
    }

    #[test]
    fn creation_failure_skips_the_behavior() {
        let invoked = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&invoked);
        let context = ContextBuilder::<Stack>::with_default("Broken")
            .method("create", |_| Err(Fault::error("cannot build subject")))
            .method("records_invocation", move |_| {
                seen.store(true, Ordering::SeqCst);
                Ok(())
            })
            .build();

        let outcome = behavior_for(context, "records_invocation").run();
        assert_eq!(
            outcome,
            Outcome::errored(Stage::SubjectCreation, "cannot build subject")
        );
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn assertion_mismatch_creates_comparison_failure() {
        let context = ContextBuilder::<Stack>::with_default("FailingContext")
            .method("failing_behavior", |_| specify("foo", equal_text("bar")))
            .build();
        let outcome = behavior_for(context, "failing_behavior").run();
        assert_eq!(
            outcome,
            Outcome::Failed(AssertionDetail::comparison("bar", "foo"))
        );
    }

    #[test]
    fn panics_and_construction_failures_are_errors() {
        let panicking = ContextBuilder::<Stack>::with_default("Panicking")
            .method("explodes", |stack| {
                let _ = stack.items[10];
                Ok(())
            })
            .build();
        let outcome = behavior_for(panicking, "explodes").run();
        assert_eq!(outcome.kind(), OutcomeKind::Errored);
        assert!(outcome.to_string().contains("panicked"));

        let unconstructible = ContextBuilder::<Stack>::new("Unconstructible", || {
            Err(Fault::error("no resources"))
        })
        .method("never_runs", |_| Ok(()))
        .build();
        assert_eq!(
            behavior_for(unconstructible, "never_runs").run(),
            Outcome::errored(Stage::ContextConstruction, "no resources")
        );
    }

    #[test]
    fn every_run_gets_a_fresh_context() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);
        let context = ContextBuilder::<Stack>::new("Isolated", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Stack::default())
        })
        .method("pushes_onto_empty_stack", |stack| {
            stack.items.push(7);
            if stack.items.len() == 1 {
                Ok(())
            } else {
                Err(Fault::mismatch("stack was shared between runs"))
            }
        })
        .build();

        let behavior = behavior_for(context, "pushes_onto_empty_stack");
        assert_eq!(behavior.run(), Outcome::Passed);
        assert_eq!(behavior.run(), Outcome::Passed);
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn teardown_runs_and_only_downgrades_passes() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&torn_down);
        let context = ContextBuilder::<Stack>::with_default("WithTeardown")
            .method("passes", |_| Ok(()))
            .method("fails", |_| Err(Fault::mismatch("nope")))
            .method("destroy", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Fault::error("teardown broke"))
            })
            .build();
        let context = Arc::new(context);

        let passes = behavior_for((*context).clone(), "passes").run();
        assert_eq!(passes, Outcome::errored(Stage::Teardown, "teardown broke"));

        let fails = behavior_for((*context).clone(), "fails").run();
        assert_eq!(fails, Outcome::Failed(AssertionDetail::message("nope")));
        assert_eq!(torn_down.load(Ordering::SeqCst), 2);
    }
}
