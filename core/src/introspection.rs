use crate::error::StrategyError;
use crate::spec::{Marker, MethodDecl, SpecificationType, TypeDecl};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const CREATE_METHOD: &str = "create";
pub const DESTROY_METHOD: &str = "destroy";

/// Policy that decides what counts as a context, a behavior and a creation
/// step for one specification.
pub trait IntrospectionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn is_context_type(&self, spec: &SpecificationType, candidate: &TypeDecl) -> bool;

    fn is_behavior(&self, method: &MethodDecl) -> bool;

    fn creation_method<'a>(&self, context: &'a TypeDecl) -> Option<&'a MethodDecl>;

    /// Every method this strategy would accept as the creation step. More
    /// than one is a shape error; `creation_method` picks the first.
    fn creation_methods<'a>(&self, context: &'a TypeDecl) -> Vec<&'a MethodDecl> {
        self.creation_method(context).into_iter().collect()
    }

    fn teardown_method<'a>(&self, _context: &'a TypeDecl) -> Option<&'a MethodDecl> {
        None
    }
}

/// Naming/shape conventions, used when nothing in the ancestry declares a
/// strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConventionIntrospection;

impl IntrospectionStrategy for ConventionIntrospection {
    fn name(&self) -> &str {
        "convention"
    }

    fn is_context_type(&self, spec: &SpecificationType, candidate: &TypeDecl) -> bool {
        candidate.is_public()
            && candidate.is_instantiable()
            && candidate.name() != spec.simple_name()
    }

    fn is_behavior(&self, method: &MethodDecl) -> bool {
        method.is_plain() && method.name() != CREATE_METHOD && method.name() != DESTROY_METHOD
    }

    fn creation_method<'a>(&self, context: &'a TypeDecl) -> Option<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .find(|method| method.is_plain() && method.name() == CREATE_METHOD)
    }

    fn creation_methods<'a>(&self, context: &'a TypeDecl) -> Vec<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .filter(|method| method.is_plain() && method.name() == CREATE_METHOD)
            .collect()
    }

    fn teardown_method<'a>(&self, context: &'a TypeDecl) -> Option<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .find(|method| method.is_plain() && method.name() == DESTROY_METHOD)
    }
}

/// Explicit markers on types and methods, names are irrelevant.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotatedIntrospection;

impl IntrospectionStrategy for AnnotatedIntrospection {
    fn name(&self) -> &str {
        "annotated"
    }

    fn is_context_type(&self, _spec: &SpecificationType, candidate: &TypeDecl) -> bool {
        candidate.has_marker(Marker::Context) && candidate.is_instantiable()
    }

    fn is_behavior(&self, method: &MethodDecl) -> bool {
        method.has_marker(Marker::Behavior) && method.param_count() == 0
    }

    fn creation_method<'a>(&self, context: &'a TypeDecl) -> Option<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .find(|method| method.has_marker(Marker::Create))
    }

    fn creation_methods<'a>(&self, context: &'a TypeDecl) -> Vec<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .filter(|method| method.has_marker(Marker::Create))
            .collect()
    }

    fn teardown_method<'a>(&self, context: &'a TypeDecl) -> Option<&'a MethodDecl> {
        context
            .methods()
            .iter()
            .find(|method| method.has_marker(Marker::Destroy))
    }
}

type StrategyFactory =
    Arc<dyn Fn() -> Result<Arc<dyn IntrospectionStrategy>, StrategyError> + Send + Sync>;

/// Declares which strategy a type in the ancestry wants. Instantiation is
/// deferred until the strategy is resolved for a specification.
#[derive(Clone)]
pub struct StrategyMarker {
    name: String,
    factory: StrategyFactory,
}

impl StrategyMarker {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn IntrospectionStrategy>, StrategyError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn of<S>(name: impl Into<String>) -> Self
    where
        S: IntrospectionStrategy + Default + 'static,
    {
        Self::new(name, || Ok(Arc::new(S::default()) as Arc<dyn IntrospectionStrategy>))
    }

    pub fn annotated() -> Self {
        Self::of::<AnnotatedIntrospection>("annotated")
    }

    pub fn convention() -> Self {
        Self::of::<ConventionIntrospection>("convention")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Result<Arc<dyn IntrospectionStrategy>, StrategyError> {
        (self.factory)()
    }
}

impl fmt::Debug for StrategyMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyMarker")
            .field("name", &self.name)
            .finish()
    }
}

/// First marker found walking the ancestry most-derived first, looking at
/// each type and then its capabilities in declaration order.
pub fn declared_marker(spec: &SpecificationType) -> Option<(&str, &StrategyMarker)> {
    for meta in spec.ancestry() {
        if let Some(marker) = &meta.strategy {
            return Some((meta.name.as_str(), marker));
        }
        for capability in &meta.capabilities {
            if let Some(marker) = &capability.strategy {
                return Some((capability.name.as_str(), marker));
            }
        }
    }
    None
}

/// Resolves without memoization. Prefer [`IntrospectionRegistry::resolve`].
pub fn resolve_strategy(
    spec: &SpecificationType,
) -> Result<Arc<dyn IntrospectionStrategy>, StrategyError> {
    match declared_marker(spec) {
        Some((declared_by, marker)) => {
            tracing::debug!(
                specification = spec.name(),
                declared_by,
                strategy = marker.name(),
                "instantiating declared introspection strategy"
            );
            marker.instantiate().map_err(|err| StrategyError::Instantiation {
                specification: spec.name().to_string(),
                declared_by: declared_by.to_string(),
                reason: err.to_string(),
            })
        }
        None => Ok(Arc::new(ConventionIntrospection)),
    }
}

type StrategySlot = Arc<OnceCell<Result<Arc<dyn IntrospectionStrategy>, StrategyError>>>;

/// Per-run memo of resolved strategies, keyed by specification name.
///
/// Concurrent callers resolving the same specification block on one
/// initialisation; failures are memoized as well, so a broken marker is
/// instantiated at most once.
#[derive(Default)]
pub struct IntrospectionRegistry {
    slots: Mutex<HashMap<String, StrategySlot>>,
}

impl IntrospectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        spec: &SpecificationType,
    ) -> Result<Arc<dyn IntrospectionStrategy>, StrategyError> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(spec.name().to_string()).or_default())
        };
        slot.get_or_init(|| resolve_strategy(spec)).clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl fmt::Debug for IntrospectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut names: Vec<&String> = slots.keys().collect();
        names.sort();
        f.debug_struct("IntrospectionRegistry")
            .field("specifications", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CapabilityMeta, ContextBuilder, SpecBuilder, TypeMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct Subject;

    fn counting_marker(counter: Arc<AtomicUsize>) -> StrategyMarker {
        StrategyMarker::new("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(AnnotatedIntrospection) as Arc<dyn IntrospectionStrategy>)
        })
    }

    #[test]
    fn convention_classifies_by_name_and_shape() {
        let strategy = ConventionIntrospection;
        assert!(strategy.is_behavior(&MethodDecl::new("pops_last_item")));
        assert!(!strategy.is_behavior(&MethodDecl::new("create")));
        assert!(!strategy.is_behavior(&MethodDecl::new("destroy")));
        assert!(!strategy.is_behavior(&MethodDecl::new("helper").params(1)));
        assert!(!strategy.is_behavior(&MethodDecl::new("value").returning_value()));
        assert!(!strategy.is_behavior(&MethodDecl::new("hidden").private()));

        let spec = SpecBuilder::new("demo::Spec").build();
        let context = ContextBuilder::<Subject>::with_default("EmptyStack").build();
        assert!(strategy.is_context_type(&spec, &context));
        assert!(!strategy.is_context_type(&spec, &TypeDecl::shape("Helper")));
        let private = ContextBuilder::<Subject>::with_default("Hidden")
            .private()
            .build();
        assert!(!strategy.is_context_type(&spec, &private));
    }

    #[test]
    fn annotated_strategy_ignores_names() {
        let strategy = AnnotatedIntrospection;
        assert!(strategy.is_behavior(&MethodDecl::new("create").marked(Marker::Behavior)));
        assert!(!strategy.is_behavior(&MethodDecl::new("looks_like_behavior")));

        let context = ContextBuilder::<Subject>::with_default("Anything")
            .marked(Marker::Context)
            .declare(MethodDecl::new("setup").marked(Marker::Create))
            .build();
        let spec = SpecBuilder::new("demo::Spec").build();
        assert!(strategy.is_context_type(&spec, &context));
        assert_eq!(
            strategy.creation_method(&context).map(MethodDecl::name),
            Some("setup")
        );
    }

    #[test]
    fn falls_back_to_convention_without_markers() {
        let spec = SpecBuilder::new("demo::Plain")
            .extends(TypeMeta::new("behave::Specification"))
            .build();
        let strategy = resolve_strategy(&spec).expect("default strategy");
        assert_eq!(strategy.name(), "convention");
    }

    #[test]
    fn marker_on_ancestor_capability_wins() {
        let spec = SpecBuilder::new("demo::Derived")
            .capability(CapabilityMeta::new("demo::Plain"))
            .extends(
                TypeMeta::new("demo::Base")
                    .capability(CapabilityMeta::new("demo::Annotated").with_strategy(StrategyMarker::annotated())),
            )
            .extends(TypeMeta::new("behave::Specification").with_strategy(StrategyMarker::convention()))
            .build();
        let (declared_by, marker) = declared_marker(&spec).expect("marker found");
        assert_eq!(declared_by, "demo::Annotated");
        assert_eq!(marker.name(), "annotated");
        assert_eq!(resolve_strategy(&spec).expect("resolves").name(), "annotated");
    }

    #[test]
    fn type_marker_precedes_its_capabilities() {
        let spec = SpecBuilder::new("demo::Spec")
            .strategy(StrategyMarker::convention())
            .capability(CapabilityMeta::new("demo::Annotated").with_strategy(StrategyMarker::annotated()))
            .build();
        assert_eq!(resolve_strategy(&spec).expect("resolves").name(), "convention");
    }

    #[test]
    fn registry_memoizes_one_instance() {
        let counter = Arc::new(AtomicUsize::new(0));
        let spec = SpecBuilder::new("demo::Memo")
            .strategy(counting_marker(Arc::clone(&counter)))
            .build();
        let registry = IntrospectionRegistry::new();

        let first = registry.resolve(&spec).expect("first resolve");
        let second = registry.resolve(&spec).expect("second resolve");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_resolution_instantiates_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let spec = Arc::new(
            SpecBuilder::new("demo::Racy")
                .strategy(counting_marker(Arc::clone(&counter)))
                .build(),
        );
        let registry = Arc::new(IntrospectionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let spec = Arc::clone(&spec);
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.resolve(&spec).expect("resolves"))
            })
            .collect();
        let resolved: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread joins"))
            .collect();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(resolved.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn instantiation_failure_is_memoized() {
        let counter = Arc::new(AtomicUsize::new(0));
        let failing_counter = Arc::clone(&counter);
        let spec = SpecBuilder::new("demo::Broken")
            .strategy(StrategyMarker::new("broken", move || {
                failing_counter.fetch_add(1, Ordering::SeqCst);
                Err(StrategyError::Unavailable("no constructor".to_string()))
            }))
            .build();
        let registry = IntrospectionRegistry::new();

        let first = registry.resolve(&spec).err().expect("first fails");
        let second = registry.resolve(&spec).err().expect("second fails");
        assert_eq!(first, second);
        assert!(first.to_string().contains("no constructor"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
