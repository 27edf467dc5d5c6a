use crate::behavior::{Behavior, BehaviorId};
use crate::introspection::IntrospectionStrategy;
use crate::spec::{SpecificationType, TypeDecl};
use std::collections::HashSet;
use std::sync::Arc;

/// Receives behaviors as discovery finds them.
pub trait SpecVisitor {
    fn on_context(&mut self, _spec: &SpecificationType, _path: &[String]) {}

    fn on_behavior(&mut self, behavior: Behavior);
}

/// Collects behaviors in discovery order.
#[derive(Debug, Default)]
pub struct BehaviorCollector {
    pub contexts: Vec<Vec<String>>,
    pub behaviors: Vec<Behavior>,
}

impl SpecVisitor for BehaviorCollector {
    fn on_context(&mut self, _spec: &SpecificationType, path: &[String]) {
        self.contexts.push(path.to_vec());
    }

    fn on_behavior(&mut self, behavior: Behavior) {
        self.behaviors.push(behavior);
    }
}

/// One context type of a specification, classified by `strategy`.
pub struct Context<'a> {
    spec: &'a SpecificationType,
    decl: Arc<TypeDecl>,
    path: Vec<String>,
    strategy: &'a dyn IntrospectionStrategy,
}

impl<'a> Context<'a> {
    pub fn new(
        spec: &'a SpecificationType,
        decl: Arc<TypeDecl>,
        path: Vec<String>,
        strategy: &'a dyn IntrospectionStrategy,
    ) -> Self {
        Self {
            spec,
            decl,
            path,
            strategy,
        }
    }

    pub fn name(&self) -> &str {
        self.decl.name()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn is_context_type(&self) -> bool {
        self.strategy.is_context_type(self.spec, &self.decl)
    }

    /// Hands one [`Behavior`] per behavior method to `visitor`, in
    /// declaration order. Only inspects shape; nothing is instantiated.
    pub fn discover(&self, visitor: &mut dyn SpecVisitor) {
        let creation = self.strategy.creation_method(&self.decl).cloned();
        let teardown = self.strategy.teardown_method(&self.decl).cloned();
        for method in self.decl.methods() {
            if !self.strategy.is_behavior(method) {
                continue;
            }
            let id = BehaviorId {
                specification: self.spec.name().to_string(),
                contexts: self.path.clone(),
                method: method.name().to_string(),
            };
            visitor.on_behavior(Behavior::new(
                id,
                Arc::clone(&self.decl),
                method.clone(),
                creation.clone(),
                teardown.clone(),
            ));
        }
    }
}

/// Walks every qualifying context of `spec`, descending into types nested
/// in qualifying contexts. A type rejected once is never examined again,
/// even when the same `Arc` is shared under several parents.
pub fn walk_specification(
    spec: &SpecificationType,
    strategy: &dyn IntrospectionStrategy,
    visitor: &mut dyn SpecVisitor,
) {
    let mut walk = Walk {
        spec,
        strategy,
        rejected: HashSet::new(),
    };
    walk.descend(spec.nested_types(), &mut Vec::new(), visitor);
}

struct Walk<'a> {
    spec: &'a SpecificationType,
    strategy: &'a dyn IntrospectionStrategy,
    rejected: HashSet<*const TypeDecl>,
}

impl Walk<'_> {
    fn descend(
        &mut self,
        candidates: &[Arc<TypeDecl>],
        path: &mut Vec<String>,
        visitor: &mut dyn SpecVisitor,
    ) {
        for candidate in candidates {
            let identity = Arc::as_ptr(candidate);
            if self.rejected.contains(&identity) {
                continue;
            }
            path.push(candidate.name().to_string());
            let context = Context::new(self.spec, Arc::clone(candidate), path.clone(), self.strategy);
            if context.is_context_type() {
                tracing::debug!(
                    specification = self.spec.name(),
                    context = %path.join("::"),
                    "discovered context"
                );
                visitor.on_context(self.spec, path);
                context.discover(visitor);
                self.descend(candidate.nested_types(), path, visitor);
            } else {
                self.rejected.insert(identity);
            }
            path.pop();
        }
    }
}
