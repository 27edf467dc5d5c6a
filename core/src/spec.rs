//! Load-time model of specifications.
//!
//! Rust has no runtime class introspection, so a specification is registered
//! explicitly: [`SpecBuilder`] records the declared metadata (groups,
//! annotations, ancestry, strategy markers) and [`ContextBuilder`] records the
//! shape of each candidate context type together with typed method bodies.
//! Introspection strategies classify this model; they never see the user's
//! concrete types.

use crate::introspection::StrategyMarker;
use crate::outcome::Fault;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased context instance produced by a [`TypeDecl`] factory.
pub type ContextInstance = Box<dyn Any + Send>;

type Factory = Arc<dyn Fn() -> Result<ContextInstance, Fault> + Send + Sync>;
type MethodBody = Arc<dyn Fn(&mut (dyn Any + Send)) -> Result<(), Fault> + Send + Sync>;

/// Explicit markers consulted by annotation-driven introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Context,
    Behavior,
    Create,
    Destroy,
}

/// Free-form declaration metadata attached to a specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Clone)]
pub struct MethodDecl {
    name: String,
    public: bool,
    params: usize,
    returns_unit: bool,
    markers: Vec<Marker>,
    body: Option<MethodBody>,
}

impl MethodDecl {
    /// Shape-only declaration: public, no parameters, returns unit, no body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
            params: 0,
            returns_unit: true,
            markers: Vec::new(),
            body: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn params(mut self, count: usize) -> Self {
        self.params = count;
        self
    }

    pub fn returning_value(mut self) -> Self {
        self.returns_unit = false;
        self
    }

    pub fn marked(mut self, marker: Marker) -> Self {
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn param_count(&self) -> usize {
        self.params
    }

    pub fn returns_unit(&self) -> bool {
        self.returns_unit
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// A plain zero-argument, unit-returning method that is callable.
    pub fn is_plain(&self) -> bool {
        self.public && self.params == 0 && self.returns_unit
    }

    pub fn invoke(&self, instance: &mut (dyn Any + Send)) -> Result<(), Fault> {
        match &self.body {
            Some(body) => body(instance),
            None => Err(Fault::Error(format!(
                "method `{}` has no invocable body",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDecl")
            .field("name", &self.name)
            .field("public", &self.public)
            .field("params", &self.params)
            .field("returns_unit", &self.returns_unit)
            .field("markers", &self.markers)
            .field("invocable", &self.body.is_some())
            .finish()
    }
}

/// A candidate context type nested in a specification (or in another
/// context). Methods are kept in declaration order.
#[derive(Clone)]
pub struct TypeDecl {
    name: String,
    public: bool,
    is_abstract: bool,
    markers: Vec<Marker>,
    methods: Vec<MethodDecl>,
    nested: Vec<Arc<TypeDecl>>,
    factory: Option<Factory>,
}

impl TypeDecl {
    /// A nested type that cannot be instantiated, e.g. a helper or a shared
    /// base for contexts.
    pub fn shape(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
            is_abstract: false,
            markers: Vec::new(),
            methods: Vec::new(),
            nested: Vec::new(),
            factory: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn marked(mut self, marker: Marker) -> Self {
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn nested(mut self, nested: impl Into<Arc<TypeDecl>>) -> Self {
        self.nested.push(nested.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_instantiable(&self) -> bool {
        self.factory.is_some() && !self.is_abstract
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    pub fn nested_types(&self) -> &[Arc<TypeDecl>] {
        &self.nested
    }

    pub fn instantiate(&self) -> Result<ContextInstance, Fault> {
        if self.is_abstract {
            return Err(Fault::Error(format!(
                "context `{}` is abstract and cannot be constructed",
                self.name
            )));
        }
        match &self.factory {
            Some(factory) => factory(),
            None => Err(Fault::Error(format!(
                "context `{}` has no constructor",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDecl")
            .field("name", &self.name)
            .field("public", &self.public)
            .field("abstract", &self.is_abstract)
            .field("markers", &self.markers)
            .field("methods", &self.methods)
            .field("nested", &self.nested)
            .field("instantiable", &self.factory.is_some())
            .finish()
    }
}

/// Typed front-end for declaring a context whose instances are `T`.
pub struct ContextBuilder<T> {
    decl: TypeDecl,
    _instance: PhantomData<fn() -> T>,
}

impl<T: Any + Send> ContextBuilder<T> {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<T, Fault> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || factory().map(|ctx| Box::new(ctx) as ContextInstance));
        let mut decl = TypeDecl::shape(name);
        decl.factory = Some(factory);
        Self {
            decl,
            _instance: PhantomData,
        }
    }

    pub fn with_default(name: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self::new(name, || Ok(T::default()))
    }

    /// Declares a public, zero-argument method with a body.
    pub fn method<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.bound(MethodDecl::new(name), body)
    }

    pub fn marked_method<F>(self, name: impl Into<String>, marker: Marker, body: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.bound(MethodDecl::new(name).marked(marker), body)
    }

    /// Attaches `body` to an arbitrary declared shape.
    pub fn bound<F>(mut self, mut method: MethodDecl, body: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Fault> + Send + Sync + 'static,
    {
        let method_name = method.name.clone();
        let erased: MethodBody = Arc::new(move |instance: &mut (dyn Any + Send)| {
            match instance.downcast_mut::<T>() {
                Some(ctx) => body(ctx),
                None => Err(Fault::Error(format!(
                    "method `{method_name}` was invoked on a foreign context instance"
                ))),
            }
        });
        method.body = Some(erased);
        self.decl.methods.push(method);
        self
    }

    /// Declares a method shape without a body (helpers, methods with
    /// parameters and similar).
    pub fn declare(mut self, method: MethodDecl) -> Self {
        self.decl.methods.push(method);
        self
    }

    pub fn marked(mut self, marker: Marker) -> Self {
        self.decl = self.decl.marked(marker);
        self
    }

    pub fn private(mut self) -> Self {
        self.decl.public = false;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.decl.is_abstract = true;
        self
    }

    pub fn nested(mut self, nested: impl Into<Arc<TypeDecl>>) -> Self {
        self.decl.nested.push(nested.into());
        self
    }

    pub fn build(self) -> TypeDecl {
        self.decl
    }
}

impl<T: Any + Send> From<ContextBuilder<T>> for TypeDecl {
    fn from(builder: ContextBuilder<T>) -> Self {
        builder.build()
    }
}

impl<T: Any + Send> From<ContextBuilder<T>> for Arc<TypeDecl> {
    fn from(builder: ContextBuilder<T>) -> Self {
        Arc::new(builder.build())
    }
}

/// A declared capability (interface) of a type in the ancestry.
#[derive(Debug, Clone)]
pub struct CapabilityMeta {
    pub name: String,
    pub strategy: Option<StrategyMarker>,
}

impl CapabilityMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, marker: StrategyMarker) -> Self {
        self.strategy = Some(marker);
        self
    }
}

/// One entry of a specification's ancestry.
#[derive(Debug, Clone)]
pub struct TypeMeta {
    pub name: String,
    pub strategy: Option<StrategyMarker>,
    pub capabilities: Vec<CapabilityMeta>,
}

impl TypeMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, marker: StrategyMarker) -> Self {
        self.strategy = Some(marker);
        self
    }

    pub fn capability(mut self, capability: CapabilityMeta) -> Self {
        self.capabilities.push(capability);
        self
    }
}

/// The top-level specification. Immutable once built.
#[derive(Debug)]
pub struct SpecificationType {
    name: String,
    groups: Vec<String>,
    annotations: Vec<Annotation>,
    ancestry: Vec<TypeMeta>,
    contexts: Vec<Arc<TypeDecl>>,
}

impl SpecificationType {
    /// Qualified name, e.g. `demo::stack::StackSpec`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Most-derived first; the first entry is the specification itself.
    pub fn ancestry(&self) -> &[TypeMeta] {
        &self.ancestry
    }

    pub fn nested_types(&self) -> &[Arc<TypeDecl>] {
        &self.contexts
    }
}

pub struct SpecBuilder {
    own: TypeMeta,
    groups: Vec<String>,
    annotations: Vec<Annotation>,
    ancestors: Vec<TypeMeta>,
    contexts: Vec<Arc<TypeDecl>>,
}

impl SpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            own: TypeMeta::new(name),
            groups: Vec::new(),
            annotations: Vec::new(),
            ancestors: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn strategy(mut self, marker: StrategyMarker) -> Self {
        self.own.strategy = Some(marker);
        self
    }

    pub fn capability(mut self, capability: CapabilityMeta) -> Self {
        self.own.capabilities.push(capability);
        self
    }

    /// Appends the next (less derived) ancestor.
    pub fn extends(mut self, ancestor: TypeMeta) -> Self {
        self.ancestors.push(ancestor);
        self
    }

    pub fn context(mut self, context: impl Into<Arc<TypeDecl>>) -> Self {
        self.contexts.push(context.into());
        self
    }

    pub fn build(self) -> SpecificationType {
        let mut ancestry = Vec::with_capacity(self.ancestors.len() + 1);
        let name = self.own.name.clone();
        ancestry.push(self.own);
        ancestry.extend(self.ancestors);
        SpecificationType {
            name,
            groups: self.groups,
            annotations: self.annotations,
            ancestry,
            contexts: self.contexts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn typed_bodies_run_against_their_instance() {
        let decl = ContextBuilder::<Counter>::with_default("Counting")
            .method("increments", |ctx| {
                ctx.value += 1;
                if ctx.value == 1 {
                    Ok(())
                } else {
                    Err(Fault::mismatch("counter was shared"))
                }
            })
            .build();

        let mut instance = decl.instantiate().expect("context constructs");
        decl.methods()[0]
            .invoke(instance.as_mut())
            .expect("body runs");
        let counter = instance.downcast_ref::<Counter>().expect("typed instance");
        assert_eq!(counter.value, 1);
    }

    #[test]
    fn shape_only_methods_refuse_invocation() {
        let decl = ContextBuilder::<Counter>::with_default("Counting")
            .declare(MethodDecl::new("helper").params(2))
            .build();
        let mut instance = decl.instantiate().expect("context constructs");
        let err = decl.methods()[0]
            .invoke(instance.as_mut())
            .expect_err("no body");
        assert!(err.to_string().contains("no invocable body"));
    }

    #[test]
    fn abstract_and_shape_types_do_not_construct() {
        assert!(TypeDecl::shape("Helper").instantiate().is_err());
        let base = ContextBuilder::<Counter>::with_default("Base")
            .abstract_type()
            .build();
        assert!(!base.is_instantiable());
        assert!(base.instantiate().is_err());
    }

    #[test]
    fn ancestry_starts_with_the_specification() {
        let spec = SpecBuilder::new("demo::stack::StackSpec")
            .group("unit")
            .group("unit")
            .extends(TypeMeta::new("behave::Specification"))
            .build();
        assert_eq!(spec.simple_name(), "StackSpec");
        assert_eq!(spec.groups(), ["unit".to_string()]);
        let names: Vec<&str> = spec.ancestry().iter().map(|meta| meta.name.as_str()).collect();
        assert_eq!(names, vec!["demo::stack::StackSpec", "behave::Specification"]);
    }
}
