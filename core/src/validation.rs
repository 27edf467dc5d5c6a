use crate::introspection::IntrospectionStrategy;
use crate::spec::{SpecificationType, TypeDecl};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn error(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            location,
            message: message.into(),
        }
    }

    fn warning(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

/// Checks the shape of `spec` as seen through `strategy`. Diagnostics are
/// informational; the run proceeds regardless.
pub fn validate_spec(spec: &SpecificationType, strategy: &dyn IntrospectionStrategy) -> Vec<Diagnostic> {
    let mut ctx = ValidationContext::new(spec.name());
    let mut contexts = 0usize;
    for candidate in spec.nested_types() {
        contexts += validate_type(spec, candidate, strategy, &mut ctx);
    }
    if contexts == 0 {
        ctx.warning(format!(
            "no context types recognised by the {} strategy",
            strategy.name()
        ));
    }
    ctx.finish()
}

struct ValidationContext {
    stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ValidationContext {
    fn new(root: &str) -> Self {
        Self {
            stack: vec![root.to_string()],
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, label: String) {
        self.stack.push(label);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn location(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join(" > "))
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::error(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn warning(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::warning(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Returns how many qualifying contexts were found at or below `decl`.
fn validate_type(
    spec: &SpecificationType,
    decl: &Arc<TypeDecl>,
    strategy: &dyn IntrospectionStrategy,
    ctx: &mut ValidationContext,
) -> usize {
    if !strategy.is_context_type(spec, decl) {
        return 0;
    }
    ctx.push(decl.name().to_string());
    validate_context(decl, strategy, ctx);
    let mut found = 1;
    for nested in decl.nested_types() {
        found += validate_type(spec, nested, strategy, ctx);
    }
    ctx.pop();
    found
}

fn validate_context(decl: &TypeDecl, strategy: &dyn IntrospectionStrategy, ctx: &mut ValidationContext) {
    let creation = strategy.creation_method(decl).map(|method| method.name().to_string());
    let teardown = strategy.teardown_method(decl).map(|method| method.name().to_string());
    let candidates = strategy.creation_methods(decl);
    if candidates.len() > 1 {
        let first = candidates[0].name();
        if candidates.iter().all(|method| method.name() == first) {
            ctx.error(format!(
                "creation method `{first}` is declared {} times",
                candidates.len()
            ));
        } else {
            let listed: Vec<String> = candidates
                .iter()
                .map(|method| format!("`{}`", method.name()))
                .collect();
            ctx.error(format!(
                "context declares {} creation methods: {}",
                candidates.len(),
                listed.join(", ")
            ));
        }
    }

    let mut seen = HashSet::new();
    let mut behaviors = 0usize;
    for method in decl.methods() {
        if !strategy.is_behavior(method) {
            continue;
        }
        if Some(method.name()) == creation.as_deref() || Some(method.name()) == teardown.as_deref() {
            ctx.error(format!(
                "method `{}` is classified both as a behavior and as a lifecycle step",
                method.name()
            ));
        }
        if !seen.insert(method.name()) {
            ctx.error(format!("behavior `{}` is declared more than once", method.name()));
        }
        behaviors += 1;
    }
    if behaviors == 0 {
        ctx.warning("context declares no behaviors");
    }
}
