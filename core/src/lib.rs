pub mod behavior;
pub mod catalog;
pub mod discovery;
pub mod error;
pub mod group;
pub mod introspection;
pub mod matchers;
pub mod outcome;
pub mod render;
pub mod report;
pub mod runtime;
pub mod spec;
pub mod validation;

pub use behavior::{Behavior, BehaviorId, LifecycleState};
pub use catalog::SpecCatalog;
pub use discovery::{walk_specification, BehaviorCollector, Context, SpecVisitor};
pub use error::{HookError, HookPhase, RunError, ScanError, StrategyError, SuiteError};
pub use group::{
    CatalogScanner, CatalogScannerFactory, GroupRunner, NoHooks, RunHooks, ScanEntry, ScanIter,
    ScannerFactory, SpecScanner, SuiteDecl, DEFAULT_GROUP, RUN_WITH, SPEC_RUNNER,
};
pub use introspection::{
    declared_marker, resolve_strategy, AnnotatedIntrospection, ConventionIntrospection,
    IntrospectionRegistry, IntrospectionStrategy, StrategyMarker, CREATE_METHOD, DESTROY_METHOD,
};
pub use matchers::{
    contains_all, contains_any, contains_exactly, contains_in_order, contains_in_partial_order,
    equal, equal_text, specify, Containment, ContainmentKind, Equal, EqualText, Matcher,
};
pub use outcome::{AssertionDetail, ErrorCause, Fault, Outcome, OutcomeKind, Stage};
pub use render::{render_json, render_junit, render_summary_table, render_text, timestamp_now, RenderError};
pub use report::{
    BehaviorReport, LogSink, RecordingSink, ReportSink, RunReport, RunSummary, SinkEvent,
    SpecReport, TeeSink,
};
pub use runtime::{RunOptions, SpecPlan, SpecRunner};
pub use spec::{
    Annotation, CapabilityMeta, ContextBuilder, Marker, MethodDecl, SpecBuilder,
    SpecificationType, TypeDecl, TypeMeta,
};
pub use validation::{validate_spec, Diagnostic, DiagnosticLevel};
