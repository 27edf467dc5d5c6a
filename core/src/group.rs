//! Multi-specification runs selected by group labels.

use crate::catalog::SpecCatalog;
use crate::error::{HookError, RunError, ScanError, SuiteError};
use crate::introspection::IntrospectionRegistry;
use crate::render::timestamp_now;
use crate::report::{ReportSink, RunReport, SpecReport};
use crate::runtime::{RunOptions, SpecPlan, SpecRunner};
use crate::spec::{Annotation, SpecificationType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Label given to specifications without an explicit group declaration that
/// the scanner places in the default group.
pub const DEFAULT_GROUP: &str = "default";
/// Annotation that puts an ungrouped specification in the default group.
pub const RUN_WITH: &str = "run_with";
pub const SPEC_RUNNER: &str = "spec_runner";

/// Declared suite metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteDecl {
    pub name: String,
    #[serde(default)]
    pub include: BTreeSet<String>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
}

impl SuiteDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn include(mut self, group: impl Into<String>) -> Self {
        self.include.insert(group.into());
        self
    }

    pub fn exclude(mut self, group: impl Into<String>) -> Self {
        self.exclude.insert(group.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.locations
            .get_or_insert_with(Vec::new)
            .push(location.into());
        self
    }

    /// Declared locations, or the suite's own module path when none are
    /// declared.
    pub fn search_locations(&self) -> Vec<String> {
        match &self.locations {
            Some(locations) => locations.clone(),
            None => {
                let module = self
                    .name
                    .rsplit_once("::")
                    .map(|(module, _)| module)
                    .unwrap_or_default();
                vec![module.to_string()]
            }
        }
    }

    /// Explicit labels: at least one included, none excluded.
    pub fn admits(&self, groups: &[String]) -> bool {
        groups.iter().any(|group| self.include.contains(group))
            && !groups.iter().any(|group| self.exclude.contains(group))
    }
}

/// One item yielded by a scanner. `group` is `None` for a specification that
/// declares no group at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub class_name: String,
    pub group: Option<String>,
}

impl ScanEntry {
    pub fn grouped(class_name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            group: Some(group.into()),
        }
    }

    pub fn ungrouped(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            group: None,
        }
    }
}

pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<ScanEntry, ScanError>> + 'a>;

/// Finds candidate specifications under one search location.
pub trait SpecScanner {
    fn scan(&self) -> ScanIter<'_>;

    fn is_in_default_group(&self, class_name: &str, annotations: &[Annotation]) -> bool;
}

/// Creates one scanner per search location.
pub trait ScannerFactory {
    fn new_scanner(&self, location: &str) -> Box<dyn SpecScanner + '_>;
}

impl<F> ScannerFactory for F
where
    F: Fn(&str) -> Box<dyn SpecScanner>,
{
    fn new_scanner(&self, location: &str) -> Box<dyn SpecScanner + '_> {
        self(location)
    }
}

/// Scans the registered specifications of a catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogScannerFactory<'a> {
    catalog: &'a SpecCatalog,
}

impl<'a> CatalogScannerFactory<'a> {
    pub fn new(catalog: &'a SpecCatalog) -> Self {
        Self { catalog }
    }
}

impl ScannerFactory for CatalogScannerFactory<'_> {
    fn new_scanner(&self, location: &str) -> Box<dyn SpecScanner + '_> {
        Box::new(CatalogScanner::new(self.catalog, location))
    }
}

pub struct CatalogScanner<'a> {
    catalog: &'a SpecCatalog,
    location: String,
}

impl<'a> CatalogScanner<'a> {
    pub fn new(catalog: &'a SpecCatalog, location: impl Into<String>) -> Self {
        Self {
            catalog,
            location: location.into(),
        }
    }
}

impl SpecScanner for CatalogScanner<'_> {
    fn scan(&self) -> ScanIter<'_> {
        Box::new(
            self.catalog
                .under(&self.location)
                .flat_map(|spec| {
                    let entries: Vec<ScanEntry> = if spec.groups().is_empty() {
                        vec![ScanEntry::ungrouped(spec.name())]
                    } else {
                        spec.groups()
                            .iter()
                            .map(|group| ScanEntry::grouped(spec.name(), group.as_str()))
                            .collect()
                    };
                    entries.into_iter().map(Ok)
                }),
        )
    }

    fn is_in_default_group(&self, _class_name: &str, annotations: &[Annotation]) -> bool {
        annotations
            .iter()
            .any(|annotation| annotation.name == RUN_WITH && annotation.value.as_deref() == Some(SPEC_RUNNER))
    }
}

/// Before/after callbacks around a whole group run.
pub trait RunHooks: Send + Sync {
    fn on_before_run(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn on_after_run(&self) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl RunHooks for NoHooks {}

/// Runs the after-hook exactly once: explicitly through [`AfterRun::finish`],
/// or from `Drop` when unwinding out of a panicking before-hook or run.
struct AfterRun<'a> {
    hooks: Option<&'a dyn RunHooks>,
}

impl<'a> AfterRun<'a> {
    fn arm(hooks: &'a dyn RunHooks) -> Self {
        Self { hooks: Some(hooks) }
    }

    fn finish(mut self) -> Result<(), HookError> {
        match self.hooks.take() {
            Some(hooks) => hooks.on_after_run(),
            None => Ok(()),
        }
    }
}

impl Drop for AfterRun<'_> {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks.take() {
            if let Err(err) = hooks.on_after_run() {
                tracing::warn!(%err, "after-run hook failed while unwinding");
            }
        }
    }
}

struct SuiteMember {
    name: String,
    groups: Vec<String>,
    spec: Option<Arc<SpecificationType>>,
}

/// Selects specifications by group and runs them as one report.
///
/// Scanning and filtering happen on construction. [`GroupRunner::run`]
/// plans every specification before the before-hook fires.
pub struct GroupRunner {
    suite: SuiteDecl,
    members: Vec<SuiteMember>,
    registry: IntrospectionRegistry,
    hooks: Box<dyn RunHooks>,
    options: RunOptions,
}

impl GroupRunner {
    pub fn new(suite: SuiteDecl, catalog: &SpecCatalog) -> Result<Self, SuiteError> {
        Self::with_scanner(suite, catalog, &CatalogScannerFactory::new(catalog))
    }

    pub fn with_scanner(
        suite: SuiteDecl,
        catalog: &SpecCatalog,
        factory: &dyn ScannerFactory,
    ) -> Result<Self, SuiteError> {
        let mut labels: IndexMap<String, Vec<String>> = IndexMap::new();
        for location in suite.search_locations() {
            let scanner = factory.new_scanner(&location);
            for entry in scanner.scan() {
                let entry = entry?;
                let label = match entry.group {
                    Some(group) => group,
                    None => {
                        let annotations = catalog
                            .get(&entry.class_name)
                            .map(|spec| spec.annotations())
                            .unwrap_or_default();
                        if !scanner.is_in_default_group(&entry.class_name, annotations) {
                            continue;
                        }
                        DEFAULT_GROUP.to_string()
                    }
                };
                let groups = labels.entry(entry.class_name).or_default();
                if !groups.contains(&label) {
                    groups.push(label);
                }
            }
        }

        let members: Vec<SuiteMember> = labels
            .into_iter()
            .filter(|(_, groups)| in_scope(&suite, groups))
            .map(|(name, groups)| SuiteMember {
                spec: catalog.get(&name).cloned(),
                name,
                groups,
            })
            .collect();
        tracing::debug!(
            suite = %suite.name,
            specifications = members.len(),
            "selected specifications"
        );

        Ok(Self {
            suite,
            members,
            registry: IntrospectionRegistry::new(),
            hooks: Box::new(NoHooks),
            options: RunOptions::default(),
        })
    }

    pub fn hooks(mut self, hooks: impl RunHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn suite(&self) -> &SuiteDecl {
        &self.suite
    }

    pub fn specification_names(&self) -> Vec<&str> {
        self.members.iter().map(|member| member.name.as_str()).collect()
    }

    /// The report tree with every selected specification and its behaviors,
    /// no outcomes recorded.
    pub fn description(&self) -> RunReport {
        let runner = SpecRunner::new(&self.registry, self.options);
        let mut report = RunReport::new(self.suite.name.clone(), timestamp_now());
        report.specifications = self
            .members
            .iter()
            .map(|member| match &member.spec {
                Some(spec) => with_groups(runner.describe(spec), member),
                None => unregistered(member),
            })
            .collect();
        report
    }

    /// Runs every selected specification in scan order.
    ///
    /// `on_after_run` is invoked exactly once on every exit path. A failing
    /// `on_before_run` prevents execution and is returned after the
    /// after-hook has run. Hook errors carry the report as far as it got.
    pub fn run(&self, sink: &dyn ReportSink) -> Result<RunReport, RunError> {
        let runner = SpecRunner::new(&self.registry, self.options);
        let plans: Vec<Result<SpecPlan, SpecReport>> = self
            .members
            .iter()
            .map(|member| match &member.spec {
                Some(spec) => Ok(runner.plan(spec)),
                None => Err(unregistered(member)),
            })
            .collect();
        let mut report = RunReport::new(self.suite.name.clone(), timestamp_now());

        let after = AfterRun::arm(&*self.hooks);
        if let Err(before) = self.hooks.on_before_run() {
            if let Err(after_err) = after.finish() {
                tracing::warn!(err = %after_err, "after-run hook failed after a failed before-run hook");
            }
            report.specifications = self
                .members
                .iter()
                .zip(&plans)
                .map(|(member, plan)| match plan {
                    Ok(plan) => with_groups(plan.description().clone(), member),
                    Err(unprocessed) => unprocessed.clone(),
                })
                .collect();
            return Err(RunError::hook(before, report));
        }

        tracing::info!(suite = %self.suite.name, specifications = plans.len(), "starting run");
        for (member, plan) in self.members.iter().zip(plans) {
            let spec_report = match plan {
                Ok(plan) => with_groups(runner.execute(plan, sink), member),
                Err(unprocessed) => unprocessed,
            };
            report.specifications.push(spec_report);
        }

        let finished = after.finish();
        let summary = report.summary();
        tracing::info!(
            suite = %self.suite.name,
            executed = summary.executed,
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            "finished run"
        );
        match finished {
            Ok(()) => Ok(report),
            Err(after) => Err(RunError::hook(after, report)),
        }
    }
}

fn in_scope(suite: &SuiteDecl, groups: &[String]) -> bool {
    if groups.iter().all(|group| group == DEFAULT_GROUP) {
        return !suite.exclude.contains(DEFAULT_GROUP);
    }
    suite.admits(groups)
}

fn with_groups(mut report: SpecReport, member: &SuiteMember) -> SpecReport {
    report.groups = member.groups.clone();
    report
}

fn unregistered(member: &SuiteMember) -> SpecReport {
    tracing::warn!(specification = %member.name, "scanned specification is not registered");
    let mut report = SpecReport::failed(member.name.clone(), "specification is not registered in the catalog");
    report.groups = member.groups.clone();
    report
}
