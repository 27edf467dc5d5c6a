use anyhow::Context as _;
use behave_core::{
    render_json, render_junit, render_text, Diagnostic, DiagnosticLevel, GroupRunner, LogSink,
    RecordingSink, ReportSink, RunOptions, RunReport, SinkEvent, SpecCatalog, SuiteDecl, TeeSink,
    DEFAULT_GROUP,
};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub mod demo;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "BEHAVE_LOG";
/// Suite name used when no suite file is given.
pub const DEFAULT_SUITE: &str = "demo::AllSpecs";

#[derive(Debug, Parser)]
#[command(author, version, about = "Behavior specification runner")]
pub struct BehaveCli {
    /// Log lifecycle details to stderr
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the selected specifications and print the report
    Run {
        #[command(flatten)]
        selection: Selection,
        /// Run the behaviors of each specification concurrently
        #[arg(long)]
        parallel: bool,
        /// Report format
        #[arg(long, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Record behavior start/finish events to a JSON lines file
        #[arg(long, value_name = "PATH")]
        events: Option<PathBuf>,
    },
    /// Print the description tree without running anything
    List {
        #[command(flatten)]
        selection: Selection,
        /// Output JSON instead of a human-readable tree
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct Selection {
    /// Suite declaration file (YAML or JSON)
    #[arg(long)]
    pub suite: Option<PathBuf>,
    /// Include a group. Repeat for multiple groups.
    #[arg(long = "include", value_name = "GROUP", action = ArgAction::Append)]
    pub include: Vec<String>,
    /// Exclude a group. Repeat for multiple groups.
    #[arg(long = "exclude", value_name = "GROUP", action = ArgAction::Append)]
    pub exclude: Vec<String>,
    /// Module path to scan. Repeat for multiple locations.
    #[arg(long = "location", value_name = "PATH", action = ArgAction::Append)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Junit,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Junit => "junit",
        };
        write!(f, "{value}")
    }
}

pub fn init_tracing(verbose: u8) {
    let fallback = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    // A subscriber may already be installed by an embedding binary.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Executes `cli` against `catalog`. Returns `false` when any behavior
/// failed or errored, or a specification could not be processed.
pub fn run_catalog(catalog: &SpecCatalog, cli: BehaveCli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Run {
            selection,
            parallel,
            format,
            output,
            events,
        } => {
            let suite = resolve_suite(&selection, catalog)?;
            let runner = GroupRunner::new(suite, catalog)?.options(RunOptions { parallel });
            execute(&runner, format, output.as_deref(), events.as_deref())
        }
        Command::List { selection, json } => {
            let suite = resolve_suite(&selection, catalog)?;
            let description = GroupRunner::new(suite, catalog)?.description();
            if json {
                println!("{}", render_json(&description)?);
            } else {
                print_description(&description);
            }
            Ok(true)
        }
    }
}

/// Runs `runner` and writes its report. The report is written even when a
/// lifecycle hook failed; the hook error is returned afterwards.
pub fn execute(
    runner: &GroupRunner,
    format: ReportFormat,
    output: Option<&Path>,
    events: Option<&Path>,
) -> anyhow::Result<bool> {
    let recorder = RecordingSink::new();
    let sinks: Vec<&dyn ReportSink> = match events {
        Some(_) => vec![&LogSink, &recorder],
        None => vec![&LogSink],
    };
    let result = runner.run(&TeeSink::new(sinks));
    if let Some(path) = events {
        write_events(&recorder.events(), path)?;
    }

    let (report, hook_error) = match result {
        Ok(report) => (report, None),
        Err(err) => {
            let (source, report) = err.into_parts();
            (report, Some(source))
        }
    };
    let rendered = match format {
        ReportFormat::Text => render_text(&report),
        ReportFormat::Json => render_json(&report)?,
        ReportFormat::Junit => render_junit(&report)?,
    };
    emit(&rendered, output)?;
    if let Some(err) = hook_error {
        return Err(anyhow::Error::new(err).context(format!("suite {} did not complete", report.name)));
    }
    Ok(!report.has_failures())
}

pub fn load_suite(path: &Path) -> anyhow::Result<SuiteDecl> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite file {}", path.display()))?;
    let suite: SuiteDecl = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("invalid suite file {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("invalid suite file {}", path.display()))?,
    };
    Ok(suite)
}

/// The suite file (if any) extended by command line flags. Without a file
/// and without `--include`, every group declared in the catalog is included.
pub fn resolve_suite(selection: &Selection, catalog: &SpecCatalog) -> anyhow::Result<SuiteDecl> {
    let mut suite = match &selection.suite {
        Some(path) => load_suite(path)?,
        None => {
            let mut suite = SuiteDecl::new(DEFAULT_SUITE);
            if selection.include.is_empty() {
                for spec in catalog.iter() {
                    suite.include.extend(spec.groups().iter().cloned());
                }
            }
            suite
        }
    };
    suite.include.extend(selection.include.iter().cloned());
    suite.exclude.extend(selection.exclude.iter().cloned());
    if !selection.locations.is_empty() {
        suite
            .locations
            .get_or_insert_with(Vec::new)
            .extend(selection.locations.iter().cloned());
    } else if selection.suite.is_none() {
        suite.locations = Some(vec![String::new()]);
    }
    tracing::debug!(
        suite = %suite.name,
        include = ?suite.include,
        exclude = ?suite.exclude,
        default_group = !suite.exclude.contains(DEFAULT_GROUP),
        "resolved suite"
    );
    Ok(suite)
}

fn emit(content: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{content}"),
    }
    Ok(())
}

fn write_events(events: &[SinkEvent], path: &Path) -> anyhow::Result<()> {
    let mut lines = String::new();
    for event in events {
        lines.push_str(&serde_json::to_string(event)?);
        lines.push('\n');
    }
    fs::write(path, lines).with_context(|| format!("failed to write events to {}", path.display()))
}

fn print_description(report: &RunReport) {
    println!("Suite: {}", report.name);
    if report.specifications.is_empty() {
        println!("No specifications matched.");
        return;
    }
    for spec in &report.specifications {
        if spec.groups.is_empty() {
            println!("  {}", spec.name);
        } else {
            println!("  {} [{}]", spec.name, spec.groups.join(", "));
        }
        if let Some(error) = &spec.error {
            println!("    [error] {error}");
        }
        print_diagnostics(&spec.diagnostics);
        for behavior in &spec.behaviors {
            println!("    - {}: {}", behavior.id.context_path(), behavior.display_name);
        }
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let level = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warn",
        };
        match &diagnostic.location {
            Some(location) => println!("    [{level}] {location}: {}", diagnostic.message),
            None => println!("    [{level}] {}", diagnostic.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use behave_core::{equal, specify, ContextBuilder, HookError, RunHooks, SpecBuilder};
    use std::io::Write;

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    fn failing_catalog() -> SpecCatalog {
        SpecCatalog::new()
            .with(
                SpecBuilder::new("app::CounterSpec")
                    .group("unit")
                    .context(
                        ContextBuilder::<Counter>::with_default("Fresh")
                            .method("starts_at_zero", |counter| specify(&counter.value, equal(0u32)))
                            .method("starts_at_one", |counter| specify(&counter.value, equal(1u32))),
                    )
                    .build(),
            )
            .expect("registers")
    }

    fn parse(args: &[&str]) -> BehaveCli {
        BehaveCli::try_parse_from(args).expect("arguments parse")
    }

    #[test]
    fn parses_repeated_group_flags() {
        let cli = parse(&[
            "behave", "-v", "run", "--include", "unit", "--include", "slow", "--exclude", "default",
            "--location", "demo", "--parallel", "--format", "junit",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Run {
                selection,
                parallel,
                format,
                output,
                events,
            } => {
                assert_eq!(selection.include, vec!["unit", "slow"]);
                assert_eq!(selection.exclude, vec!["default"]);
                assert_eq!(selection.locations, vec!["demo"]);
                assert!(parallel);
                assert_eq!(format, ReportFormat::Junit);
                assert!(output.is_none());
                assert!(events.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn loads_yaml_suite_and_extends_it_with_flags() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "name: app::Suite\ninclude: [unit]\nexclude: [slow]\nlocations: [app]"
        )
        .expect("write suite");

        let selection = Selection {
            suite: Some(file.path().to_path_buf()),
            include: vec!["integration".to_string()],
            ..Selection::default()
        };
        let suite = resolve_suite(&selection, &SpecCatalog::new()).expect("suite resolves");
        assert_eq!(suite.name, "app::Suite");
        assert!(suite.include.contains("unit") && suite.include.contains("integration"));
        assert!(suite.exclude.contains("slow"));
        assert_eq!(suite.search_locations(), vec!["app"]);
    }

    #[test]
    fn loads_json_suite_without_locations() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(file, r#"{{"name": "app::nested::Suite", "include": ["unit"]}}"#).expect("write suite");
        let suite = load_suite(file.path()).expect("suite loads");
        assert_eq!(suite.search_locations(), vec!["app::nested"]);
        assert!(suite.exclude.is_empty());
    }

    #[test]
    fn rejects_malformed_suite_files() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(file, "{{ not json").expect("write suite");
        let err = load_suite(file.path()).expect_err("invalid file");
        assert!(err.to_string().contains("invalid suite file"));
    }

    #[test]
    fn failing_behaviors_are_reported_and_signal_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("report.xml");
        let cli = parse(&[
            "behave",
            "run",
            "--format",
            "junit",
            "--output",
            output.to_str().expect("utf-8 path"),
        ]);

        let success = run_catalog(&failing_catalog(), cli).expect("run completes");
        assert!(!success);
        let xml = fs::read_to_string(&output).expect("report written");
        assert!(xml.contains("classname=\"app::CounterSpec::Fresh\""));
        assert!(xml.contains("failures=\"1\""));
    }

    #[test]
    fn demo_catalog_runs_clean() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("report.json");
        let cli = parse(&[
            "behave",
            "run",
            "--parallel",
            "--format",
            "json",
            "--output",
            output.to_str().expect("utf-8 path"),
        ]);
        let catalog = demo::catalog().expect("demo catalog builds");
        assert!(run_catalog(&catalog, cli).expect("run completes"));

        let report: RunReport =
            serde_json::from_str(&fs::read_to_string(&output).expect("report written")).expect("valid report");
        let names: Vec<&str> = report.specifications.iter().map(|spec| spec.name.as_str()).collect();
        assert!(names.contains(&"demo::StackSpec"));
        assert!(names.contains(&"demo::SmokeSpec"));
        assert!(report.summary().passed > 0);
    }

    #[test]
    fn excluding_groups_narrows_the_demo_run() {
        let catalog = demo::catalog().expect("demo catalog builds");
        let selection = Selection {
            include: vec!["unit".to_string()],
            exclude: vec![DEFAULT_GROUP.to_string()],
            ..Selection::default()
        };
        let suite = resolve_suite(&selection, &catalog).expect("suite resolves");
        let runner = GroupRunner::new(suite, &catalog).expect("runner builds");
        assert!(!runner.specification_names().contains(&"demo::SmokeSpec"));
        assert!(!runner.specification_names().contains(&"demo::SlowSpec"));
        assert!(runner.specification_names().contains(&"demo::StackSpec"));
    }

    #[test]
    fn events_file_records_each_behavior() {
        let dir = tempfile::tempdir().expect("temp dir");
        let events = dir.path().join("events.jsonl");
        let cli = parse(&[
            "behave",
            "run",
            "--output",
            dir.path().join("report.txt").to_str().expect("utf-8 path"),
            "--events",
            events.to_str().expect("utf-8 path"),
        ]);
        assert!(!run_catalog(&failing_catalog(), cli).expect("run completes"));

        let recorded: Vec<SinkEvent> = fs::read_to_string(&events)
            .expect("events written")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid event"))
            .collect();
        assert_eq!(recorded.len(), 4);
        let finished: Vec<&str> = recorded
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Finished { id, .. } => Some(id.method.as_str()),
                SinkEvent::Started { .. } => None,
            })
            .collect();
        assert_eq!(finished, vec!["starts_at_zero", "starts_at_one"]);
    }

    #[test]
    fn report_is_written_when_after_hook_fails() {
        struct FailingAfter;
        impl RunHooks for FailingAfter {
            fn on_after_run(&self) -> Result<(), HookError> {
                Err(HookError::after_run("cleanup failed"))
            }
        }
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("report.json");
        let catalog = failing_catalog();
        let runner = GroupRunner::new(SuiteDecl::new("app::Suite").include("unit"), &catalog)
            .expect("runner builds")
            .hooks(FailingAfter);

        let err = execute(&runner, ReportFormat::Json, Some(&output), None).expect_err("hook failure surfaces");
        assert!(format!("{err:#}").contains("cleanup failed"));
        let report: RunReport =
            serde_json::from_str(&fs::read_to_string(&output).expect("report written")).expect("valid report");
        assert_eq!(report.summary().executed, 2);
        assert_eq!(report.summary().passed, 1);
    }
}
