use crate::outcome::{AssertionDetail, Outcome};
use crate::report::{RunReport, RunSummary, SpecReport};
use comfy_table::{presets::ASCII_FULL, Table};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("failed to write xml: {0}")]
    Xml(String),
    #[error("failed to serialize report: {0}")]
    Json(String),
}

pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn render_summary_table(summary: &RunSummary) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec![
        "specifications",
        "behaviors",
        "executed",
        "passed",
        "failed",
        "errored",
    ]);
    table.add_row(vec![
        summary.specifications.to_string(),
        summary.behaviors.to_string(),
        summary.executed.to_string(),
        summary.passed.to_string(),
        summary.failed.to_string(),
        summary.errored.to_string(),
    ]);
    table.to_string()
}

pub fn render_text(report: &RunReport) -> String {
    format!("{report}\n{}", render_summary_table(&report.summary()))
}

pub fn render_json(report: &RunReport) -> Result<String, RenderError> {
    serde_json::to_string_pretty(report).map_err(|err| RenderError::Json(err.to_string()))
}

/// JUnit XML: one `testsuite` per specification, one `testcase` per
/// behavior.
pub fn render_junit(report: &RunReport) -> Result<String, RenderError> {
    let summary = report.summary();
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("testsuites");
    root.push_attribute(("name", report.name.as_str()));
    root.push_attribute(("tests", summary.behaviors.to_string().as_str()));
    root.push_attribute(("failures", summary.failed.to_string().as_str()));
    root.push_attribute((
        "errors",
        (summary.errored + summary.unprocessed_specifications)
            .to_string()
            .as_str(),
    ));
    root.push_attribute(("timestamp", report.generated_at.as_str()));
    write(&mut writer, Event::Start(root))?;

    for spec in &report.specifications {
        write_suite(&mut writer, spec, &report.generated_at)?;
    }

    write(&mut writer, Event::End(BytesEnd::new("testsuites")))?;
    String::from_utf8(writer.into_inner()).map_err(|err| RenderError::Xml(err.to_string()))
}

fn write_suite(writer: &mut Writer<Vec<u8>>, spec: &SpecReport, timestamp: &str) -> Result<(), RenderError> {
    let count = |kind: fn(&Outcome) -> bool| {
        spec.behaviors
            .iter()
            .filter(|behavior| behavior.outcome.as_ref().is_some_and(kind))
            .count()
    };
    let failures = count(|outcome| matches!(outcome, Outcome::Failed(_)));
    let errors = count(|outcome| matches!(outcome, Outcome::Errored(_))) + usize::from(spec.error.is_some());
    let skipped = spec
        .behaviors
        .iter()
        .filter(|behavior| behavior.outcome.is_none())
        .count();

    let mut start = BytesStart::new("testsuite");
    start.push_attribute(("name", spec.name.as_str()));
    start.push_attribute(("tests", spec.behaviors.len().to_string().as_str()));
    start.push_attribute(("failures", failures.to_string().as_str()));
    start.push_attribute(("errors", errors.to_string().as_str()));
    start.push_attribute(("skipped", skipped.to_string().as_str()));
    start.push_attribute(("timestamp", timestamp));
    write(writer, Event::Start(start))?;

    for behavior in &spec.behaviors {
        let mut case = BytesStart::new("testcase");
        case.push_attribute(("name", behavior.display_name.as_str()));
        let classname = if behavior.id.contexts.is_empty() {
            spec.name.clone()
        } else {
            format!("{}::{}", spec.name, behavior.id.context_path())
        };
        case.push_attribute(("classname", classname.as_str()));
        if let Some(duration) = behavior.duration_ms {
            let seconds = format!("{:.3}", duration as f64 / 1000.0);
            case.push_attribute(("time", seconds.as_str()));
        }

        match &behavior.outcome {
            Some(Outcome::Passed) => write(writer, Event::Empty(case))?,
            Some(Outcome::Failed(detail)) => {
                write(writer, Event::Start(case))?;
                let message = detail.to_string();
                let mut failure = BytesStart::new("failure");
                failure.push_attribute(("message", message.as_str()));
                let body = match detail {
                    AssertionDetail::Comparison { expected, actual } => {
                        failure.push_attribute(("type", "comparison"));
                        format!("expected: {expected}\nactual: {actual}")
                    }
                    AssertionDetail::Message { message } => {
                        failure.push_attribute(("type", "assertion"));
                        message.clone()
                    }
                };
                write_text_element(writer, failure, &body)?;
                write(writer, Event::End(BytesEnd::new("testcase")))?;
            }
            Some(Outcome::Errored(cause)) => {
                write(writer, Event::Start(case))?;
                let mut error = BytesStart::new("error");
                error.push_attribute(("message", cause.message.as_str()));
                error.push_attribute(("type", cause.stage.as_str()));
                write_text_element(writer, error, &cause.to_string())?;
                write(writer, Event::End(BytesEnd::new("testcase")))?;
            }
            None => {
                write(writer, Event::Start(case))?;
                write(writer, Event::Empty(BytesStart::new("skipped")))?;
                write(writer, Event::End(BytesEnd::new("testcase")))?;
            }
        }
    }

    if let Some(error) = &spec.error {
        write_text_element(writer, BytesStart::new("system-err"), error)?;
    }

    write(writer, Event::End(BytesEnd::new("testsuite")))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, start: BytesStart<'_>, text: &str) -> Result<(), RenderError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    write(writer, Event::Start(start))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RenderError> {
    writer
        .write_event(event)
        .map_err(|err| RenderError::Xml(err.to_string()))
}
