//! Output formatters for batch progress and results
//!
//! Provides JSON, Table, CSV, and summary output formats.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::models::{EventLevel, ExecutionSnapshot, LogEvent, Outcome, TaskResult};

/// Longest response body shown in table output
const BODY_PREVIEW: usize = 80;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    /// Whether live log events should be printed while a batch runs
    pub fn streams_events(&self) -> bool {
        matches!(self, OutputFormat::Table | OutputFormat::Summary)
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.colorize {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        let json = if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        json.unwrap_or_default()
    }

    /// Format one live log event
    pub fn format_event(&self, event: &LogEvent) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(event),
            OutputFormat::Csv => csv_line(&[
                event.timestamp.to_rfc3339(),
                event.level.to_string().to_lowercase(),
                event.task.clone().unwrap_or_default(),
                event.message.clone(),
            ]),
            OutputFormat::Table | OutputFormat::Summary => {
                let code = match event.level {
                    EventLevel::Info => "36",
                    EventLevel::Success => "32",
                    EventLevel::Warning => "33",
                    EventLevel::Error => "31",
                };
                format!(
                    "{} {} {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    self.paint(code, event.level.symbol()),
                    event.message
                )
            }
        }
    }

    /// Format a single task result
    pub fn format_result(&self, result: &TaskResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(result),
            OutputFormat::Csv => csv_line(&result_record(result)),
            OutputFormat::Summary => format!(
                "{} {} ({}ms)",
                result.outcome.symbol(),
                result.task_name,
                result.outcome.duration_ms()
            ),
        }
    }

    fn format_result_table(&self, result: &TaskResult) -> String {
        let status_str = match result.outcome {
            Outcome::Success { .. } => self.paint("32", "✓ PASS"),
            Outcome::Failure { .. } => self.paint("31", "✗ FAIL"),
            Outcome::Error { .. } => self.paint("31", "! ERROR"),
            Outcome::Cancelled { .. } => self.paint("33", "○ SKIP"),
        };
        let status_code = result
            .outcome
            .http_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{:3}. {:24} {} {:>4} [{:>6}ms]",
            result.index + 1,
            result.task_name,
            status_str,
            status_code,
            result.outcome.duration_ms()
        )
    }

    /// Format the final report of an execution
    pub fn format_report(&self, snapshot: &ExecutionSnapshot) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(snapshot),
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(snapshot),
            OutputFormat::Csv => self.format_report_csv(snapshot),
            OutputFormat::Summary => self.format_report_brief(snapshot),
        }
    }

    fn format_report_table(&self, snapshot: &ExecutionSnapshot) -> String {
        let mut output = String::new();

        output.push_str("\n═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(
            " Execution {} ({} tasks, concurrency {}, delay {}ms)\n",
            snapshot.id, snapshot.total_tests, snapshot.concurrency, snapshot.delay_ms
        ));
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        let mut results: Vec<_> = snapshot.results.iter().collect();
        results.sort_by_key(|r| r.index);
        for result in results {
            output.push_str(&format!(" {}\n", self.format_result_table(result)));
        }

        output.push_str(" ───────────────────────────────────────────────────────────\n");

        let breakdown = snapshot.breakdown();
        let pass_str = self.paint("32", &snapshot.success_count.to_string());
        let fail_str = if snapshot.failure_count > 0 {
            self.paint("31", &snapshot.failure_count.to_string())
        } else {
            snapshot.failure_count.to_string()
        };
        output.push_str(&format!(
            " Total: {} | Pass: {} | Fail: {} (status {}, error {}, cancelled {})\n",
            snapshot.total_tests,
            pass_str,
            fail_str,
            breakdown.failure,
            breakdown.error,
            breakdown.cancelled
        ));
        output.push_str(&format!(
            " Pass Rate: {:5.1}% | Wall: {}ms | Task time: {}ms\n",
            snapshot.success_rate(),
            snapshot.elapsed_ms(),
            snapshot.total_task_duration_ms()
        ));

        let failures: Vec<_> = snapshot.failures().collect();
        if !failures.is_empty() {
            output.push_str("\n Failures:\n");
            for result in failures {
                output.push_str(&format!(
                    "   - {}: {}\n",
                    result.task_name,
                    result.outcome.error_message().unwrap_or_default()
                ));
                if let Outcome::Failure { body, .. } = &result.outcome {
                    if !body.is_empty() {
                        output.push_str(&format!("     {}\n", preview(body)));
                    }
                }
            }
        }

        output
    }

    fn format_report_csv(&self, snapshot: &ExecutionSnapshot) -> String {
        report_csv(snapshot).unwrap_or_default()
    }

    fn format_report_brief(&self, snapshot: &ExecutionSnapshot) -> String {
        format!(
            "{}: {}/{} passed ({:.1}%) in {}ms{}",
            snapshot.id,
            snapshot.success_count,
            snapshot.total_tests,
            snapshot.success_rate(),
            snapshot.elapsed_ms(),
            if snapshot.cancelled { " [cancelled]" } else { "" }
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

const RESULT_HEADER: [&str; 7] = [
    "index",
    "task_name",
    "status",
    "http_status",
    "duration_ms",
    "finished_at",
    "error",
];

fn result_record(result: &TaskResult) -> [String; 7] {
    [
        result.index.to_string(),
        result.task_name.clone(),
        result.outcome.label().to_string(),
        result
            .outcome
            .http_status()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        result.outcome.duration_ms().to_string(),
        result.finished_at.to_rfc3339(),
        result.outcome.error_message().unwrap_or_default(),
    ]
}

fn report_csv(snapshot: &ExecutionSnapshot) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(RESULT_HEADER)?;
    for result in &snapshot.results {
        writer.write_record(result_record(result))?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// Single CSV record without trailing newline
fn csv_line<I, T>(fields: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let line = || -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(fields)?;
        Ok(String::from_utf8(writer.into_inner()?)?)
    };
    line()
        .map(|l| l.trim_end_matches('\n').to_string())
        .unwrap_or_default()
}

fn preview(body: &str) -> String {
    let line = body.lines().next().unwrap_or_default();
    if line.chars().count() > BODY_PREVIEW {
        let cut: String = line.chars().take(BODY_PREVIEW).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

/// Write an execution report to a file
pub fn write_report_to_file(
    path: &str,
    snapshot: &ExecutionSnapshot,
    format: OutputFormat,
) -> Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_report(snapshot);

    let mut file = std::fs::File::create(path).context("Failed to create report file")?;
    file.write_all(content.as_bytes())
        .context("Failed to write report")?;

    Ok(())
}
