use crate::process::{ExecutionResult, TaskError};
use console::style;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// How much captured output to print per completed task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Print every task's stdout and stderr
    #[default]
    Full,
    /// Print output only for failing tasks; passing tasks get a one-line notice
    FailuresOnly,
}

/// Receives scheduler events in completion order
pub trait Reporter {
    fn on_start(&mut self, _total: usize, _jobs: usize) {}

    fn on_result(&mut self, index: usize, total: usize, result: &ExecutionResult);

    /// A task that ended without a result for a reason other than cancellation
    fn on_task_error(&mut self, index: usize, total: usize, file: &Path, error: &TaskError);

    fn on_cancelled(&mut self) {}
}

/// Writes progress lines and captured tool output to a stream
pub struct ProgressReporter<W: Write> {
    out: W,
    mode: OutputMode,
    color: bool,
}

impl<W: Write> ProgressReporter<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self {
            out,
            mode,
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn header(&self, index: usize, total: usize, file: &Path) -> String {
        format!(
            "{} {}",
            style(format!("[{index}/{total}]:")).dim().force_styling(self.color),
            style(file.display()).bold().force_styling(self.color)
        )
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            tracing::warn!("Failed to write progress output: {}", e);
        }
    }

    fn emit_stream(&mut self, captured: &str) {
        if captured.is_empty() {
            return;
        }
        self.emit(captured);
        if !captured.ends_with('\n') {
            self.emit("\n");
        }
    }
}

impl<W: Write> Reporter for ProgressReporter<W> {
    fn on_result(&mut self, index: usize, total: usize, result: &ExecutionResult) {
        let header = self.header(index, total, &result.file_path);

        if result.passed() && self.mode == OutputMode::FailuresOnly {
            let notice = style("[All checks passed!]").green().force_styling(self.color);
            self.emit(&format!("{header} {notice}\n"));
        } else {
            self.emit(&format!("{header}\n"));
            self.emit_stream(&result.stdout);
            self.emit_stream(&result.stderr);
        }

        let _ = self.out.flush();
    }

    fn on_task_error(&mut self, index: usize, total: usize, file: &Path, error: &TaskError) {
        let header = self.header(index, total, file);
        let reason = style(format!("[{error}]")).red().force_styling(self.color);
        self.emit(&format!("{header} {reason}\n"));
        let _ = self.out.flush();
    }

    fn on_cancelled(&mut self) {
        let notice = style("All tasks cancelled").yellow().force_styling(self.color);
        self.emit(&format!("\n{notice}\n"));
        let _ = self.out.flush();
    }
}
