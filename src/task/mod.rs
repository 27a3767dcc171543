//! Task descriptors
//!
//! A [`TaskSpec`] describes one analysis invocation: the file to check plus the
//! arguments forwarded from the command line. [`ToolCommand`] knows which program
//! to run and turns a task into the argument vector handed to the process executor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default analysis tool
pub const DEFAULT_TOOL: &str = "clang-tidy";

/// Immutable description of one analysis invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub file_path: PathBuf,
    /// Forwarded tool arguments, shared by every task of a run
    pub tool_args: Arc<[String]>,
}

impl TaskSpec {
    pub fn new(file_path: impl Into<PathBuf>, tool_args: Arc<[String]>) -> Self {
        Self {
            file_path: file_path.into(),
            tool_args,
        }
    }

    /// Create one task per file, all sharing the same forwarded arguments
    pub fn for_files<I, P>(files: I, tool_args: Vec<String>) -> Vec<TaskSpec>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let shared: Arc<[String]> = tool_args.into();
        files
            .into_iter()
            .map(|file| TaskSpec::new(file, shared.clone()))
            .collect()
    }
}

/// The external tool and any arguments it always receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Program name or path, resolved through PATH by the OS
    pub program: String,
    /// Arguments appended after the forwarded ones (e.g. `-warnings-as-errors=*`)
    #[serde(default)]
    pub trailing_args: Vec<String>,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_TOOL.to_string(),
            trailing_args: Vec::new(),
        }
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            trailing_args: Vec::new(),
        }
    }

    pub fn with_trailing_args(mut self, args: Vec<String>) -> Self {
        self.trailing_args = args;
        self
    }

    /// Build `[program, file, forwarded..., trailing...]` for one task
    pub fn build_args(&self, task: &TaskSpec) -> Vec<String> {
        let mut args = build_arg_list(&self.program, &task.file_path, &task.tool_args);
        args.extend(self.trailing_args.iter().cloned());
        args
    }
}

/// Build the invocation argument vector for checking `file` with `tool_args`.
///
/// Forwarded arguments are appended verbatim and in order.
pub fn build_arg_list(program: &str, file: &Path, tool_args: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(tool_args.len() + 2);
    args.push(program.to_string());
    args.push(file.to_string_lossy().into_owned());
    args.extend(tool_args.iter().cloned());
    args
}
