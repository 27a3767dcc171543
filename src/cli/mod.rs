//! Command-line interface for tidyrun
//!
//! Parses arguments, layers them over the configuration files, discovers the
//! target files and hands them to the [`Scheduler`]. The process exit code is
//! decided here from the run outcome and the configured [`ExitPolicy`].

use crate::config::{
    ConfigOverrides, DiscoveryOverrides, RunOverrides, TidyrunConfig, ToolOverrides,
};
use crate::discovery::{self, DiscoveryError};
use crate::parallel::{ExitPolicy, OutputMode, ProgressReporter, RunOutcome, Scheduler};
use crate::process::ProcessExecutor;
use crate::task::TaskSpec;
use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

mod output;

pub use output::Output;

/// Exit code for usage errors and paths that do not exist
pub const EXIT_USAGE: i32 = 2;

/// Run a static-analysis tool over many files in parallel
#[derive(Parser, Debug)]
#[command(
    name = "tidyrun",
    version = crate::VERSION,
    about = "Run clang-tidy (or a compatible tool) over many files in parallel",
    long_about = "tidyrun runs one analysis process per file with a bounded number of \
                  processes at once, prints each file's output as it completes and \
                  exits with an aggregate status."
)]
pub struct Cli {
    /// Files or directories to analyse
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Maximum number of concurrent tool processes [default: logical CPUs]
    #[arg(short = 'j', long = "num-jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Analysis program to run [default: clang-tidy]
    #[arg(long, value_name = "PROGRAM")]
    pub tool: Option<String>,

    /// Which captured output to print
    #[arg(long, value_enum)]
    pub output: Option<OutputMode>,

    /// How failures map to the exit code
    #[arg(long, value_enum)]
    pub exit_policy: Option<ExitPolicy>,

    /// Per-file time limit in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep files whose path under a directory root matches (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Drop files whose path under a directory root matches (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Keep files whose name matches, e.g. '*.cpp' (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub filename: Vec<String>,

    /// Summary format
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    pub format: SummaryFormat,

    /// Use custom configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Arguments forwarded to the tool after the file path
    #[arg(last = true, value_name = "TOOL-ARGS")]
    pub tool_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    #[serde(flatten)]
    outcome: &'a RunOutcome,
    exit_code: i32,
}

impl Cli {
    /// Execute a full run and return the process exit code
    pub async fn run(self) -> Result<i32> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);

        let config = TidyrunConfig::load(self.config.as_deref(), &self.overrides())?;

        if which::which(&config.tool.program).is_err() {
            tracing::warn!(
                "`{}` was not found on PATH; every file will report a spawn failure",
                config.tool.program
            );
        }

        let files = match discovery::find(&self.paths, &config.discovery) {
            Ok(files) => files,
            Err(e @ DiscoveryError::MissingRoot(_)) => {
                output.error(&e.to_string());
                return Ok(EXIT_USAGE);
            }
            Err(e) => return Err(e.into()),
        };

        if files.is_empty() {
            output.warning("No files matched; nothing to analyse");
            return Ok(0);
        }
        output.verbose(&format!(
            "Analysing {} files with `{}` ({} jobs)",
            files.len(),
            config.tool.program,
            config.jobs()
        ));

        let cancel = CancellationToken::new();
        let listener = spawn_interrupt_listener(cancel.clone());

        let executor = ProcessExecutor::new(config.tool.clone()).with_timeout(config.timeout());

        let tasks = TaskSpec::for_files(files, self.tool_args);
        let mut reporter = ProgressReporter::new(std::io::stdout(), config.run.output)
            .with_color(console::colors_enabled());

        let outcome = Scheduler::new(config.jobs())
            .run(&executor, tasks, &cancel, &mut reporter)
            .await;
        listener.abort();

        let exit_code = config.run.exit_policy.exit_code(&outcome);

        match self.format {
            SummaryFormat::Text => output.summary(&outcome),
            SummaryFormat::Json => {
                let summary = JsonSummary {
                    outcome: &outcome,
                    exit_code,
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        if config.run.exit_policy == ExitPolicy::AlwaysSuccess && !outcome.status.is_success() {
            // Shown even with -q
            output.error(&format!(
                "Linter check failed with return code {}",
                ExitPolicy::Propagate.exit_code(&outcome)
            ));
        }

        Ok(exit_code)
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tool: ToolOverrides {
                program: self.tool.clone(),
            },
            run: RunOverrides {
                jobs: self.jobs,
                output: self.output,
                exit_policy: self.exit_policy,
                timeout_secs: self.timeout,
            },
            discovery: DiscoveryOverrides {
                include: self.include.clone(),
                exclude: self.exclude.clone(),
                filename: self.filename.clone(),
            },
        }
    }
}

/// Cancel the run on the first Ctrl-C
fn spawn_interrupt_listener(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, cancelling run");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
    })
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info,globset=warn,walkdir=warn"),
            2 => tracing_subscriber::EnvFilter::new("debug,globset=warn,walkdir=warn"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // Tool output owns stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
