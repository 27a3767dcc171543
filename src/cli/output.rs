//! Styled status messages for tidyrun
//!
//! Progress lines and tool output are written by the
//! [`ProgressReporter`](crate::parallel::ProgressReporter); this handler covers
//! everything around a run: notices, the final summary and fatal errors.

use crate::parallel::RunOutcome;
use console::style;
use std::path::Path;

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    /// Create a new output handler
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        // Errors are always shown, even in quiet mode
        eprintln!("{} {}", style("✖").red(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print a verbose message (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    /// Print the end-of-run summary
    pub fn summary(&self, outcome: &RunOutcome) {
        if self.quiet {
            return;
        }

        println!();
        if outcome.cancelled {
            self.warning(&format!(
                "Run cancelled after {} of {} files",
                outcome.files_processed, outcome.files_total
            ));
        } else if outcome.status.is_success() {
            self.success(&format!("All {} files passed", outcome.files_total));
        } else {
            self.error(&format!(
                "{} of {} files failed",
                outcome.failed_files.len(),
                outcome.files_total
            ));
        }

        if outcome.spawn_failures > 0 {
            self.table_row("Spawn failures", &outcome.spawn_failures.to_string());
        }
        if outcome.timed_out > 0 {
            self.table_row("Timed out", &outcome.timed_out.to_string());
        }
        if self.verbose {
            for file in &outcome.failed_files {
                self.list_item(file);
            }
        }
    }

    /// Print a table row
    pub fn table_row(&self, key: &str, value: &str) {
        println!("  {:<20} {}", style(key).dim(), value);
    }

    fn list_item(&self, path: &Path) {
        println!("  {} {}", style("•").red(), style(path.display()).dim());
    }
}
