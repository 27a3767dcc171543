//! # tidyrun - parallel static analysis over many files
//!
//! Runs an external per-file analysis tool (clang-tidy by default) once per
//! target file, with at most N child processes alive at a time. Each file's
//! captured output is printed as soon as it completes and the run ends with a
//! single aggregate status.
//!
//! ## Layout
//!
//! - [`task`]: per-file task descriptors and argument construction
//! - [`process`]: spawning, capturing and tearing down one child process
//! - [`parallel`]: the concurrency limiter, scheduler and progress reporting
//! - [`discovery`]: expanding directory roots into target files
//! - [`config`]: layered configuration
//! - [`cli`]: the `tidyrun` command-line front-end
//!
//! ## Quick Start
//!
//! ```bash
//! tidyrun -j 8 --filename '*.cpp' src/ -- -p build
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod parallel;
pub mod process;
pub mod task;

pub use cli::{Cli, Output};
pub use config::TidyrunConfig;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
