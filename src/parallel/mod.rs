//! Bounded parallel execution of analysis tasks
//!
//! This module owns concurrency and aggregation. It does not know how a task is
//! executed (that is the [`TaskRunner`](crate::process::TaskRunner) seam) or how
//! results are presented (the [`Reporter`] seam).
//!
//! ```text
//! ┌─────────────┐    ┌──────────────────┐    ┌──────────────────┐    ┌─────────────┐
//! │  TaskSpecs  │───▶│ ConcurrencyLimit │───▶│  ProcessExecutor │───▶│  Scheduler  │
//! │ (one/file)  │    │   (N permits)    │    │ (one child/task) │    │  aggregate  │
//! └─────────────┘    └──────────────────┘    └──────────────────┘    └─────────────┘
//! ```
//!
//! - **Limiter**: a FIFO semaphore; a permit is held for one subprocess lifetime
//!   and released on every exit path.
//! - **Scheduler**: drives all tasks on one logical task, consumes results in
//!   completion order and folds them into a [`RunOutcome`].
//! - **Cancellation**: one [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   reaches every task; waiting tasks never start, running ones are terminated
//!   and reaped before the run returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidyrun::parallel::{OutputMode, ProgressReporter, Scheduler};
//! use tidyrun::process::ProcessExecutor;
//! use tidyrun::task::{TaskSpec, ToolCommand};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let executor = ProcessExecutor::new(ToolCommand::new("clang-tidy"));
//! let tasks = TaskSpec::for_files(["src/a.cpp", "src/b.cpp"], vec!["-p".into(), "build".into()]);
//! let mut reporter = ProgressReporter::new(std::io::stdout(), OutputMode::FailuresOnly);
//!
//! let outcome = Scheduler::new(4)
//!     .run(&executor, tasks, &CancellationToken::new(), &mut reporter)
//!     .await;
//! println!("{:?}", outcome.status);
//! # }
//! ```

pub mod limiter;
pub mod report;
pub mod scheduler;

// Re-export main types for easier access
pub use limiter::ConcurrencyLimiter;
pub use report::{OutputMode, ProgressReporter, Reporter};
pub use scheduler::{AggregateStatus, ExitPolicy, RunOutcome, Scheduler};
