use super::limiter::ConcurrencyLimiter;
use super::report::Reporter;
use crate::process::{ExecutionResult, TaskError, TaskRunner};
use crate::task::TaskSpec;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Run-wide pass/fail summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateStatus {
    #[default]
    Success,
    Failure,
}

impl AggregateStatus {
    pub fn is_success(self) -> bool {
        self == AggregateStatus::Success
    }
}

/// How the front-end turns an [`AggregateStatus`] into a process exit code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Exit nonzero when any file fails
    #[default]
    Propagate,
    /// Always exit 0 and only log failures, for pipelines that must not break
    AlwaysSuccess,
}

impl ExitPolicy {
    /// Exit code for a finished run
    pub fn exit_code(self, outcome: &RunOutcome) -> i32 {
        match self {
            ExitPolicy::AlwaysSuccess => 0,
            ExitPolicy::Propagate if outcome.cancelled => 130,
            ExitPolicy::Propagate if outcome.status.is_success() => 0,
            ExitPolicy::Propagate => 1,
        }
    }
}

/// Everything a run produced, folded from results in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub status: AggregateStatus,
    pub files_total: usize,
    /// Tasks that finished with a result or a non-cancellation error
    pub files_processed: usize,
    pub failed_files: Vec<PathBuf>,
    pub spawn_failures: usize,
    pub timed_out: usize,
    pub cancelled: bool,
}

impl RunOutcome {
    fn new(files_total: usize) -> Self {
        Self {
            files_total,
            ..Self::default()
        }
    }

    fn record_result(&mut self, result: &ExecutionResult) {
        self.files_processed += 1;
        if !result.passed() {
            self.mark_failed(&result.file_path);
        }
    }

    fn record_error(&mut self, file: &Path, error: &TaskError) {
        self.files_processed += 1;
        match error {
            TaskError::Spawn { .. } => self.spawn_failures += 1,
            TaskError::TimedOut(_) => self.timed_out += 1,
            TaskError::Io { .. } | TaskError::Cancelled => {}
        }
        self.mark_failed(file);
    }

    fn mark_failed(&mut self, file: &Path) {
        self.status = AggregateStatus::Failure;
        self.failed_files.push(file.to_path_buf());
    }
}

/// Fans tasks out through a [`ConcurrencyLimiter`] and aggregates their results
#[derive(Debug)]
pub struct Scheduler {
    limiter: ConcurrencyLimiter,
}

impl Scheduler {
    /// Scheduler running at most `jobs` tasks at once
    pub fn new(jobs: usize) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(jobs),
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Run every task and report results as they complete.
    ///
    /// Firing `cancel` stops tasks still waiting for a permit from ever starting
    /// and tears down running ones. The call returns only after every task has
    /// settled, and it never fails: per-task problems are folded into the outcome.
    pub async fn run<R, P>(
        &self,
        runner: &R,
        tasks: Vec<TaskSpec>,
        cancel: &CancellationToken,
        reporter: &mut P,
    ) -> RunOutcome
    where
        R: TaskRunner,
        P: Reporter,
    {
        let total = tasks.len();
        let mut outcome = RunOutcome::new(total);
        reporter.on_start(total, self.limiter.capacity());

        tracing::info!(
            files = total,
            jobs = self.limiter.capacity(),
            "Starting analysis run"
        );

        let mut pending: FuturesUnordered<_> = tasks
            .iter()
            .map(|task| async move {
                let result = self
                    .limiter
                    .run(cancel, async { runner.run(task, cancel).await })
                    .await;
                (task, result)
            })
            .collect();

        let mut index = 0;
        let mut cancelled_tasks = 0;

        while let Some((task, result)) = pending.next().await {
            match result {
                Ok(result) => {
                    index += 1;
                    outcome.record_result(&result);
                    reporter.on_result(index, total, &result);
                }
                Err(TaskError::Cancelled) => {
                    cancelled_tasks += 1;
                    tracing::trace!(file = %task.file_path.display(), "Task cancelled");
                }
                Err(error) => {
                    index += 1;
                    match &error {
                        TaskError::Spawn { .. } => tracing::error!(
                            file = %task.file_path.display(),
                            "Spawn failure: {}",
                            error
                        ),
                        _ => tracing::error!(
                            file = %task.file_path.display(),
                            "Task failed: {}",
                            error
                        ),
                    }
                    outcome.record_error(&task.file_path, &error);
                    reporter.on_task_error(index, total, &task.file_path, &error);
                }
            }
        }

        if cancelled_tasks > 0 {
            outcome.cancelled = true;
            tracing::info!(cancelled = cancelled_tasks, "Run cancelled");
            reporter.on_cancelled();
        }

        tracing::info!(
            processed = outcome.files_processed,
            failed = outcome.failed_files.len(),
            "Analysis run finished: {:?}",
            outcome.status
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::report::{OutputMode, ProgressReporter};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Scripted stand-in for a subprocess: fixed exit code and duration per file
    #[derive(Default)]
    struct FakeTool {
        outcomes: HashMap<PathBuf, (i32, Duration)>,
        spawn_fails: HashSet<PathBuf>,
        active: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<PathBuf>>,
        terminated: Mutex<Vec<PathBuf>>,
    }

    impl FakeTool {
        fn with(mut self, file: &str, exit_code: i32, millis: u64) -> Self {
            self.outcomes.insert(
                PathBuf::from(file),
                (exit_code, Duration::from_millis(millis)),
            );
            self
        }

        fn failing_spawn(mut self, file: &str) -> Self {
            self.spawn_fails.insert(PathBuf::from(file));
            self
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn live(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        fn started(&self) -> Vec<PathBuf> {
            self.started.lock().unwrap().clone()
        }

        fn terminated(&self) -> Vec<PathBuf> {
            self.terminated.lock().unwrap().clone()
        }
    }

    impl TaskRunner for FakeTool {
        async fn run(
            &self,
            task: &TaskSpec,
            cancel: &CancellationToken,
        ) -> Result<ExecutionResult, TaskError> {
            if self.spawn_fails.contains(&task.file_path) {
                return Err(TaskError::Spawn {
                    program: "fake-tidy".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }

            let (exit_code, duration) = self
                .outcomes
                .get(&task.file_path)
                .copied()
                .unwrap_or((0, Duration::from_millis(5)));

            self.started.lock().unwrap().push(task.file_path.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let finished = tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = cancel.cancelled() => false,
            };

            // "Reap" before reporting either way
            self.active.fetch_sub(1, Ordering::SeqCst);
            if !finished {
                self.terminated.lock().unwrap().push(task.file_path.clone());
                return Err(TaskError::Cancelled);
            }

            Ok(ExecutionResult {
                file_path: task.file_path.clone(),
                exit_code,
                stdout: format!("checked {}\n", task.file_path.display()),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    format!("{}: warning: bad things\n", task.file_path.display())
                },
            })
        }
    }

    /// Fires the run-wide cancellation after `after` results
    struct CancelAfter<P> {
        inner: P,
        after: usize,
        seen: usize,
        token: CancellationToken,
    }

    impl<P: Reporter> Reporter for CancelAfter<P> {
        fn on_result(&mut self, index: usize, total: usize, result: &ExecutionResult) {
            self.inner.on_result(index, total, result);
            self.seen += 1;
            if self.seen == self.after {
                self.token.cancel();
            }
        }

        fn on_task_error(&mut self, index: usize, total: usize, file: &Path, error: &TaskError) {
            self.inner.on_task_error(index, total, file, error);
        }

        fn on_cancelled(&mut self) {
            self.inner.on_cancelled();
        }
    }

    fn tasks(files: &[&str]) -> Vec<TaskSpec> {
        TaskSpec::for_files(files.iter().copied(), Vec::new())
    }

    fn progress_lines(output: &str) -> Vec<&str> {
        output.lines().filter(|line| line.starts_with('[')).collect()
    }

    #[tokio::test]
    async fn test_all_passing_files_succeed() {
        let tool = FakeTool::default()
            .with("a.cpp", 0, 30)
            .with("b.cpp", 0, 10)
            .with("c.cpp", 0, 20);
        let scheduler = Scheduler::new(2);
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::Full);

        let outcome = scheduler
            .run(
                &tool,
                tasks(&["a.cpp", "b.cpp", "c.cpp"]),
                &CancellationToken::new(),
                &mut reporter,
            )
            .await;

        assert_eq!(outcome.status, AggregateStatus::Success);
        assert_eq!(outcome.files_processed, 3);
        assert!(!outcome.cancelled);
        assert!(tool.peak() <= 2);

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines = progress_lines(&output);
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.starts_with(&format!("[{}/3]: ", i + 1)));
        }
        for file in ["a.cpp", "b.cpp", "c.cpp"] {
            assert_eq!(lines.iter().filter(|l| l.ends_with(file)).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_single_failure_fails_run_and_shows_output() {
        let tool = FakeTool::default()
            .with("a.cpp", 0, 5)
            .with("b.cpp", 1, 5)
            .with("c.cpp", 0, 5);
        let scheduler = Scheduler::new(1);
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::FailuresOnly);

        let outcome = scheduler
            .run(
                &tool,
                tasks(&["a.cpp", "b.cpp", "c.cpp"]),
                &CancellationToken::new(),
                &mut reporter,
            )
            .await;

        assert_eq!(outcome.status, AggregateStatus::Failure);
        assert_eq!(outcome.failed_files, vec![PathBuf::from("b.cpp")]);
        assert_eq!(tool.peak(), 1);

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(output.contains("checked b.cpp\n"));
        assert!(output.contains("b.cpp: warning: bad things\n"));
        assert!(!output.contains("checked a.cpp"));
        assert!(output.contains("a.cpp [All checks passed!]"));
    }

    #[tokio::test]
    async fn test_empty_task_set_succeeds() {
        let tool = FakeTool::default();
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::Full);

        let outcome = Scheduler::new(4)
            .run(&tool, Vec::new(), &CancellationToken::new(), &mut reporter)
            .await;

        assert_eq!(outcome.status, AggregateStatus::Success);
        assert_eq!(outcome.files_total, 0);
        assert!(reporter.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_bound_holds_for_many_jobs_settings() {
        let files: Vec<String> = (0..16).map(|i| format!("f{i}.cpp")).collect();
        for jobs in [1, 2, 3, 7, 32] {
            let tool = files
                .iter()
                .enumerate()
                .fold(FakeTool::default(), |tool, (i, f)| {
                    tool.with(f, 0, 5 + (i as u64 % 4) * 5)
                });
            let mut reporter = ProgressReporter::new(std::io::sink(), OutputMode::Full);

            let outcome = Scheduler::new(jobs)
                .run(
                    &tool,
                    TaskSpec::for_files(files.iter(), Vec::new()),
                    &CancellationToken::new(),
                    &mut reporter,
                )
                .await;

            assert!(tool.peak() <= jobs, "jobs={jobs} peak={}", tool.peak());
            assert_eq!(outcome.files_processed, files.len());
            let started: HashSet<_> = tool.started().into_iter().collect();
            assert_eq!(started.len(), files.len());
        }
    }

    #[tokio::test]
    async fn test_status_is_independent_of_completion_order() {
        let mut statuses = Vec::new();
        for (slow, fast) in [(40, 5), (5, 40)] {
            let tool = FakeTool::default()
                .with("a.cpp", 0, slow)
                .with("b.cpp", 3, fast)
                .with("c.cpp", 0, 20);
            let mut reporter = ProgressReporter::new(std::io::sink(), OutputMode::Full);
            let outcome = Scheduler::new(3)
                .run(
                    &tool,
                    tasks(&["a.cpp", "b.cpp", "c.cpp"]),
                    &CancellationToken::new(),
                    &mut reporter,
                )
                .await;
            statuses.push(outcome.status);
        }

        assert_eq!(statuses, vec![AggregateStatus::Failure; 2]);
    }

    #[tokio::test]
    async fn test_spawn_failure_counts_as_failure() {
        let tool = FakeTool::default().failing_spawn("missing.cpp");
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::Full);

        let outcome = Scheduler::new(2)
            .run(
                &tool,
                tasks(&["ok.cpp", "missing.cpp"]),
                &CancellationToken::new(),
                &mut reporter,
            )
            .await;

        assert_eq!(outcome.status, AggregateStatus::Failure);
        assert_eq!(outcome.spawn_failures, 1);
        assert_eq!(outcome.files_processed, 2);
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(output.contains("missing.cpp [failed to start `fake-tidy`"));
    }

    #[tokio::test]
    async fn test_interrupt_after_two_completions_leaves_nothing_running() {
        let tool = FakeTool::default()
            .with("a.cpp", 0, 10)
            .with("b.cpp", 0, 20)
            .with("c.cpp", 0, 10_000)
            .with("d.cpp", 0, 10_000)
            .with("e.cpp", 0, 10_000);
        let cancel = CancellationToken::new();
        let mut reporter = CancelAfter {
            inner: ProgressReporter::new(Vec::new(), OutputMode::Full),
            after: 2,
            seen: 0,
            token: cancel.clone(),
        };

        let started = Instant::now();
        let outcome = Scheduler::new(3)
            .run(
                &tool,
                tasks(&["a.cpp", "b.cpp", "c.cpp", "d.cpp", "e.cpp"]),
                &cancel,
                &mut reporter,
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(outcome.cancelled);
        assert_eq!(outcome.files_processed, 2);
        assert_eq!(outcome.status, AggregateStatus::Success);
        assert!(tool.peak() <= 3);
        assert_eq!(tool.live(), 0, "a fake child outlived the run");

        // Every task that started and did not finish was torn down
        let finished = 2;
        assert_eq!(tool.started().len(), finished + tool.terminated().len());

        let output = String::from_utf8(reporter.inner.into_inner()).unwrap();
        assert_eq!(progress_lines(&output).len(), 2);
        assert!(output.ends_with("All tasks cancelled\n"));
    }

    #[tokio::test]
    async fn test_tasks_waiting_for_a_permit_never_start_after_cancel() {
        let tool = FakeTool::default()
            .with("a.cpp", 0, 10_000)
            .with("b.cpp", 0, 10_000)
            .with("c.cpp", 0, 10_000);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::Full);
        let scheduler = Scheduler::new(1);

        let (outcome, _) = tokio::join!(
            scheduler.run(
                &tool,
                tasks(&["a.cpp", "b.cpp", "c.cpp"]),
                &cancel,
                &mut reporter
            ),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                trigger.cancel();
            }
        );

        assert!(outcome.cancelled);
        assert_eq!(outcome.files_processed, 0);
        assert_eq!(tool.started().len(), 1);
        assert_eq!(tool.terminated(), tool.started());
        assert_eq!(scheduler.limiter().held(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_run_starts_nothing() {
        let tool = FakeTool::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Idempotent
        cancel.cancel();
        let mut reporter = ProgressReporter::new(Vec::new(), OutputMode::Full);

        let outcome = Scheduler::new(2)
            .run(&tool, tasks(&["a.cpp", "b.cpp"]), &cancel, &mut reporter)
            .await;

        assert!(outcome.cancelled);
        assert!(tool.started().is_empty());
        assert_eq!(outcome.status, AggregateStatus::Success);
    }

    #[test]
    fn test_exit_policy_mapping() {
        let failed = RunOutcome {
            status: AggregateStatus::Failure,
            ..RunOutcome::default()
        };
        let passed = RunOutcome::default();
        let cancelled = RunOutcome {
            cancelled: true,
            ..RunOutcome::default()
        };

        assert_eq!(ExitPolicy::Propagate.exit_code(&failed), 1);
        assert_eq!(ExitPolicy::Propagate.exit_code(&passed), 0);
        assert_eq!(ExitPolicy::Propagate.exit_code(&cancelled), 130);
        assert_eq!(ExitPolicy::AlwaysSuccess.exit_code(&failed), 0);
        assert_eq!(ExitPolicy::AlwaysSuccess.exit_code(&cancelled), 0);
    }
}
