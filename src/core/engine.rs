//! Execution engine: run every planned task on a bounded pool of workers
//!
//! The pool has exactly `workers` dispatch slots. Each slot takes one task at a
//! time and hands it to a [`TaskRunner`]; in production that runner is
//! [`WorkerProcess`](super::worker::WorkerProcess), so every conversion lives
//! in its own OS process. Failures of any kind (error, panic, crash, timeout)
//! are folded into that task's [`TaskOutcome`] and never reach sibling tasks.

use anyhow::{Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::error::ConversionError;
use super::task::{ConversionTask, FailureKind, TaskOutcome, TaskStatus};

/// Anything that can carry out a single conversion
pub trait TaskRunner: Sync {
    fn run(&self, task: &ConversionTask) -> Result<(), ConversionError>;
}

/// Run one task, turning errors and panics into a status
pub fn run_guarded<R: TaskRunner + ?Sized>(runner: &R, task: &ConversionTask) -> TaskStatus {
    match panic::catch_unwind(AssertUnwindSafe(|| runner.run(task))) {
        Ok(Ok(())) => TaskStatus::Success,
        Ok(Err(e)) => TaskStatus::Failure {
            kind: e.kind(),
            message: e.to_string(),
        },
        Err(payload) => TaskStatus::Failure {
            kind: FailureKind::Panicked,
            message: format!("panic during conversion: {}", panic_message(payload.as_ref())),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub struct Engine {
    workers: usize,
    progress: ProgressBar,
    interrupt: Option<Arc<AtomicBool>>,
    verbose: bool,
}

impl Engine {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            progress: ProgressBar::hidden(),
            interrupt: None,
            verbose: false,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Once `flag` is set, tasks that have not started are skipped
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute all tasks and block until every outcome is in
    ///
    /// # Arguments
    /// * `tasks` - Planned conversions; each is handed to `runner` once
    /// * `runner` - Carries out a single conversion on a pool slot
    ///
    /// # Returns
    /// Exactly one outcome per task, in task order
    pub fn execute<R: TaskRunner>(
        &self,
        tasks: Vec<ConversionTask>,
        runner: &R,
    ) -> Result<Vec<TaskOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("convert-slot-{i}"))
            .build()
            .context("Failed to build worker pool")?;

        self.progress.set_length(tasks.len() as u64);
        debug!(tasks = tasks.len(), workers = self.workers, "Dispatching");

        // One task per split so a slow conversion never holds a queue of
        // others hostage on its slot.
        let outcomes = pool.install(|| {
            tasks
                .into_par_iter()
                .with_max_len(1)
                .progress_with(self.progress.clone())
                .map(|task| self.execute_one(task, runner))
                .collect::<Vec<_>>()
        });

        Ok(outcomes)
    }

    fn execute_one<R: TaskRunner>(&self, task: ConversionTask, runner: &R) -> TaskOutcome {
        if self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return TaskOutcome {
                task,
                status: TaskStatus::Skipped("interrupted before start".to_string()),
            };
        }

        let started = Instant::now();
        let status = run_guarded(runner, &task);
        let elapsed = started.elapsed();

        match &status {
            TaskStatus::Success => {
                debug!(source = %task.source.display(), ?elapsed, "Converted");
            }
            TaskStatus::Failure { kind, message } => {
                debug!(source = %task.source.display(), %kind, ?elapsed, "Conversion failed: {message}");
                if self.verbose {
                    self.progress
                        .println(format!("FAILED: {} ({kind}): {message}", task.source.display()));
                }
            }
            TaskStatus::Skipped(_) => {}
        }

        TaskOutcome { task, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct Counting {
        calls: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl TaskRunner for Counting {
        fn run(&self, task: &ConversionTask) -> Result<(), ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(task.source.clone());
            Ok(())
        }
    }

    fn tasks(n: usize) -> Vec<ConversionTask> {
        (0..n)
            .map(|i| ConversionTask::new(format!("/in/{i}.md"), format!("/in/{i}.pdf")))
            .collect()
    }

    #[test]
    fn test_every_task_runs_exactly_once() {
        let runner = Counting {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        };
        let outcomes = Engine::new(4).execute(tasks(50), &runner).unwrap();

        assert_eq!(outcomes.len(), 50);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 50);
        let unique: HashSet<_> = runner.seen.lock().unwrap().iter().cloned().collect();
        assert_eq!(unique.len(), 50);
        assert!(outcomes.iter().all(|o| o.status.is_success()));
    }

    #[test]
    fn test_panic_is_contained() {
        struct Explosive;
        impl TaskRunner for Explosive {
            fn run(&self, task: &ConversionTask) -> Result<(), ConversionError> {
                if task.source.ends_with("3.md") {
                    panic!("boom");
                }
                Ok(())
            }
        }

        let outcomes = Engine::new(2).execute(tasks(6), &Explosive).unwrap();
        assert_eq!(outcomes.len(), 6);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.status.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status.failure_kind(), Some(FailureKind::Panicked));
        assert!(matches!(
            &failed[0].status,
            TaskStatus::Failure { message, .. } if message.contains("boom")
        ));
    }

    #[test]
    fn test_interrupt_skips_unstarted_tasks() {
        let flag = Arc::new(AtomicBool::new(true));
        let runner = Counting {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        };
        let outcomes = Engine::new(2)
            .with_interrupt(flag)
            .execute(tasks(5), &runner)
            .unwrap();

        assert_eq!(outcomes.len(), 5);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.status, TaskStatus::Skipped(_))));
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(Engine::new(0).workers(), 1);
    }
}
