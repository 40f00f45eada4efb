use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use invocation::{ExecutionResult, InvocationId, ProcessStatus, RunState, Runtime};
use sequence::MacroInvocation;
use util::Timer;

use crate::fs::Fs;
use crate::ui::Ui;

use super::run_cmd::{run_cmd, Outcome};
use super::CancelToken;

/// Counts of how each invocation in a run ended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// never started, either blocked by a failed predecessor or after the run stopped.
    pub skipped: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.skipped == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} cancelled, {} skipped",
            self.succeeded, self.failed, self.cancelled, self.skipped
        )
    }
}

/// `Scheduler` runs the invocations of a pipeline one at a time.
///
/// Before each invocation starts, its arguments are corrected (references
/// resolved, temp files created) and a process spec is built. The process
/// runs with its output copied into a log file, and its result is recorded on
/// the invocation so later invocations can check whether their run-order
/// predecessors succeeded.
pub struct Scheduler {
    runtime: Runtime,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
    /// times each invocation for its result record
    timer: Timer,
    cancel: CancelToken,
    /// keep running after a failure when run-order links are off
    keep_going: bool,
}

impl Scheduler {
    pub fn new(runtime: Runtime, fs: Fs, ui: Ui, cancel: CancelToken, keep_going: bool) -> Self {
        Self {
            runtime,
            fs,
            ui,
            timer: Timer::now(),
            cancel,
            keep_going,
        }
    }

    /// Run every invocation in `pipeline`, in execution order.
    /// Results from any earlier run are discarded first.
    pub fn run(&mut self, pipeline: &mut MacroInvocation) -> Result<Summary> {
        pipeline.reset_results();
        let order = pipeline
            .execution_order()
            .context("while ordering invocations")?;

        let mut summary = Summary::default();
        let mut stopped = false;

        for id in order {
            let inv = pipeline.get(id)?;
            let label = format!("{} {}", inv.run_number(), inv.name());

            if stopped || self.cancel.is_cancelled() {
                eprintln!("{} {label} (run stopped)", "SKIPPED".yellow());
                summary.skipped += 1;
                continue;
            }

            let blockers = pipeline.blocked_by(id)?;
            if !blockers.is_empty() {
                let names: Vec<_> = blockers
                    .iter()
                    .filter_map(|b| pipeline.get(*b).ok())
                    .map(|b| b.name().to_owned())
                    .collect();
                eprintln!(
                    "{} {label} (waiting on {})",
                    "SKIPPED".yellow(),
                    names.join(", ")
                );
                summary.skipped += 1;
                continue;
            }

            eprintln!("{} {label}", "RUN".green());
            let result = self.run_one(pipeline, id);
            let state = result.state();
            pipeline.set_results(id, result)?;

            match state {
                RunState::Succeeded => {
                    eprintln!("{} {label}\n", "COMPLETED".green());
                    summary.succeeded += 1;
                }
                RunState::Cancelled => {
                    eprintln!("{} {label}\n", "CANCELLED".yellow());
                    summary.cancelled += 1;
                    stopped = true;
                }
                _ => {
                    eprintln!("{} {label}\n", "FAILED".red());
                    summary.failed += 1;
                    if !pipeline.run_order_links() && !self.keep_going {
                        stopped = true;
                    }
                }
            }
        }

        let msg = format!("Pipeline finished: {summary}.");
        if summary.is_success() {
            eprintln!("{}\n", msg.green());
        } else {
            eprintln!("{}\n", msg.red());
        }
        Ok(summary)
    }

    /// Start invocation `id` and wait for it, producing its final result.
    fn run_one(&mut self, pipeline: &mut MacroInvocation, id: InvocationId) -> ExecutionResult {
        self.timer.reset();
        let start_time = self.timer.started_at();
        let mut log = None;

        let outcome = self.launch(pipeline, id, &mut log);
        let duration = self.timer.elapsed();
        if self.ui.verbose {
            self.timer.print_elapsed("Invocation");
        }

        match outcome {
            Ok(Outcome {
                exit_code,
                cancelled,
            }) => ExecutionResult {
                start_time: Some(start_time),
                duration: Some(duration),
                exit_code,
                status: match (cancelled, exit_code) {
                    (true, _) => ProcessStatus::Interrupted,
                    (false, Some(_)) => ProcessStatus::Exited,
                    (false, None) => ProcessStatus::Killed,
                },
                cancelled,
                log,
            },
            Err(e) => {
                eprintln!("{} {e:#}", "Error:".red());
                ExecutionResult {
                    start_time: Some(start_time),
                    duration: Some(duration),
                    status: ProcessStatus::FailedToStart,
                    log,
                    ..ExecutionResult::default()
                }
            }
        }
    }

    fn launch(
        &mut self,
        pipeline: &mut MacroInvocation,
        id: InvocationId,
        log: &mut Option<PathBuf>,
    ) -> Result<Outcome> {
        pipeline
            .correct_arguments(id, &self.runtime)
            .context("while correcting arguments")?;
        let spec = pipeline
            .build_process_spec(id, &self.runtime)
            .context("while building process")?;
        let mut cmd = spec.to_command()?;
        self.ui.verbose_msg(&spec.display());

        let inv = pipeline.get(id)?;
        let path = self.fs.log_file(inv.run_number(), inv.name());
        let file = self
            .fs
            .create_file(&path)
            .context("while creating log file")?;
        *log = Some(path);

        pipeline.set_results(id, ExecutionResult::running(self.timer.started_at()))?;
        run_cmd(&mut cmd, file, &self.cancel, self.ui.verbose)
    }
}
