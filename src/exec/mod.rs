use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runs a pipeline's invocations in order
mod scheduler;
pub use scheduler::Scheduler;

/// Run a subprocess
mod run_cmd;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Cannot attach to child {0}")]
    Pipe(&'static str),
    #[error("Thread copying child {0} panicked")]
    OutputThread(&'static str),
    #[error("Pipeline failed: {failed} failed, {cancelled} cancelled, {skipped} skipped")]
    PipelineFailed {
        failed: usize,
        cancelled: usize,
        skipped: usize,
    },
}

/// Shared flag used to stop a running pipeline.
///
/// Cancelling kills the process currently running and prevents
/// any further invocation from starting.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
