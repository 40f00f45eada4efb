use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Fine-grained status of the external process, separate from its exit code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    #[default]
    Unexecuted,
    Running,
    /// exited on its own and reported an exit code
    Exited,
    /// terminated without an exit code (e.g. by a signal)
    Killed,
    /// stopped because the user cancelled the run
    Interrupted,
    /// could not be spawned at all
    FailedToStart,
}

/// Coarse lifecycle state derived from a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unexecuted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// What happened the last time an invocation was run.
/// Written by the scheduler in one piece per attempt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub start_time: Option<SystemTime>,
    pub duration: Option<Duration>,
    pub exit_code: Option<i32>,
    pub status: ProcessStatus,
    pub cancelled: bool,
    /// combined stdout/stderr of the process
    pub log: Option<PathBuf>,
}

impl ExecutionResult {
    /// Record for a process that has just been started.
    pub fn running(start_time: SystemTime) -> Self {
        Self {
            start_time: Some(start_time),
            status: ProcessStatus::Running,
            ..Self::default()
        }
    }

    /// True iff the process exited with code 0.
    /// Note that the cancelled flag is not consulted.
    pub fn is_succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn state(&self) -> RunState {
        match self.status {
            ProcessStatus::Unexecuted => RunState::Unexecuted,
            ProcessStatus::Running => RunState::Running,
            _ if self.cancelled => RunState::Cancelled,
            _ if self.is_succeeded() => RunState::Succeeded,
            _ => RunState::Failed,
        }
    }

    /// True once the process is no longer running (or never will).
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state(), RunState::Unexecuted | RunState::Running)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn finished(exit_code: Option<i32>, cancelled: bool) -> ExecutionResult {
        ExecutionResult {
            start_time: Some(SystemTime::now()),
            duration: Some(Duration::from_millis(10)),
            exit_code,
            status: if cancelled {
                ProcessStatus::Interrupted
            } else {
                ProcessStatus::Exited
            },
            cancelled,
            log: None,
        }
    }

    #[test]
    fn test_states() {
        assert_eq!(RunState::Unexecuted, ExecutionResult::default().state());
        assert_eq!(
            RunState::Running,
            ExecutionResult::running(SystemTime::now()).state()
        );
        assert_eq!(RunState::Succeeded, finished(Some(0), false).state());
        assert_eq!(RunState::Failed, finished(Some(2), false).state());
        assert_eq!(RunState::Cancelled, finished(Some(137), true).state());
        assert!(!ExecutionResult::running(SystemTime::now()).is_terminal());
        assert!(finished(Some(2), false).is_terminal());
    }

    #[test]
    fn test_succeeded_ignores_cancelled_flag() {
        let r = finished(Some(0), true);
        assert!(r.is_succeeded());
        assert_eq!(RunState::Cancelled, r.state());
    }
}
