use std::io;
use std::time::Duration;

use crate::tasks::Task;

/// The OS could not create the process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// `wait_for` did not produce a result.
///
/// Every variant except `AlreadyWaited` is returned only after the process
/// has been terminated and all tasks have exited.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{task} failed: {source}")]
    TaskFailure {
        task: Task,
        #[source]
        source: io::Error,
    },

    #[error("process did not finish within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("process was already waited for or released")]
    AlreadyWaited,

    #[error("task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RunError {
    pub(crate) fn task(task: Task, source: io::Error) -> Self {
        Self::TaskFailure { task, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Run(#[from] RunError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failure_names_the_task() {
        let err = RunError::task(Task::Stdin, io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("stdin writer failed"), "{err}");
    }

    #[test]
    fn launch_error_names_the_program() {
        let err = LaunchError::Spawn {
            program: "missing-tool".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("missing-tool"), "{err}");
    }

    #[test]
    fn umbrella_error_is_transparent() {
        let err: Error = RunError::Timeout {
            timeout: Duration::from_secs(1),
        }
        .into();
        assert_eq!(err.to_string(), "process did not finish within 1s");
    }
}
