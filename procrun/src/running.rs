use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::process::Child;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::RunConfig;
use crate::error::RunError;
use crate::process::signal_process_group;
use crate::tasks::{self, Task, TaskOutput};
use crate::types::RunResult;

/// How long `release` waits for tasks after termination before aborting them.
const JOIN_BOUND: Duration = Duration::from_secs(1);

type TaskResult = Result<TaskOutput, RunError>;

/// A started process and the scope its helper tasks run in.
///
/// Call [`wait_for`](Self::wait_for) once to collect the result, then
/// [`release`](Self::release). Dropping without `release` still kills the
/// process group and aborts the tasks, but cannot wait for the child to be
/// reaped.
pub struct RunningProcess {
    pid: u32,
    /// Present until `wait_for` hands it to the exit waiter.
    child: Option<Child>,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
    grace: Duration,
    tasks: JoinSet<TaskResult>,
    cancel: CancellationToken,
    /// Set by the exit waiter once the leader has been reaped.
    leader_reaped: Arc<AtomicBool>,
    released: bool,
}

impl RunningProcess {
    pub(crate) fn new(child: Child, pid: u32, config: RunConfig) -> Self {
        Self {
            pid,
            child: Some(child),
            stdin: config.stdin,
            timeout: config.timeout,
            grace: config.termination_grace,
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            leader_reaped: Arc::new(AtomicBool::new(false)),
            released: false,
        }
    }

    /// Pid recorded at launch.
    pub fn process_id(&self) -> u32 {
        self.pid
    }

    /// Time `wait_for` allows the process, measured from the call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write stdin, drain both outputs and wait for exit, all concurrently.
    ///
    /// The deadline is `now + timeout`, taken when this is called. On the
    /// first task failure or when the deadline passes, the remaining tasks
    /// are cancelled and the process is killed and reaped before the error
    /// is returned.
    ///
    /// Meant to be called once, before `release`. Later calls return
    /// [`RunError::AlreadyWaited`].
    pub async fn wait_for(&mut self) -> Result<RunResult, RunError> {
        let Some(mut child) = self.child.take() else {
            return Err(RunError::AlreadyWaited);
        };
        let deadline = Instant::now() + self.timeout;
        debug!(pid = self.pid, timeout_ms = self.timeout.as_millis(), "waiting for process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let payload = self.stdin.take();

        self.tasks.spawn(async move {
            let pipe = stdin.ok_or_else(|| missing_pipe(Task::Stdin))?;
            tasks::write_stdin(pipe, payload)
                .await
                .map(|()| TaskOutput::StdinClosed)
                .map_err(|e| RunError::task(Task::Stdin, e))
        });
        self.tasks.spawn(async move {
            let pipe = stdout.ok_or_else(|| missing_pipe(Task::Stdout))?;
            tasks::drain(pipe)
                .await
                .map(TaskOutput::Stdout)
                .map_err(|e| RunError::task(Task::Stdout, e))
        });
        self.tasks.spawn(async move {
            let pipe = stderr.ok_or_else(|| missing_pipe(Task::Stderr))?;
            tasks::drain(pipe)
                .await
                .map(TaskOutput::Stderr)
                .map_err(|e| RunError::task(Task::Stderr, e))
        });
        let (pid, grace, cancel) = (self.pid, self.grace, self.cancel.clone());
        let reaped = Arc::clone(&self.leader_reaped);
        self.tasks.spawn(async move {
            let exited = tasks::wait_exit(child, pid, grace, cancel).await;
            reaped.store(true, Ordering::SeqCst);
            exited
                .map(TaskOutput::Exited)
                .map_err(|e| RunError::task(Task::Exit, e))
        });

        let err = match time::timeout_at(deadline, collect(&mut self.tasks)).await {
            Ok(Ok(collected)) => return collected.into_result(self.pid),
            Ok(Err(e)) => e,
            Err(_) => RunError::Timeout {
                timeout: self.timeout,
            },
        };

        debug!(pid = self.pid, error = %err, "run failed, shutting down");
        self.release().await;
        Err(err)
    }

    /// Terminate the process if it is still alive and join every task.
    ///
    /// Idempotent, and safe whether or not `wait_for` ran or failed.
    /// Termination failures are logged, never returned.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Running exit waiter terminates and reaps the child itself.
        self.cancel.cancel();

        // Never handed to a waiter.
        if let Some(mut child) = self.child.take() {
            match tasks::terminate(&mut child, self.pid, self.grace).await {
                Ok(code) => debug!(pid = self.pid, exit_value = code, "process terminated"),
                Err(e) => warn!(pid = self.pid, error = %e, "failed to terminate process"),
            }
        }

        while let Some(joined) = self.tasks.try_join_next() {
            log_released(joined);
        }
        // Leader gone but tasks still blocked on its pipes: a descendant holds
        // them, which also keeps the PGID in use.
        if self.leader_reaped.load(Ordering::SeqCst) && !self.tasks.is_empty() {
            debug!(pid = self.pid, "leader already exited, killing remaining group");
            signal_process_group(self.pid, Signal::SIGKILL);
        }

        if time::timeout(self.grace + JOIN_BOUND, join_all(&mut self.tasks))
            .await
            .is_err()
        {
            // Holders outside the process group can keep the pipes open.
            warn!(pid = self.pid, "tasks still running after termination, aborting");
            signal_process_group(self.pid, Signal::SIGKILL);
            self.tasks.abort_all();
            join_all(&mut self.tasks).await;
        }
        debug!(pid = self.pid, "released");
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        // A reaped leader with no tasks left means its PGID may already be reused.
        if self.released || (self.child.is_none() && self.tasks.is_empty()) {
            return;
        }
        debug!(pid = self.pid, "dropped without release, killing process group");
        self.cancel.cancel();
        signal_process_group(self.pid, Signal::SIGKILL);
        // Remaining `Child` handles are killed by `kill_on_drop` and reaped by tokio.
        self.tasks.abort_all();
    }
}

/// Partial outputs gathered while joining.
#[derive(Default)]
struct Collected {
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    exit_value: Option<i32>,
}

impl Collected {
    fn into_result(self, process_id: u32) -> Result<RunResult, RunError> {
        Ok(RunResult {
            exit_value: self.exit_value.ok_or_else(|| missing_output(Task::Exit))?,
            stdout: self.stdout.ok_or_else(|| missing_output(Task::Stdout))?,
            stderr: self.stderr.ok_or_else(|| missing_output(Task::Stderr))?,
            process_id,
        })
    }
}

/// Join tasks until all succeed or one fails.
async fn collect(tasks: &mut JoinSet<TaskResult>) -> Result<Collected, RunError> {
    let mut collected = Collected::default();
    while let Some(joined) = tasks.join_next().await {
        match joined?? {
            TaskOutput::StdinClosed => trace!("stdin task done"),
            TaskOutput::Stdout(bytes) => collected.stdout = Some(bytes),
            TaskOutput::Stderr(bytes) => collected.stderr = Some(bytes),
            TaskOutput::Exited(code) => collected.exit_value = Some(code),
        }
    }
    Ok(collected)
}

/// Join every task, discarding outcomes.
async fn join_all(tasks: &mut JoinSet<TaskResult>) {
    while let Some(joined) = tasks.join_next().await {
        log_released(joined);
    }
}

fn log_released(joined: Result<TaskResult, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => trace!(error = %e, "task failed during release"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(error = %e, "task panicked during release"),
    }
}

fn missing_pipe(task: Task) -> RunError {
    RunError::task(
        task,
        io::Error::new(io::ErrorKind::BrokenPipe, "pipe was not captured"),
    )
}

fn missing_output(task: Task) -> RunError {
    RunError::task(task, io::Error::other("task finished without output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{start, start_with_config, start_without_stdin};

    #[tokio::test]
    async fn wait_for_collects_everything() {
        let mut process = start_without_stdin(
            &["sh", "-c", "printf out; printf err >&2; exit 4"],
            Duration::from_secs(5),
        )
        .unwrap();
        let result = process.wait_for().await.unwrap();
        process.release().await;

        assert_eq!(result.exit_value, 4);
        assert_eq!(result.stdout, b"out");
        assert_eq!(result.stderr, b"err");
        assert_eq!(result.process_id, process.process_id());
    }

    #[tokio::test]
    async fn empty_streams_are_empty_vecs() {
        let mut process = start_without_stdin(&["true"], Duration::from_secs(5)).unwrap();
        let result = process.wait_for().await.unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn empty_payload_closes_stdin() {
        let mut process = start(&["cat"], Vec::new(), Duration::from_secs(5)).unwrap();
        let result = process.wait_for().await.unwrap();
        assert_eq!(result.exit_value, 0);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn no_payload_closes_stdin() {
        let mut process = start_without_stdin(&["cat"], Duration::from_secs(5)).unwrap();
        let result = process.wait_for().await.unwrap();
        assert_eq!(result.exit_value, 0);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn second_wait_for_is_rejected() {
        let mut process = start_without_stdin(&["true"], Duration::from_secs(5)).unwrap();
        process.wait_for().await.unwrap();
        let err = process.wait_for().await.unwrap_err();
        assert!(matches!(err, RunError::AlreadyWaited));
    }

    #[tokio::test]
    async fn timeout_kills_before_returning() {
        let mut process = start_without_stdin(&["sleep", "30"], Duration::from_millis(200)).unwrap();
        let pid = process.process_id();
        assert_eq!(process.timeout(), Duration::from_millis(200));

        let err = process.wait_for().await.unwrap_err();
        assert!(
            matches!(err, RunError::Timeout { timeout } if timeout == Duration::from_millis(200)),
            "{err}"
        );
        assert!(!crate::is_running(pid));
    }

    #[tokio::test]
    async fn release_without_wait_for_kills() {
        let mut process = start_without_stdin(&["sleep", "30"], Duration::from_secs(5)).unwrap();
        let pid = process.process_id();
        process.release().await;
        assert!(!crate::is_running(pid));

        // idempotent
        process.release().await;
    }

    #[tokio::test]
    async fn release_honours_termination_grace() {
        let config = RunConfig::new(Duration::from_secs(5))
            .with_termination_grace(Duration::from_secs(2));
        let mut process = start_with_config(&["sleep", "30"], config).unwrap();
        let pid = process.process_id();

        let started = Instant::now();
        process.release().await;
        // sleep exits on SIGTERM, so the grace period is not used up
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!crate::is_running(pid));
    }

    #[tokio::test]
    async fn stdin_write_failure_is_task_failure() {
        let mut process = start(&["true"], vec![0u8; 8 * 1024 * 1024], Duration::from_secs(5)).unwrap();
        let err = process.wait_for().await.unwrap_err();
        assert!(
            matches!(err, RunError::TaskFailure { task: Task::Stdin, .. }),
            "{err}"
        );
    }
}
