use std::ffi::OsStr;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::{LaunchError, Result};
use crate::running::RunningProcess;
use crate::types::RunResult;

/// Format a human-readable display string for a command line.
fn format_command_display<S: AsRef<OsStr>>(cmd: &[S]) -> String {
    cmd.iter()
        .map(|part| part.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Start `cmd` and feed it `stdin` once [`RunningProcess::wait_for`] runs.
///
/// Must be called from within a Tokio runtime.
pub fn start<S: AsRef<OsStr>>(
    cmd: &[S],
    stdin: impl Into<Vec<u8>>,
    timeout: Duration,
) -> std::result::Result<RunningProcess, LaunchError> {
    start_with_config(cmd, RunConfig::new(timeout).with_stdin(stdin))
}

/// Start `cmd` with no input; its stdin is closed as soon as the run begins.
pub fn start_without_stdin<S: AsRef<OsStr>>(
    cmd: &[S],
    timeout: Duration,
) -> std::result::Result<RunningProcess, LaunchError> {
    start_with_config(cmd, RunConfig::new(timeout))
}

/// Start `cmd` with a full [`RunConfig`].
///
/// The child gets piped stdio and its own process group, so terminating the
/// group also reaches descendants that inherited its pipes.
pub fn start_with_config<S: AsRef<OsStr>>(
    cmd: &[S],
    config: RunConfig,
) -> std::result::Result<RunningProcess, LaunchError> {
    let (program, args) = cmd.split_first().ok_or(LaunchError::EmptyCommand)?;
    let cmd_display = format_command_display(cmd);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.as_ref().to_string_lossy().into_owned(),
            source,
        })?;

    let pid = child.id().ok_or_else(|| LaunchError::Spawn {
        program: cmd_display.clone(),
        source: io::Error::other("process exited before its pid was read"),
    })?;
    debug!(pid, command = %cmd_display, "process started");

    Ok(RunningProcess::new(child, pid, config))
}

/// Start, wait and release in one call.
///
/// The process is released on every path, including when `wait_for` fails.
pub async fn run<S: AsRef<OsStr>>(
    cmd: &[S],
    stdin: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<RunResult> {
    let config = RunConfig {
        stdin,
        ..RunConfig::new(timeout)
    };
    let mut process = start_with_config(cmd, config)?;
    let result = process.wait_for().await;
    process.release().await;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn format_command_display_joins_args() {
        assert_eq!(format_command_display(&["gzip", "-c"]), "gzip -c");
        assert_eq!(format_command_display::<&str>(&[]), "");
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = start_without_stdin::<&str>(&[], Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::EmptyCommand));
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let err = start_without_stdin(&["nonexistent-binary-xyz"], Duration::from_secs(1))
            .err()
            .unwrap();
        match err {
            LaunchError::Spawn { program, source } => {
                assert_eq!(program, "nonexistent-binary-xyz");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn pid_is_available_before_wait() {
        let mut process = start_without_stdin(&["sleep", "5"], Duration::from_secs(1)).unwrap();
        assert!(process.process_id() > 0);
        assert!(crate::is_running(process.process_id()));
        process.release().await;
    }

    #[tokio::test]
    async fn run_returns_result() {
        let result = run(&["cat"], Some(b"abc".to_vec()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout, b"abc");
    }

    #[tokio::test]
    async fn run_surfaces_launch_error() {
        let err = run(&["nonexistent-binary-xyz"], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
    }
}
