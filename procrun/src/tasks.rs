//! The four units of work forked by `wait_for`.
//!
//! Each task owns exactly one sub-resource of the child: its stdin pipe, one
//! of the output pipes, or the `Child` itself for waiting. No two tasks touch
//! the same pipe, so nothing here needs a lock.

use std::fmt;
use std::io;
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Child;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::process::{exit_code, signal_process_group};

/// Read buffer size for the output drainers.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024; // 64KB

/// Which task a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Stdin,
    Stdout,
    Stderr,
    Exit,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::Stdin => "stdin writer",
            Task::Stdout => "stdout drainer",
            Task::Stderr => "stderr drainer",
            Task::Exit => "exit waiter",
        })
    }
}

/// What a successful task hands back to the coordinator.
#[derive(Debug)]
pub(crate) enum TaskOutput {
    StdinClosed,
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exited(i32),
}

/// Write `payload` in full, then close the pipe.
///
/// The pipe is dropped on every path, so the child sees EOF even when the
/// write fails. With no payload the pipe is closed without writing.
pub(crate) async fn write_stdin<W>(pipe: W, payload: Option<Vec<u8>>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(payload) = payload else {
        drop(pipe);
        return Ok(());
    };

    let mut writer = BufWriter::new(pipe);
    writer.write_all(&payload).await?;
    // shutdown flushes the buffer before closing
    writer.shutdown().await?;
    trace!(bytes = payload.len(), "stdin written");
    Ok(())
}

/// Read `pipe` to EOF and return everything it produced.
pub(crate) async fn drain<R>(pipe: R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, pipe);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Wait for the child to exit, or terminate it once `cancel` fires.
///
/// Either way the child has been reaped when this returns.
pub(crate) async fn wait_exit(
    mut child: Child,
    pid: u32,
    grace: Duration,
    cancel: CancellationToken,
) -> io::Result<i32> {
    tokio::select! {
        status = child.wait() => return Ok(exit_code(status?)),
        () = cancel.cancelled() => {}
    }
    debug!(pid, "exit waiter cancelled, terminating");
    terminate(&mut child, pid, grace).await
}

/// Terminate the child's process group and reap the child.
///
/// Sends SIGTERM first when `grace` is non-zero and escalates to SIGKILL if the
/// child is still alive once it elapses. The group is signalled while the
/// leader is still unreaped, so its PGID cannot have been recycled.
pub(crate) async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> io::Result<i32> {
    if !grace.is_zero() {
        signal_process_group(pid, Signal::SIGTERM);
        if let Ok(status) = time::timeout(grace, child.wait()).await {
            return Ok(exit_code(status?));
        }
        debug!(pid, grace_ms = grace.as_millis(), "still alive after grace period");
    }

    signal_process_group(pid, Signal::SIGKILL);
    if let Err(e) = child.start_kill() {
        trace!(pid, error = %e, "direct kill skipped");
    }
    let status = child.wait().await?;
    Ok(exit_code(status))
}
