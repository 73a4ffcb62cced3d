use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Send `signal` to the process group led by `pid`.
///
/// Requires the child to have been spawned with `process_group(0)` so that its
/// PGID equals its PID. A group that no longer exists is not an error, and
/// other failures are logged rather than returned.
pub(crate) fn signal_process_group(pid: u32, signal: Signal) {
    let Some(pgid) = to_pid(pid) else {
        warn!(pid, "pid out of range, not signalling");
        return;
    };
    match signal::killpg(pgid, signal) {
        Ok(()) => debug!(pid, ?signal, "signalled process group"),
        Err(Errno::ESRCH) => debug!(pid, ?signal, "process group already gone"),
        Err(e) => warn!(pid, ?signal, error = %e, "failed to signal process group"),
    }
}

/// Whether a process with this pid currently exists.
///
/// A process we may not signal (`EPERM`) still exists. Pid 0 and values
/// outside `pid_t` never refer to a single process.
pub fn is_running(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    match signal::kill(pid, None::<Signal>) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
}

/// Exit code from an `ExitStatus`, mapping signals to 128 + signal number.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn exit_code_plain() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn exit_code_from_signal() {
        // Raw wait status for "terminated by SIGKILL".
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn current_process_is_running() {
        assert!(is_running(std::process::id()));
    }

    #[test]
    fn invalid_pids_are_not_running() {
        assert!(!is_running(0));
        assert!(!is_running(u32::MAX));
    }

    #[test]
    fn signalling_missing_group_is_harmless() {
        // Larger than the default pid_max, so no such group exists.
        signal_process_group(4_194_304 + 17, Signal::SIGKILL);
    }
}
