use std::borrow::Cow;

/// Everything a finished process produced.
///
/// Only built when all four tasks succeeded before the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code, or `128 + signal` if the process was killed by a signal.
    pub exit_value: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Pid recorded at launch, not re-queried after exit.
    pub process_id: u32,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_value == 0
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossy_views_replace_invalid_utf8() {
        let result = RunResult {
            exit_value: 2,
            stdout: b"ok".to_vec(),
            stderr: vec![b'b', b'a', b'd', 0xff],
            process_id: 1,
        };
        assert!(!result.success());
        assert_eq!(result.stdout_lossy(), "ok");
        assert_eq!(result.stderr_lossy(), "bad\u{fffd}");
    }
}
