use std::time::Duration;

/// Settings for a single run. Fixed once the process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Bytes written to the child's stdin before it is closed.
    ///
    /// `None` and `Some(vec![])` both close stdin without writing, but only the
    /// latter counts as "input was supplied".
    pub stdin: Option<Vec<u8>>,
    /// Budget for `wait_for`, measured from the moment it is called.
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL during termination. Zero sends SIGKILL directly.
    pub termination_grace: Duration,
}

impl RunConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            stdin: None,
            timeout,
            termination_grace: Duration::ZERO,
        }
    }

    pub fn with_stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }
}
