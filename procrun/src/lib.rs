//! Run a child process under a deadline and collect what it produced.
//!
//! [`start`] spawns the process and hands back a [`RunningProcess`].
//! [`RunningProcess::wait_for`] then runs four tasks at once: write stdin,
//! drain stdout, drain stderr and wait for exit. All four share one deadline.
//! The first failure or an expired deadline cancels the rest and kills the
//! process before the error is returned.
//!
//! ## Lifecycle
//!
//! 1. `start` spawns the child in its own process group (pid available immediately)
//! 2. `wait_for` forks the tasks and joins them until `now + timeout`
//! 3. `release` (or `Drop`) terminates the group and joins every task
//!
//! [`run`] bundles the three steps for callers that only need the result.

mod config;
mod error;
mod launcher;
mod process;
mod running;
mod tasks;
mod types;

pub use config::RunConfig;
pub use error::{Error, LaunchError, Result, RunError};
pub use launcher::{run, start, start_with_config, start_without_stdin};
pub use process::is_running;
pub use running::RunningProcess;
pub use tasks::Task;
pub use types::RunResult;
