/// Failures that end a `procrun` subcommand before it can relay a result.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("launch error: {0}")]
    Launch(#[from] procrun::LaunchError),

    #[error("run error: {0}")]
    Run(#[from] procrun::RunError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
