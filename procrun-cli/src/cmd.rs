use std::io::{Read, Write};
use std::path::PathBuf;

use clap::Args;
use flate2::read::GzDecoder;
use procrun::RunConfig;
use tracing::{info, warn};

use crate::error::CliResult;

#[derive(Args)]
pub struct ExecArgs {
    /// Text written to the command's stdin
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// File whose contents are written to the command's stdin
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Command and arguments, after `--`
    #[arg(required = true, last = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct GzipDemoArgs {
    /// Text to compress
    #[arg(default_value = "zip me")]
    pub text: String,
}

/// Returns the byte the CLI should exit with.
pub async fn run_exec(args: ExecArgs, config: RunConfig) -> CliResult<u8> {
    let input = match (args.input, args.input_file) {
        (Some(text), _) => Some(text.into_bytes()),
        (None, Some(path)) => Some(tokio::fs::read(&path).await?),
        (None, None) => None,
    };
    let config = RunConfig {
        stdin: input,
        ..config
    };

    let mut process = procrun::start_with_config(args.command.as_slice(), config)?;
    info!(
        pid = process.process_id(),
        timeout_ms = process.timeout().as_millis(),
        "started process"
    );
    let result = process.wait_for().await;
    process.release().await;
    let result = result?;

    info!(
        exit_value = result.exit_value,
        stdout_len = result.stdout.len(),
        stderr_len = result.stderr.len(),
        "process finished"
    );
    std::io::stdout().write_all(&result.stdout)?;
    std::io::stderr().write_all(&result.stderr)?;

    Ok(u8::try_from(result.exit_value).unwrap_or(1))
}

/// Returns whether the decompressed output matched the input.
pub async fn run_gzip_demo(args: GzipDemoArgs, config: RunConfig) -> CliResult<bool> {
    let config = config.with_stdin(args.text.as_bytes());
    let mut process = procrun::start_with_config(&["gzip", "-c"], config)?;
    println!("started process with pid: {}", process.process_id());

    let result = process.wait_for().await;
    process.release().await;
    let result = result?;
    println!("exit value: {}", result.exit_value);
    if !result.success() {
        warn!(stderr = %result.stderr_lossy(), "gzip reported a failure");
    }

    let unzipped = gunzip(&result.stdout)?;
    let matches = unzipped == args.text;
    println!("as expected: {matches}");

    Ok(matches)
}

fn gunzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut out = String::new();
    GzDecoder::new(bytes).read_to_string(&mut out)?;
    Ok(out)
}
