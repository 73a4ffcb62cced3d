mod cmd;
mod error;

use std::fmt;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "procrun", version)]
struct Cli {
    /// Seconds the child may run before it is killed
    #[arg(long, global = true, env = "PROCRUN_TIMEOUT_SECS", default_value_t = 5)]
    timeout_secs: u64,

    /// Milliseconds between SIGTERM and SIGKILL when the child is terminated
    #[arg(long, global = true, env = "PROCRUN_GRACE_MS", default_value_t = 0)]
    grace_ms: u64,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn run_config(&self) -> procrun::RunConfig {
        procrun::RunConfig::new(Duration::from_secs(self.timeout_secs))
            .with_termination_grace(Duration::from_millis(self.grace_ms))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a command, relay its output and exit with its exit code
    Exec(cmd::ExecArgs),
    /// Compress text with the system gzip and check that it decompresses back
    GzipDemo(cmd::GzipDemoArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.run_config();

    let result = match cli.command {
        Command::Exec(args) => cmd::run_exec(args, config).await.map(ExitCode::from),
        Command::GzipDemo(args) => cmd::run_gzip_demo(args, config)
            .await
            .map(|matched| if matched { ExitCode::SUCCESS } else { ExitCode::FAILURE }),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
