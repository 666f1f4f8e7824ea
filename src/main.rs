use std::path::PathBuf;

use clap::Parser;
use judge_core::config::load_config;
use judge_core::runner::Runner;

/// Runs one sandboxed submission and prints its verdict as JSON to stdout.
#[derive(Debug, Parser)]
#[command(name = "judge-core", version, about)]
struct Cli {
    /// Keep the submission workspace on disk instead of deleting it.
    #[arg(long)]
    keep: bool,

    /// Increase log verbosity; repeat for more (e.g. -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a judge-core.toml config file. Missing file falls back
    /// to built-in defaults.
    #[arg(long, default_value = "judge-core.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            let submission_id = uuid::Uuid::new_v4().simple().to_string();
            let (verdict, exit_code) = judge_core::verdict::runner_error(
                &submission_id,
                "config",
                0,
                Some(2),
                "",
                false,
                "",
                false,
                16_000,
            );
            println!("{verdict}");
            std::process::exit(exit_code);
        }
    };

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve current directory");
            std::process::exit(2);
        }
    };

    let runner = Runner::new(config);
    let (verdict, exit_code) = runner.run(&cwd, cli.keep).await;

    println!("{verdict}");
    std::process::exit(exit_code);
}

/// Structured logging to stderr only — stdout is reserved for the one
/// verdict JSON document a run ever produces.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "judge_core=info",
        1 => "judge_core=debug",
        _ => "judge_core=trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
