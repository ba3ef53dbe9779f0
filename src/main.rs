//! rtbridge CLI
//!
//! Entry point for the rtbridge command-line application.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rtbridge::cli::output::{display_error, exit_code, OutputConfig};
use rtbridge::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    // RUST_LOG directives are added on top of the verbosity level
    let filter = EnvFilter::builder()
        .with_default_directive(output_config.log_level().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run().await {
        display_error(&e);
        std::process::exit(exit_code(&e));
    }
}
