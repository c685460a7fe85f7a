use clap::Parser;
use tracing_subscriber::EnvFilter;

use lute_core::cli::{load_config, run_cli_with_args, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli_with_args(cli, config)
}
