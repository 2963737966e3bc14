use clap::Parser;
use sortwise::cli::{Cli, run_cli};
use sortwise::output::OutputFormatter;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run_cli(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            ExitCode::from(2)
        }
    }
}
