//! torrentplay - play a torrent while it downloads
//!
//! # Usage
//!
//! ```bash
//! torrentplay play tt1856101 --source 1080p=https://example.com/br.torrent
//! torrentplay config set-limits --upload 100
//! torrentplay config show --json
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use torrentplay::cli::{Cli, Command, ExitCode, Output};
use torrentplay::commands;
use torrentplay::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = run_cli(cli).await;
    exit_code.into()
}

/// Log to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let default = if verbose { "torrentplay=debug" } else { "torrentplay=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match cli.config.as_deref() {
        Some(path) if path.exists() => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
        Some(_) => Config::default(),
        None => Config::load(),
    };

    match cli.command {
        Command::Play(cmd) => commands::play_cmd(cmd, &config, &output).await,
        Command::Config(cmd) => commands::config_cmd(cmd, config, cli.config.as_deref(), &output),
    }
}
