use chatline::cli::{Cli, Commands, Repl};
use chatline::config::Config;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    chatline::cli::init_logging();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply_overrides(&mut config);
    tracing::debug!(endpoint = %config.endpoint, "Starting chatline");

    match cli.command {
        Some(Commands::Ask(args)) => match chatline::cli::run_ask(args, &config).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
        None => match Repl::new(&config).run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}
