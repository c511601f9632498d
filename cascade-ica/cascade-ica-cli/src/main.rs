//! cascade-ica binary entry point.

use std::process::ExitCode;

use cascade_ica::report::{failure_line, EXIT_FAILURE};
use cascade_ica_cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cascade_ica_cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", failure_line(&err));
            ExitCode::from(EXIT_FAILURE as u8)
        }
    }
}
