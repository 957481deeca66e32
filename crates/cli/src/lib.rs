pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rudolph-cli",
    about = "Rudolph operator CLI",
    long_about = "Inspect rudolph configuration, check readiness, and evaluate the scheduled digest gate.",
    after_help = "Examples:\n  rudolph-cli doctor --json\n  rudolph-cli config\n  rudolph-cli gate --at 2018-09-17T00:30:00Z"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, token format, and timezone availability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Report whether the share price digest would fire at an instant")]
    Gate {
        #[arg(long, help = "RFC 3339 instant to evaluate (defaults to now)")]
        at: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Gate { at } => commands::gate::run(at.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
