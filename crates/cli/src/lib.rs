pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ticketry",
    about = "Ticketry operator CLI",
    long_about = "Inspect Ticketry readiness and the persisted ticket state without a running bot.",
    after_help = "Examples:\n  ticketry doctor --json\n  ticketry tickets\n  ticketry tickets --all --path ./tickets.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config and check that both state files load")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List tickets from the persisted tickets file")]
    Tickets {
        #[arg(long, help = "Tickets file to read instead of the configured one")]
        path: Option<PathBuf>,
        #[arg(long, help = "Include closed and archived tickets")]
        all: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Tickets { path, all } => commands::tickets::run(path, all),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
