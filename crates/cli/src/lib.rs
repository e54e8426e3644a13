pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "boardsight",
    about = "Boardsight operator CLI",
    long_about = "Ask business questions against the configured monday.com boards, inspect configuration, and check readiness.",
    after_help = "Examples:\n  boardsight ask \"How is the energy pipeline this quarter?\"\n  boardsight doctor --json\n  boardsight config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one question through the pipeline and print the response envelope as JSON")]
    Ask {
        question: String,
        #[arg(long, help = "JSON file with prior conversation turns ([{\"role\":\"user\",\"content\":\"...\"}])")]
        history: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, monday.com reachability, board access, and model credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, history } => commands::ask::run(&question, history.as_deref()),
        Command::Config => commands::CommandResult::printed(commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
