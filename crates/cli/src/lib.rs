pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "architect",
    about = "Agentic-Architect relay operator CLI",
    long_about = "Inspect relay configuration, check readiness, and talk to an agent directly.",
    after_help = "Examples:\n  architect doctor --json\n  architect config\n  architect invoke --agent provisioning \"deploy the staging stack\""
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
    #[command(about = "Validate config and agent target readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one message to an agent and print its full response")]
    Invoke {
        #[arg(long, default_value = "onboarding", help = "onboarding | provisioning")]
        agent: String,
        #[arg(long, help = "Continue an existing agent session")]
        session: Option<String>,
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult::text(commands::config::run(), 0)
        }
        Command::Doctor { json } => {
            commands::CommandResult::text(commands::doctor::run(json), 0)
        }
        Command::Invoke { agent, session, message } => {
            commands::invoke::run(&agent, session.as_deref(), &message)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
