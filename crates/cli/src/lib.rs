pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "opsgate",
    about = "Opsgate operator CLI",
    long_about = "Operate the Opsgate gateway: readiness checks, config and policy inspection, and direct tool invocation against the configured ERP backend.",
    after_help = "Examples:\n  opsgate doctor --json\n  opsgate policies\n  opsgate call get_partner --args '{\"name\":\"acme\"}'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, the policy table, backend connectivity, and scope resolution")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print the entity policy table the gateway enforces")]
    Policies,
    #[command(about = "List the tool catalog")]
    Tools,
    #[command(about = "Invoke one tool against the configured backend")]
    Call {
        #[arg(help = "Tool name, as listed by `opsgate tools`")]
        tool: String,
        #[arg(long, default_value = "{}", help = "Tool input as a JSON object")]
        args: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Policies => {
            commands::CommandResult { exit_code: 0, output: commands::policies::run() }
        }
        Command::Tools => {
            commands::CommandResult { exit_code: 0, output: commands::tools::run() }
        }
        Command::Call { tool, args } => commands::call::run(&tool, &args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
