mod commands;
mod local;
mod logging;
mod ui;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::conns::ConnsCommand;
use crate::commands::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "sluice",
    version,
    about = "Move data between connections, one stream or a whole replication at a time"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task or a replication
    Run(Box<RunArgs>),
    /// Manage local connections
    Conns {
        #[command(subcommand)]
        command: ConnsCommand,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Commands::Run(args) if args.debug => "debug",
        _ => cli.log_level.as_str(),
    };
    logging::init(log_level);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(*args).await,
        Commands::Conns { command } => commands::conns::execute(command),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&e);
            ExitCode::FAILURE
        }
    }
}
