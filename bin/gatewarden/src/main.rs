mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gatewarden")]
#[command(about = "Supervisor and control plane for a local AI gateway engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and supervise it until Ctrl-C
    Run {
        /// Echo engine output to the terminal
        #[arg(long)]
        follow: bool,
    },

    /// Stop any running engine instance, including ones started elsewhere
    Stop,

    /// Show engine installation, liveness and connectivity
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install the engine into the private state directory
    Install,

    /// Run environment diagnostics and the engine's own repair command
    Doctor,

    /// Show the engine's daily log file
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Manage engine plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommands,
    },
}

#[derive(Subcommand)]
enum PluginsCommands {
    /// List plugins and their status
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enable a plugin by id
    Enable { id: String },
    /// Disable a plugin by id
    Disable { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { follow } => {
            commands::run::run(follow).await?;
        }
        Commands::Stop => {
            commands::run::stop().await?;
        }
        Commands::Status { json } => {
            commands::status::run(json).await?;
        }
        Commands::Install => {
            commands::install::run().await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
        Commands::Logs { lines } => {
            commands::logs_cmd::show(lines).await?;
        }
        Commands::Plugins { command } => match command {
            PluginsCommands::List { json } => {
                commands::plugins::list(json).await?;
            }
            PluginsCommands::Enable { id } => {
                commands::plugins::toggle(&id, true).await?;
            }
            PluginsCommands::Disable { id } => {
                commands::plugins::toggle(&id, false).await?;
            }
        },
    }

    Ok(())
}
