use anyhow::Result;
use bridgefx::core::log::init_logging;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for bridgefx::AppCommand {
    fn from(cmd: Commands) -> bridgefx::AppCommand {
        match cmd {
            Commands::Convert {
                from,
                to,
                amount,
                json,
            } => bridgefx::AppCommand::Convert {
                from,
                to,
                amount,
                json,
            },
            Commands::Batch { items, json, stats } => {
                bridgefx::AppCommand::Batch { items, json, stats }
            }
            Commands::Health { json } => bridgefx::AppCommand::Health { json },
            Commands::Assets => bridgefx::AppCommand::Assets,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert an amount between two assets
    Convert {
        /// Asset to convert from, e.g. BTC
        from: String,
        /// Asset to convert to, e.g. USD
        to: String,
        /// Amount of FROM to convert
        #[arg(default_value_t = 1.0)]
        amount: f64,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert several BASE:QUOTE[:AMOUNT] items concurrently
    Batch {
        #[arg(required = true)]
        items: Vec<String>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
        /// Show performance statistics after the batch
        #[arg(long)]
        stats: bool,
    },
    /// Check cache, providers and a set of test conversions
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List supported assets
    Assets,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; credentials may come from the shell or config.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let result = match cli.command {
        Some(Commands::Setup) => bridgefx::cli::setup::setup(),
        Some(cmd) => bridgefx::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
