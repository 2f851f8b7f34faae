use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundharvest::core::log::init_logging;
use fundharvest::harvest::DetailTarget;

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

impl From<Commands> for fundharvest::AppCommand {
    fn from(cmd: Commands) -> fundharvest::AppCommand {
        match cmd {
            Commands::List => fundharvest::AppCommand::List,
            Commands::Detail { id: Some(id), .. } => {
                fundharvest::AppCommand::Detail(DetailTarget::Single(id))
            }
            Commands::Detail { id: None, all } => fundharvest::AppCommand::Detail(if all {
                DetailTarget::All
            } else {
                DetailTarget::Pending
            }),
            Commands::Status { pending } => fundharvest::AppCommand::Status {
                list_pending: pending,
            },
            Commands::Show { id } => fundharvest::AppCommand::Show(id),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Harvest all listing pages into base records
    List,
    /// Harvest detail pages of funds still missing details
    Detail {
        /// Harvest only this fund
        id: Option<String>,

        /// Re-harvest every known fund
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Display how many funds are harvested and pending
    Status {
        /// Also list the ids pending details
        #[arg(long)]
        pending: bool,
    },
    /// Display the stored record of a fund
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fundharvest::cli::setup::setup_at_path(path),
            None => fundharvest::cli::setup::setup(),
        },
        Some(cmd) => fundharvest::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
