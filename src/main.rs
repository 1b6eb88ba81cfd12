use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use finfeed::config::ApiCategory;
use finfeed::log::init_logging;

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

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch one endpoint for a data category
    Fetch {
        /// Data category: stock-market, news, crypto, economic, brazilian-stock
        category: String,
        /// Endpoint path, e.g. /simple/price
        endpoint: String,
        /// Query parameters as name=value (repeatable)
        #[arg(short, long)]
        param: Vec<String>,
        /// Cache lifetime for the response, in seconds
        #[arg(long, default_value_t = 300)]
        ttl_secs: u64,
    },
    /// Display today's API quota usage
    Usage,
    /// Remove cached responses, optionally only those under a key prefix
    CacheClear {
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

impl TryFrom<Commands> for finfeed::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<finfeed::AppCommand> {
        Ok(match cmd {
            Commands::Fetch {
                category,
                endpoint,
                param,
                ttl_secs,
            } => finfeed::AppCommand::Fetch {
                category: category.parse::<ApiCategory>()?,
                endpoint,
                params: finfeed::parse_params(&param),
                ttl_secs,
            },
            Commands::Usage => finfeed::AppCommand::Usage,
            Commands::CacheClear { prefix } => finfeed::AppCommand::CacheClear { prefix },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => finfeed::write_default_config(),
        Some(cmd) => finfeed::run_command(cmd.try_into()?, cli.config_path.as_deref()).await,
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
