//! Marvelous Auth CLI - run and inspect the authentication hub.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marvelous_auth_core::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "marvelous-auth")]
#[command(about = "Marvelous Auth - token issuance and inter-service trust")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the state directory)
    #[arg(short, long, global = true, env = "MARVELOUS_AUTH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the auth hub
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (local, public, or IP)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Probe a running hub
    Status,

    /// Hash a password in the stored format
    HashPassword {
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Verify against this hash instead of hashing
        #[arg(long)]
        verify: Option<String>,
    },

    /// Print the inter-service trust registry
    Registry {
        /// Only this service
        #[arg(long)]
        service: Option<String>,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective configuration
    Show,

    /// Validate configuration
    Validate,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let loaded = commands::load_config(config_path);
    let (debug, format) = loaded.as_ref().map_or((false, LogFormat::Pretty), |c| {
        (c.settings.debug, c.settings.log_format)
    });
    init_tracing(cli.verbose || debug, format);

    match cli.command {
        Commands::Serve { port, bind } => {
            let args = commands::serve::ServeArgs { port, bind };
            commands::run_serve(loaded?, args).await?;
        }

        Commands::Status => commands::run_status(&loaded?).await?,

        Commands::HashPassword { password, verify } => {
            let args = commands::hash::HashArgs { password, verify };
            commands::run_hash_password(args)?;
        }

        Commands::Registry { service } => commands::run_registry(service.as_deref())?,

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(config_path, action)?;
        }
    }

    Ok(())
}
