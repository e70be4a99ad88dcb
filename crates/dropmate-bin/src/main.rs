//! Dropmate - headless host for the realtime sync and session core.

mod app;
mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dropmate_config_and_utils::{init_logging, init_logging_with_file, Config, Paths};

/// Dropmate command-line interface.
#[derive(Parser)]
#[command(name = "dropmate")]
#[command(about = "Keep shipment data in sync with the Dropmate backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs and credentials. Defaults to ~/.dropmate
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and keep the realtime channel and cache in sync
    Run {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "DROPMATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Use in-process identity, channel and data services
        #[arg(long)]
        offline: bool,
    },
    /// Show whether a session is persisted
    Status,
    /// Forget the persisted session
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());

    match cli.command {
        Commands::Run {
            email,
            password,
            offline,
        } => {
            paths.ensure_dirs()?;
            init_logging_with_file(&level, &paths.log_file());
            let options = app::RunOptions {
                email,
                password,
                offline,
            };
            app::run(config, paths, options).await?;
        }
        Commands::Status => {
            init_logging(&level);
            auth::status(&paths)?;
        }
        Commands::Logout => {
            init_logging(&level);
            auth::logout(&paths)?;
        }
    }

    Ok(())
}
