//! RoboHire CLI - sign in and check route access from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use robohire_auth::SessionContext;
use robohire_config::{Config, Paths};
use tracing::debug;

/// RoboHire CLI - manage your RoboHire session.
#[derive(Parser)]
#[command(name = "robohire")]
#[command(about = "RoboHire CLI for sign-in and route access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login {
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Complete sign-in from a pasted redirect URL
    Callback {
        /// The full redirect URL, including the token
        url: String,
    },

    /// Show the current session
    Status,

    /// Refresh the session token
    Refresh,

    /// Sign out and clear the session
    Logout,

    /// Check whether the current session may open a path
    Check {
        /// Path to check, e.g. /accounts
        path: String,
    },

    /// List protected routes
    Routes,
}

async fn dispatch(
    command: Commands,
    config: &Config,
    format: &output::OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Login { no_browser } => commands::login(config, no_browser, format).await,
        Commands::Callback { url } => commands::callback(config, &url, format).await,
        Commands::Status => commands::status(format).await,
        Commands::Refresh => commands::refresh(format).await,
        Commands::Logout => commands::logout(format).await,
        Commands::Check { path } => commands::check(config, &path, format).await,
        Commands::Routes => commands::routes(config, format).await,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let config = Config::load(&paths)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    robohire_config::init_logging(&level);
    debug!(config = %paths.config_file().display(), ephemeral = cli.ephemeral, "Starting");

    let ctx = commands::open_session(&paths, &config, cli.ephemeral)?;
    SessionContext::provide(ctx, dispatch(cli.command, &config, &cli.format)).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
