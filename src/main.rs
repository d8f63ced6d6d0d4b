//! De Lijn CLI - main entry point
//!
//! Subcommands:
//! - stop / departures / search-stops: stop lookups and realtime departures
//! - line / search-lines / colours: line lookups

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use delijn_client::delijn::error::EXIT_ERROR;
use delijn_client::{ApiError, ClientConfig, Credentials, DeLijnClient};

mod commands;

use commands::resolver::ResolveError;

#[derive(Parser, Debug)]
#[command(name = "delijn")]
#[command(about = "Query stops, lines and realtime departures from the De Lijn open data API", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to a file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a stop by its 6-digit number or name
    Stop {
        /// Stop number (e.g. 101000) or a name that matches exactly one stop
        stop: String,
    },

    /// Show realtime departures at a stop
    Departures {
        /// Stop number (e.g. 101000) or a name that matches exactly one stop
        stop: String,

        /// Only show this line (internal or public line number)
        #[arg(long)]
        line: Option<String>,

        /// Maximum number of departures to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Search stops by name
    SearchStops {
        query: String,
    },

    /// Show a line
    Line {
        /// Entity number (1-5)
        entity: u32,
        /// Line number
        line: u32,
    },

    /// Search lines by number or description
    SearchLines {
        query: String,
    },

    /// Show the colours of a line
    Colours {
        /// Entity number (1-5)
        entity: u32,
        /// Line number
        line: u32,
    },
}

fn setup_logging(verbose: bool, log_dir: Option<&PathBuf>) -> Result<()> {
    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // stdout carries the JSON output, so the console layer writes to stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_line_number(verbose)
        .with_ansi(true);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let log_filename = format!(
                "delijn_{}.log",
                chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
            );
            let file_appender = tracing_appender::rolling::never(dir, &log_filename);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_ansi(false)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        info!("Logging to {}", dir.display());
    }

    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let client = DeLijnClient::with_config(credentials, ClientConfig::from_env())?;

    match cli.command {
        Commands::Stop { stop } => commands::stops::show(&client, &stop, &cancel).await,
        Commands::Departures { stop, line, limit } => {
            commands::departures::run(&client, &stop, line.as_deref(), limit, &cancel).await
        }
        Commands::SearchStops { query } => commands::stops::search(&client, &query, &cancel).await,
        Commands::Line { entity, line } => {
            commands::lines::show(&client, entity, line, &cancel).await
        }
        Commands::SearchLines { query } => commands::lines::search(&client, &query, &cancel).await,
        Commands::Colours { entity, line } => {
            commands::lines::colours(&client, entity, line, &cancel).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose, cli.log_dir.as_ref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(EXIT_ERROR as u8);
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            ctrl_c_token.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match (e.downcast_ref::<ApiError>(), e.downcast_ref::<ResolveError>()) {
            (Some(api_err), _) => {
                eprintln!("Error: {}", api_err.hint());
                ExitCode::from(api_err.exit_code() as u8)
            }
            (None, Some(resolve_err)) => {
                eprintln!("Error: {}", resolve_err.hint());
                ExitCode::from(resolve_err.exit_code() as u8)
            }
            (None, None) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(EXIT_ERROR as u8)
            }
        },
    }
}
