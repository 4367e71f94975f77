// src/cli/mod.rs
// Command-line surface: source registry, discovery, sync and backfill jobs, cache inspection

pub mod inspect;
pub mod jobs;
pub mod sources;

use crate::settings::{self, AppSettings};
use crate::sheets::database::{DbConfig, DbError};
use crate::sheets::errors::SyncError;
use crate::sheets::source::SourceError;
use crate::sheets::RowStatus;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "SheetSync - keeps a local row cache in step with Google Sheets", long_about = None)]
pub struct Cli {
    /// Cache database file (overrides settings and SHEETSYNC_DATABASE)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Settings file (defaults to app_settings.json in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage registered spreadsheets
    Sources {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// List the tabs of a spreadsheet and register them
    Discover {
        /// Source id
        source: i64,
    },

    /// Reconcile cached rows with the spreadsheets
    Sync {
        /// Only this source (runs even when inactive)
        #[arg(long)]
        source: Option<i64>,
        /// Process sources one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Write identifiers into rows that lack one
    Backfill {
        /// Only this source (runs even when inactive)
        #[arg(long)]
        source: Option<i64>,
    },

    /// Append a row to the end of a sheet
    Append {
        /// Source id
        source: i64,
        /// Sheet name
        sheet: String,
        /// Cell values, left to right
        #[arg(required = true)]
        values: Vec<String>,
        /// Put a freshly generated identifier in column A before the values
        #[arg(long)]
        identifier: bool,
    },

    /// Show cached rows of one sheet
    Rows {
        /// Source id
        source: i64,
        /// Sheet name
        sheet: String,
        /// Only rows with this status (active, deleted, error)
        #[arg(long)]
        status: Option<RowStatus>,
    },

    /// Generate or inspect row identifiers
    Identifier {
        #[command(subcommand)]
        action: IdentifierAction,
    },

    /// Show or write the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Store the Google OAuth refresh token in the OS keyring
    Auth {
        /// Refresh token issued for the configured OAuth client
        refresh_token: String,
    },
}

#[derive(Subcommand)]
pub enum SourceAction {
    /// Register a spreadsheet
    Add {
        /// Display name
        name: String,
        /// Spreadsheet id as it appears in the sheet URL
        external_id: String,
    },
    /// List registered spreadsheets
    List,
    /// Include a source in periodic runs
    Activate { id: i64 },
    /// Exclude a source from periodic runs
    Deactivate { id: i64 },
    /// Remove a source together with its sheets and cached rows
    Remove { id: i64 },
}

#[derive(Subcommand)]
pub enum IdentifierAction {
    /// Print fresh identifiers
    New {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Validate an identifier and show its embedded timestamp
    Inspect { text: String },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the effective settings (file, .env and environment combined)
    Show,
    /// Write the effective settings to the settings file
    Init,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("Settings error: {0}")]
    Settings(#[from] std::io::Error),
    #[error("Could not encode report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

pub type CliResult<T = ()> = Result<T, CliError>;

/// Everything a command needs from the environment.
pub struct Context {
    pub settings: AppSettings,
    pub config_path: PathBuf,
    pub db: DbConfig,
    pub json: bool,
}

impl Context {
    pub fn load(cli: &Cli) -> CliResult<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => settings::io::get_config_path()?,
        };
        let settings = settings::io::load_settings(Some(config_path.as_path()))?;
        let db = match cli.database.as_ref().or(settings.database_path.as_ref()) {
            Some(path) => DbConfig::with_path(path),
            None => DbConfig::new(),
        };
        Ok(Self {
            settings,
            config_path,
            db,
            json: cli.json,
        })
    }
}

pub fn run(cli: Cli) -> CliResult {
    // Identifier tools need neither settings nor a database
    if let Commands::Identifier { action } = &cli.command {
        return inspect::identifier(action);
    }

    let ctx = Context::load(&cli)?;
    match cli.command {
        Commands::Sources { action } => sources::run(&ctx, action),
        Commands::Discover { source } => jobs::discover(&ctx, source),
        Commands::Sync { source, sequential } => jobs::sync(&ctx, source, sequential),
        Commands::Backfill { source } => jobs::backfill(&ctx, source),
        Commands::Rows {
            source,
            sheet,
            status,
        } => inspect::rows(&ctx, source, &sheet, status),
        Commands::Append {
            source,
            sheet,
            values,
            identifier,
        } => jobs::append(&ctx, source, &sheet, &values, identifier),
        Commands::Settings { action } => inspect::settings(&ctx, action),
        Commands::Auth { refresh_token } => jobs::store_refresh_token(&ctx, &refresh_token),
        Commands::Identifier { .. } => Ok(()),
    }
}
