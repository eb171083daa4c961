//! Packmule CLI - operator interface for the registry sync pipeline.

mod commands;
mod config;
mod progress;
mod shutdown;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packmule")]
#[command(version)]
#[command(about = "npm registry sync pipeline")]
#[command(
    long_about = "Packmule keeps a search index and derived package metadata synchronized \
with the npm registry. It follows the change feed for incremental updates, runs a \
resumable full-registry backfill for cold starts, computes install sizes on demand, \
and notifies users when packages they follow are updated."
)]
#[command(after_long_help = r#"EXAMPLES
    Run migrations, then a full cold-start backfill:
        $ packmule migrate up
        $ packmule backfill start

    Check backfill progress (from any process):
        $ packmule backfill status

    Follow the change feed from a saved cursor:
        $ packmule watch --since 38811620

    Compute the install size of a package:
        $ packmule resolve express
        $ packmule resolve left-pad --version 1.3.0 --json

    Generate shell completions:
        $ packmule completions bash > ~/.local/share/bash-completion/completions/packmule

CONFIGURATION
    Packmule reads configuration from:
      1. ~/.config/packmule/config.toml (or $XDG_CONFIG_HOME/packmule/config.toml)
      2. ./packmule.toml
      3. Environment variables (PACKMULE_* prefix)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    PACKMULE_DATABASE_URL     Database connection string (default: ~/.local/state/packmule/packmule.db)
    PACKMULE_REGISTRY_URL     Registry endpoint (default: https://registry.npmjs.org)
    PACKMULE_INDEX_URL        Typesense endpoint
    PACKMULE_INDEX_API_KEY    Typesense API key
"#)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Full-registry backfill operations
    Backfill {
        #[command(subcommand)]
        action: BackfillAction,
    },
    /// Follow the registry change feed and sync updated packages
    Watch {
        /// Change-feed sequence to resume from
        #[arg(short = 's', long, default_value_t = 0)]
        since: u64,

        /// Poll once, process what arrived, and exit
        #[arg(long)]
        once: bool,
    },
    /// Sync specific packages into the search index now
    Sync {
        /// Package name(s) - can specify multiple
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Compute the install size of a package's dependency tree
    Resolve {
        /// Package name
        package: String,

        /// Version or range (defaults to the latest tag)
        #[arg(short = 'V', long)]
        version: Option<String>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
pub enum BackfillAction {
    /// Start a cold-start backfill and run it to completion
    Start,
    /// Pause a running backfill (progress is preserved)
    Pause,
    /// Resume a paused backfill from the stored offset
    Resume,
    /// Reset to idle, clearing progress and pending ticks
    Reset,
    /// Show the persisted backfill state
    Status,
    /// Run a single tick (debugging)
    Tick,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging when not attached to a terminal.
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("packmule=info,packmule_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    // Commands that don't touch the database.
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Resolve {
            package,
            version,
            json,
        } => {
            commands::resolve::handle_resolve(package.clone(), version.clone(), *json, &config)
                .await?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Failed to determine database URL")?;

    // Ensure the database directory exists for SQLite.
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Backfill { action } => {
            commands::backfill::handle_backfill(action, &config, &database_url).await?;
        }
        Commands::Watch { since, once } => {
            commands::watch::handle_watch(since, once, &config, &database_url).await?;
        }
        Commands::Sync { packages } => {
            commands::sync::handle_sync(packages, &config, &database_url).await?;
        }
        Commands::Resolve { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
