//! Configuration file support for packmule.
//!
//! Configuration is loaded with the following precedence (highest to
//! lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PACKMULE_`, e.g., `PACKMULE_DATABASE_URL`)
//! 3. Config file (~/.config/packmule/config.toml or ./packmule.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/packmule/packmule.db"  # optional, this is the default
//!
//! [registry]
//! url = "https://registry.npmjs.org"
//! feed_url = "https://replicate.npmjs.com/registry"
//! rps = 20
//!
//! [index]
//! url = "http://localhost:8108"
//! api_key = "xyz"
//! collection = "packages"
//!
//! [feed]
//! initial_backoff_ms = 1000
//! max_backoff_ms = 30000
//! max_retries = 8
//! poll_interval_secs = 5
//!
//! [sync]
//! batch_size = 500
//! tick_interval_secs = 5
//! worker_concurrency = 8
//!
//! [resolve]
//! max_packages = 500
//! timeout_secs = 15
//! concurrency = 20
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use packmule::registry::{DEFAULT_FEED_URL, DEFAULT_REGISTRY_URL, FeedBackoff};
use packmule::resolve::ResolveLimits;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Registry endpoints and pacing.
    pub registry: RegistryConfig,
    /// Search index connection.
    pub index: IndexConfig,
    /// Change-feed reconnect behavior.
    pub feed: FeedConfig,
    /// Backfill and worker settings.
    pub sync: SyncConfig,
    /// Install-size resolver bounds.
    pub resolve: ResolveConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL. Supports sqlite:// and postgres:// schemes.
    /// Defaults to `sqlite://~/.local/state/packmule/packmule.db` if not
    /// specified.
    pub url: Option<String>,
}

/// Registry configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Packument/listing endpoint.
    pub url: String,
    /// Change-feed endpoint (the replication host on the public registry).
    pub feed_url: String,
    /// Proactive request pacing in requests/second.
    pub rps: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            rps: packmule::limit::REGISTRY_DEFAULT_RPS,
        }
    }
}

/// Search index configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Typesense base URL. When unset, an in-memory index is used and a
    /// warning is logged — useful for dry runs only.
    pub url: Option<String>,
    /// API key. Can also be set via PACKMULE_INDEX_API_KEY.
    pub api_key: Option<String>,
    /// Collection name.
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection: "packages".to_string(),
        }
    }
}

/// Change-feed reconnect configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retries: u32,
    pub poll_interval_secs: u64,
    /// Events requested per poll.
    pub page_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            max_retries: 8,
            poll_interval_secs: 5,
            page_limit: 200,
        }
    }
}

impl FeedConfig {
    pub fn backoff(&self) -> FeedBackoff {
        FeedBackoff {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Backfill and worker configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Names enqueued per drain tick.
    pub batch_size: u64,
    /// Delay between ticks.
    pub tick_interval_secs: u64,
    /// Concurrent queue workers.
    pub worker_concurrency: usize,
    /// Listing page size.
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            tick_interval_secs: 5,
            worker_concurrency: 8,
            page_size: 10_000,
        }
    }
}

/// Resolver bounds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub max_packages: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        let defaults = ResolveLimits::default();
        Self {
            max_packages: defaults.max_packages,
            timeout_secs: defaults.timeout.as_secs(),
            concurrency: defaults.fetch_concurrency,
        }
    }
}

impl ResolveConfig {
    pub fn limits(&self) -> ResolveLimits {
        ResolveLimits {
            max_packages: self.max_packages,
            timeout: Duration::from_secs(self.timeout_secs),
            fetch_concurrency: self.concurrency,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/packmule/config.toml)
    /// 3. Local config file (./packmule.toml)
    /// 4. Environment variables with PACKMULE_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "packmule") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("packmule.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./packmule.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("PACKMULE")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory
    /// path (`~/.local/state/packmule/packmule.db` on Linux).
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("packmule.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/packmule` or
    /// `~/.local/state/packmule`. On macOS/Windows, falls back to the data
    /// directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "packmule").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
