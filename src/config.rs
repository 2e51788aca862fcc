// Runtime configuration shared by the CLI and the API server

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the database location
pub const DB_ENV: &str = "RECEIPTS_DB";

/// Environment variable overriding the server bind address
pub const ADDR_ENV: &str = "RECEIPTS_ADDR";

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub server_addr: String,
}

impl Config {
    /// `<data dir>/receipt-insights/receipts.db`, or `./receipts.db` when the
    /// platform has no data dir
    pub fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("receipt-insights").join("receipts.db"))
            .unwrap_or_else(|| PathBuf::from("receipts.db"))
    }

    /// Environment first, defaults second
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var(DB_ENV).ok().map(PathBuf::from),
            std::env::var(ADDR_ENV).ok(),
        )
    }

    fn resolve(db_path: Option<PathBuf>, server_addr: Option<String>) -> Self {
        Config {
            db_path: db_path
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(Self::default_db_path),
            server_addr: server_addr
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        }
    }

    pub fn with_db_path(mut self, db_path: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.db_path = path;
        }
        self
    }

    /// Create the database's parent directory if needed
    pub fn ensure_db_dir(&self) -> Result<()> {
        ensure_parent_dir(&self.db_path)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))
        }
        _ => Ok(()),
    }
}

/// Install the global tracing subscriber
///
/// Priority: RUST_LOG env var > verbose flag > default (info)
pub fn init_logging(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // try_init: tests and embedders may have installed one already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init();
}
