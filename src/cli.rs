//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use receipt_insights::config::DB_ENV;
use receipt_insights::Granularity;

/// Receipt Insights - duplicates and spending trends for scanned receipts
#[derive(Parser)]
#[command(name = "receipt-insights")]
#[command(about = "Find double-scanned receipts and compare spending across periods", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the platform data directory)
    #[arg(long, env = DB_ENV, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import transactions from a CSV or JSON file
    Import {
        /// File to import (.json = array of transactions, anything else = CSV)
        #[arg(short, long)]
        file: PathBuf,

        /// Skip applying learned merchant mappings
        #[arg(long)]
        no_mappings: bool,
    },

    /// List stored transactions, flagging possible duplicates
    List {
        /// Maximum rows to print
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show groups of likely double-scanned receipts
    Duplicates,

    /// Delete a stored transaction (e.g. the extra copy of a duplicate)
    Remove {
        /// Transaction id
        id: String,
    },

    /// Compare spending per category against the previous period
    Trends {
        /// week, month, quarter or year
        #[arg(short, long, default_value = "month")]
        granularity: Granularity,

        /// Year of the current period (defaults to today's period)
        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        month: Option<u32>,

        #[arg(long)]
        quarter: Option<u32>,

        /// Week of month (1-5)
        #[arg(long)]
        week: Option<u32>,

        /// Break down by item category instead of store category
        #[arg(long)]
        items: bool,
    },

    /// Look up the learned mapping for a merchant name
    Match {
        #[arg(short, long)]
        merchant: String,
    },

    /// Teach a merchant mapping (display name and optional category)
    Learn {
        /// Merchant name as scanned
        #[arg(short, long)]
        merchant: String,

        /// Display name to use instead
        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        category: Option<String>,
    },

    /// Open the terminal UI (requires the `tui` feature)
    Ui,
}
