// Receipt Insights - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod comparison;
pub mod config;
pub mod db;
pub mod deduplication;
pub mod labels;
pub mod merchant;
pub mod period;

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use db::{
    LineItem, Transaction, truncate,
    load_csv, load_json, load_file, setup_database, insert_transactions,
    get_all_transactions, get_transaction, update_transaction, delete_transaction,
    verify_count, save_merchant_mapping, get_merchant_mappings, record_mapping_usage,
};
pub use deduplication::{
    DuplicateCheckResult, DuplicateMap, TIME_PROXIMITY_MINUTES,
    are_times_within_proximity, check_for_duplicates, duplicate_groups, find_duplicates,
    get_base_group_key, get_duplicate_ids, parse_time_to_minutes,
};
pub use period::{
    Granularity, PeriodError, PeriodIdentifier,
    get_iso_week_number, get_next_period, get_previous_period, get_weeks_in_year,
    is_date_in_period,
};
pub use comparison::{
    Accessors, Change, ChangeDirection, ComparisonRow, ItemRecord, PeriodComparisonInput,
    SAME_CHANGE_THRESHOLD, calculate_change, calculate_period_comparison, compare_items,
    compare_transactions, flatten_items, item_accessors, transaction_accessors,
};
pub use merchant::{
    DEFAULT_THRESHOLD, MerchantMapping, MerchantMatch, MerchantMatcher, fuzzy_score,
    normalize_merchant_name,
};
pub use labels::{EnglishLabels, Translate, format_change, format_period_label};
pub use config::{Config, init_logging};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
