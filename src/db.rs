use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::merchant::MerchantMapping;

/// A single line on a scanned receipt
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LineItem {
    pub name: String,

    /// Price in integer currency units
    pub price: i64,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
}

impl LineItem {
    /// Price times quantity (quantity defaults to 1)
    pub fn line_total(&self) -> f64 {
        self.price as f64 * self.qty.unwrap_or(1.0)
    }
}

/// Receipt transaction
///
/// `date` is always a calendar date (YYYY-MM-DD); the time of day lives in
/// the separate optional `time` field (HH:MM).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Transaction {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    /// Document id. Legacy records may not carry one.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    // ========================================================================
    // RECEIPT FIELDS
    // ========================================================================
    pub date: String,

    pub merchant: String,

    /// User-editable display name for the merchant
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default)]
    pub category: String,

    /// Total in integer currency units
    pub total: i64,

    #[serde(default)]
    pub items: Vec<LineItem>,

    // ========================================================================
    // OPTIONAL CONTEXT
    // ========================================================================
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl Transaction {
    /// Alias when set, merchant otherwise
    pub fn display_name(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.merchant)
    }

    /// Parse `date` as YYYY-MM-DD
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()
    }

    /// Sum of line totals (may differ from `total` after discounts/tips)
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Compute idempotency hash for import
    ///
    /// Records with an id hash on the id alone, so re-importing an edited
    /// export never creates a second copy. Id-less records hash their content
    /// plus `occurrence`, the number of identical records before this one in
    /// the same import. Re-importing a file yields the same hashes, while two
    /// identical scans inside one file are both stored and left for duplicate
    /// detection to flag.
    pub fn compute_idempotency_hash(&self, occurrence: usize) -> String {
        let mut hasher = Sha256::new();
        match &self.id {
            Some(id) if !id.is_empty() => hasher.update(format!("id:{}", id)),
            _ => hasher.update(format!("{}#{}", self.content_key(), occurrence)),
        }
        format!("{:x}", hasher.finalize())
    }

    fn content_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.date,
            self.merchant,
            self.total,
            self.time.as_deref().unwrap_or(""),
            self.city.as_deref().unwrap_or(""),
            self.country.as_deref().unwrap_or(""),
            self.items.len()
        )
    }
}

/// Cut to `max_chars` characters for table columns, ending in "..."
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// FILE LOADERS
// ============================================================================

/// Flat CSV shape: items travel as a JSON array in a single column
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    date: String,
    merchant: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    category: Option<String>,
    total: i64,
    #[serde(default)]
    items: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CsvRow {
    fn into_transaction(self) -> Result<Transaction> {
        let items = match non_empty(self.items) {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Invalid items JSON for {} on {}", self.merchant, self.date))?,
            None => Vec::new(),
        };

        Ok(Transaction {
            id: non_empty(self.id),
            date: self.date,
            merchant: self.merchant,
            alias: non_empty(self.alias),
            category: self.category.unwrap_or_default(),
            total: self.total,
            items,
            city: non_empty(self.city),
            country: non_empty(self.country),
            time: non_empty(self.time),
            currency: non_empty(self.currency),
        })
    }
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<Transaction>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut transactions = Vec::new();

    for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to deserialize CSV row {}", line + 2))?;
        transactions.push(row.into_transaction()?);
    }

    debug!(path = %csv_path.display(), count = transactions.len(), "loaded CSV");
    Ok(transactions)
}

pub fn load_json(json_path: &Path) -> Result<Vec<Transaction>> {
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read JSON file {}", json_path.display()))?;
    let transactions: Vec<Transaction> =
        serde_json::from_str(&raw).context("Failed to deserialize transactions JSON")?;

    debug!(path = %json_path.display(), count = transactions.len(), "loaded JSON");
    Ok(transactions)
}

/// Load by extension: `.json` as an array, anything else as CSV
pub fn load_file(path: &Path) -> Result<Vec<Transaction>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_json(path),
        _ => load_csv(path),
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_id TEXT UNIQUE NOT NULL,
            idempotency_hash TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            time TEXT,
            merchant TEXT NOT NULL,
            alias TEXT,
            category TEXT NOT NULL,
            total INTEGER NOT NULL,
            currency TEXT,
            city TEXT,
            country TEXT,
            items TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merchant_mappings (
            id TEXT PRIMARY KEY,
            original_merchant TEXT NOT NULL,
            normalized_merchant TEXT UNIQUE NOT NULL,
            target_merchant TEXT NOT NULL,
            target_category TEXT,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_date ON transactions(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_merchant ON transactions(merchant)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "tx_id, date, time, merchant, alias, category, total, currency, city, country, items";

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let items_json: String = row.get(10)?;
    let items = serde_json::from_str(&items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        date: row.get(1)?,
        time: row.get(2)?,
        merchant: row.get(3)?,
        alias: row.get(4)?,
        category: row.get(5)?,
        total: row.get(6)?,
        currency: row.get(7)?,
        city: row.get(8)?,
        country: row.get(9)?,
        items,
    })
}

/// Insert transactions, skipping ones already stored
///
/// Id-less records get a fresh UUID; the hash is taken before that so a
/// re-import of the same file stays idempotent. Identical id-less records
/// within one batch are all stored.
pub fn insert_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<usize> {
    let mut inserted = 0;
    let mut skipped = 0;

    let mut seen: HashMap<String, usize> = HashMap::new();

    for tx in transactions {
        let occurrence = match tx.id.as_deref() {
            Some(id) if !id.is_empty() => 0,
            _ => {
                let count = seen.entry(tx.content_key()).or_insert(0);
                *count += 1;
                *count - 1
            }
        };
        let hash = tx.compute_idempotency_hash(occurrence);
        let id = tx
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let items_json = serde_json::to_string(&tx.items)?;

        let result = conn.execute(
            "INSERT INTO transactions (
                tx_id, idempotency_hash, date, time, merchant, alias, category,
                total, currency, city, country, items
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                hash,
                tx.date,
                tx.time,
                tx.merchant,
                tx.alias,
                tx.category,
                tx.total,
                tx.currency,
                tx.city,
                tx.country,
                items_json,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, skipped, "stored transactions");
    Ok(inserted)
}

pub fn get_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions ORDER BY date DESC, time DESC, row_id DESC",
        TRANSACTION_COLUMNS
    ))?;

    let transactions = stmt
        .query_map([], row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE tx_id = ?1", TRANSACTION_COLUMNS),
            [id],
            row_to_transaction,
        )
        .optional()?;

    Ok(tx)
}

/// Persist a user edit. Returns false when the id is unknown.
pub fn update_transaction(conn: &Connection, tx: &Transaction) -> Result<bool> {
    let id = tx
        .id
        .as_deref()
        .context("Cannot update a transaction without an id")?;
    let items_json = serde_json::to_string(&tx.items)?;

    let updated = conn.execute(
        "UPDATE transactions
         SET date = ?2, time = ?3, merchant = ?4, alias = ?5, category = ?6,
             total = ?7, currency = ?8, city = ?9, country = ?10, items = ?11,
             updated_at = CURRENT_TIMESTAMP
         WHERE tx_id = ?1",
        params![
            id,
            tx.date,
            tx.time,
            tx.merchant,
            tx.alias,
            tx.category,
            tx.total,
            tx.currency,
            tx.city,
            tx.country,
            items_json,
        ],
    )?;

    debug!(id, updated, "updated transaction");
    Ok(updated > 0)
}

pub fn delete_transaction(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM transactions WHERE tx_id = ?1", [id])?;
    debug!(id, deleted, "deleted transaction");
    Ok(deleted > 0)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// MERCHANT MAPPINGS
// ============================================================================

/// Insert or replace the mapping for a normalized merchant name
pub fn save_merchant_mapping(conn: &Connection, mapping: &MerchantMapping) -> Result<()> {
    conn.execute(
        "INSERT INTO merchant_mappings (
            id, original_merchant, normalized_merchant, target_merchant,
            target_category, usage_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(normalized_merchant) DO UPDATE SET
            original_merchant = excluded.original_merchant,
            target_merchant = excluded.target_merchant,
            target_category = excluded.target_category,
            updated_at = CURRENT_TIMESTAMP",
        params![
            mapping.id,
            mapping.original_merchant,
            mapping.normalized_merchant,
            mapping.target_merchant,
            mapping.target_category,
            mapping.usage_count,
        ],
    )?;

    debug!(merchant = %mapping.normalized_merchant, "saved merchant mapping");
    Ok(())
}

pub fn get_merchant_mappings(conn: &Connection) -> Result<Vec<MerchantMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, original_merchant, normalized_merchant, target_merchant,
                target_category, usage_count
         FROM merchant_mappings
         ORDER BY usage_count DESC, normalized_merchant",
    )?;

    let mappings = stmt
        .query_map([], |row| {
            Ok(MerchantMapping {
                id: row.get(0)?,
                original_merchant: row.get(1)?,
                normalized_merchant: row.get(2)?,
                target_merchant: row.get(3)?,
                target_category: row.get(4)?,
                usage_count: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(mappings)
}

pub fn record_mapping_usage(conn: &Connection, mapping_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE merchant_mappings
         SET usage_count = usage_count + 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1",
        [mapping_id],
    )?;
    Ok(())
}
