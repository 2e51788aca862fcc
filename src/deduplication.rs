// 🔍 Duplicate Detection - Flag accidental double scans
// Candidates share a normalized business key; within a key, pairs whose
// times of day are within TIME_PROXIMITY_MINUTES are duplicates.

use crate::db::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Maximum gap between two scans of the same receipt
pub const TIME_PROXIMITY_MINUTES: u32 = 60;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Map from transaction id to the ids it duplicates
///
/// Symmetric: if A lists B, B lists A. Transactions with no duplicate are
/// absent rather than mapped to an empty list.
pub type DuplicateMap = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheckResult {
    /// Id of the checked transaction (empty when it has none)
    pub transaction_id: String,

    pub is_duplicate: bool,

    pub duplicate_ids: Vec<String>,
}

// ============================================================================
// KEYS & TIME
// ============================================================================

/// Normalized `date|merchant|total|city|country` key
///
/// `alias` is user-editable and `time` is compared separately with a
/// tolerance, so neither takes part in the key.
pub fn get_base_group_key(tx: &Transaction) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        tx.date.trim(),
        tx.merchant.trim(),
        tx.total,
        tx.city.as_deref().unwrap_or("").trim(),
        tx.country.as_deref().unwrap_or("").trim()
    )
    .to_lowercase()
}

/// Parse "HH:MM" (or "H:MM", optional ":SS") into minutes since midnight
pub fn parse_time_to_minutes(time: &str) -> Option<u32> {
    let mut parts = time.trim().split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;

    if hours > 23 || minutes > 59 {
        return None;
    }

    Some(hours * 60 + minutes)
}

/// Two times of day are proximate when at most 60 minutes apart
///
/// A missing time never excludes a match: legacy records have no time field.
pub fn are_times_within_proximity(t1: Option<u32>, t2: Option<u32>) -> bool {
    match (t1, t2) {
        (Some(a), Some(b)) => a.abs_diff(b) <= TIME_PROXIMITY_MINUTES,
        _ => true,
    }
}

fn transaction_minutes(tx: &Transaction) -> Option<u32> {
    tx.time.as_deref().and_then(parse_time_to_minutes)
}

fn transaction_id(tx: &Transaction) -> Option<&str> {
    tx.id.as_deref().filter(|id| !id.is_empty())
}

// ============================================================================
// DETECTION
// ============================================================================

/// Find all duplicate relationships in a list of transactions
///
/// Transactions without an id are skipped.
pub fn find_duplicates(transactions: &[Transaction]) -> DuplicateMap {
    // Group by base key, keeping input order inside each group
    let mut groups: HashMap<String, Vec<(&str, Option<u32>)>> = HashMap::new();
    for tx in transactions {
        let Some(id) = transaction_id(tx) else {
            continue;
        };
        groups
            .entry(get_base_group_key(tx))
            .or_default()
            .push((id, transaction_minutes(tx)));
    }

    let mut duplicates = DuplicateMap::new();

    for members in groups.values().filter(|m| m.len() >= 2) {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (id_a, time_a) = members[i];
                let (id_b, time_b) = members[j];

                if id_a == id_b || !are_times_within_proximity(time_a, time_b) {
                    continue;
                }

                link(&mut duplicates, id_a, id_b);
                link(&mut duplicates, id_b, id_a);
            }
        }
    }

    debug!(
        transactions = transactions.len(),
        flagged = duplicates.len(),
        "duplicate detection complete"
    );

    duplicates
}

fn link(map: &mut DuplicateMap, from: &str, to: &str) {
    let entry = map.entry(from.to_string()).or_default();
    if !entry.iter().any(|existing| existing == to) {
        entry.push(to.to_string());
    }
}

/// Check one transaction against the full list
pub fn check_for_duplicates(tx: &Transaction, all_transactions: &[Transaction]) -> DuplicateCheckResult {
    let Some(id) = transaction_id(tx) else {
        return DuplicateCheckResult {
            transaction_id: String::new(),
            is_duplicate: false,
            duplicate_ids: Vec::new(),
        };
    };

    let duplicate_ids = find_duplicates(all_transactions)
        .remove(id)
        .unwrap_or_default();

    DuplicateCheckResult {
        transaction_id: id.to_string(),
        is_duplicate: !duplicate_ids.is_empty(),
        duplicate_ids,
    }
}

/// Every id taking part in any duplicate relationship
pub fn get_duplicate_ids(transactions: &[Transaction]) -> HashSet<String> {
    find_duplicates(transactions).into_keys().collect()
}

/// Flagged transactions grouped by base key, in first-seen order
///
/// For review screens: each group is one receipt scanned more than once.
pub fn duplicate_groups(transactions: &[Transaction]) -> Vec<Vec<&Transaction>> {
    let flagged = get_duplicate_ids(transactions);
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Transaction>> = HashMap::new();

    for tx in transactions {
        let Some(id) = transaction_id(tx) else {
            continue;
        };
        if !flagged.contains(id) {
            continue;
        }

        let key = get_base_group_key(tx);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(tx);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
