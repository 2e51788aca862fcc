// 📈 Period Comparison - Current vs previous period, per category
//
// Records are read through caller-supplied accessors, so the same
// aggregation runs over whole transactions, flattened line items, or any
// other shape a caller wants to chart.

use crate::db::Transaction;
use crate::period::{get_previous_period, is_date_in_period, Granularity, PeriodError, PeriodIdentifier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Relative changes below this percentage count as "same"
pub const SAME_CHANGE_THRESHOLD: f64 = 0.5;

// ============================================================================
// CHANGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    /// Nothing in the previous period, something now
    New,
    Same,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub direction: ChangeDirection,

    /// Signed, rounded percentage; 0 for `New` and `Same`
    pub percent: i64,
}

impl Change {
    fn flat(direction: ChangeDirection) -> Self {
        Change { direction, percent: 0 }
    }
}

/// Round half towards positive infinity, matching how the charts round
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Classify the move from `previous` to `current`
///
/// Never fails: zero, negative and non-finite inputs all land in one of the
/// four directions.
pub fn calculate_change(current: f64, previous: f64) -> Change {
    if !current.is_finite() || !previous.is_finite() {
        return Change::flat(ChangeDirection::Same);
    }

    if previous == 0.0 {
        return if current > 0.0 {
            Change::flat(ChangeDirection::New)
        } else {
            Change::flat(ChangeDirection::Same)
        };
    }

    // Divide by |previous| so the sign always follows current - previous
    let relative = (current - previous) * 100.0 / previous.abs();

    if relative.abs() < SAME_CHANGE_THRESHOLD {
        return Change::flat(ChangeDirection::Same);
    }

    Change {
        direction: if relative > 0.0 { ChangeDirection::Up } else { ChangeDirection::Down },
        percent: round_half_up(relative),
    }
}

// ============================================================================
// ACCESSORS
// ============================================================================

/// How to read a record's date, category and value
pub struct Accessors<'a, T> {
    /// `None` excludes the record (unparseable or missing date)
    pub date: &'a dyn Fn(&T) -> Option<NaiveDate>,
    pub category: &'a dyn Fn(&T) -> String,
    pub value: &'a dyn Fn(&T) -> f64,
}

fn transaction_date(tx: &Transaction) -> Option<NaiveDate> {
    tx.parsed_date()
}

fn transaction_category(tx: &Transaction) -> String {
    tx.category.clone()
}

fn transaction_total(tx: &Transaction) -> f64 {
    tx.total as f64
}

/// Transactions bucketed by store category, valued by receipt total
pub fn transaction_accessors() -> Accessors<'static, Transaction> {
    Accessors {
        date: &transaction_date,
        category: &transaction_category,
        value: &transaction_total,
    }
}

/// A receipt line flattened out of its transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub date: String,
    pub name: String,

    /// Item category, falling back to the transaction's category
    pub category: String,

    pub amount: f64,
}

pub fn flatten_items(transactions: &[Transaction]) -> Vec<ItemRecord> {
    transactions
        .iter()
        .flat_map(|tx| {
            tx.items.iter().map(move |item| ItemRecord {
                date: tx.date.clone(),
                name: item.name.clone(),
                category: item
                    .category
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| tx.category.clone()),
                amount: item.line_total(),
            })
        })
        .collect()
}

fn item_date(item: &ItemRecord) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(item.date.trim(), "%Y-%m-%d").ok()
}

fn item_category(item: &ItemRecord) -> String {
    item.category.clone()
}

fn item_amount(item: &ItemRecord) -> f64 {
    item.amount
}

/// Line items bucketed by item category, valued by line total
pub fn item_accessors() -> Accessors<'static, ItemRecord> {
    Accessors {
        date: &item_date,
        category: &item_category,
        value: &item_amount,
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

pub struct PeriodComparisonInput<'a, T> {
    pub transactions: &'a [T],
    pub current_period: &'a PeriodIdentifier,
    pub time_period: Granularity,
    pub accessors: Accessors<'a, T>,
}

/// One category's value now vs. in the previous period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub category: String,

    /// Sum in the current period
    pub value: f64,

    /// Sum in the previous period (0 when absent)
    pub previous_value: f64,

    pub change_direction: ChangeDirection,
    pub change_percent: i64,

    /// Records contributing to `value`
    pub count: usize,
}

impl ComparisonRow {
    pub fn change(&self) -> Change {
        Change {
            direction: self.change_direction,
            percent: self.change_percent,
        }
    }
}

#[derive(Default)]
struct Bucket {
    value: f64,
    count: usize,
}

/// Per-category comparison of the current period against the one before
///
/// Only categories present in the current period produce rows; a category
/// seen only in the previous period is dropped. Rows are sorted by current
/// value, largest first, ties by category name.
pub fn calculate_period_comparison<T>(
    input: PeriodComparisonInput<'_, T>,
) -> Result<Vec<ComparisonRow>, PeriodError> {
    let PeriodComparisonInput { transactions, current_period, time_period, accessors } = input;
    let previous_period = get_previous_period(current_period, time_period)?;

    let mut current: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut previous: HashMap<String, Bucket> = HashMap::new();

    for record in transactions {
        let Some(date) = (accessors.date)(record) else {
            continue;
        };

        let bucket = if is_date_in_period(date, current_period, time_period) {
            current.entry((accessors.category)(record)).or_default()
        } else if is_date_in_period(date, &previous_period, time_period) {
            previous.entry((accessors.category)(record)).or_default()
        } else {
            continue;
        };

        bucket.value += (accessors.value)(record);
        bucket.count += 1;
    }

    let mut rows: Vec<ComparisonRow> = current
        .into_iter()
        .map(|(category, bucket)| {
            let previous_value = previous.get(&category).map_or(0.0, |b| b.value);
            let change = calculate_change(bucket.value, previous_value);
            ComparisonRow {
                category,
                value: bucket.value,
                previous_value,
                change_direction: change.direction,
                change_percent: change.percent,
                count: bucket.count,
            }
        })
        .collect();

    // Stable sort keeps the alphabetical order from the BTreeMap for ties
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));

    debug!(
        period = ?current_period,
        granularity = %time_period,
        rows = rows.len(),
        "period comparison complete"
    );

    Ok(rows)
}

/// Category comparison over whole transactions
pub fn compare_transactions(
    transactions: &[Transaction],
    current_period: &PeriodIdentifier,
    time_period: Granularity,
) -> Result<Vec<ComparisonRow>, PeriodError> {
    calculate_period_comparison(PeriodComparisonInput {
        transactions,
        current_period,
        time_period,
        accessors: transaction_accessors(),
    })
}

/// Item-category comparison over flattened receipt lines
pub fn compare_items(
    transactions: &[Transaction],
    current_period: &PeriodIdentifier,
    time_period: Granularity,
) -> Result<Vec<ComparisonRow>, PeriodError> {
    let items = flatten_items(transactions);
    calculate_period_comparison(PeriodComparisonInput {
        transactions: &items,
        current_period,
        time_period,
        accessors: item_accessors(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LineItem;

    fn tx(date: &str, category: &str, total: i64) -> Transaction {
        Transaction {
            id: Some(format!("{}-{}-{}", date, category, total)),
            date: date.to_string(),
            merchant: "Store".to_string(),
            category: category.to_string(),
            total,
            ..Default::default()
        }
    }

    #[test]
    fn test_change_thresholds() {
        assert_eq!(calculate_change(100.0, 0.0), Change { direction: ChangeDirection::New, percent: 0 });
        assert_eq!(calculate_change(100.4, 100.0), Change { direction: ChangeDirection::Same, percent: 0 });
        assert_eq!(calculate_change(120.0, 100.0), Change { direction: ChangeDirection::Up, percent: 20 });
        assert_eq!(calculate_change(85.0, 100.0), Change { direction: ChangeDirection::Down, percent: -15 });
        assert_eq!(calculate_change(0.0, 0.0), Change { direction: ChangeDirection::Same, percent: 0 });
    }

    #[test]
    fn test_change_threshold_boundary() {
        // exactly 0.5% is no longer "same"
        let change = calculate_change(100.5, 100.0);
        assert_eq!(change.direction, ChangeDirection::Up);
        assert_eq!(change.percent, 1);

        let change = calculate_change(99.7, 100.0);
        assert_eq!(change.direction, ChangeDirection::Same);
    }

    #[test]
    fn test_change_drop_to_zero() {
        assert_eq!(calculate_change(0.0, 50.0), Change { direction: ChangeDirection::Down, percent: -100 });
    }

    #[test]
    fn test_change_edge_inputs() {
        assert_eq!(calculate_change(f64::NAN, 10.0).direction, ChangeDirection::Same);
        assert_eq!(calculate_change(10.0, f64::INFINITY).direction, ChangeDirection::Same);
        assert_eq!(calculate_change(-5.0, 0.0).direction, ChangeDirection::Same);

        // negative baseline: moving from -100 to -50 is an increase
        assert_eq!(calculate_change(-50.0, -100.0), Change { direction: ChangeDirection::Up, percent: 50 });
    }

    #[test]
    fn test_comparison_rows_sorted_and_annotated() {
        let transactions = vec![
            tx("2026-03-02", "Supermarket", 30000),
            tx("2026-03-15", "Supermarket", 20000),
            tx("2026-03-20", "Restaurant", 12000),
            tx("2026-03-21", "Pharmacy", 5000),
            tx("2026-02-10", "Supermarket", 40000),
            tx("2026-02-11", "Restaurant", 12000),
            tx("2026-01-05", "Supermarket", 99999),
        ];

        let rows = compare_transactions(&transactions, &PeriodIdentifier::month(2026, 3), Granularity::Month).unwrap();

        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].category, "Supermarket");
        assert_eq!(rows[0].value, 50000.0);
        assert_eq!(rows[0].previous_value, 40000.0);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].change_direction, ChangeDirection::Up);
        assert_eq!(rows[0].change_percent, 25);

        assert_eq!(rows[1].category, "Restaurant");
        assert_eq!(rows[1].change_direction, ChangeDirection::Same);

        assert_eq!(rows[2].category, "Pharmacy");
        assert_eq!(rows[2].change_direction, ChangeDirection::New);
    }

    #[test]
    fn test_previous_only_category_is_dropped() {
        let transactions = vec![
            tx("2026-03-02", "Supermarket", 100),
            tx("2026-02-02", "Transport", 500),
        ];

        let rows = compare_transactions(&transactions, &PeriodIdentifier::month(2026, 3), Granularity::Month).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.category != "Transport"));
    }

    #[test]
    fn test_ties_ordered_by_category() {
        let transactions = vec![
            tx("2026-03-02", "Zoo", 100),
            tx("2026-03-02", "Apparel", 100),
        ];

        let rows = compare_transactions(&transactions, &PeriodIdentifier::year(2026), Granularity::Year).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();

        assert_eq!(names, vec!["Apparel", "Zoo"]);
    }

    #[test]
    fn test_week_comparison_crosses_month() {
        let transactions = vec![
            tx("2026-03-03", "Supermarket", 300),
            tx("2026-02-25", "Supermarket", 200),
            tx("2026-02-20", "Supermarket", 999),
        ];

        let rows = compare_transactions(&transactions, &PeriodIdentifier::week(2026, 3, 1), Granularity::Week).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 300.0);
        assert_eq!(rows[0].previous_value, 200.0);
        assert_eq!(rows[0].change_percent, 50);
    }

    #[test]
    fn test_unparseable_dates_are_skipped() {
        let transactions = vec![tx("13/03/2026", "Supermarket", 100), tx("2026-03-13", "Supermarket", 50)];

        let rows = compare_transactions(&transactions, &PeriodIdentifier::month(2026, 3), Granularity::Month).unwrap();

        assert_eq!(rows[0].value, 50.0);
        assert_eq!(rows[0].count, 1);
    }

    #[test]
    fn test_invalid_period_is_error() {
        let result = compare_transactions(&[], &PeriodIdentifier::year(2026), Granularity::Quarter);
        assert_eq!(result, Err(PeriodError::QuarterRequired));
    }

    #[test]
    fn test_custom_accessors() {
        struct Expense {
            day: NaiveDate,
            tag: &'static str,
            cents: i32,
        }

        let date = |e: &Expense| Some(e.day);
        let category = |e: &Expense| e.tag.to_string();
        let value = |e: &Expense| e.cents as f64 / 100.0;

        let expenses = vec![
            Expense { day: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), tag: "coffee", cents: 350 },
            Expense { day: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), tag: "coffee", cents: 700 },
        ];

        let rows = calculate_period_comparison(PeriodComparisonInput {
            transactions: &expenses,
            current_period: &PeriodIdentifier::quarter(2026, 2),
            time_period: Granularity::Quarter,
            accessors: Accessors { date: &date, category: &category, value: &value },
        })
        .unwrap();

        assert_eq!(rows[0].value, 3.5);
        assert_eq!(rows[0].change_direction, ChangeDirection::Down);
        assert_eq!(rows[0].change_percent, -50);
    }

    #[test]
    fn test_item_comparison_uses_item_categories() {
        let mut receipt = tx("2026-03-02", "Supermarket", 3000);
        receipt.items = vec![
            LineItem { name: "Milk".to_string(), price: 1000, category: Some("Dairy".to_string()), qty: Some(2.0) },
            LineItem { name: "Bag".to_string(), price: 1000, category: None, qty: None },
        ];

        let rows = compare_items(&[receipt], &PeriodIdentifier::month(2026, 3), Granularity::Month).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "Dairy");
        assert_eq!(rows[0].value, 2000.0);
        assert_eq!(rows[1].category, "Supermarket");
    }
}
