// 🏷️ Labels - Human-readable periods and changes
//
// Text comes from an injected lookup so the same formatting serves every
// locale. Any `Fn(&str) -> String` works as a lookup.

use crate::comparison::{Change, ChangeDirection};
use crate::period::{Granularity, PeriodIdentifier};

/// String lookup by key; unknown keys come back unchanged
pub trait Translate {
    fn t(&self, key: &str) -> String;
}

impl<F> Translate for F
where
    F: Fn(&str) -> String,
{
    fn t(&self, key: &str) -> String {
        self(key)
    }
}

/// Built-in English strings
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishLabels;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

impl Translate for EnglishLabels {
    fn t(&self, key: &str) -> String {
        if let Some(n) = key.strip_prefix("month.short.") {
            return month_index(n)
                .map(|i| MONTHS[i][..3].to_string())
                .unwrap_or_else(|| key.to_string());
        }
        if let Some(n) = key.strip_prefix("month.") {
            return month_index(n)
                .map(|i| MONTHS[i].to_string())
                .unwrap_or_else(|| key.to_string());
        }

        match key {
            "period.week" => "Week",
            "period.quarterPrefix" => "Q",
            "change.new" => "new",
            "change.same" => "no change",
            "duplicate.badge" => "possible duplicate",
            _ => key,
        }
        .to_string()
    }
}

fn month_index(n: &str) -> Option<usize> {
    let month: usize = n.parse().ok()?;
    (1..=12).contains(&month).then(|| month - 1)
}

/// "2026", "Q1 2026", "March 2026", "Week 2 · Mar 2026"
///
/// Falls back to the coarsest label the period can support.
pub fn format_period_label(period: &PeriodIdentifier, granularity: Granularity, t: &dyn Translate) -> String {
    let year = period.year;

    match (granularity, period.month, period.quarter, period.week) {
        (Granularity::Week, Some(month), _, Some(week)) => format!(
            "{} {} · {} {}",
            t.t("period.week"),
            week,
            t.t(&format!("month.short.{}", month)),
            year
        ),
        (Granularity::Week | Granularity::Month, Some(month), _, _) => {
            format!("{} {}", t.t(&format!("month.{}", month)), year)
        }
        (Granularity::Quarter, _, Some(quarter), _) => {
            format!("{}{} {}", t.t("period.quarterPrefix"), quarter, year)
        }
        _ => year.to_string(),
    }
}

/// "+20%", "-15%", "new", "no change"
pub fn format_change(change: &Change, t: &dyn Translate) -> String {
    match change.direction {
        ChangeDirection::New => t.t("change.new"),
        ChangeDirection::Same => t.t("change.same"),
        ChangeDirection::Up => format!("+{}%", change.percent),
        ChangeDirection::Down => format!("{}%", change.percent),
    }
}
