// 📅 Calendar Periods - Buckets for trend comparison
//
// Four granularities:
// 1. Year
// 2. Quarter (Q1-Q4)
// 3. Month
// 4. Week of month (1-5, restarts every month: days 1-7 → 1, ..., 29-31 → 5)

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// GRANULARITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// Next coarser granularity, wrapping from year back to week
    pub fn cycle(&self) -> Self {
        match self {
            Granularity::Week => Granularity::Month,
            Granularity::Month => Granularity::Quarter,
            Granularity::Quarter => Granularity::Year,
            Granularity::Year => Granularity::Week,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" | "weekly" | "w" => Ok(Granularity::Week),
            "month" | "monthly" | "m" => Ok(Granularity::Month),
            "quarter" | "quarterly" | "q" => Ok(Granularity::Quarter),
            "year" | "yearly" | "y" => Ok(Granularity::Year),
            _ => Err(format!(
                "Unknown granularity: {} (valid: week, month, quarter, year)",
                s
            )),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Caller passed a period that does not fit the requested granularity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Week and month numbers required")]
    WeekAndMonthRequired,

    #[error("Month number required")]
    MonthRequired,

    #[error("Quarter number required")]
    QuarterRequired,

    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("Quarter must be between 1 and 4, got {0}")]
    InvalidQuarter(u32),

    #[error("Week {week} out of range for {year}-{month:02} (1-{max})")]
    InvalidWeek { year: i32, month: u32, week: u32, max: u32 },

    #[error("Year {0} has no adjacent period")]
    YearOutOfRange(i32),
}

// ============================================================================
// PERIOD IDENTIFIER
// ============================================================================

/// Sparse descriptor of a calendar bucket
///
/// The constructors produce the canonical shape for each granularity: only
/// the fields that granularity needs are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodIdentifier {
    pub year: i32,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u32>,

    /// Week of month (1-5)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
}

impl PeriodIdentifier {
    pub fn year(year: i32) -> Self {
        PeriodIdentifier { year, month: None, quarter: None, week: None }
    }

    pub fn quarter(year: i32, quarter: u32) -> Self {
        PeriodIdentifier { year, month: None, quarter: Some(quarter), week: None }
    }

    pub fn month(year: i32, month: u32) -> Self {
        PeriodIdentifier { year, month: Some(month), quarter: None, week: None }
    }

    pub fn week(year: i32, month: u32, week: u32) -> Self {
        PeriodIdentifier { year, month: Some(month), quarter: None, week: Some(week) }
    }

    /// The bucket of the given granularity that contains `date`
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Year => Self::year(date.year()),
            Granularity::Quarter => Self::quarter(date.year(), quarter_of_month(date.month())),
            Granularity::Month => Self::month(date.year(), date.month()),
            Granularity::Week => Self::week(date.year(), date.month(), week_of_month(date.day())),
        }
    }

    /// Period from optional parts, falling back to the one containing `today`
    ///
    /// With no parts given this is `containing(today, granularity)`; otherwise
    /// the parts are taken as-is with the year defaulting to today's.
    pub fn resolve(
        granularity: Granularity,
        year: Option<i32>,
        month: Option<u32>,
        quarter: Option<u32>,
        week: Option<u32>,
        today: NaiveDate,
    ) -> Self {
        if year.is_none() && month.is_none() && quarter.is_none() && week.is_none() {
            return Self::containing(today, granularity);
        }

        PeriodIdentifier {
            year: year.unwrap_or_else(|| today.year()),
            month,
            quarter,
            week,
        }
    }
}

// ============================================================================
// CALENDAR HELPERS
// ============================================================================

/// 1-7 → 1, 8-14 → 2, 15-21 → 3, 22-28 → 4, 29-31 → 5
pub fn week_of_month(day: u32) -> u32 {
    (day.max(1) - 1) / 7 + 1
}

/// 1-3 → Q1, ..., 10-12 → Q4
pub fn quarter_of_month(month: u32) -> u32 {
    (month.clamp(1, 12) - 1) / 3 + 1
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Number of week-of-month buckets: `ceil(days_in_month / 7)`
pub fn weeks_in_month(year: i32, month: u32) -> Option<u32> {
    days_in_month(year, month).map(|days| (days + 6) / 7)
}

/// ISO-8601 week number (week 1 contains the year's first Thursday)
///
/// Dates at the edges of a year may belong to the neighbouring ISO year,
/// e.g. 2027-01-01 is in week 53 of 2026.
pub fn get_iso_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// 52 or 53: December 28th always falls in the last ISO week
pub fn get_weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}

fn check_month(month: u32) -> Result<u32, PeriodError> {
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(PeriodError::InvalidMonth(month))
    }
}

fn check_quarter(quarter: u32) -> Result<u32, PeriodError> {
    if (1..=4).contains(&quarter) {
        Ok(quarter)
    } else {
        Err(PeriodError::InvalidQuarter(quarter))
    }
}

fn check_week(year: i32, month: u32, week: u32) -> Result<u32, PeriodError> {
    let max = weeks_in_month(year, month).unwrap_or(5);
    if (1..=max).contains(&week) {
        Ok(week)
    } else {
        Err(PeriodError::InvalidWeek { year, month, week, max })
    }
}

fn week_parts(period: &PeriodIdentifier) -> Result<(u32, u32), PeriodError> {
    match (period.week, period.month) {
        (Some(week), Some(month)) => {
            let month = check_month(month)?;
            Ok((check_week(period.year, month, week)?, month))
        }
        _ => Err(PeriodError::WeekAndMonthRequired),
    }
}

fn prev_year(year: i32) -> Result<i32, PeriodError> {
    year.checked_sub(1).ok_or(PeriodError::YearOutOfRange(year))
}

fn next_year(year: i32) -> Result<i32, PeriodError> {
    year.checked_add(1).ok_or(PeriodError::YearOutOfRange(year))
}

// ============================================================================
// PERIOD ARITHMETIC
// ============================================================================

/// The period immediately before `current`
pub fn get_previous_period(
    current: &PeriodIdentifier,
    granularity: Granularity,
) -> Result<PeriodIdentifier, PeriodError> {
    let year = current.year;

    match granularity {
        Granularity::Week => {
            let (week, month) = week_parts(current)?;
            if week > 1 {
                return Ok(PeriodIdentifier::week(year, month, week - 1));
            }
            let (before_year, before_month) = if month == 1 { (prev_year(year)?, 12) } else { (year, month - 1) };
            let last_week = weeks_in_month(before_year, before_month).unwrap_or(5);
            Ok(PeriodIdentifier::week(before_year, before_month, last_week))
        }
        Granularity::Month => {
            let month = check_month(current.month.ok_or(PeriodError::MonthRequired)?)?;
            Ok(if month == 1 {
                PeriodIdentifier::month(prev_year(year)?, 12)
            } else {
                PeriodIdentifier::month(year, month - 1)
            })
        }
        Granularity::Quarter => {
            let quarter = check_quarter(current.quarter.ok_or(PeriodError::QuarterRequired)?)?;
            Ok(if quarter == 1 {
                PeriodIdentifier::quarter(prev_year(year)?, 4)
            } else {
                PeriodIdentifier::quarter(year, quarter - 1)
            })
        }
        Granularity::Year => Ok(PeriodIdentifier::year(prev_year(year)?)),
    }
}

/// The period immediately after `current` (inverse of `get_previous_period`)
pub fn get_next_period(
    current: &PeriodIdentifier,
    granularity: Granularity,
) -> Result<PeriodIdentifier, PeriodError> {
    let year = current.year;

    match granularity {
        Granularity::Week => {
            let (week, month) = week_parts(current)?;
            let last_week = weeks_in_month(year, month).unwrap_or(5);
            if week < last_week {
                return Ok(PeriodIdentifier::week(year, month, week + 1));
            }
            Ok(if month == 12 {
                PeriodIdentifier::week(next_year(year)?, 1, 1)
            } else {
                PeriodIdentifier::week(year, month + 1, 1)
            })
        }
        Granularity::Month => {
            let month = check_month(current.month.ok_or(PeriodError::MonthRequired)?)?;
            Ok(if month == 12 {
                PeriodIdentifier::month(next_year(year)?, 1)
            } else {
                PeriodIdentifier::month(year, month + 1)
            })
        }
        Granularity::Quarter => {
            let quarter = check_quarter(current.quarter.ok_or(PeriodError::QuarterRequired)?)?;
            Ok(if quarter == 4 {
                PeriodIdentifier::quarter(next_year(year)?, 1)
            } else {
                PeriodIdentifier::quarter(year, quarter + 1)
            })
        }
        Granularity::Year => Ok(PeriodIdentifier::year(next_year(year)?)),
    }
}

/// Whether `date` falls inside `period` at the given granularity
///
/// A period missing the field the granularity needs contains nothing.
pub fn is_date_in_period(date: NaiveDate, period: &PeriodIdentifier, granularity: Granularity) -> bool {
    if date.year() != period.year {
        return false;
    }

    match granularity {
        Granularity::Year => true,
        Granularity::Quarter => period.quarter == Some(quarter_of_month(date.month())),
        Granularity::Month => period.month == Some(date.month()),
        Granularity::Week => {
            period.month == Some(date.month()) && period.week == Some(week_of_month(date.day()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_resolve_defaults_to_today() {
        let today = date("2026-10-19");
        assert_eq!(
            PeriodIdentifier::resolve(Granularity::Month, None, None, None, None, today),
            PeriodIdentifier::month(2026, 10)
        );
        assert_eq!(
            PeriodIdentifier::resolve(Granularity::Week, None, None, None, None, today),
            PeriodIdentifier::week(2026, 10, 3)
        );
    }

    #[test]
    fn test_resolve_explicit_parts() {
        let today = date("2026-10-19");
        assert_eq!(
            PeriodIdentifier::resolve(Granularity::Quarter, Some(2025), None, Some(4), None, today),
            PeriodIdentifier::quarter(2025, 4)
        );
        assert_eq!(
            PeriodIdentifier::resolve(Granularity::Month, None, Some(2), None, None, today),
            PeriodIdentifier::month(2026, 2)
        );
    }

    #[test]
    fn test_week_of_month_buckets() {
        assert_eq!(week_of_month(1), 1);
        assert_eq!(week_of_month(7), 1);
        assert_eq!(week_of_month(8), 2);
        assert_eq!(week_of_month(28), 4);
        assert_eq!(week_of_month(29), 5);
        assert_eq!(week_of_month(31), 5);
    }

    #[test]
    fn test_weeks_in_month() {
        assert_eq!(weeks_in_month(2026, 2), Some(4)); // 28 days
        assert_eq!(weeks_in_month(2024, 2), Some(5)); // 29 days
        assert_eq!(weeks_in_month(2026, 4), Some(5));
        assert_eq!(weeks_in_month(2026, 13), None);
    }

    #[test]
    fn test_previous_month_rolls_year() {
        let prev = get_previous_period(&PeriodIdentifier::month(2026, 1), Granularity::Month).unwrap();
        assert_eq!(prev, PeriodIdentifier::month(2025, 12));

        let prev = get_previous_period(&PeriodIdentifier::month(2026, 7), Granularity::Month).unwrap();
        assert_eq!(prev, PeriodIdentifier::month(2026, 6));
    }

    #[test]
    fn test_previous_quarter_rolls_year() {
        let prev = get_previous_period(&PeriodIdentifier::quarter(2026, 1), Granularity::Quarter).unwrap();
        assert_eq!(prev, PeriodIdentifier::quarter(2025, 4));

        let prev = get_previous_period(&PeriodIdentifier::quarter(2026, 3), Granularity::Quarter).unwrap();
        assert_eq!(prev, PeriodIdentifier::quarter(2026, 2));
    }

    #[test]
    fn test_previous_year() {
        let prev = get_previous_period(&PeriodIdentifier::year(2026), Granularity::Year).unwrap();
        assert_eq!(prev, PeriodIdentifier::year(2025));
    }

    #[test]
    fn test_previous_week_within_month() {
        let prev = get_previous_period(&PeriodIdentifier::week(2026, 3, 3), Granularity::Week).unwrap();
        assert_eq!(prev, PeriodIdentifier::week(2026, 3, 2));
    }

    #[test]
    fn test_previous_week_crosses_month() {
        // March 2026 week 1 → February 2026 has 28 days → week 4
        let prev = get_previous_period(&PeriodIdentifier::week(2026, 3, 1), Granularity::Week).unwrap();
        assert_eq!(prev, PeriodIdentifier::week(2026, 2, 4));

        // January week 1 → December of the previous year, week 5
        let prev = get_previous_period(&PeriodIdentifier::week(2026, 1, 1), Granularity::Week).unwrap();
        assert_eq!(prev, PeriodIdentifier::week(2025, 12, 5));
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let year_only = PeriodIdentifier::year(2026);

        assert_eq!(
            get_previous_period(&year_only, Granularity::Week),
            Err(PeriodError::WeekAndMonthRequired)
        );
        assert_eq!(
            get_previous_period(&year_only, Granularity::Month),
            Err(PeriodError::MonthRequired)
        );
        assert_eq!(
            get_previous_period(&year_only, Granularity::Quarter),
            Err(PeriodError::QuarterRequired)
        );
        assert_eq!(
            PeriodError::WeekAndMonthRequired.to_string(),
            "Week and month numbers required"
        );
    }

    #[test]
    fn test_year_limits_are_errors() {
        assert_eq!(
            get_previous_period(&PeriodIdentifier::year(i32::MIN), Granularity::Year),
            Err(PeriodError::YearOutOfRange(i32::MIN))
        );
        assert_eq!(
            get_next_period(&PeriodIdentifier::year(i32::MAX), Granularity::Year),
            Err(PeriodError::YearOutOfRange(i32::MAX))
        );
        assert_eq!(
            get_previous_period(&PeriodIdentifier::month(i32::MIN, 1), Granularity::Month),
            Err(PeriodError::YearOutOfRange(i32::MIN))
        );
        assert_eq!(
            get_next_period(&PeriodIdentifier::quarter(i32::MAX, 4), Granularity::Quarter),
            Err(PeriodError::YearOutOfRange(i32::MAX))
        );
        assert_eq!(
            get_next_period(&PeriodIdentifier::quarter(i32::MAX, 3), Granularity::Quarter),
            Ok(PeriodIdentifier::quarter(i32::MAX, 4))
        );
    }

    #[test]
    fn test_out_of_range_fields_are_errors() {
        assert_eq!(
            get_previous_period(&PeriodIdentifier::month(2026, 13), Granularity::Month),
            Err(PeriodError::InvalidMonth(13))
        );
        assert_eq!(
            get_next_period(&PeriodIdentifier::quarter(2026, 0), Granularity::Quarter),
            Err(PeriodError::InvalidQuarter(0))
        );
        assert!(matches!(
            get_previous_period(&PeriodIdentifier::week(2026, 2, 5), Granularity::Week),
            Err(PeriodError::InvalidWeek { max: 4, .. })
        ));
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            (PeriodIdentifier::month(2026, 1), Granularity::Month),
            (PeriodIdentifier::month(2026, 6), Granularity::Month),
            (PeriodIdentifier::quarter(2026, 1), Granularity::Quarter),
            (PeriodIdentifier::quarter(2025, 4), Granularity::Quarter),
            (PeriodIdentifier::year(2026), Granularity::Year),
            (PeriodIdentifier::week(2026, 1, 1), Granularity::Week),
            (PeriodIdentifier::week(2026, 3, 1), Granularity::Week),
            (PeriodIdentifier::week(2024, 3, 1), Granularity::Week),
            (PeriodIdentifier::week(2026, 5, 5), Granularity::Week),
        ];

        for (period, granularity) in cases {
            let prev = get_previous_period(&period, granularity).unwrap();
            assert_eq!(get_next_period(&prev, granularity).unwrap(), period, "{:?}", period);

            let next = get_next_period(&period, granularity).unwrap();
            assert_eq!(get_previous_period(&next, granularity).unwrap(), period, "{:?}", period);
        }
    }

    #[test]
    fn test_is_date_in_period() {
        let d = date("2025-12-13");

        assert!(is_date_in_period(d, &PeriodIdentifier::year(2025), Granularity::Year));
        assert!(!is_date_in_period(d, &PeriodIdentifier::year(2026), Granularity::Year));

        assert!(is_date_in_period(d, &PeriodIdentifier::quarter(2025, 4), Granularity::Quarter));
        assert!(!is_date_in_period(d, &PeriodIdentifier::quarter(2025, 3), Granularity::Quarter));

        assert!(is_date_in_period(d, &PeriodIdentifier::month(2025, 12), Granularity::Month));
        assert!(!is_date_in_period(d, &PeriodIdentifier::month(2024, 12), Granularity::Month));

        assert!(is_date_in_period(d, &PeriodIdentifier::week(2025, 12, 2), Granularity::Week));
        assert!(!is_date_in_period(d, &PeriodIdentifier::week(2025, 12, 3), Granularity::Week));
        assert!(is_date_in_period(date("2025-12-31"), &PeriodIdentifier::week(2025, 12, 5), Granularity::Week));
    }

    #[test]
    fn test_is_date_in_period_missing_field() {
        let d = date("2025-12-13");
        assert!(!is_date_in_period(d, &PeriodIdentifier::year(2025), Granularity::Month));
        assert!(!is_date_in_period(d, &PeriodIdentifier::month(2025, 12), Granularity::Week));
    }

    #[test]
    fn test_containing() {
        let d = date("2026-08-30");
        assert_eq!(PeriodIdentifier::containing(d, Granularity::Week), PeriodIdentifier::week(2026, 8, 5));
        assert_eq!(PeriodIdentifier::containing(d, Granularity::Quarter), PeriodIdentifier::quarter(2026, 3));
        assert!(is_date_in_period(d, &PeriodIdentifier::containing(d, Granularity::Month), Granularity::Month));
    }

    #[test]
    fn test_iso_weeks() {
        assert_eq!(get_iso_week_number(date("2026-01-01")), 1);
        assert_eq!(get_iso_week_number(date("2027-01-01")), 53);
        assert_eq!(get_iso_week_number(date("2025-12-29")), 1);
        assert_eq!(get_weeks_in_year(2026), 53);
        assert_eq!(get_weeks_in_year(2025), 52);
        assert_eq!(get_weeks_in_year(2020), 53);
    }

    #[test]
    fn test_granularity_parsing() {
        assert_eq!("Month".parse::<Granularity>(), Ok(Granularity::Month));
        assert_eq!("q".parse::<Granularity>(), Ok(Granularity::Quarter));
        assert!("decade".parse::<Granularity>().is_err());
        assert_eq!(Granularity::Year.cycle(), Granularity::Week);
    }
}
