use std::fmt;

use serde::{Serialize, Serializer};

use crate::db::cases::MonthBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i64,
    pub month: i64,
}

impl YearMonth {
    pub fn of(bucket: &MonthBucket) -> Self {
        Self {
            year: bucket.year,
            month: bucket.month,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Orders month groups newest first. Callers never rely on query order.
pub fn recent_first(mut buckets: Vec<MonthBucket>) -> Vec<MonthBucket> {
    buckets.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    buckets
}

/// Month groups that are considered complete: everything but the newest.
/// Expects `recent_first` ordering.
pub fn complete_months(buckets: &[MonthBucket]) -> &[MonthBucket] {
    buckets.get(1..).unwrap_or(&[])
}

pub fn last_complete_month(buckets: &[MonthBucket]) -> Option<&MonthBucket> {
    complete_months(buckets).first()
}

/// `part / whole * 100` rounded to two decimals; `None` when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(round2(part as f64 * 100.0 / whole as f64))
}

/// Relative change from `previous` to `current`; `None` when `previous` is zero.
pub fn growth_percent(current: i64, previous: i64) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some(round2((current - previous) as f64 * 100.0 / previous as f64))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(year: i64, month: i64, total_cases: i64) -> MonthBucket {
        MonthBucket {
            year,
            month,
            total_cases,
            subset_count: 0,
        }
    }

    #[test]
    fn test_recent_first_orders_across_years() {
        let ordered = recent_first(vec![
            bucket(2024, 11, 1),
            bucket(2025, 1, 1),
            bucket(2024, 12, 1),
            bucket(2023, 12, 1),
        ]);
        let periods: Vec<String> = ordered
            .iter()
            .map(|b| YearMonth::of(b).to_string())
            .collect();
        assert_eq!(periods, vec!["2025-01", "2024-12", "2024-11", "2023-12"]);
    }

    #[test]
    fn test_newest_month_always_excluded() {
        // A huge newest month is still dropped.
        let buckets = recent_first(vec![bucket(2024, 12, 600), bucket(2025, 1, 1_000_000)]);
        let last = last_complete_month(&buckets).unwrap();
        assert_eq!(YearMonth::of(last).to_string(), "2024-12");
        assert_eq!(complete_months(&buckets).len(), 1);
    }

    #[test]
    fn test_no_complete_month_with_single_group() {
        let buckets = vec![bucket(2025, 1, 50)];
        assert!(last_complete_month(&buckets).is_none());
        assert!(complete_months(&buckets).is_empty());
        assert!(complete_months(&[]).is_empty());
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(60, 600), Some(10.0));
        assert_eq!(percentage(1, 3), Some(33.33));
        assert_eq!(percentage(2, 3), Some(66.67));
        assert_eq!(percentage(0, 10), Some(0.0));
        assert_eq!(percentage(0, 0), None);
    }

    #[test]
    fn test_growth_percent() {
        assert_eq!(growth_percent(600, 500), Some(20.0));
        assert_eq!(growth_percent(400, 500), Some(-20.0));
        assert_eq!(growth_percent(10, 0), None);
    }

    #[test]
    fn test_year_month_display_and_json() {
        let ym = YearMonth { year: 2024, month: 3 };
        assert_eq!(ym.to_string(), "2024-03");
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"2024-03\"");
    }
}
