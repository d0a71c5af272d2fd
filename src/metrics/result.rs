use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::window::YearMonth;
use crate::db::cases::Subset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Indicator {
    #[serde(rename = "case_increase_rate")]
    CaseGrowth,
    #[serde(rename = "mortality_rate")]
    Mortality,
    #[serde(rename = "icu_occupancy_rate")]
    IcuOccupancy,
    #[serde(rename = "vaccination_rate")]
    Vaccination,
}

impl Indicator {
    pub const ALL: [Indicator; 4] = [
        Indicator::CaseGrowth,
        Indicator::Mortality,
        Indicator::IcuOccupancy,
        Indicator::Vaccination,
    ];

    pub fn subset(self) -> Subset {
        match self {
            Indicator::CaseGrowth => Subset::None,
            Indicator::Mortality => Subset::Deaths,
            Indicator::IcuOccupancy => Subset::Icu,
            Indicator::Vaccination => Subset::CovidVaccinated,
        }
    }

    /// Number of newest month groups the indicator needs, the excluded
    /// incomplete month included.
    pub fn required_months(self) -> usize {
        match self {
            Indicator::CaseGrowth => 3,
            _ => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::CaseGrowth => "case growth rate",
            Indicator::Mortality => "mortality rate",
            Indicator::IcuOccupancy => "ICU occupancy rate",
            Indicator::Vaccination => "vaccination rate",
        }
    }

    fn count_key(self) -> &'static str {
        match self {
            Indicator::CaseGrowth => "case_count",
            Indicator::Mortality => "death_count",
            Indicator::IcuOccupancy => "icu_count",
            Indicator::Vaccination => "vaccinated_count",
        }
    }

    fn rate_key(self) -> &'static str {
        match self {
            Indicator::CaseGrowth => "percent_increase_rate",
            Indicator::Mortality => "mortality_rate_percent",
            Indicator::IcuOccupancy => "icu_occupancy_rate_percent",
            Indicator::Vaccination => "vaccination_rate_percent",
        }
    }
}

/// Share of one month's cases falling in the indicator's subset.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRate {
    pub indicator: Indicator,
    pub period: YearMonth,
    pub total_cases: i64,
    pub subset_count: i64,
    pub rate_percent: Option<f64>,
}

impl Serialize for MonthlyRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("year", &self.period.year)?;
        map.serialize_entry("month", &self.period.month)?;
        map.serialize_entry("total_cases", &self.total_cases)?;
        map.serialize_entry(self.indicator.count_key(), &self.subset_count)?;
        map.serialize_entry(self.indicator.rate_key(), &self.rate_percent)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRate {
    pub current_month: YearMonth,
    pub compared_month: YearMonth,
    pub latest_cases: i64,
    pub previous_cases: i64,
    pub percent_increase_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricResult {
    Growth(GrowthRate),
    Rate(MonthlyRate),
    InsufficientData { error: String },
}

impl MetricResult {
    pub fn insufficient(indicator: Indicator, months_found: usize) -> Self {
        MetricResult::InsufficientData {
            error: format!(
                "Insufficient data to calculate {}: {} month group(s) found, {} required \
                 (the most recent month is excluded as incomplete)",
                indicator.label(),
                months_found,
                indicator.required_months()
            ),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, MetricResult::InsufficientData { .. })
    }

    pub fn rate_percent(&self) -> Option<f64> {
        match self {
            MetricResult::Growth(g) => g.percent_increase_rate,
            MetricResult::Rate(r) => r.rate_percent,
            MetricResult::InsufficientData { .. } => None,
        }
    }
}

pub type MetricsReport = BTreeMap<Indicator, MetricResult>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monthly_rate_json_shape() {
        let rate = MonthlyRate {
            indicator: Indicator::IcuOccupancy,
            period: YearMonth { year: 2024, month: 12 },
            total_cases: 600,
            subset_count: 120,
            rate_percent: Some(20.0),
        };
        assert_eq!(
            serde_json::to_value(MetricResult::Rate(rate)).unwrap(),
            json!({
                "year": 2024,
                "month": 12,
                "total_cases": 600,
                "icu_count": 120,
                "icu_occupancy_rate_percent": 20.0,
            })
        );
    }

    #[test]
    fn test_null_rate_serializes_as_null() {
        let rate = MonthlyRate {
            indicator: Indicator::Mortality,
            period: YearMonth { year: 2024, month: 12 },
            total_cases: 0,
            subset_count: 0,
            rate_percent: None,
        };
        let value = serde_json::to_value(MetricResult::Rate(rate)).unwrap();
        assert!(value["mortality_rate_percent"].is_null());
        assert_eq!(value["death_count"], 0);
    }

    #[test]
    fn test_growth_json_shape() {
        let growth = GrowthRate {
            current_month: YearMonth { year: 2024, month: 12 },
            compared_month: YearMonth { year: 2024, month: 11 },
            latest_cases: 600,
            previous_cases: 500,
            percent_increase_rate: Some(20.0),
        };
        assert_eq!(
            serde_json::to_value(MetricResult::Growth(growth)).unwrap(),
            json!({
                "current_month": "2024-12",
                "compared_month": "2024-11",
                "latest_cases": 600,
                "previous_cases": 500,
                "percent_increase_rate": 20.0,
            })
        );
    }

    #[test]
    fn test_insufficient_serializes_as_error_marker() {
        let result = MetricResult::insufficient(Indicator::CaseGrowth, 1);
        assert!(result.is_insufficient());
        assert_eq!(result.rate_percent(), None);
        let value = serde_json::to_value(&result).unwrap();
        let message = value["error"].as_str().unwrap();
        assert!(message.starts_with("Insufficient data to calculate case growth rate"));
        assert!(message.contains("3 required"));
    }

    #[test]
    fn test_report_keys() {
        let mut report = MetricsReport::new();
        report.insert(
            Indicator::Vaccination,
            MetricResult::insufficient(Indicator::Vaccination, 0),
        );
        report.insert(
            Indicator::CaseGrowth,
            MetricResult::insufficient(Indicator::CaseGrowth, 0),
        );
        let value = serde_json::to_value(&report).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["case_increase_rate", "vaccination_rate"]);
        assert_eq!(serde_json::to_string(&MetricsReport::new()).unwrap(), "{}");
    }
}
