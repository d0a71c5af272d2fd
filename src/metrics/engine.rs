use sqlx::SqlitePool;

use super::result::{GrowthRate, Indicator, MetricResult, MetricsReport, MonthlyRate};
use super::window::{
    YearMonth, complete_months, growth_percent, last_complete_month, percentage, recent_first,
};
use crate::db::cases::{self, MonthBucket};

/// Stateless view over the case table. Each call re-reads the table, so two
/// calls against unchanged data return identical results.
#[derive(Clone)]
pub struct MetricsEngine {
    pool: SqlitePool,
}

impl MetricsEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(name = "metrics case_growth_rate", skip(self))]
    pub async fn case_growth_rate(&self) -> Result<MetricResult, sqlx::Error> {
        self.indicator(Indicator::CaseGrowth).await
    }

    #[tracing::instrument(name = "metrics mortality_rate", skip(self))]
    pub async fn mortality_rate(&self) -> Result<MetricResult, sqlx::Error> {
        self.indicator(Indicator::Mortality).await
    }

    #[tracing::instrument(name = "metrics icu_occupancy_rate", skip(self))]
    pub async fn icu_occupancy_rate(&self) -> Result<MetricResult, sqlx::Error> {
        self.indicator(Indicator::IcuOccupancy).await
    }

    #[tracing::instrument(name = "metrics vaccination_rate", skip(self))]
    pub async fn vaccination_rate(&self) -> Result<MetricResult, sqlx::Error> {
        self.indicator(Indicator::Vaccination).await
    }

    /// All indicators. They share no state, so the queries run concurrently.
    pub async fn compute_all(&self) -> Result<MetricsReport, sqlx::Error> {
        let (growth, mortality, icu, vaccination) = tokio::try_join!(
            self.case_growth_rate(),
            self.mortality_rate(),
            self.icu_occupancy_rate(),
            self.vaccination_rate(),
        )?;

        Ok(MetricsReport::from([
            (Indicator::CaseGrowth, growth),
            (Indicator::Mortality, mortality),
            (Indicator::IcuOccupancy, icu),
            (Indicator::Vaccination, vaccination),
        ]))
    }

    async fn indicator(&self, indicator: Indicator) -> Result<MetricResult, sqlx::Error> {
        let limit = indicator.required_months() as i64;
        let buckets = cases::month_buckets(&self.pool, indicator.subset(), limit).await?;
        Ok(derive(indicator, buckets))
    }
}

/// Applies the last-complete-month policy and the indicator's formula to
/// already-grouped counts.
pub fn derive(indicator: Indicator, buckets: Vec<MonthBucket>) -> MetricResult {
    let buckets = recent_first(buckets);
    if buckets.len() < indicator.required_months() {
        return MetricResult::insufficient(indicator, buckets.len());
    }

    match indicator {
        Indicator::CaseGrowth => derive_growth(&buckets),
        _ => derive_monthly_rate(indicator, &buckets),
    }
}

fn derive_growth(buckets: &[MonthBucket]) -> MetricResult {
    match complete_months(buckets) {
        [latest, previous, ..] => MetricResult::Growth(GrowthRate {
            current_month: YearMonth::of(latest),
            compared_month: YearMonth::of(previous),
            latest_cases: latest.total_cases,
            previous_cases: previous.total_cases,
            percent_increase_rate: growth_percent(latest.total_cases, previous.total_cases),
        }),
        _ => MetricResult::insufficient(Indicator::CaseGrowth, buckets.len()),
    }
}

fn derive_monthly_rate(indicator: Indicator, buckets: &[MonthBucket]) -> MetricResult {
    match last_complete_month(buckets) {
        Some(month) => MetricResult::Rate(MonthlyRate {
            indicator,
            period: YearMonth::of(month),
            total_cases: month.total_cases,
            subset_count: month.subset_count,
            rate_percent: percentage(month.subset_count, month.total_cases),
        }),
        None => MetricResult::insufficient(indicator, buckets.len()),
    }
}
