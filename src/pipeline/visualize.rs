use std::path::PathBuf;

use sqlx::SqlitePool;

use super::stage::{Stage, StageName};
use super::state::PipelineState;
use crate::chart::{self, ChartBundle};
use crate::error::ReportError;

pub struct VisualizationStage {
    pool: SqlitePool,
    charts_dir: PathBuf,
    days: u32,
    months: u32,
}

impl VisualizationStage {
    pub fn new(pool: SqlitePool, charts_dir: PathBuf, days: u32, months: u32) -> Self {
        Self {
            pool,
            charts_dir,
            days,
            months,
        }
    }
}

#[async_trait::async_trait]
impl Stage for VisualizationStage {
    type Output = ChartBundle;

    fn name(&self) -> StageName {
        StageName::Visualization
    }

    async fn run(&self, _state: &PipelineState) -> Result<ChartBundle, ReportError> {
        let daily = chart::daily_cases_chart(&self.pool, self.days, &self.charts_dir).await?;
        let monthly = chart::monthly_cases_chart(&self.pool, self.months, &self.charts_dir).await?;
        Ok(ChartBundle {
            daily_cases_chart: Some(daily),
            monthly_cases_chart: Some(monthly),
        })
    }
}
