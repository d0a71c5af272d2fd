use super::stage::{Stage, StageName};
use super::state::PipelineState;
use crate::error::ReportError;
use crate::metrics::{Indicator, MetricResult, MetricsEngine, MetricsReport};

pub struct MetricsStage {
    engine: MetricsEngine,
}

impl MetricsStage {
    pub fn new(engine: MetricsEngine) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl Stage for MetricsStage {
    type Output = MetricsReport;

    fn name(&self) -> StageName {
        StageName::Metrics
    }

    async fn run(&self, _state: &PipelineState) -> Result<MetricsReport, ReportError> {
        let report = self.engine.compute_all().await?;
        let insufficient: Vec<&str> = Indicator::ALL
            .into_iter()
            .filter(|i| report.get(i).is_none_or(MetricResult::is_insufficient))
            .map(Indicator::label)
            .collect();
        if insufficient.is_empty() {
            tracing::info!(indicators = report.len(), "Indicators computed");
        } else {
            tracing::warn!(
                indicators = report.len(),
                insufficient = ?insufficient,
                "Indicators computed, some without enough complete months"
            );
        }
        Ok(report)
    }
}
