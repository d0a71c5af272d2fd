use serde::Serialize;

use super::prepare::DatasetSummary;
use super::render::RenderedArtifact;
use super::stage::StageName;
use crate::chart::ChartBundle;
use crate::metrics::MetricsReport;
use crate::news::NewsBundle;
use crate::report::ReportBundle;

/// A stage's output cell. Written once, by the orchestrator, after the
/// owning stage returns.
#[derive(Debug)]
pub struct Slot<T>(Option<T>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot(None)
    }
}

impl<T> Slot<T> {
    pub(super) fn fill(&mut self, value: T) {
        debug_assert!(self.0.is_none(), "stage output written twice");
        self.0 = Some(value);
    }

    fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Degraded { error: String },
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Degraded { .. } => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: StageName,
    #[serde(flatten)]
    pub status: StageStatus,
    pub duration_ms: u64,
}

/// State threaded through one run. Getters return `None` only for stages
/// that have not run yet; after a completed run every fragment is present,
/// possibly as its empty default.
#[derive(Debug, Default)]
pub struct PipelineState {
    dataset: Slot<DatasetSummary>,
    metrics: Slot<MetricsReport>,
    charts: Slot<ChartBundle>,
    news_analysis: Slot<NewsBundle>,
    report: Slot<ReportBundle>,
    html: Slot<RenderedArtifact>,
    pdf: Slot<RenderedArtifact>,
    history: Vec<StageRecord>,
}

impl PipelineState {
    pub fn dataset(&self) -> Option<&DatasetSummary> {
        self.dataset.get()
    }

    pub fn metrics(&self) -> Option<&MetricsReport> {
        self.metrics.get()
    }

    pub fn charts(&self) -> Option<&ChartBundle> {
        self.charts.get()
    }

    pub fn news_analysis(&self) -> Option<&NewsBundle> {
        self.news_analysis.get()
    }

    pub fn report(&self) -> Option<&ReportBundle> {
        self.report.get()
    }

    pub fn html(&self) -> Option<&RenderedArtifact> {
        self.html.get()
    }

    pub fn pdf(&self) -> Option<&RenderedArtifact> {
        self.pdf.get()
    }

    /// Executed stages, in execution order.
    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn degraded_stages(&self) -> Vec<StageName> {
        self.history
            .iter()
            .filter(|r| r.status.is_degraded())
            .map(|r| r.stage)
            .collect()
    }

    pub(super) fn push_record(&mut self, record: StageRecord) {
        self.history.push(record);
    }

    pub(super) fn dataset_slot(&mut self) -> &mut Slot<DatasetSummary> {
        &mut self.dataset
    }

    pub(super) fn metrics_slot(&mut self) -> &mut Slot<MetricsReport> {
        &mut self.metrics
    }

    pub(super) fn charts_slot(&mut self) -> &mut Slot<ChartBundle> {
        &mut self.charts
    }

    pub(super) fn news_slot(&mut self) -> &mut Slot<NewsBundle> {
        &mut self.news_analysis
    }

    pub(super) fn report_slot(&mut self) -> &mut Slot<ReportBundle> {
        &mut self.report
    }

    pub(super) fn html_slot(&mut self) -> &mut Slot<RenderedArtifact> {
        &mut self.html
    }

    pub(super) fn pdf_slot(&mut self) -> &mut Slot<RenderedArtifact> {
        &mut self.pdf
    }
}
