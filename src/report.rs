use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::chart::ChartBundle;
use crate::error::ReportError;
use crate::metrics::MetricsReport;
use crate::news::NewsBundle;

pub const REPORT_TYPE: &str = "SRAG Report";
pub const GENERATED_BY: &str = "SRAG Report Agent System";
const FILE_PREFIX: &str = "srag_report_";

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generation_date: String,
    pub report_type: &'static str,
    pub generated_by: &'static str,
    pub report_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub report_metadata: ReportMetadata,
    pub metrics: MetricsReport,
    pub news_analysis: NewsBundle,
    pub charts: ChartBundle,
    pub summary_metrics: String,
    pub summary_charts: String,
    pub executive_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip)]
    generated_at: DateTime<Local>,
}

/// The two-part narrative plus the executive summary written from it.
#[derive(Debug, Clone, Default)]
pub struct Narrative {
    pub summary_metrics: String,
    pub summary_charts: String,
    pub executive_summary: String,
}

/// Output of the summarize stage. Empty when that stage degraded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportBundle {
    #[serde(flatten)]
    pub report: Option<Report>,
}

impl Report {
    /// Builds the report from whatever fragments the run produced. Missing
    /// fragments are their empty defaults; this never fails.
    pub fn assemble(
        metrics: &MetricsReport,
        news_analysis: &NewsBundle,
        charts: &ChartBundle,
        narrative: Narrative,
        trace_id: Option<String>,
    ) -> Self {
        let generated_at = Local::now();
        Self {
            report_metadata: ReportMetadata {
                generation_date: generated_at.to_rfc3339(),
                report_type: REPORT_TYPE,
                generated_by: GENERATED_BY,
                report_id: Uuid::new_v4(),
                trace_id,
            },
            metrics: metrics.clone(),
            news_analysis: news_analysis.clone(),
            charts: charts.clone(),
            summary_metrics: narrative.summary_metrics,
            summary_charts: narrative.summary_charts,
            executive_summary: narrative.executive_summary,
            report_path: None,
            generated_at,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{FILE_PREFIX}{}.json",
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Writes the report as pretty JSON under `dir` and records the path.
    #[tracing::instrument(name = "report save", skip(self), fields(report.id = %self.report_metadata.report_id))]
    pub async fn save(&mut self, dir: &Path) -> Result<PathBuf, ReportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        self.report_path = Some(path.clone());
        let json = serde_json::to_vec_pretty(self)?;
        if let Err(err) = tokio::fs::write(&path, json).await {
            self.report_path = None;
            return Err(err.into());
        }
        tracing::info!(path = %path.display(), "Report saved");
        Ok(path)
    }
}

impl ReportBundle {
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.report
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
    }
}

/// Most recent saved report in `dir`, by the timestamp embedded in its name.
pub async fn latest_saved(dir: &Path) -> Result<Option<PathBuf>, ReportError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut latest: Option<PathBuf> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"));
        if is_report && latest.as_ref().is_none_or(|l| path > *l) {
            latest = Some(path);
        }
    }
    Ok(latest)
}

pub async fn load_saved(path: &Path) -> Result<serde_json::Value, ReportError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
