use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::stage::{Stage, StageName};
use super::state::PipelineState;
use crate::error::ReportError;
use crate::render::{find_browser, render_html, render_pdf};
use crate::report::{latest_saved, load_saved};

/// A file written by a render stage; `path` is empty when the stage degraded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

pub struct RenderHtmlStage {
    reports_dir: PathBuf,
}

impl RenderHtmlStage {
    pub fn new(reports_dir: PathBuf) -> Self {
        Self { reports_dir }
    }

    /// This run's report, or the latest one saved by an earlier run.
    async fn report_json(&self, state: &PipelineState) -> Result<serde_json::Value, ReportError> {
        if let Some(json) = state.report().and_then(|b| b.to_json()) {
            return Ok(json);
        }

        let path = latest_saved(&self.reports_dir)
            .await?
            .ok_or_else(|| ReportError::Render("no report available to render".to_string()))?;
        tracing::warn!(path = %path.display(), "No report in this run, rendering the latest saved one");
        load_saved(&path).await
    }
}

#[async_trait::async_trait]
impl Stage for RenderHtmlStage {
    type Output = RenderedArtifact;

    fn name(&self) -> StageName {
        StageName::RenderHtml
    }

    async fn run(&self, state: &PipelineState) -> Result<RenderedArtifact, ReportError> {
        let report = self.report_json(state).await?;
        let path = render_html(&report, &self.reports_dir).await?;
        Ok(RenderedArtifact { path: Some(path) })
    }
}

pub struct RenderPdfStage {
    reports_dir: PathBuf,
    browser: Option<PathBuf>,
    timeout: Duration,
}

impl RenderPdfStage {
    pub fn new(reports_dir: PathBuf, browser: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            reports_dir,
            browser,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl Stage for RenderPdfStage {
    type Output = RenderedArtifact;

    fn name(&self) -> StageName {
        StageName::RenderPdf
    }

    async fn run(&self, state: &PipelineState) -> Result<RenderedArtifact, ReportError> {
        let html = state
            .html()
            .and_then(|a| a.path.clone())
            .ok_or_else(|| ReportError::Render("no HTML report rendered in this run".to_string()))?;
        let browser = find_browser(self.browser.as_deref())?;
        let path = render_pdf(&browser, &html, &self.reports_dir, self.timeout).await?;
        Ok(RenderedArtifact { path: Some(path) })
    }
}
