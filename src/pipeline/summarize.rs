use std::path::PathBuf;

use super::stage::{Stage, StageName};
use super::state::PipelineState;
use crate::chart::ChartBundle;
use crate::error::ReportError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::metrics::MetricsReport;
use crate::news::NewsBundle;
use crate::report::{Narrative, Report, ReportBundle};
use crate::telemetry::current_trace_id;

const SYSTEM_PROMPT: &str = "You are a public health specialist focused on severe acute \
respiratory infections (SARI/SRAG) in Brazil. Write for public health managers: objective, \
professional and plain.";

/// Settings for the narrative calls.
#[derive(Debug, Clone)]
pub struct NarrativeSettings {
    pub model: String,
    pub temperature: f32,
    pub language: String,
}

/// Writes the narrative, assembles the report and saves it as JSON.
pub struct SummarizeStage {
    llm: Option<LlmClient>,
    settings: NarrativeSettings,
    reports_dir: PathBuf,
}

impl SummarizeStage {
    pub fn new(llm: Option<LlmClient>, settings: NarrativeSettings, reports_dir: PathBuf) -> Self {
        Self {
            llm,
            settings,
            reports_dir,
        }
    }

    /// One LLM attempt; anything short of a non-empty answer yields `fallback`.
    async fn narrate(&self, part: &str, prompt: String, max_tokens: u32, fallback: String) -> String {
        let Some(llm) = &self.llm else {
            return fallback;
        };

        let request = GenerateRequest {
            model: self.settings.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: self.settings.temperature,
            max_tokens,
            stage: format!("summarize.{part}"),
        };

        match llm.generate(&request).await {
            Ok(resp) if !resp.content.is_empty() => resp.content,
            Ok(_) => {
                tracing::warn!(
                    part,
                    provider = llm.provider_name(),
                    "LLM returned an empty answer, using fallback text"
                );
                fallback
            }
            Err(err) => {
                tracing::warn!(
                    part,
                    provider = llm.provider_name(),
                    error = %err,
                    "LLM call failed, using fallback text"
                );
                fallback
            }
        }
    }

    async fn write_narrative(
        &self,
        metrics: &MetricsReport,
        news: &NewsBundle,
        charts: &ChartBundle,
    ) -> Narrative {
        let news_summary = news.summary_or_placeholder();
        let metrics_json = serde_json::to_string_pretty(metrics).unwrap_or_else(|_| "{}".to_string());
        let language = &self.settings.language;

        let summary_metrics = self
            .narrate(
                "metrics",
                format!(
                    "Analyse the epidemiological indicators (case growth, mortality, ICU occupancy, \
                     vaccination) and the recent news below. Relate the indicators to the news \
                     context and point out trends, risks and possible alerts.\n\
                     INDICATORS:\n{metrics_json}\nNEWS:\n{news_summary}\n\
                     Answer in at most 10 lines, in {language}."
                ),
                350,
                format!("Indicator summary:\nIndicators: {metrics_json}\nNews: {news_summary}"),
            )
            .await;

        let daily = charts.daily_description();
        let monthly = charts.monthly_description();
        let summary_charts = self
            .narrate(
                "charts",
                format!(
                    "Compare the dates and content of the news below with the trends of the daily \
                     and monthly case charts. Say whether the chart trends match what the news \
                     report and highlight convergences or divergences relevant to surveillance.\n\
                     NEWS:\n{news_summary}\nDAILY CHART:\n{daily}\nMONTHLY CHART:\n{monthly}\n\
                     Answer in at most 10 lines, in {language}."
                ),
                350,
                format!(
                    "Chart and news summary:\nNews: {news_summary}\nCharts: Daily: {daily} | Monthly: {monthly}"
                ),
            )
            .await;

        let executive_summary = self
            .narrate(
                "executive",
                format!(
                    "Using the two summaries below, one on indicators and news and one on charts \
                     and news, write a final executive summary covering the whole picture, with \
                     risks, alerts and recommendations for public health managers.\n\
                     INDICATORS AND NEWS:\n{summary_metrics}\nCHARTS AND NEWS:\n{summary_charts}\n\
                     Answer in at most 20 lines, in {language}."
                ),
                500,
                format!(
                    "Executive summary:\nIndicators and news: {summary_metrics}\nCharts and news: {summary_charts}"
                ),
            )
            .await;

        Narrative {
            summary_metrics,
            summary_charts,
            executive_summary,
        }
    }
}

#[async_trait::async_trait]
impl Stage for SummarizeStage {
    type Output = ReportBundle;

    fn name(&self) -> StageName {
        StageName::Summarize
    }

    async fn run(&self, state: &PipelineState) -> Result<ReportBundle, ReportError> {
        let metrics = state.metrics().cloned().unwrap_or_default();
        let news = state.news_analysis().cloned().unwrap_or_default();
        let charts = state.charts().cloned().unwrap_or_default();

        let narrative = self.write_narrative(&metrics, &news, &charts).await;
        let mut report = Report::assemble(&metrics, &news, &charts, narrative, current_trace_id());

        if let Err(err) = report.save(&self.reports_dir).await {
            tracing::error!(error = %err, "Could not save report JSON, keeping it in memory");
        }

        Ok(ReportBundle {
            report: Some(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::client::stub::ScriptedProvider;

    fn settings() -> NarrativeSettings {
        NarrativeSettings {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            language: "Brazilian Portuguese".to_string(),
        }
    }

    #[tokio::test]
    async fn test_without_llm_uses_fallback_text() {
        let dir = tempfile::tempdir().unwrap();
        let stage = SummarizeStage::new(None, settings(), dir.path().to_path_buf());

        let bundle = stage.run(&PipelineState::default()).await.unwrap();
        let report = bundle.report.unwrap();

        assert!(report.summary_metrics.starts_with("Indicator summary:"));
        assert!(report.summary_metrics.contains("No news analysed"));
        assert!(report.summary_charts.starts_with("Chart and news summary:"));
        assert!(report.executive_summary.starts_with("Executive summary:"));
        let path = report.report_path.unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_llm_answers_feed_executive_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("metrics narrative".to_string()),
            Err(anyhow::anyhow!("503 service unavailable")),
            Ok("executive narrative".to_string()),
        ]));
        let llm = LlmClient::new(provider.clone(), Duration::from_secs(5));
        let stage = SummarizeStage::new(Some(llm), settings(), dir.path().to_path_buf());

        let report = stage
            .run(&PipelineState::default())
            .await
            .unwrap()
            .report
            .unwrap();

        assert_eq!(report.summary_metrics, "metrics narrative");
        assert!(report.summary_charts.starts_with("Chart and news summary:"));
        assert_eq!(report.executive_summary, "executive narrative");

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("in Brazilian Portuguese"));
        assert!(prompts[2].contains("metrics narrative"));
        assert!(prompts[2].contains("Chart and news summary:"));
    }

    #[tokio::test]
    async fn test_unwritable_reports_dir_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let stage = SummarizeStage::new(None, settings(), blocker);

        let report = stage
            .run(&PipelineState::default())
            .await
            .unwrap()
            .report
            .unwrap();
        assert!(report.report_path.is_none());
    }
}
