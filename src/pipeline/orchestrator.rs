use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;

use super::metrics::MetricsStage;
use super::news::NewsStage;
use super::prepare::{DatasetSummary, PrepareDataStage};
use super::render::{RenderHtmlStage, RenderPdfStage, RenderedArtifact};
use super::stage::{Stage, StageName, run_required_stage, run_stage};
use super::state::PipelineState;
use super::summarize::{NarrativeSettings, SummarizeStage};
use super::visualize::VisualizationStage;
use crate::chart::ChartBundle;
use crate::config::Config;
use crate::error::ReportError;
use crate::ingest::resolve_sources;
use crate::llm::LlmClient;
use crate::llm::openai::OpenAIProvider;
use crate::metrics::{MetricsEngine, MetricsReport};
use crate::news::{NewsBundle, NewsSearch};
use crate::report::ReportBundle;
use crate::telemetry::metrics::REPORT_GENERATION_DURATION;

type BoxedStage<T> = Box<dyn Stage<Output = T>>;

/// The fixed chain
/// `prepare_data → metrics → visualization → news → summarize → render_html → render_pdf`.
///
/// Stages run one at a time over a single [`PipelineState`]. Any error from
/// `prepare_data` ends a run early; every other failure leaves an empty
/// fragment and the next stage runs.
pub struct Pipeline {
    prepare_data: BoxedStage<DatasetSummary>,
    metrics: BoxedStage<MetricsReport>,
    visualization: BoxedStage<ChartBundle>,
    news: BoxedStage<NewsBundle>,
    summarize: BoxedStage<ReportBundle>,
    render_html: BoxedStage<RenderedArtifact>,
    render_pdf: BoxedStage<RenderedArtifact>,
}

impl Pipeline {
    pub fn builder(config: Config, pool: SqlitePool) -> PipelineBuilder {
        PipelineBuilder::new(config, pool)
    }

    #[tracing::instrument(
        name = "pipeline run",
        skip(self),
        fields(
            pipeline.stages_run,
            pipeline.degraded_stages,
            report.duration_ms,
        )
    )]
    pub async fn run(&self) -> Result<PipelineState, ReportError> {
        let start = Instant::now();
        let mut state = PipelineState::default();

        run_required_stage(&*self.prepare_data, &mut state, PipelineState::dataset_slot).await?;
        run_stage(&*self.metrics, &mut state, PipelineState::metrics_slot).await;
        run_stage(&*self.visualization, &mut state, PipelineState::charts_slot).await;
        run_stage(&*self.news, &mut state, PipelineState::news_slot).await;
        run_stage(&*self.summarize, &mut state, PipelineState::report_slot).await;
        run_stage(&*self.render_html, &mut state, PipelineState::html_slot).await;
        run_stage(&*self.render_pdf, &mut state, PipelineState::pdf_slot).await;

        let duration = start.elapsed();
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);

        let degraded: Vec<&str> = state.degraded_stages().iter().map(|s| s.as_str()).collect();
        let span = tracing::Span::current();
        span.record("pipeline.stages_run", state.history().len());
        span.record("pipeline.degraded_stages", degraded.join(",").as_str());
        span.record("report.duration_ms", duration.as_millis() as u64);

        if degraded.is_empty() {
            tracing::info!(duration_ms = duration.as_millis() as u64, "Pipeline completed");
        } else {
            tracing::warn!(
                duration_ms = duration.as_millis() as u64,
                degraded = ?degraded,
                "Pipeline completed with degraded stages"
            );
        }

        Ok(state)
    }
}

/// Wires the production stages from [`Config`]; any stage can be replaced
/// before [`build`](PipelineBuilder::build).
pub struct PipelineBuilder {
    config: Config,
    pool: SqlitePool,
    http: Option<reqwest::Client>,
    llm: Option<LlmClient>,
    prepare_data: Option<BoxedStage<DatasetSummary>>,
    metrics: Option<BoxedStage<MetricsReport>>,
    visualization: Option<BoxedStage<ChartBundle>>,
    news: Option<BoxedStage<NewsBundle>>,
    summarize: Option<BoxedStage<ReportBundle>>,
    render_html: Option<BoxedStage<RenderedArtifact>>,
    render_pdf: Option<BoxedStage<RenderedArtifact>>,
}

impl PipelineBuilder {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        Self {
            config,
            pool,
            http: None,
            llm: None,
            prepare_data: None,
            metrics: None,
            visualization: None,
            news: None,
            summarize: None,
            render_html: None,
            render_pdf: None,
        }
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Narrative client; defaults to OpenAI when `OPENAI_API_KEY` is set.
    pub fn llm(mut self, llm: LlmClient) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn prepare_data(mut self, stage: impl Stage<Output = DatasetSummary> + 'static) -> Self {
        self.prepare_data = Some(Box::new(stage));
        self
    }

    pub fn metrics(mut self, stage: impl Stage<Output = MetricsReport> + 'static) -> Self {
        self.metrics = Some(Box::new(stage));
        self
    }

    pub fn visualization(mut self, stage: impl Stage<Output = ChartBundle> + 'static) -> Self {
        self.visualization = Some(Box::new(stage));
        self
    }

    pub fn news(mut self, stage: impl Stage<Output = NewsBundle> + 'static) -> Self {
        self.news = Some(Box::new(stage));
        self
    }

    pub fn summarize(mut self, stage: impl Stage<Output = ReportBundle> + 'static) -> Self {
        self.summarize = Some(Box::new(stage));
        self
    }

    pub fn render_html(mut self, stage: impl Stage<Output = RenderedArtifact> + 'static) -> Self {
        self.render_html = Some(Box::new(stage));
        self
    }

    pub fn render_pdf(mut self, stage: impl Stage<Output = RenderedArtifact> + 'static) -> Self {
        self.render_pdf = Some(Box::new(stage));
        self
    }

    pub fn build(self) -> Result<Pipeline, ReportError> {
        let config = self.config;
        let pool = self.pool;
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .user_agent(concat!("srag-report/", env!("CARGO_PKG_VERSION")))
                .timeout(config.source_timeout)
                .build()?,
        };
        let llm = self.llm.or_else(|| {
            config.openai_api_key.as_deref().map(|key| {
                let provider = OpenAIProvider::new(key, config.openai_api_base.as_deref());
                LlmClient::new(Arc::new(provider), config.llm_timeout)
            })
        });

        let prepare_data = self.prepare_data.unwrap_or_else(|| {
            let sources = resolve_sources(&config.data_dir, &config.data_files, &config.data_urls);
            Box::new(PrepareDataStage::new(
                pool.clone(),
                http.clone(),
                sources,
                config.load_workers,
            ))
        });
        let metrics = self
            .metrics
            .unwrap_or_else(|| Box::new(MetricsStage::new(MetricsEngine::new(pool.clone()))));
        let visualization = self.visualization.unwrap_or_else(|| {
            Box::new(VisualizationStage::new(
                pool.clone(),
                config.charts_dir(),
                config.chart_days,
                config.chart_months,
            ))
        });
        let news = self.news.unwrap_or_else(|| {
            Box::new(NewsStage::new(NewsSearch::new(
                http.clone(),
                config.serper_api_key.clone(),
                config.news_endpoint.clone(),
                config.news_max_results,
                config.news_timeout,
            )))
        });
        let summarize = self.summarize.unwrap_or_else(|| {
            Box::new(SummarizeStage::new(
                llm,
                NarrativeSettings {
                    model: config.llm_model.clone(),
                    temperature: config.llm_temperature,
                    language: config.report_language.clone(),
                },
                config.reports_dir.clone(),
            ))
        });
        let render_html = self
            .render_html
            .unwrap_or_else(|| Box::new(RenderHtmlStage::new(config.reports_dir.clone())));
        let render_pdf = self.render_pdf.unwrap_or_else(|| {
            Box::new(RenderPdfStage::new(
                config.reports_dir.clone(),
                config.chrome_path.clone(),
                config.pdf_timeout,
            ))
        });

        Ok(Pipeline {
            prepare_data: checked(prepare_data, StageName::PrepareData)?,
            metrics: checked(metrics, StageName::Metrics)?,
            visualization: checked(visualization, StageName::Visualization)?,
            news: checked(news, StageName::News)?,
            summarize: checked(summarize, StageName::Summarize)?,
            render_html: checked(render_html, StageName::RenderHtml)?,
            render_pdf: checked(render_pdf, StageName::RenderPdf)?,
        })
    }
}

/// A stage must report the name of the position it fills, or the history
/// would no longer match the execution order.
fn checked<T: Default + Send>(stage: BoxedStage<T>, expected: StageName) -> Result<BoxedStage<T>, ReportError> {
    let name = stage.name();
    if name != expected {
        return Err(ReportError::Config(format!(
            "stage '{name}' cannot run in the '{expected}' position"
        )));
    }
    Ok(stage)
}
