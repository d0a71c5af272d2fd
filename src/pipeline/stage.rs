use std::fmt;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::Instrument;

use super::state::{PipelineState, Slot, StageRecord, StageStatus};
use crate::error::ReportError;
use crate::telemetry::metrics::{PIPELINE_STAGE_DURATION, PIPELINE_STAGE_FAILURES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    PrepareData,
    Metrics,
    Visualization,
    News,
    Summarize,
    RenderHtml,
    RenderPdf,
}

impl StageName {
    /// Execution order of a run.
    pub const ORDER: [StageName; 7] = [
        StageName::PrepareData,
        StageName::Metrics,
        StageName::Visualization,
        StageName::News,
        StageName::Summarize,
        StageName::RenderHtml,
        StageName::RenderPdf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::PrepareData => "prepare_data",
            StageName::Metrics => "metrics",
            StageName::Visualization => "visualization",
            StageName::News => "news",
            StageName::Summarize => "summarize",
            StageName::RenderHtml => "render_html",
            StageName::RenderPdf => "render_pdf",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of a run. A stage reads whatever earlier stages left in the
/// state and returns its own fragment; only the orchestrator writes it back.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    /// The stage's fragment. `Default` is what a failed stage leaves behind.
    type Output: Default + Send;

    fn name(&self) -> StageName;

    async fn run(&self, state: &PipelineState) -> Result<Self::Output, ReportError>;
}

/// Runs `stage` and stores its output in the slot selected by `slot`.
///
/// Any error is logged, counted and replaced by the default output, so the
/// caller always moves on to the next stage.
pub(super) async fn run_stage<T>(
    stage: &dyn Stage<Output = T>,
    state: &mut PipelineState,
    slot: fn(&mut PipelineState) -> &mut Slot<T>,
) where
    T: Default + Send,
{
    let _ = execute(stage, state, slot, false).await;
}

/// Like [`run_stage`], except that any error is returned after it has been
/// recorded, ending the run.
pub(super) async fn run_required_stage<T>(
    stage: &dyn Stage<Output = T>,
    state: &mut PipelineState,
    slot: fn(&mut PipelineState) -> &mut Slot<T>,
) -> Result<(), ReportError>
where
    T: Default + Send,
{
    execute(stage, state, slot, true).await
}

async fn execute<T>(
    stage: &dyn Stage<Output = T>,
    state: &mut PipelineState,
    slot: fn(&mut PipelineState) -> &mut Slot<T>,
    required: bool,
) -> Result<(), ReportError>
where
    T: Default + Send,
{
    let name = stage.name();
    let span = tracing::info_span!(
        "pipeline_stage",
        otel.name = %format!("pipeline_stage {name}"),
        pipeline.stage = %name,
        pipeline.stage.status = tracing::field::Empty,
        otel.status_code = tracing::field::Empty,
        error.message = tracing::field::Empty,
    );

    let start = Instant::now();
    let result = stage.run(state).instrument(span.clone()).await;
    let duration = start.elapsed();

    let (output, status, fatal) = match result {
        Ok(output) => (output, StageStatus::Completed, None),
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(&err));
            PIPELINE_STAGE_FAILURES.add(1, &[KeyValue::new("pipeline.stage", name.as_str())]);

            let status = StageStatus::Degraded {
                error: err.to_string(),
            };
            if required {
                tracing::error!(parent: &span, stage = %name, error = %err, "Required stage failed, aborting run");
                (T::default(), status, Some(err))
            } else {
                tracing::error!(parent: &span, stage = %name, error = %err, "Stage failed, continuing with empty output");
                (T::default(), status, None)
            }
        }
    };

    span.record("pipeline.stage.status", status.as_str());
    PIPELINE_STAGE_DURATION.record(
        duration.as_secs_f64(),
        &[
            KeyValue::new("pipeline.stage", name.as_str()),
            KeyValue::new("pipeline.stage.status", status.as_str()),
        ],
    );

    slot(state).fill(output);
    state.push_record(StageRecord {
        stage: name,
        status,
        duration_ms: duration.as_millis() as u64,
    });

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::marker::PhantomData;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Always fails with the error built by `make_error`.
    pub struct FailingStage<T> {
        pub name: StageName,
        pub make_error: fn() -> ReportError,
        pub _output: PhantomData<fn() -> T>,
    }

    impl<T> FailingStage<T> {
        pub fn new(name: StageName, make_error: fn() -> ReportError) -> Self {
            Self {
                name,
                make_error,
                _output: PhantomData,
            }
        }
    }

    #[async_trait::async_trait]
    impl<T: Default + Send + 'static> Stage for FailingStage<T> {
        type Output = T;

        fn name(&self) -> StageName {
            self.name
        }

        async fn run(&self, _state: &PipelineState) -> Result<T, ReportError> {
            Err((self.make_error)())
        }
    }

    /// Returns a fixed output and counts its invocations.
    pub struct FixedStage<T> {
        pub name: StageName,
        pub output: T,
        pub calls: Arc<AtomicUsize>,
    }

    impl<T> FixedStage<T> {
        pub fn new(name: StageName, output: T) -> Self {
            Self {
                name,
                output,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl<T: Default + Clone + Send + Sync + 'static> Stage for FixedStage<T> {
        type Output = T;

        fn name(&self) -> StageName {
            self.name
        }

        async fn run(&self, _state: &PipelineState) -> Result<T, ReportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::{FailingStage, FixedStage};
    use super::*;
    use crate::news::NewsBundle;
    use crate::pipeline::prepare::DatasetSummary;

    #[tokio::test]
    async fn test_failure_leaves_default_and_continues() {
        let mut state = PipelineState::default();
        let stage = FailingStage::<NewsBundle>::new(StageName::News, || {
            ReportError::News("503".to_string())
        });

        run_stage(&stage, &mut state, PipelineState::news_slot).await;

        assert_eq!(state.news_analysis(), Some(&NewsBundle::default()));
        let record = &state.history()[0];
        assert_eq!(record.stage, StageName::News);
        assert_eq!(
            record.status,
            StageStatus::Degraded {
                error: "News search error: 503".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fatal_failure_is_returned() {
        let mut state = PipelineState::default();
        let stage =
            FailingStage::<DatasetSummary>::new(StageName::PrepareData, || ReportError::NoDataSources);

        let err = run_required_stage(&stage, &mut state, PipelineState::dataset_slot)
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::NoDataSources));
        assert_eq!(state.history().len(), 1);
        assert!(state.history()[0].status.is_degraded());
    }

    #[tokio::test]
    async fn test_required_stage_aborts_on_non_fatal_error() {
        let mut state = PipelineState::default();
        let stage = FailingStage::<DatasetSummary>::new(StageName::PrepareData, || {
            ReportError::Database(sqlx::Error::PoolClosed)
        });

        let err = run_required_stage(&stage, &mut state, PipelineState::dataset_slot)
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Database(_)));
        assert!(!err.is_fatal());
        assert_eq!(state.degraded_stages(), vec![StageName::PrepareData]);
    }

    #[tokio::test]
    async fn test_fatal_error_contained_outside_required_stage() {
        let mut state = PipelineState::default();
        let stage = FailingStage::<NewsBundle>::new(StageName::News, || {
            ReportError::Config("bad".to_string())
        });

        run_stage(&stage, &mut state, PipelineState::news_slot).await;

        assert!(state.news_analysis().is_some());
        assert_eq!(state.degraded_stages(), vec![StageName::News]);
    }

    #[tokio::test]
    async fn test_success_stores_output() {
        let mut state = PipelineState::default();
        let bundle = NewsBundle::from_articles(Vec::new());
        let stage = FixedStage::new(StageName::News, bundle.clone());

        run_required_stage(&stage, &mut state, PipelineState::news_slot)
            .await
            .unwrap();

        assert_eq!(state.news_analysis(), Some(&bundle));
        assert_eq!(state.history()[0].status, StageStatus::Completed);
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = StageName::ORDER.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "prepare_data",
                "metrics",
                "visualization",
                "news",
                "summarize",
                "render_html",
                "render_pdf"
            ]
        );
    }
}
