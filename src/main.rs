use std::process::ExitCode;

use srag_report::db;
use srag_report::telemetry::init_telemetry;
use srag_report::{Config, Pipeline, PipelineState, ReportError};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        environment = %config.environment,
        database_url = %config.database_url,
        reports_dir = %config.reports_dir.display(),
        "Starting srag-report"
    );

    let code = match run(config).await {
        Ok(state) => {
            let report_path = state
                .report()
                .and_then(|b| b.report.as_ref())
                .and_then(|r| r.report_path.as_ref());
            tracing::info!(
                report = ?report_path,
                html = ?state.html().and_then(|a| a.path.as_ref()),
                pdf = ?state.pdf().and_then(|a| a.path.as_ref()),
                degraded = ?state.degraded_stages(),
                "Report run finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, fatal = err.is_fatal(), "Report run aborted");
            ExitCode::FAILURE
        }
    };

    telemetry_guard.shutdown();

    Ok(code)
}

/// Everything that can stop a run before a report exists: missing required
/// credentials, an unusable data store, or no loadable data source.
async fn run(config: Config) -> Result<PipelineState, ReportError> {
    config.check_credentials()?;

    let pool = db::create_pool(&config.database_url).await?;

    let pipeline = Pipeline::builder(config, pool).build()?;
    pipeline.run().await
}
