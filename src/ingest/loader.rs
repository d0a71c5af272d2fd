use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::parse::{ParsedSource, parse_cases};
use super::source::DataSource;
use crate::db::cases::CaseRecord;
use crate::error::ReportError;
use crate::telemetry::metrics::DATASET_SOURCE_FAILURES;

#[derive(Debug, Default)]
pub struct LoadedDataset {
    pub records: Vec<CaseRecord>,
    pub rows_dropped: usize,
    pub sources_loaded: usize,
    pub sources_failed: usize,
}

/// Loads every source on a pool of at most `max_workers` tasks and merges the
/// results. A failing source is logged and skipped; if none succeeds the load
/// fails with [`ReportError::NoDataSources`]. The merged records are sorted,
/// so the result does not depend on completion order.
#[tracing::instrument(
    name = "ingest.load_multiple",
    skip_all,
    fields(sources = sources.len(), workers, rows)
)]
pub async fn load_multiple(
    sources: Vec<DataSource>,
    http: reqwest::Client,
    max_workers: usize,
) -> Result<LoadedDataset, ReportError> {
    load_with(sources, max_workers, move |source| {
        let http = http.clone();
        async move { load_source(&source, &http).await }
    })
    .await
}

/// The worker pool behind [`load_multiple`], generic over how one source is
/// loaded.
async fn load_with<F, Fut>(
    sources: Vec<DataSource>,
    max_workers: usize,
    load: F,
) -> Result<LoadedDataset, ReportError>
where
    F: Fn(DataSource) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<ParsedSource, ReportError>> + Send + 'static,
{
    if sources.is_empty() {
        return Err(ReportError::NoDataSources);
    }

    let start = Instant::now();
    let workers = max_workers.min(sources.len()).max(1);
    tracing::Span::current().record("workers", workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for source in sources {
        let semaphore = semaphore.clone();
        let load = load.clone();
        tasks.spawn(
            async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => load(source.clone()).await,
                    Err(_) => Err(ReportError::Ingest("worker pool closed".to_string())),
                };
                (source, result)
            }
            .in_current_span(),
        );
    }

    let mut dataset = LoadedDataset::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(parsed))) => {
                dataset.sources_loaded += 1;
                dataset.rows_dropped += parsed.rows_dropped;
                dataset.records.extend(parsed.records);
            }
            Ok((source, Err(e))) => {
                tracing::error!(source = %source, error = %e, "Error loading dataset");
                dataset.sources_failed += 1;
                DATASET_SOURCE_FAILURES.add(1, &[]);
            }
            Err(e) => {
                tracing::error!(error = %e, "Dataset loader task aborted");
                dataset.sources_failed += 1;
                DATASET_SOURCE_FAILURES.add(1, &[]);
            }
        }
    }

    if dataset.sources_loaded == 0 {
        return Err(ReportError::NoDataSources);
    }

    dataset.records.sort();

    tracing::Span::current().record("rows", dataset.records.len());
    tracing::info!(
        rows = dataset.records.len(),
        rows_dropped = dataset.rows_dropped,
        sources_loaded = dataset.sources_loaded,
        sources_failed = dataset.sources_failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Datasets loaded"
    );

    Ok(dataset)
}

async fn load_source(
    source: &DataSource,
    http: &reqwest::Client,
) -> Result<ParsedSource, ReportError> {
    let start = Instant::now();
    tracing::info!(source = %source, "Loading dataset");

    let bytes = source.fetch(http).await?;
    let parsed = tokio::task::spawn_blocking(move || parse_cases(&bytes))
        .await
        .map_err(|e| ReportError::Ingest(format!("parser task failed: {e}")))??;

    tracing::info!(
        source = %source,
        rows = parsed.records.len(),
        rows_dropped = parsed.rows_dropped,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Dataset parsed"
    );

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let mut body = String::from("DT_SIN_PRI;EVOLUCAO;UTI;VACINA_COV\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_merges_sources_in_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", &["2024-12-02;1;2;2", "2024-11-01;2;1;1"]);
        let b = write_csv(dir.path(), "b.csv", &["2024-10-15;1;2;2", "bad;1;1;1"]);

        let forward = load_multiple(
            vec![DataSource::Local(a.clone()), DataSource::Local(b.clone())],
            reqwest::Client::new(),
            4,
        )
        .await
        .unwrap();
        let backward = load_multiple(
            vec![DataSource::Local(b), DataSource::Local(a)],
            reqwest::Client::new(),
            1,
        )
        .await
        .unwrap();

        assert_eq!(forward.sources_loaded, 2);
        assert_eq!(forward.sources_failed, 0);
        assert_eq!(forward.rows_dropped, 1);
        assert_eq!(forward.records.len(), 3);
        assert_eq!(forward.records, backward.records);
        let months: Vec<u32> = forward.records.iter().map(|r| r.month).collect();
        assert_eq!(months, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_failed_source_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_csv(dir.path(), "good.csv", &["2024-12-02;1;2;2"]);

        let dataset = load_multiple(
            vec![
                DataSource::Local(good),
                DataSource::Local(dir.path().join("missing.csv")),
            ],
            reqwest::Client::new(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(dataset.sources_loaded, 1);
        assert_eq!(dataset.sources_failed, 1);
        assert_eq!(dataset.records.len(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_fatal() {
        let result = load_multiple(
            vec![DataSource::Local(PathBuf::from("/nonexistent/a.csv"))],
            reqwest::Client::new(),
            4,
        )
        .await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, ReportError::NoDataSources));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_no_sources_is_fatal() {
        let result = load_multiple(Vec::new(), reqwest::Client::new(), 4).await;
        assert!(matches!(result, Err(ReportError::NoDataSources)));
    }

    async fn peak_concurrency(source_count: usize, max_workers: usize) -> usize {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let sources = (0..source_count)
            .map(|i| DataSource::Local(PathBuf::from(format!("source-{i}.csv"))))
            .collect();

        let counters = (in_flight.clone(), peak.clone());
        let dataset = load_with(sources, max_workers, move |_source| {
            let (in_flight, peak) = counters.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(ParsedSource::default())
            }
        })
        .await
        .unwrap();

        assert_eq!(dataset.sources_loaded, source_count);
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_never_exceeds_max_workers() {
        assert_eq!(peak_concurrency(8, 3).await, 3);
        assert_eq!(peak_concurrency(8, 1).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_is_capped_by_source_count() {
        assert_eq!(peak_concurrency(2, 16).await, 2);
    }
}
