use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("srag-report"));

// --- Pipeline Metrics ---

pub static PIPELINE_STAGE_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("pipeline.stage.duration")
        .with_description("Duration of a single pipeline stage in seconds")
        .with_unit("s")
        .build()
});

pub static PIPELINE_STAGE_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("pipeline.stage.failures")
        .with_description("Number of pipeline stages that degraded to their default output")
        .with_unit("{stage}")
        .build()
});

pub static REPORT_GENERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.generation.duration")
        .with_description("Total pipeline run duration in seconds")
        .with_unit("s")
        .build()
});

// --- Dataset Metrics ---

pub static DATASET_ROWS_LOADED: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("dataset.rows_loaded")
        .with_description("Number of case records loaded into the data store per run")
        .with_unit("{row}")
        .build()
});

pub static DATASET_SOURCE_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("dataset.source.failures")
        .with_description("Number of data sources that failed to load")
        .with_unit("{source}")
        .build()
});

pub static NEWS_ARTICLES: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("news.articles")
        .with_description("Number of unique news articles collected per run")
        .with_unit("{article}")
        .build()
});

// --- LLM Metrics ---

pub static GEN_AI_TOKEN_USAGE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.token.usage")
        .with_description("Number of tokens used per LLM call")
        .with_unit("{token}")
        .build()
});

pub static GEN_AI_OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.operation.duration")
        .with_description("Duration of LLM operations in seconds")
        .with_unit("s")
        .build()
});

pub static GEN_AI_ERROR_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.error.count")
        .with_description("Number of LLM call errors")
        .with_unit("{error}")
        .build()
});
