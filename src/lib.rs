pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod news;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod telemetry;

pub use config::Config;
pub use error::ReportError;
pub use pipeline::{Pipeline, PipelineState};
