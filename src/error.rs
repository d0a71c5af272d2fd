use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No data sources could be loaded")]
    NoDataSources,

    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("News search error: {0}")]
    News(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Fatal errors abort the run before (or instead of) the pipeline; every
    /// other variant is absorbed at a stage boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::NoDataSources
                | ReportError::MissingCredentials(_)
                | ReportError::Config(_)
        )
    }
}
