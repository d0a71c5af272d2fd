use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ReportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Local(PathBuf),
    Remote(String),
}

impl DataSource {
    pub async fn fetch(&self, http: &reqwest::Client) -> Result<Vec<u8>, ReportError> {
        match self {
            DataSource::Local(path) => Ok(tokio::fs::read(path).await?),
            DataSource::Remote(url) => {
                let response = http.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Local(path) => write!(f, "{}", path.display()),
            DataSource::Remote(url) => f.write_str(url),
        }
    }
}

/// Local files win when every expected file is present; otherwise the
/// remote URLs are used.
pub fn resolve_sources(data_dir: &Path, files: &[String], urls: &[String]) -> Vec<DataSource> {
    let local: Vec<PathBuf> = files.iter().map(|f| data_dir.join(f)).collect();

    if !local.is_empty() && local.iter().all(|p| p.is_file()) {
        tracing::info!(count = local.len(), "Found all expected local CSV files");
        return local.into_iter().map(DataSource::Local).collect();
    }

    tracing::info!(count = urls.len(), "Local CSV files not found, using remote URLs");
    urls.iter().cloned().map(DataSource::Remote).collect()
}
