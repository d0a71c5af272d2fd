use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::PDF_FILE;
use crate::error::ReportError;

const BROWSER_NAMES: [&str; 5] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Explicit `configured` path when given, otherwise the first Chromium-like
/// binary on `PATH`.
pub fn find_browser(configured: Option<&Path>) -> Result<PathBuf, ReportError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ReportError::Render(format!(
            "configured browser {} does not exist",
            path.display()
        )));
    }

    BROWSER_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| ReportError::Render("no headless Chromium found on PATH".to_string()))
}

/// Prints `html_path` to `out_dir/srag_report.pdf` with a headless browser.
#[tracing::instrument(name = "render pdf", skip(browser))]
pub async fn render_pdf(
    browser: &Path,
    html_path: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, ReportError> {
    if !html_path.is_file() {
        return Err(ReportError::Render(format!(
            "HTML report {} not found",
            html_path.display()
        )));
    }

    tokio::fs::create_dir_all(out_dir).await?;
    let html_path = tokio::fs::canonicalize(html_path).await?;
    let pdf_path = tokio::fs::canonicalize(out_dir).await?.join(PDF_FILE);

    // Only a file written by this browser run counts as output.
    match tokio::fs::remove_file(&pdf_path).await {
        Ok(()) => tracing::debug!(path = %pdf_path.display(), "Removed previous PDF"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let mut command = Command::new(browser);
    command
        .arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-pdf-header-footer")
        .arg(format!("--print-to-pdf={}", pdf_path.display()))
        .arg(format!("file://{}", html_path.display()))
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(ReportError::Render(format!(
                "browser did not finish within {}s",
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        return Err(ReportError::Render(format!(
            "browser exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    if !pdf_path.is_file() {
        return Err(ReportError::Render("browser produced no PDF".to_string()));
    }

    tracing::info!(path = %pdf_path.display(), "PDF report written");
    Ok(pdf_path)
}
