use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ReportError;

const DEFAULT_DATA_FILES: &str = "INFLUD25-08-08-2025.csv,INFLUD24-26-06-2025.csv";
const DEFAULT_DATA_URLS: &str = "https://s3.sa-east-1.amazonaws.com/ckan.saude.gov.br/SRAG/2025/INFLUD25-04-08-2025.csv,\
https://s3.sa-east-1.amazonaws.com/ckan.saude.gov.br/SRAG/2024/INFLUD24-26-06-2025.csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub data_files: Vec<String>,
    pub data_urls: Vec<String>,
    pub load_workers: usize,
    pub source_timeout: Duration,
    pub reports_dir: PathBuf,
    pub chart_days: u32,
    pub chart_months: u32,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_timeout: Duration,
    pub report_language: String,
    pub serper_api_key: Option<String>,
    pub news_endpoint: String,
    pub news_max_results: usize,
    pub news_timeout: Duration,
    pub chrome_path: Option<PathBuf>,
    pub pdf_timeout: Duration,
    pub require_credentials: bool,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ReportError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            environment: var("ENVIRONMENT", "development"),
            database_url: var("DATABASE_URL", "sqlite:data/srag.db"),
            data_dir: PathBuf::from(var("DATA_DIR", "data")),
            data_files: split_list(&var("DATA_FILES", DEFAULT_DATA_FILES)),
            data_urls: split_list(&var("DATA_URLS", DEFAULT_DATA_URLS)),
            load_workers: parse(&lookup, "LOAD_WORKERS", 4)?,
            source_timeout: Duration::from_secs(parse(&lookup, "SOURCE_TIMEOUT_SECS", 300)?),
            reports_dir: PathBuf::from(var("REPORTS_DIR", "reports")),
            chart_days: parse(&lookup, "CHART_DAYS", 30)?,
            chart_months: parse(&lookup, "CHART_MONTHS", 12)?,
            openai_api_key: secret("OPENAI_API_KEY"),
            openai_api_base: secret("OPENAI_API_BASE"),
            llm_model: var("LLM_MODEL", "gpt-4o-mini"),
            llm_temperature: parse(&lookup, "LLM_TEMPERATURE", 0.7)?,
            llm_timeout: Duration::from_secs(parse(&lookup, "LLM_TIMEOUT_SECS", 30)?),
            report_language: var("REPORT_LANGUAGE", "Brazilian Portuguese"),
            serper_api_key: secret("SERPER_API_KEY"),
            news_endpoint: var("NEWS_ENDPOINT", "https://google.serper.dev/news"),
            news_max_results: parse(&lookup, "NEWS_MAX_RESULTS", 5)?,
            news_timeout: Duration::from_secs(parse(&lookup, "NEWS_TIMEOUT_SECS", 10)?),
            chrome_path: secret("CHROME_PATH").map(PathBuf::from),
            pdf_timeout: Duration::from_secs(parse(&lookup, "PDF_TIMEOUT_SECS", 60)?),
            require_credentials: parse(&lookup, "REQUIRE_CREDENTIALS", false)?,
            otel_service_name: var("OTEL_SERVICE_NAME", "srag-report"),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Names of the credentials that gate optional collaborators and are unset.
    pub fn missing_credentials(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY".to_string());
        }
        if self.serper_api_key.is_none() {
            missing.push("SERPER_API_KEY".to_string());
        }
        missing
    }

    /// Fails only when credentials were declared mandatory for this deployment.
    pub fn check_credentials(&self) -> Result<(), ReportError> {
        let missing = self.missing_credentials();
        if self.require_credentials && !missing.is_empty() {
            return Err(ReportError::MissingCredentials(missing));
        }
        for name in &missing {
            tracing::warn!(credential = %name, "Credential not set, collaborator will use fallback output");
        }
        Ok(())
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.reports_dir.join("charts")
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ReportError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ReportError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
