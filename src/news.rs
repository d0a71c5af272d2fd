use std::collections::HashSet;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::telemetry::metrics::NEWS_ARTICLES;

pub const SEARCH_TERMS: [&str; 7] = [
    "Síndrome Respiratória Aguda Grave",
    "SRAG Brasil",
    "Surto respiratório Brasil",
    "Influenza Brasil",
    "COVID-19 Brasil",
    "Gripes no Brasil",
    "Mortes por síndrome respiratória aguda grave",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
}

/// Output of the news stage. `summary` is absent only in the degraded default.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewsBundle {
    pub articles: Vec<NewsArticle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NewsBundle {
    pub fn from_articles(articles: Vec<NewsArticle>) -> Self {
        let summary = digest(&articles);
        Self {
            articles,
            summary: Some(summary),
        }
    }

    pub fn summary_or_placeholder(&self) -> &str {
        self.summary.as_deref().unwrap_or("No news analysed")
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    news: Vec<SerperItem>,
}

#[derive(Debug, Deserialize)]
struct SerperItem {
    title: Option<String>,
    snippet: Option<String>,
    source: Option<String>,
    date: Option<String>,
    link: Option<String>,
}

impl From<SerperItem> for NewsArticle {
    fn from(item: SerperItem) -> Self {
        Self {
            title: item.title,
            summary: item.snippet,
            source: item.source,
            date: item.date,
            url: item.link,
        }
    }
}

pub struct NewsSearch {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    max_results: usize,
    timeout: Duration,
}

impl NewsSearch {
    pub fn new(
        http: reqwest::Client,
        api_key: Option<String>,
        endpoint: impl Into<String>,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_key,
            endpoint: endpoint.into(),
            max_results,
            timeout,
        }
    }

    /// Queries every search term in turn. A term that fails is skipped; the
    /// call only errors when all of them failed.
    #[tracing::instrument(name = "news search", skip(self), fields(news.articles))]
    pub async fn search(&self) -> Result<Vec<NewsArticle>, ReportError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("SERPER_API_KEY not set, skipping news search");
            return Ok(Vec::new());
        };

        let mut collected = Vec::new();
        let mut failures = 0;
        for term in SEARCH_TERMS {
            match self.search_term(api_key, term).await {
                Ok(items) => collected.extend(items),
                Err(err) => {
                    failures += 1;
                    tracing::warn!(term, error = %err, "News search term failed");
                }
            }
        }

        if failures == SEARCH_TERMS.len() {
            return Err(ReportError::News(format!(
                "all {failures} search terms failed"
            )));
        }

        let articles = dedupe(collected, self.max_results);
        tracing::Span::current().record("news.articles", articles.len());
        NEWS_ARTICLES.record(articles.len() as f64, &[KeyValue::new("news.provider", "serper")]);
        tracing::info!(count = articles.len(), "Collected news articles");

        Ok(articles)
    }

    async fn search_term(&self, api_key: &str, term: &str) -> Result<Vec<NewsArticle>, ReportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": term, "type": "news" }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::News(format!("status {status} for {term:?}")));
        }

        let body: SerperResponse = response.json().await?;
        Ok(body.news.into_iter().map(NewsArticle::from).collect())
    }
}

/// Keeps the first article per URL, up to `max`.
fn dedupe(articles: Vec<NewsArticle>, max: usize) -> Vec<NewsArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.url.clone()))
        .take(max)
        .collect()
}

fn digest(articles: &[NewsArticle]) -> String {
    if articles.is_empty() {
        return "No news found".to_string();
    }
    articles
        .iter()
        .map(|a| {
            format!(
                "- [{}] {} ({}): {}",
                a.date.as_deref().unwrap_or("undated"),
                a.title.as_deref().unwrap_or("untitled"),
                a.source.as_deref().unwrap_or("unknown source"),
                a.summary.as_deref().unwrap_or(""),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
