use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::HTML_FILE;
use crate::error::ReportError;

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2em auto;color:#001F3F}\
table{border-collapse:collapse;width:100%}td,th{border:1px solid #AAAAAA;padding:4px 8px;text-align:left}\
th{background:#D8D8D8}section{margin-bottom:2em}.meta{color:#334C66;font-size:0.9em}\
.error{color:#7099A8;font-style:italic}";

/// Writes `report` as a self-contained HTML page into `out_dir`.
#[tracing::instrument(name = "render html", skip(report))]
pub async fn render_html(report: &Value, out_dir: &Path) -> Result<PathBuf, ReportError> {
    let charts = inline_charts(report).await;
    let html = build_document(report, &charts);

    tokio::fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(HTML_FILE);
    tokio::fs::write(&path, html).await?;
    tracing::info!(path = %path.display(), "HTML report written");
    Ok(path)
}

/// `(chart key, svg markup or error text)` in document order.
async fn inline_charts(report: &Value) -> Vec<(String, Result<String, String>)> {
    let Some(charts) = report.get("charts").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (key, chart) in charts {
        let entry = match (chart.get("image_path").and_then(Value::as_str), chart.get("error")) {
            (Some(image_path), _) => tokio::fs::read_to_string(image_path)
                .await
                .map_err(|err| format!("chart image unavailable: {err}")),
            (None, Some(error)) => Err(text(error)),
            (None, None) => Err("chart unavailable".to_string()),
        };
        out.push((key.clone(), entry));
    }
    out
}

fn build_document(report: &Value, charts: &[(String, Result<String, String>)]) -> String {
    let meta = &report["report_metadata"];
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{0}</title><style>{STYLE}</style></head><body>\
         <h1>{0}</h1><p class=\"meta\">Generated {1} by {2}</p>",
        escape(&text(&meta["report_type"])),
        escape(&text(&meta["generation_date"])),
        escape(&text(&meta["generated_by"])),
    );

    section(&mut html, "Executive summary", &report["executive_summary"]);

    html.push_str("<section><h2>Indicators</h2>");
    match report.get("metrics").and_then(Value::as_object) {
        Some(metrics) if !metrics.is_empty() => {
            for (name, result) in metrics {
                let _ = write!(html, "<h3>{}</h3>", escape(&title_case(name)));
                html.push_str(&key_value_table(result));
            }
        }
        _ => html.push_str("<p class=\"error\">No indicators available</p>"),
    }
    html.push_str("</section>");

    section(&mut html, "Indicators and news", &report["summary_metrics"]);

    html.push_str("<section><h2>Charts</h2>");
    if charts.is_empty() {
        html.push_str("<p class=\"error\">No charts available</p>");
    }
    for (key, chart) in charts {
        let _ = write!(html, "<h3>{}</h3>", escape(&title_case(key)));
        match chart {
            Ok(svg) => html.push_str(svg),
            Err(error) => {
                let _ = write!(html, "<p class=\"error\">{}</p>", escape(error));
            }
        }
    }
    html.push_str("</section>");

    section(&mut html, "Charts and news", &report["summary_charts"]);

    html.push_str("<section><h2>News</h2>");
    match report["news_analysis"]["articles"].as_array() {
        Some(articles) if !articles.is_empty() => {
            html.push_str("<ul>");
            for article in articles {
                let url = text(&article["url"]);
                let _ = write!(
                    html,
                    "<li><a href=\"{}\">{}</a> <span class=\"meta\">{} {}</span><br>{}</li>",
                    escape(&url),
                    escape(&text(&article["title"])),
                    escape(&text(&article["source"])),
                    escape(&text(&article["date"])),
                    escape(&text(&article["summary"])),
                );
            }
            html.push_str("</ul>");
        }
        _ => html.push_str("<p class=\"error\">No news available</p>"),
    }
    html.push_str("</section>");

    if let Some(id) = meta.get("report_id").and_then(Value::as_str) {
        let _ = write!(html, "<p class=\"meta\">Report {}</p>", escape(id));
    }
    html.push_str("</body></html>");
    html
}

fn section(html: &mut String, heading: &str, body: &Value) {
    let body = text(body);
    let body = if body.is_empty() {
        "<span class=\"error\">Not available</span>".to_string()
    } else {
        escape(&body).replace('\n', "<br>")
    };
    let _ = write!(html, "<section><h2>{heading}</h2><p>{body}</p></section>");
}

fn key_value_table(value: &Value) -> String {
    let Some(fields) = value.as_object() else {
        return format!("<p>{}</p>", escape(&text(value)));
    };
    let mut table = String::from("<table>");
    for (key, field) in fields {
        let _ = write!(
            table,
            "<tr><th>{}</th><td>{}</td></tr>",
            escape(&title_case(key)),
            escape(&display_value(field)),
        );
    }
    table.push_str("</table>");
    table
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        other => text(other),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn title_case(key: &str) -> String {
    let mut words = key.split('_').filter(|w| !w.is_empty());
    let mut out = String::new();
    if let Some(first) = words.next() {
        let mut chars = first.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    for word in words {
        out.push(' ');
        out.push_str(word);
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
