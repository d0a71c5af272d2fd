use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::cases::{self, Subset};
use crate::error::ReportError;
use crate::metrics::window::{YearMonth, complete_months, recent_first};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 400.0;
const MARGIN: f64 = 50.0;
const LINE_COLOR: &str = "#001F3F";
const BAR_COLOR: &str = "#334C66";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub cases: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub image_path: PathBuf,
    pub data: Vec<ChartPoint>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Chart {
    Rendered(ChartSeries),
    Unavailable { error: String },
}

impl Chart {
    pub fn description(&self) -> &str {
        match self {
            Chart::Rendered(series) => &series.description,
            Chart::Unavailable { .. } => "",
        }
    }
}

/// Output of the visualization stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_cases_chart: Option<Chart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_cases_chart: Option<Chart>,
}

impl ChartBundle {
    pub fn daily_description(&self) -> &str {
        self.daily_cases_chart.as_ref().map_or("", Chart::description)
    }

    pub fn monthly_description(&self) -> &str {
        self.monthly_cases_chart.as_ref().map_or("", Chart::description)
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Line,
    Bar,
}

#[tracing::instrument(name = "chart daily_cases", skip(pool, out_dir))]
pub async fn daily_cases_chart(
    pool: &SqlitePool,
    days: u32,
    out_dir: &Path,
) -> Result<Chart, ReportError> {
    let rows = cases::daily_counts(pool, days).await?;
    if rows.len() < 2 {
        return Ok(Chart::Unavailable {
            error: "Not enough data for the chart (minimum 2 days)".to_string(),
        });
    }

    let data: Vec<ChartPoint> = rows
        .into_iter()
        .map(|r| ChartPoint {
            label: r.day,
            cases: r.cases,
        })
        .collect();

    let title = format!("Daily SARI cases, last {days} days");
    let image_path = out_dir.join("daily_cases.svg");
    write_svg(&image_path, &title, &data, Style::Line).await?;

    let description = describe(&format!("Daily cases over the last {days} days:"), &data, "");
    Ok(Chart::Rendered(ChartSeries {
        image_path,
        data,
        description,
    }))
}

/// Monthly totals over the last `months` complete months. The newest month in
/// the data is treated as incomplete and left out, as for the indicators.
#[tracing::instrument(name = "chart monthly_cases", skip(pool, out_dir))]
pub async fn monthly_cases_chart(
    pool: &SqlitePool,
    months: u32,
    out_dir: &Path,
) -> Result<Chart, ReportError> {
    let buckets = cases::month_buckets(pool, Subset::None, i64::from(months) + 1).await?;
    let buckets = recent_first(buckets);
    if buckets.len() < 2 {
        return Ok(Chart::Unavailable {
            error: "Not enough data for the chart (minimum 2 months)".to_string(),
        });
    }

    let data: Vec<ChartPoint> = complete_months(&buckets)
        .iter()
        .rev()
        .map(|b| ChartPoint {
            label: YearMonth::of(b).to_string(),
            cases: b.total_cases,
        })
        .collect();

    let title = format!("Monthly SARI cases, last {months} months");
    let image_path = out_dir.join("monthly_cases.svg");
    write_svg(&image_path, &title, &data, Style::Bar).await?;

    let description = describe(
        &format!("Monthly cases over the last {months} months:"),
        &data,
        " cases",
    );
    Ok(Chart::Rendered(ChartSeries {
        image_path,
        data,
        description,
    }))
}

fn describe(header: &str, data: &[ChartPoint], suffix: &str) -> String {
    let mut out = header.to_string();
    for point in data {
        let _ = write!(out, "\n- {}: {}{}", point.label, point.cases, suffix);
    }
    out
}

async fn write_svg(
    path: &Path,
    title: &str,
    data: &[ChartPoint],
    style: Style,
) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_svg(title, data, style)).await?;
    tracing::info!(path = %path.display(), "Chart written");
    Ok(())
}

fn render_svg(title: &str, data: &[ChartPoint], style: Style) -> String {
    let max = data.iter().map(|p| p.cases).max().unwrap_or(0).max(1) as f64;
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let step = plot_w / data.len().max(1) as f64;
    let y_of = |cases: i64| MARGIN + plot_h - (cases as f64 / max) * plot_h;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="10">"#
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="20" text-anchor="middle" font-size="14">{}</text>"#,
        WIDTH / 2.0,
        escape_xml(title)
    );
    let _ = write!(
        svg,
        r##"<line x1="{MARGIN}" y1="{0}" x2="{1}" y2="{0}" stroke="#888"/><line x1="{MARGIN}" y1="{MARGIN}" x2="{MARGIN}" y2="{0}" stroke="#888"/>"##,
        MARGIN + plot_h,
        MARGIN + plot_w,
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
        MARGIN - 4.0,
        MARGIN + 4.0,
        max as i64
    );

    match style {
        Style::Line => {
            let points: Vec<String> = data
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{:.1},{:.1}", MARGIN + step * (i as f64 + 0.5), y_of(p.cases)))
                .collect();
            let _ = write!(
                svg,
                r#"<polyline fill="none" stroke="{LINE_COLOR}" stroke-width="2" points="{}"/>"#,
                points.join(" ")
            );
        }
        Style::Bar => {
            for (i, p) in data.iter().enumerate() {
                let y = y_of(p.cases);
                let _ = write!(
                    svg,
                    r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{BAR_COLOR}"/>"#,
                    MARGIN + step * i as f64 + step * 0.1,
                    y,
                    step * 0.8,
                    MARGIN + plot_h - y
                );
            }
        }
    }

    for (i, p) in data.iter().enumerate() {
        let x = MARGIN + step * (i as f64 + 0.5);
        let y = MARGIN + plot_h + 12.0;
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{y:.1}" text-anchor="end" transform="rotate(-45 {x:.1} {y:.1})">{}</text>"#,
            escape_xml(&p.label)
        );
    }

    svg.push_str("</svg>");
    svg
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
