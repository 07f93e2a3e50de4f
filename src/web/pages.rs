//! Server-rendered pages.

use super::theme::Theme;
use super::{apply_filter, AppState};
use crate::availability::{summarize, DeviceAvailabilityResult, LatencySummary, Overview};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

// Templates use simple string replacement
const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const STATUS_TEMPLATE: &str = include_str!("templates/status.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default, rename = "where")]
    pub filter: Option<String>,
}

impl PageQuery {
    fn theme(&self) -> Result<Theme, Response> {
        match self.theme.as_deref() {
            None | Some("") => Ok(Theme::default()),
            Some(name) => name
                .parse()
                .map_err(|e: super::theme::UnknownTheme| {
                    (StatusCode::BAD_REQUEST, Html(escape_html(&e.to_string()))).into_response()
                }),
        }
    }
}

fn render_layout(title: &str, theme: Theme, content: &str) -> String {
    let theme_links: String = Theme::ALL
        .iter()
        .filter(|t| **t != theme)
        .map(|t| format!(r#"<a href="?theme={0}">{0}</a>"#, t.name()))
        .collect();

    LAYOUT_TEMPLATE
        .replace("{{title}}", title)
        .replace("{{theme_css}}", &theme.css_vars())
        .replace("{{theme_links}}", &theme_links)
        .replace("{{theme}}", theme.name())
        .replace("{{content}}", content)
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    let theme = match query.theme() {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let (merged, overview) = {
        let view = state.view.read().await;
        (view.merged(), view.overview())
    };

    let filter = query.filter.as_deref().unwrap_or("");
    let (rows, error) = match apply_filter(merged, Some(filter)) {
        Ok(rows) => (rows, overview.last_error.clone().map(|e| format!("Backend: {}", e))),
        Err(e) => (Vec::new(), Some(format!("Filter: {}", e))),
    };

    let content = render_dashboard(&rows, &overview, theme, filter, error.as_deref());
    Html(render_layout("Device Availability", theme, &content)).into_response()
}

fn render_dashboard(
    rows: &[DeviceAvailabilityResult],
    overview: &Overview,
    theme: Theme,
    filter: &str,
    error: Option<&str>,
) -> String {
    // Cards describe the rows shown, so they follow the filter
    let stats = summarize(Some(rows));
    let latency = LatencySummary::from_results(rows);

    let run_status = match (&overview.status, overview.progress_percent) {
        (Some(status), Some(pct)) if status.in_progress => format!(
            r#"<p class="warn">Check running: {}/{} devices ({}%)</p><div class="progress"><div style="width: {}%"></div></div>"#,
            status.completed_count, status.total_count, pct, pct
        ),
        _ => String::new(),
    };

    let error = error
        .map(|e| format!(r#"<p class="bad">{}</p>"#, escape_html(e)))
        .unwrap_or_default();

    let p50 = if latency.samples > 0 {
        format!("{:.1}", latency.p50_ms)
    } else {
        "-".to_string()
    };

    let table_rows: String = rows.iter().map(render_row).collect::<Vec<_>>().join("\n");

    DASHBOARD_TEMPLATE
        .replace("{{total}}", &stats.total_devices.to_string())
        .replace("{{available}}", &stats.available_devices.to_string())
        .replace("{{unavailable}}", &stats.unavailable_devices.to_string())
        .replace("{{uptime}}", &stats.uptime_percent.to_string())
        .replace("{{p50}}", &p50)
        .replace("{{run_status}}", &run_status)
        .replace("{{error}}", &error)
        .replace("{{theme}}", theme.name())
        .replace("{{snapshot_at}}", &format_time(overview.snapshot_at))
        .replace("{{rows}}", &table_rows)
        // User text goes in last so it is never scanned for placeholders
        .replace("{{where}}", &escape_html(filter))
}

fn render_row(r: &DeviceAvailabilityResult) -> String {
    let (class, label) = if r.is_available {
        ("ok", "Available")
    } else {
        ("bad", "Unavailable")
    };
    let response = r
        .response_time
        .map(|ms| format!("{:.1}", ms))
        .unwrap_or_else(|| "-".to_string());

    format!(
        r#"<tr><td>{}</td><td>{}</td><td class="{}">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
        r.device_id,
        escape_html(&r.device_name),
        class,
        label,
        response,
        escape_html(&r.check_method),
        escape_html(&r.timestamp),
        escape_html(r.error.as_deref().unwrap_or("")),
    )
}

// ============================================================================
// Status Page
// ============================================================================

pub async fn handle_status(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    let theme = match query.theme() {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let db_size = state.store.get_db_size_bytes().unwrap_or(0);
    let freelist_count = state.store.get_freelist_count().unwrap_or(0);
    let sample_stats = state.store.get_sample_stats().unwrap_or_default();
    let latest = state.store.latest_sample().ok().flatten().map(|s| s.time);
    let runs = state.store.get_check_runs(20).unwrap_or_default();

    let run_rows: String = runs
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}/{}</td><td>{}%</td></tr>",
                format_time(r.started_at),
                format_time(Some(r.finished_at)),
                r.completed_count,
                r.total_count,
                r.uptime_percent
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let content = STATUS_TEMPLATE
        .replace("{{db_size}}", &format_bytes(db_size))
        .replace("{{freelist_count}}", &freelist_count.to_string())
        .replace("{{sample_count}}", &sample_stats.count.to_string())
        .replace("{{digest_size}}", &format_bytes(sample_stats.digest_bytes))
        .replace("{{oldest_sample}}", &format_time(sample_stats.oldest))
        .replace("{{latest_sample}}", &format_time(latest))
        .replace("{{run_rows}}", &run_rows)
        .replace("{{backend_url}}", &escape_html(state.client.base_url()));

    Html(render_layout("availwatch status", theme, &content)).into_response()
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn format_bytes(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#10b981"/>
        <path d="M28 52 L44 68 L74 36" stroke="white" stroke-width="8" fill="none"/>
    </svg>"##;

    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        svg,
    )
}
