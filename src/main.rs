//! availwatch - device availability monitor
//!
//! Follows an availability backend, reconciles its persisted snapshot with
//! the partial results of a running check, and serves the combined view.

mod availability;
mod client;
mod condition;
mod config;
mod db;
mod poller;
mod web;

use availability::{summarize, AvailabilityView, LatencySummary};
use client::AvailabilityClient;
use condition::Condition;
use config::ServerConfig;
use db::Store;
use poller::{Poller, PollerConfig, RetentionManager};
use web::{AppState, Server};

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "availwatch")]
#[command(about = "Device availability monitor", long_about = None)]
#[command(version)]
struct Cli {
    /// Availability backend base URL
    #[arg(long, global = true, env = "AVAILWATCH_BACKEND_URL")]
    backend_url: Option<String>,

    /// HTTP port for the web server
    #[arg(long, global = true, env = "AVAILWATCH_HTTP_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller and web server (default)
    Serve,

    /// Print the reconciled availability view once
    Status {
        /// Only show devices matching this condition, e.g. 'row.is_available == false'
        #[arg(long = "where")]
        filter: Option<Condition>,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Trigger a bulk check and follow it until it finishes
    Check {
        /// Concurrency passed to the backend
        #[arg(long)]
        max_concurrent: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Logs go to stderr so `status --json` output stays clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("availwatch=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = ServerConfig::load();
    if let Some(url) = cli.backend_url {
        cfg.backend_url = url;
    }
    if let Some(port) = cli.port {
        cfg.http_port = port;
    }

    let client = AvailabilityClient::new(&cfg.backend_url, cfg.request_timeout)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg, client).await,
        Commands::Status { filter, json } => print_status(&client, filter.as_ref(), json).await,
        Commands::Check { max_concurrent } => {
            let max_concurrent = max_concurrent.unwrap_or(cfg.max_concurrent);
            run_check(&cfg, &client, max_concurrent).await
        }
    }
}

async fn serve(cfg: ServerConfig, client: AvailabilityClient) -> Result<(), BoxError> {
    tracing::info!("Starting availwatch on port {}...", cfg.http_port);
    tracing::info!("Following backend at {}", cfg.backend_url);
    tracing::info!("Using database at {}", cfg.db_path);

    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let poller = Arc::new(Poller::new(
        client.clone(),
        store.clone(),
        AvailabilityView::shared(),
        PollerConfig::from(&cfg),
    ));
    let poller_task = poller.start();

    let retention = RetentionManager::new(store.clone(), cfg.history_retention);
    let retention_task = retention.start();

    let server = Server::new(AppState {
        config: cfg,
        store,
        client,
        view: poller.view(),
        poller: poller.clone(),
    });

    let result = tokio::select! {
        r = server.start() => r,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    poller.stop();
    retention.stop();
    let _ = tokio::join!(poller_task, retention_task);

    result
}

async fn print_status(
    client: &AvailabilityClient,
    filter: Option<&Condition>,
    json: bool,
) -> Result<(), BoxError> {
    let (latest, status) = tokio::join!(client.latest(), client.status());
    let status = status?;

    let mut view = AvailabilityView::default();
    view.set_snapshot(latest?);
    if status.in_progress {
        view.set_stream(client.results().await?);
    }
    view.set_status(status.clone());
    let running = view.is_check_running();

    let rows = match filter {
        Some(c) => {
            tracing::debug!("Filtering with {}", c);
            c.filter(view.merged())
        }
        None => view.merged(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let stats = summarize(Some(&rows));
    let latency = LatencySummary::from_results(&rows);

    println!(
        "{} devices, {} available, {} unavailable, {}% uptime",
        stats.total_devices, stats.available_devices, stats.unavailable_devices, stats.uptime_percent
    );
    if latency.samples > 0 {
        println!(
            "response time p50 {:.1} ms, p95 {:.1} ms, max {:.1} ms",
            latency.p50_ms, latency.p95_ms, latency.max_ms
        );
    }
    if running {
        println!(
            "check running: {}/{} ({}%)",
            status.completed_count,
            status.total_count,
            status.progress_percent()
        );
    }
    println!();

    for r in &rows {
        let response = r
            .response_time
            .map(|ms| format!("{:.1} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<30}  {:<4}  {:>10}  {}  {}",
            r.device_id,
            r.device_name,
            if r.is_available { "up" } else { "DOWN" },
            response,
            r.timestamp,
            r.error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

async fn run_check(
    cfg: &ServerConfig,
    client: &AvailabilityClient,
    max_concurrent: u32,
) -> Result<(), BoxError> {
    let response = client.run_checks(max_concurrent).await?;
    println!("{}", response.message);

    let mut interval = tokio::time::interval(cfg.stream_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let status = match client.status().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Status fetch failed: {}", e);
                continue;
            }
        };

        println!(
            "{}/{} devices checked ({}%)",
            status.completed_count,
            status.total_count,
            status.progress_percent()
        );

        if !status.in_progress {
            break;
        }
    }

    let stats = summarize(Some(&client.latest().await?));
    println!(
        "done: {}/{} available, {}% uptime",
        stats.available_devices, stats.total_devices, stats.uptime_percent
    );

    Ok(())
}
