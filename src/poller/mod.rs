//! Poller that keeps the shared availability view current.
//!
//! The snapshot is refreshed on a slow interval. While the backend reports a
//! check run in progress, status and partial results are fetched on the fast
//! stream interval. When the run completes the stream is discarded and the
//! snapshot is fetched once more.

mod retention;

pub use retention::*;

use crate::availability::{
    latency_digest, summarize, CheckStatus, RunChecksResponse, SharedView,
};
use crate::client::{AvailabilityClient, ClientError};
use crate::config::ServerConfig;
use crate::db::{serialize_tdigest, CheckRun, Store};

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// Polling intervals.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub snapshot_interval: Duration,
    pub stream_interval: Duration,
}

impl From<&ServerConfig> for PollerConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            snapshot_interval: cfg.snapshot_interval,
            stream_interval: cfg.stream_interval,
        }
    }
}

/// Owns the background polling task.
pub struct Poller {
    client: AvailabilityClient,
    store: Arc<Store>,
    view: SharedView,
    config: PollerConfig,
    wake: Notify,
    /// Set by a trigger so the next wake follows the run to its end
    triggered: AtomicBool,
    stop: broadcast::Sender<()>,
}

impl Poller {
    pub fn new(
        client: AvailabilityClient,
        store: Arc<Store>,
        view: SharedView,
        config: PollerConfig,
    ) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            client,
            store,
            view,
            config,
            wake: Notify::new(),
            triggered: AtomicBool::new(false),
            stop,
        }
    }

    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    /// Start the polling loop in the background.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let poller = self.clone();
        let stop_rx = self.stop.subscribe();
        tokio::spawn(async move { poller.run(stop_rx).await })
    }

    /// Stop the polling loop.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    /// Ask the loop to re-read run status now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Trigger a bulk check on the backend and start following it.
    pub async fn trigger_check(&self, max_concurrent: u32) -> Result<RunChecksResponse, ClientError> {
        let response = self.client.run_checks(max_concurrent).await?;
        tracing::info!("Check triggered: {}", response.message);

        if let Some(status) = &response.status {
            self.view.write().await.set_status(status.clone());
        }
        self.triggered.store(true, Ordering::SeqCst);
        self.wake();

        Ok(response)
    }

    async fn run(&self, mut stop_rx: broadcast::Receiver<()>) {
        tracing::info!(
            "Poller started against {} (snapshot every {:?}, stream every {:?})",
            self.client.base_url(),
            self.config.snapshot_interval,
            self.config.stream_interval
        );

        // Stagger startup so restarted instances don't hit the backend together
        let jitter = rand::random::<u64>() % 250;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let mut tracking = self.follow_status().await;

        let mut snapshot_tick = tokio::time::interval(self.config.snapshot_interval);
        snapshot_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stream_tick = tokio::time::interval(self.config.stream_interval);
        stream_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    break;
                }
                _ = snapshot_tick.tick() => {
                    if let Err(e) = self.refresh_snapshot().await {
                        tracing::error!("Snapshot refresh failed: {}", e);
                    }
                }
                _ = stream_tick.tick(), if tracking => {
                    match self.poll_stream().await {
                        Ok(running) => tracking = running,
                        Err(e) => tracing::error!("Stream poll failed: {}", e),
                    }
                }
                _ = self.wake.notified() => {
                    // A triggered run that already finished still goes through
                    // poll_stream so the snapshot is re-fetched and the run recorded
                    let triggered = self.triggered.swap(false, Ordering::SeqCst);
                    tracking = self.follow_status().await || tracking || triggered;
                    if tracking {
                        stream_tick.reset();
                    }
                }
            }
        }

        tracing::info!("Poller stopped");
    }

    /// Fetch status once; true when a run is in progress.
    async fn follow_status(&self) -> bool {
        match self.refresh_status().await {
            Ok(status) => status.in_progress,
            Err(e) => {
                tracing::warn!("Status fetch failed: {}", e);
                false
            }
        }
    }

    pub async fn refresh_status(&self) -> Result<CheckStatus, ClientError> {
        match self.client.status().await {
            Ok(status) => {
                self.view.write().await.set_status(status.clone());
                Ok(status)
            }
            Err(e) => {
                self.view.write().await.record_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Replace the snapshot and record a stats sample.
    pub async fn refresh_snapshot(&self) -> Result<(), ClientError> {
        let latest = match self.client.latest().await {
            Ok(l) => l,
            Err(e) => {
                self.view.write().await.record_error(e.to_string());
                return Err(e);
            }
        };

        let merged = {
            let mut view = self.view.write().await;
            view.set_snapshot(latest);
            view.merged()
        };

        let stats = summarize(Some(&merged));
        let digest = latency_digest(&merged)
            .map(|td| serialize_tdigest(&td))
            .unwrap_or_default();

        tracing::debug!(
            "Snapshot refreshed: {}/{} devices available",
            stats.available_devices,
            stats.total_devices
        );

        if let Err(e) = self.store.add_sample(Utc::now(), &stats, &digest) {
            tracing::error!("Failed to record stats sample: {}", e);
        }

        Ok(())
    }

    /// One stream tick. Returns whether the run is still in progress.
    pub async fn poll_stream(&self) -> Result<bool, ClientError> {
        let (status, results) = tokio::join!(self.client.status(), self.client.results());

        let status = match status {
            Ok(s) => s,
            Err(e) => {
                self.view.write().await.record_error(e.to_string());
                return Err(e);
            }
        };

        if !status.in_progress {
            self.finish_run(status).await;
            return Ok(false);
        }

        let mut view = self.view.write().await;
        view.set_status(status);
        match results {
            Ok(r) => view.set_stream(r),
            Err(e) => {
                tracing::warn!("Partial results fetch failed: {}", e);
                view.record_error(e.to_string());
            }
        }

        Ok(true)
    }

    async fn finish_run(&self, status: CheckStatus) {
        tracing::info!(
            "Check run finished: {}/{} devices checked",
            status.completed_count,
            status.total_count
        );

        {
            let mut view = self.view.write().await;
            view.set_status(status.clone());
            view.clear_stream();
        }

        // Stream is gone, so the recorded sample reflects the final snapshot only
        if let Err(e) = self.refresh_snapshot().await {
            tracing::error!("Snapshot refresh after run failed: {}", e);
        }

        let uptime_percent = summarize(self.view.read().await.snapshot()).uptime_percent;

        let run = CheckRun {
            id: 0,
            started_at: status.start_time.and_then(epoch_to_datetime),
            finished_at: Utc::now(),
            total_count: status.total_count,
            completed_count: status.completed_count,
            uptime_percent,
        };

        if let Err(e) = self.store.add_check_run(&run) {
            tracing::error!("Failed to record check run: {}", e);
        }
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}
