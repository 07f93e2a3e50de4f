//! Live availability state shared between the poller and its readers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::models::{CheckStatus, DeviceAvailabilityResult, DeviceAvailabilityStats};
use super::reconcile::merge;
use super::stats::{summarize, LatencySummary};

/// Handle to the view. The poller writes, everything else reads.
pub type SharedView = Arc<RwLock<AvailabilityView>>;

/// The two live input lists plus run status.
///
/// The merged list is derived on every read and never stored.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityView {
    snapshot: Option<Vec<DeviceAvailabilityResult>>,
    stream: Option<Vec<DeviceAvailabilityResult>>,
    status: Option<CheckStatus>,
    snapshot_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl AvailabilityView {
    pub fn shared() -> SharedView {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn set_snapshot(&mut self, results: Vec<DeviceAvailabilityResult>) {
        self.snapshot = Some(results);
        self.snapshot_at = Some(Utc::now());
        self.last_error = None;
    }

    pub fn set_stream(&mut self, results: Vec<DeviceAvailabilityResult>) {
        self.stream = Some(results);
    }

    /// Drop streamed results once a run is over.
    pub fn clear_stream(&mut self) {
        self.stream = None;
    }

    pub fn set_status(&mut self, status: CheckStatus) {
        self.status = Some(status);
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn is_check_running(&self) -> bool {
        self.status.as_ref().map(|s| s.in_progress).unwrap_or(false)
    }

    pub fn snapshot(&self) -> Option<&[DeviceAvailabilityResult]> {
        self.snapshot.as_deref()
    }

    pub fn stream(&self) -> Option<&[DeviceAvailabilityResult]> {
        self.stream.as_deref()
    }

    pub fn merged(&self) -> Vec<DeviceAvailabilityResult> {
        merge(self.snapshot.as_deref(), self.stream.as_deref())
    }

    pub fn overview(&self) -> Overview {
        let merged = self.merged();
        Overview {
            stats: summarize(Some(&merged)),
            latency: LatencySummary::from_results(&merged),
            status: self.status.clone(),
            progress_percent: self.status.as_ref().map(CheckStatus::progress_percent),
            partial_results: self.stream().map(<[_]>::len),
            snapshot_at: self.snapshot_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Aggregate picture of the current view.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub stats: DeviceAvailabilityStats,
    pub latency: LatencySummary,
    pub status: Option<CheckStatus>,
    pub progress_percent: Option<u32>,
    /// Devices reported so far by the running check
    pub partial_results: Option<usize>,
    pub snapshot_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
