//! Database model types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::availability::DeviceAvailabilityStats;

/// One recorded aggregate of the reconciled view.
#[derive(Debug, Clone)]
pub struct StatsSample {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub stats: DeviceAvailabilityStats,
    /// Serialized response time digest, empty when no device answered
    pub latency_digest: Vec<u8>,
}

/// A finished bulk check run as observed by the poller.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRun {
    pub id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub total_count: u64,
    pub completed_count: u64,
    pub uptime_percent: u32,
}

/// Sample table statistics for the status page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleStats {
    pub count: i64,
    pub digest_bytes: i64,
    pub oldest: Option<DateTime<Utc>>,
}
