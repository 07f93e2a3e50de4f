//! Availability data types shared with the backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device's latest known check outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAvailabilityResult {
    pub device_id: i64,
    #[serde(default)]
    pub device_name: String,
    pub is_available: bool,
    /// Latency in milliseconds, absent on failure
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub check_method: String,
    /// ISO-8601 instant, kept as sent by the backend
    pub timestamp: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceAvailabilityResult {
    /// The check time, or `None` when the backend sent something unparsable.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// State of a bulk check run on the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub in_progress: bool,
    #[serde(default)]
    pub completed_count: u64,
    #[serde(default)]
    pub total_count: u64,
    /// Epoch seconds
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_total_seconds: Option<f64>,
}

impl CheckStatus {
    /// Completion as a whole percentage in `[0, 100]`.
    pub fn progress_percent(&self) -> u32 {
        if self.total_count == 0 {
            return 0;
        }
        let done = self.completed_count.min(self.total_count);
        ((done * 100 + self.total_count / 2) / self.total_count) as u32
    }
}

/// Summary counts over a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAvailabilityStats {
    pub total_devices: u64,
    pub available_devices: u64,
    pub unavailable_devices: u64,
    pub uptime_percent: u32,
}

/// A single row of a device's check history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityCheck {
    pub id: i64,
    pub device_id: i64,
    pub timestamp: String,
    pub is_available: bool,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub check_method: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Per-device series prepared by the backend for charting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityChartData {
    pub device_id: i64,
    #[serde(default)]
    pub timestamps: Vec<String>,
    /// 1 for available, 0 for unavailable
    #[serde(default)]
    pub availability: Vec<u8>,
    #[serde(default)]
    pub response_times: Vec<Option<f64>>,
    #[serde(default)]
    pub daily_uptime: Vec<f64>,
    #[serde(default)]
    pub daily_dates: Vec<String>,
    #[serde(default)]
    pub total_uptime_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySettings {
    pub check_interval_minutes: u32,
}

/// Reply to an on-demand check of one device.
///
/// The backend answers with an error object instead of a result when the
/// device is unknown or cannot be checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceCheckOutcome {
    Checked(DeviceAvailabilityResult),
    Rejected { error: String },
}

/// Backend reply to a check trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunChecksResponse {
    pub message: String,
    #[serde(default)]
    pub status: Option<CheckStatus>,
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and naive ISO-8601 forms (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    None
}
