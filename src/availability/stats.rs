//! Aggregation of a result set into summary figures.

use serde::Serialize;
use tdigests::TDigest;

use super::models::{DeviceAvailabilityResult, DeviceAvailabilityStats};
use crate::db::get_tdigest_stats;

/// Max centroids kept for response time digests
const DIGEST_CENTROIDS: usize = 100;

/// Reduce a result set into availability counts.
pub fn summarize(results: Option<&[DeviceAvailabilityResult]>) -> DeviceAvailabilityStats {
    let results = match results {
        Some(r) if !r.is_empty() => r,
        _ => return DeviceAvailabilityStats::default(),
    };

    let total = results.len() as u64;
    let available = results.iter().filter(|r| r.is_available).count() as u64;

    DeviceAvailabilityStats {
        total_devices: total,
        available_devices: available,
        unavailable_devices: total - available,
        uptime_percent: ((available * 100 + total / 2) / total) as u32,
    }
}

/// Build a digest of response times reported by reachable devices.
pub fn latency_digest(results: &[DeviceAvailabilityResult]) -> Option<TDigest> {
    let values: Vec<f64> = results
        .iter()
        .filter(|r| r.is_available)
        .filter_map(|r| r.response_time)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect();

    if values.is_empty() {
        return None;
    }

    let mut td = TDigest::from_values(values);
    td.compress(DIGEST_CENTROIDS);
    Some(td)
}

/// Response time distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    pub fn from_digest(td: &TDigest) -> Self {
        let (min, max, sum, count) = get_tdigest_stats(td);
        if count <= 0.0 {
            return Self::default();
        }

        Self {
            samples: count.round() as u64,
            min_ms: sanitize_float(min),
            max_ms: sanitize_float(max),
            mean_ms: sanitize_float(sum / count),
            p50_ms: sanitize_float(td.estimate_quantile(0.50)),
            p95_ms: sanitize_float(td.estimate_quantile(0.95)),
            p99_ms: sanitize_float(td.estimate_quantile(0.99)),
        }
    }

    pub fn from_results(results: &[DeviceAvailabilityResult]) -> Self {
        latency_digest(results)
            .map(|td| Self::from_digest(&td))
            .unwrap_or_default()
    }
}

fn sanitize_float(f: f64) -> f64 {
    if f.is_nan() || f.is_infinite() {
        0.0
    } else {
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: i64, available: bool, response_time: Option<f64>) -> DeviceAvailabilityResult {
        DeviceAvailabilityResult {
            device_id: id,
            device_name: String::new(),
            is_available: available,
            response_time,
            check_method: "tcp".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            error: None,
        }
    }

    #[test]
    fn test_empty_is_all_zero() {
        assert_eq!(summarize(None), DeviceAvailabilityStats::default());
        assert_eq!(summarize(Some(&[])), DeviceAvailabilityStats::default());
    }

    #[test]
    fn test_two_of_three_rounds_up() {
        let rs = vec![
            result(1, true, Some(1.0)),
            result(2, true, Some(2.0)),
            result(3, false, None),
        ];
        assert_eq!(
            summarize(Some(&rs)),
            DeviceAvailabilityStats {
                total_devices: 3,
                available_devices: 2,
                unavailable_devices: 1,
                uptime_percent: 67,
            }
        );
    }

    #[test]
    fn test_counts_add_up_and_percent_in_range() {
        for total in 1..=40i64 {
            for up in 0..=total {
                let rs: Vec<_> = (0..total).map(|i| result(i, i < up, None)).collect();
                let stats = summarize(Some(&rs));
                assert_eq!(stats.available_devices + stats.unavailable_devices, stats.total_devices);
                assert!(stats.uptime_percent <= 100);
                assert_eq!(stats.uptime_percent == 0, up * 200 < total, "{}/{}", up, total);
                assert_eq!(stats.uptime_percent == 100, (total - up) * 200 <= total, "{}/{}", up, total);
            }
        }
    }

    #[test]
    fn test_half_rounds_up() {
        let rs: Vec<_> = (0..8).map(|i| result(i, i == 0, None)).collect();
        // 12.5% -> 13
        assert_eq!(summarize(Some(&rs)).uptime_percent, 13);
    }

    #[test]
    fn test_latency_ignores_unavailable_devices() {
        let rs = vec![
            result(1, true, Some(10.0)),
            result(2, true, Some(20.0)),
            result(3, true, Some(30.0)),
            result(4, false, Some(9000.0)),
            result(5, true, None),
        ];
        let summary = LatencySummary::from_results(&rs);
        assert_eq!(summary.samples, 3);
        assert!((summary.min_ms - 10.0).abs() < 0.01);
        assert!((summary.max_ms - 30.0).abs() < 0.01);
        assert!((summary.mean_ms - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_latency_without_samples_is_default() {
        let rs = vec![result(1, false, None)];
        assert!(latency_digest(&rs).is_none());
        assert_eq!(LatencySummary::from_results(&rs), LatencySummary::default());
    }
}
