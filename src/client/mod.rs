//! REST client for the availability backend.

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::availability::{
    AvailabilityChartData, AvailabilityCheck, AvailabilitySettings, CheckStatus,
    DeviceAvailabilityResult, DeviceCheckOutcome, RunChecksResponse,
};

pub const LATEST_PATH: &str = "/availability/latest";
pub const RESULTS_PATH: &str = "/availability/results";
pub const STATUS_PATH: &str = "/availability/status";
pub const CHECK_PATH: &str = "/availability/check";
pub const SETTINGS_PATH: &str = "/availability/settings";

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("invalid response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Thin typed wrapper over the backend's availability endpoints.
#[derive(Debug, Clone)]
pub struct AvailabilityClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AvailabilityClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "backend url must start with http:// or https://: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last persisted result for every device.
    pub async fn latest(&self) -> Result<Vec<DeviceAvailabilityResult>, ClientError> {
        self.get_json(LATEST_PATH).await
    }

    /// Partial results of the run in progress.
    pub async fn results(&self) -> Result<Vec<DeviceAvailabilityResult>, ClientError> {
        self.get_json(RESULTS_PATH).await
    }

    pub async fn status(&self) -> Result<CheckStatus, ClientError> {
        self.get_json(STATUS_PATH).await
    }

    /// Start a bulk check run on the backend.
    pub async fn run_checks(&self, max_concurrent: u32) -> Result<RunChecksResponse, ClientError> {
        let path = format!("{}?maxConcurrent={}", CHECK_PATH, max_concurrent);
        let req = self.request(Method::POST, &path);
        self.send_json(req, &path).await
    }

    /// Check one device right now. The backend stores the result as well.
    pub async fn check_device(&self, device_id: i64) -> Result<DeviceCheckOutcome, ClientError> {
        self.get_json(&format!("/availability/{}/check", device_id)).await
    }

    pub async fn device_history(
        &self,
        device_id: i64,
        limit: u32,
    ) -> Result<Vec<AvailabilityCheck>, ClientError> {
        self.get_json(&format!("/availability/{}/history?limit={}", device_id, limit))
            .await
    }

    pub async fn chart_data(
        &self,
        device_id: i64,
        days: u32,
    ) -> Result<AvailabilityChartData, ClientError> {
        self.get_json(&format!("/availability/{}/chart-data?days={}", device_id, days))
            .await
    }

    pub async fn settings(&self) -> Result<AvailabilitySettings, ClientError> {
        self.get_json(SETTINGS_PATH).await
    }

    pub async fn update_settings(
        &self,
        settings: &AvailabilitySettings,
    ) -> Result<AvailabilitySettings, ClientError> {
        let req = self.request(Method::POST, SETTINGS_PATH).json(settings);
        self.send_json(req, SETTINGS_PATH).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let req = self.request(Method::GET, path);
        self.send_json(req, path).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        path: &str,
    ) -> Result<T, ClientError> {
        let response = req.send().await.map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{result, FakeBackend};
    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let err = AvailabilityClient::new("localhost:8001", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let client = AvailabilityClient::new("http://localhost:8001/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[tokio::test]
    async fn test_fetches_snapshot_stream_and_status() {
        let backend = FakeBackend::start().await;
        backend.set_snapshot(vec![result(1, true, "2024-01-01T00:00:00Z")]);
        backend.set_stream(vec![result(2, false, "2024-01-01T00:01:00Z")]);
        backend.set_status(CheckStatus {
            in_progress: true,
            completed_count: 1,
            total_count: 2,
            ..Default::default()
        });

        let client = backend.client();
        let latest = client.latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].device_id, 1);

        let results = client.results().await.unwrap();
        assert_eq!(results[0].device_id, 2);

        let status = client.status().await.unwrap();
        assert!(status.in_progress);
        assert_eq!(status.progress_percent(), 50);
    }

    #[tokio::test]
    async fn test_run_checks_sends_concurrency() {
        let backend = FakeBackend::start().await;
        let client = backend.client();

        let response = client.run_checks(25).await.unwrap();
        assert!(response.message.contains("25"));
        assert_eq!(backend.last_max_concurrent(), Some(25));
        assert!(client.status().await.unwrap().in_progress);
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let backend = FakeBackend::start().await;
        backend.fail_requests(true);

        let err = backend.client().latest().await.unwrap_err();
        match err {
            ClientError::Status { status, path } => {
                assert_eq!(status, 503);
                assert_eq!(path, LATEST_PATH);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = AvailabilityClient::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let err = client.latest().await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_) | ClientError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_settings_roundtrip_through_backend() {
        let backend = FakeBackend::start().await;
        let client = backend.client();

        assert_eq!(client.settings().await.unwrap().check_interval_minutes, 15);
        let updated = client
            .update_settings(&AvailabilitySettings { check_interval_minutes: 5 })
            .await
            .unwrap();
        assert_eq!(updated.check_interval_minutes, 5);
        assert_eq!(client.settings().await.unwrap().check_interval_minutes, 5);
    }

    #[tokio::test]
    async fn test_device_history() {
        let backend = FakeBackend::start().await;
        let history = backend.client().device_history(7, 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|h| h.device_id == 7));
    }

    #[tokio::test]
    async fn test_check_device() {
        let backend = FakeBackend::start().await;
        backend.set_snapshot(vec![result(3, false, "2024-01-01T00:00:00Z")]);
        let client = backend.client();

        match client.check_device(3).await.unwrap() {
            DeviceCheckOutcome::Checked(r) => {
                assert_eq!(r.device_id, 3);
                assert!(r.is_available);
            }
            other => panic!("expected a result, got {:?}", other),
        }

        assert!(matches!(
            client.check_device(99).await.unwrap(),
            DeviceCheckOutcome::Rejected { .. }
        ));
    }
}
