//! In-process stand-in for the availability backend, used by tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::AvailabilityClient;
use crate::availability::{
    AvailabilityChartData, AvailabilityCheck, AvailabilitySettings, CheckStatus,
    DeviceAvailabilityResult, DeviceCheckOutcome, RunChecksResponse,
};

#[derive(Default)]
struct FakeState {
    snapshot: Vec<DeviceAvailabilityResult>,
    stream: Vec<DeviceAvailabilityResult>,
    status: CheckStatus,
    settings_minutes: u32,
    failing: bool,
    latest_hits: usize,
    results_hits: usize,
    last_max_concurrent: Option<u32>,
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeBackend {
    addr: SocketAddr,
    state: Shared,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState {
            settings_minutes: 15,
            ..Default::default()
        }));

        let router = Router::new()
            .route("/availability/latest", get(latest))
            .route("/availability/results", get(results))
            .route("/availability/status", get(status))
            .route("/availability/check", post(run_checks))
            .route("/availability/settings", get(settings).post(update_settings))
            .route("/availability/{id}/check", get(check_device))
            .route("/availability/{id}/history", get(history))
            .route("/availability/{id}/chart-data", get(chart_data))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> AvailabilityClient {
        AvailabilityClient::new(&self.url(), Duration::from_secs(5)).unwrap()
    }

    pub fn set_snapshot(&self, results: Vec<DeviceAvailabilityResult>) {
        self.state.lock().unwrap().snapshot = results;
    }

    pub fn set_stream(&self, results: Vec<DeviceAvailabilityResult>) {
        self.state.lock().unwrap().stream = results;
    }

    pub fn set_status(&self, status: CheckStatus) {
        self.state.lock().unwrap().status = status;
    }

    /// Mark the run finished and publish its results as the new snapshot.
    pub fn finish_run(&self) {
        let mut state = self.state.lock().unwrap();
        let finished = std::mem::take(&mut state.stream);
        for r in finished {
            match state.snapshot.iter_mut().find(|s| s.device_id == r.device_id) {
                Some(existing) => *existing = r,
                None => state.snapshot.push(r),
            }
        }
        state.status.in_progress = false;
        state.status.completed_count = state.status.total_count;
    }

    pub fn fail_requests(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn latest_hits(&self) -> usize {
        self.state.lock().unwrap().latest_hits
    }

    pub fn results_hits(&self) -> usize {
        self.state.lock().unwrap().results_hits
    }

    pub fn last_max_concurrent(&self) -> Option<u32> {
        self.state.lock().unwrap().last_max_concurrent
    }
}

pub fn result(id: i64, available: bool, ts: &str) -> DeviceAvailabilityResult {
    DeviceAvailabilityResult {
        device_id: id,
        device_name: format!("device-{}", id),
        is_available: available,
        response_time: if available { Some(10.0 * id as f64) } else { None },
        check_method: "ping".to_string(),
        timestamp: ts.to_string(),
        error: if available { None } else { Some("timeout".to_string()) },
    }
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "backend unavailable").into_response()
}

async fn latest(State(state): State<Shared>) -> Response {
    let mut state = state.lock().unwrap();
    state.latest_hits += 1;
    if state.failing {
        return unavailable();
    }
    Json(state.snapshot.clone()).into_response()
}

async fn results(State(state): State<Shared>) -> Response {
    let mut state = state.lock().unwrap();
    state.results_hits += 1;
    if state.failing {
        return unavailable();
    }
    Json(state.stream.clone()).into_response()
}

async fn status(State(state): State<Shared>) -> Response {
    let state = state.lock().unwrap();
    if state.failing {
        return unavailable();
    }
    Json(state.status.clone()).into_response()
}

async fn run_checks(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let max_concurrent = params
        .get("maxConcurrent")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    state.last_max_concurrent = Some(max_concurrent);

    let total = state.snapshot.len().max(1) as u64;
    state.status = CheckStatus {
        in_progress: true,
        completed_count: 0,
        total_count: total,
        start_time: Some(1_700_000_000.0),
        ..Default::default()
    };

    Json(RunChecksResponse {
        message: format!(
            "Started availability checks for {} devices with max concurrency {}",
            total, max_concurrent
        ),
        status: Some(state.status.clone()),
    })
    .into_response()
}

/// Known devices come back available; unknown ids get the backend's error object.
async fn check_device(State(state): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = state.lock().unwrap();
    if state.failing {
        return unavailable();
    }
    let outcome = match state.snapshot.iter().find(|r| r.device_id == id) {
        Some(_) => DeviceCheckOutcome::Checked(result(id, true, "2024-01-01T00:10:00Z")),
        None => DeviceCheckOutcome::Rejected {
            error: "Device not found".to_string(),
        },
    };
    Json(outcome).into_response()
}

async fn settings(State(state): State<Shared>) -> Json<AvailabilitySettings> {
    let state = state.lock().unwrap();
    Json(AvailabilitySettings {
        check_interval_minutes: state.settings_minutes,
    })
}

async fn update_settings(
    State(state): State<Shared>,
    Json(update): Json<AvailabilitySettings>,
) -> Json<AvailabilitySettings> {
    let mut state = state.lock().unwrap();
    state.settings_minutes = update.check_interval_minutes;
    Json(update)
}

async fn history(
    Path(id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<AvailabilityCheck>> {
    let limit: i64 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);
    Json(
        (0..limit)
            .map(|i| AvailabilityCheck {
                id: i + 1,
                device_id: id,
                timestamp: format!("2024-01-01T00:{:02}:00", i % 60),
                is_available: i % 2 == 0,
                response_time: Some(5.0),
                check_method: "ping".to_string(),
                error_message: None,
            })
            .collect(),
    )
}

async fn chart_data(
    Path(id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<AvailabilityChartData> {
    let days: usize = params.get("days").and_then(|v| v.parse().ok()).unwrap_or(7);
    Json(AvailabilityChartData {
        device_id: id,
        timestamps: vec![],
        availability: vec![],
        response_times: vec![],
        daily_uptime: vec![100.0; days],
        daily_dates: (0..days).map(|d| format!("2024-01-{:02}", d + 1)).collect(),
        total_uptime_percent: 100.0,
    })
}
