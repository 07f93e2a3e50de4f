//! Web server module.

mod handlers;
mod pages;
pub mod theme;

pub use handlers::*;
pub use pages::*;

use crate::availability::SharedView;
use crate::client::AvailabilityClient;
use crate::config::ServerConfig;
use crate::db::Store;
use crate::poller::Poller;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub client: AvailabilityClient,
    pub view: SharedView,
    pub poller: Arc<Poller>,
}

/// Web server for availwatch.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        Router::new()
            // Pages
            .route("/", get(pages::handle_dashboard))
            .route("/status", get(pages::handle_status))
            // Reconciled view
            .route("/api/availability", get(handlers::handle_get_availability))
            .route("/api/availability/stats", get(handlers::handle_get_stats))
            .route("/api/availability/status", get(handlers::handle_get_overview))
            .route("/api/availability/check", post(handlers::handle_run_checks))
            // Local history
            .route("/api/history", get(handlers::handle_get_history))
            .route("/api/runs", get(handlers::handle_get_runs))
            // Backend passthrough
            .route("/api/devices/{id}/check", get(handlers::handle_check_device))
            .route("/api/devices/{id}/history", get(handlers::handle_device_history))
            .route("/api/devices/{id}/chart-data", get(handlers::handle_device_chart))
            .route(
                "/api/settings",
                get(handlers::handle_get_settings).post(handlers::handle_update_settings),
            )
            // Static assets
            .route("/favicon.ico", get(pages::handle_favicon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web server listening on {}", addr);
        self.serve(listener).await
    }

    async fn serve(
        &self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        axum::serve(listener, self.routes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::{AvailabilityView, DeviceAvailabilityResult};
    use crate::client::fake::{result, FakeBackend};
    use crate::poller::PollerConfig;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    async fn spawn_server(backend: &FakeBackend, db: &NamedTempFile) -> (String, AppState) {
        let store = Arc::new(Store::new(db.path()).unwrap());
        let view = AvailabilityView::shared();
        let poller = Arc::new(Poller::new(
            backend.client(),
            store.clone(),
            view.clone(),
            PollerConfig {
                snapshot_interval: Duration::from_secs(3600),
                stream_interval: Duration::from_secs(3600),
            },
        ));
        let state = AppState {
            config: ServerConfig::default(),
            store,
            client: backend.client(),
            view,
            poller,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = Server::new(state.clone());
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        (url, state)
    }

    #[tokio::test]
    async fn test_routes_end_to_end() {
        let backend = FakeBackend::start().await;
        let db = NamedTempFile::new().unwrap();
        let (url, state) = spawn_server(&backend, &db).await;

        state.view.write().await.set_snapshot(vec![
            result(1, true, "2024-01-01T00:00:00Z"),
            result(2, false, "2024-01-01T00:00:00Z"),
        ]);

        let http = reqwest::Client::new();

        let rows: Vec<DeviceAvailabilityResult> = http
            .get(format!("{}/api/availability", url))
            .query(&[("where", "row.device_id >= 2")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_id, 2);

        let stats: serde_json::Value = http
            .get(format!("{}/api/availability/stats", url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["totalDevices"], 2);
        assert_eq!(stats["uptimePercent"], 50);

        let bad = http
            .get(format!("{}/api/availability", url))
            .query(&[("where", "row.device_id ==")])
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

        let page = http
            .get(format!("{}/?theme=paper", url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains("device-2"));
        assert!(page.contains("#FAF6E9"));

        let favicon = http.get(format!("{}/favicon.ico", url)).send().await.unwrap();
        assert_eq!(favicon.headers()["content-type"], "image/svg+xml");

        let status_page = http.get(format!("{}/status", url)).send().await.unwrap();
        assert!(status_page.status().is_success());
    }

    #[tokio::test]
    async fn test_check_trigger_route() {
        let backend = FakeBackend::start().await;
        let db = NamedTempFile::new().unwrap();
        let (url, _state) = spawn_server(&backend, &db).await;

        let resp: serde_json::Value = reqwest::Client::new()
            .post(format!("{}/api/availability/check?maxConcurrent=7", url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(resp["message"].as_str().unwrap().contains('7'));
        assert_eq!(backend.last_max_concurrent(), Some(7));
    }

    #[tokio::test]
    async fn test_device_check_route() {
        let backend = FakeBackend::start().await;
        backend.set_snapshot(vec![result(2, false, "2024-01-01T00:00:00Z")]);
        let db = NamedTempFile::new().unwrap();
        let (url, _state) = spawn_server(&backend, &db).await;
        let http = reqwest::Client::new();

        let checked: DeviceAvailabilityResult = http
            .get(format!("{}/api/devices/2/check", url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(checked.device_id, 2);

        let missing = http.get(format!("{}/api/devices/77/check", url)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
