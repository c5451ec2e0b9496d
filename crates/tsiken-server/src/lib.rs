//! Tsiken Camera Simulator - Axum server speaking the camera wire protocol
//!
//! Stands in for the Raspberry Pi camera server so discovery and sessions
//! can be exercised without hardware. Every endpoint's behaviour is
//! scriptable through [`AppState`].

pub mod api;
pub mod stream;

use axum::http::{header, HeaderValue};
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tsiken_core::TelemetrySnapshot;

/// How `/status` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    /// `{"status": "online", ...}`
    #[default]
    Online,
    /// Well-formed body with a status other than `online`
    Offline,
    /// 200 with a body that is not JSON
    Malformed,
    /// Accept the request and never answer
    Hang,
}

/// Scriptable camera state
#[derive(Debug, Clone, Default)]
pub struct CameraState {
    pub status_mode: StatusMode,
    /// Reported by `/get_public_url`; `None` means local only
    pub public_url: Option<String>,
    pub detections: TelemetrySnapshot,
    /// Latest JPEG frame; `/snapshot` is 404 until one exists
    pub frame: Option<Vec<u8>>,
    /// Added before every response
    pub response_delay: Duration,
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub camera: Arc<Mutex<CameraState>>,
    /// Server configuration
    pub config: ServerConfig,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on (0 = ephemeral)
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            camera: Arc::new(Mutex::new(CameraState::default())),
            config,
        }
    }

    /// Apply a change to the camera state
    pub fn update(&self, f: impl FnOnce(&mut CameraState)) {
        if let Ok(mut camera) = self.camera.lock() {
            f(&mut camera);
        }
    }

    pub fn snapshot(&self) -> CameraState {
        self.camera
            .lock()
            .map(|camera| camera.clone())
            .unwrap_or_default()
    }

    pub fn set_status_mode(&self, mode: StatusMode) {
        self.update(|camera| camera.status_mode = mode);
    }

    pub fn set_public_url(&self, url: Option<String>) {
        self.update(|camera| camera.public_url = url);
    }

    pub fn set_detections(&self, detections: TelemetrySnapshot) {
        self.update(|camera| camera.detections = detections);
    }

    pub fn set_frame(&self, frame: Option<Vec<u8>>) {
        self.update(|camera| camera.frame = frame);
    }

    pub fn set_response_delay(&self, delay: Duration) {
        self.update(|camera| camera.response_delay = delay);
    }

    fn response_delay(&self) -> Duration {
        self.camera
            .lock()
            .map(|camera| camera.response_delay)
            .unwrap_or_default()
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", axum::routing::get(api::get_status))
        .route("/get_public_url", axum::routing::get(api::get_public_url))
        .route("/detections", axum::routing::get(api::get_detections))
        .route("/snapshot", axum::routing::get(api::get_snapshot))
        .route("/video_feed", axum::routing::get(stream::video_feed))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Start the camera server and serve until the process exits
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Camera server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// A server running on a background task
pub struct RunningServer {
    pub addr: SocketAddr,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl RunningServer {
    /// `http://ip:port` of the bound listener
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bind the listener, then serve on a spawned task
///
/// With `port: 0` the OS picks a free port; the bound address is returned
/// so tests can run many simulators side by side.
pub async fn spawn_server(state: AppState) -> anyhow::Result<RunningServer> {
    let bind = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&bind).await?;
    let addr = listener.local_addr()?;
    let app = build_router(state.clone());

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(%addr, error = %e, "Camera server stopped");
        }
    });
    tracing::debug!(%addr, "Camera server spawned");

    Ok(RunningServer {
        addr,
        state,
        handle,
    })
}

/// Hostname and LAN address for the startup banner
pub fn describe_host(port: u16) -> (String, String) {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "localhost".to_string());
    (host, format!("http://{}:{}", ip, port))
}
