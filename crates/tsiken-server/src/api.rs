//! JSON endpoints of the camera server
//!
//! `/status`, `/get_public_url`, `/detections` and `/snapshot`, with the
//! same bodies the Raspberry Pi server sends.

use crate::{AppState, StatusMode};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tsiken_core::TelemetrySnapshot;

/// Health check response
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub camera: bool,
    pub model: bool,
    pub timestamp: String,
}

/// Public tunnel URL response
#[derive(Serialize)]
pub struct PublicUrlResponse {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body, `{"error": "..."}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No frame available")]
    NoFrame,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NoFrame => StatusCode::NOT_FOUND,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Sleep for the scripted response delay
async fn delay(state: &AppState) {
    let delay = state.response_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Response {
    delay(&state).await;
    let mode = state.snapshot().status_mode;

    let status = match mode {
        StatusMode::Online => "online",
        StatusMode::Offline => "offline",
        StatusMode::Malformed => {
            return (
                [(header::CONTENT_TYPE, "text/html")],
                "<html><body>router login</body></html>",
            )
                .into_response();
        }
        StatusMode::Hang => {
            tracing::debug!("Status request parked");
            return std::future::pending::<Response>().await;
        }
    };

    Json(StatusResponse {
        status: status.to_string(),
        camera: true,
        model: true,
        timestamp: chrono::Local::now().to_rfc3339(),
    })
    .into_response()
}

/// GET /get_public_url
pub async fn get_public_url(State(state): State<AppState>) -> Json<PublicUrlResponse> {
    delay(&state).await;
    match state.snapshot().public_url {
        Some(url) => Json(PublicUrlResponse {
            url: Some(url),
            kind: "cloudflare_tunnel".to_string(),
            message: None,
        }),
        None => Json(PublicUrlResponse {
            url: None,
            kind: "local_only".to_string(),
            message: Some("Tunnel not active - local network only".to_string()),
        }),
    }
}

/// GET /detections
pub async fn get_detections(State(state): State<AppState>) -> Json<TelemetrySnapshot> {
    delay(&state).await;
    Json(state.snapshot().detections)
}

/// GET /snapshot
pub async fn get_snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    delay(&state).await;
    let frame = state.snapshot().frame.ok_or(ApiError::NoFrame)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], frame).into_response())
}
