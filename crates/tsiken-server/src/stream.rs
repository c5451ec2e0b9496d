//! MJPEG stream at `/video_feed`
//!
//! Serves `multipart/x-mixed-replace; boundary=frame`, one part per tick,
//! repeating the current frame. Ticks with no frame are skipped.

use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Multipart boundary between JPEG parts
pub const BOUNDARY: &str = "frame";

/// Time between two parts
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Wrap one JPEG as a multipart part
pub fn frame_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// GET /video_feed
pub async fn video_feed(State(state): State<AppState>) -> Response {
    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let parts = stream::unfold((state, interval), |(state, mut interval)| async move {
        interval.tick().await;
        let part = state.snapshot().frame.map(|jpeg| frame_part(&jpeg));
        Some((part, (state, interval)))
    })
    .filter_map(|part| async move { part.map(Ok::<_, Infallible>) });

    tracing::debug!("MJPEG client connected");
    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )],
        Body::from_stream(parts),
    )
        .into_response()
}
