//! Standalone camera simulator
//!
//! Serves the camera wire protocol with scripted detections so the client
//! can be developed away from the coop. Environment:
//! - `PORT`: listen port (default 5000)
//! - `BIND_ADDR`: listen address (default 0.0.0.0)
//! - `PUBLIC_URL`: value reported by `/get_public_url`
//! - `SIM_PREDATORS=1`: mix predator sightings into the demo detections

use std::time::Duration;
use tsiken_core::{DetectedObject, TelemetrySnapshot};
use tsiken_server::{AppState, ServerConfig};

/// Smallest well-formed JPEG (SOI + EOI); enough for `/snapshot` clients
const PLACEHOLDER_FRAME: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

fn demo_detections(tick: u64, predators: bool) -> TelemetrySnapshot {
    let mut objects = vec![DetectedObject {
        class: "chicken".to_string(),
        confidence: 85.0 + (tick % 10) as f64,
        bbox: Some(vec![40.0, 60.0, 180.0, 220.0]),
    }];
    if tick % 4 == 1 {
        objects.push(DetectedObject {
            class: "person".to_string(),
            confidence: 72.5,
            bbox: Some(vec![200.0, 20.0, 400.0, 410.0]),
        });
    }
    if predators && tick % 15 == 7 {
        objects.push(DetectedObject {
            class: "dog".to_string(),
            confidence: 91.3,
            bbox: Some(vec![10.0, 250.0, 160.0, 400.0]),
        });
    }

    TelemetrySnapshot {
        count: objects.len() as u32,
        objects,
        fps: 7.5,
        timestamp: Some(chrono::Local::now().to_rfc3339()),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tsiken=debug".parse().unwrap()),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000u16);
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
    let public_url = std::env::var("PUBLIC_URL").ok().filter(|u| !u.is_empty());
    let predators = std::env::var("SIM_PREDATORS").is_ok_and(|v| v == "1");

    let state = AppState::new(ServerConfig { port, bind_addr });
    state.set_public_url(public_url);
    state.set_frame(Some(PLACEHOLDER_FRAME.to_vec()));

    let feeder = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            feeder.set_detections(demo_detections(tick, predators));
            tick += 1;
        }
    });

    let (host, lan_url) = tsiken_server::describe_host(port);
    tracing::info!(%host, %lan_url, predators, "Camera simulator starting");

    tokio::select! {
        result = tsiken_server::start_server(state) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down camera simulator");
        }
    }
}
