//! Tsiken - farm camera client
//!
//! Command-line front end: find the camera server, keep a session open and
//! watch detections, or grab a single frame.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tsiken::otp::LogDelivery;
use tsiken::{
    AppConfig, ConnectionState, DiscoveryOutcome, HttpTransport, JsonFileStore, Locator,
    OtpService, ProbeOutcome, SessionEvent, StreamSession,
};

type HttpLocator = Locator<HttpTransport, Arc<JsonFileStore>>;

#[derive(Parser)]
#[command(name = "tsiken", version)]
#[command(about = "Find the farm camera server and watch its detections")]
struct Cli {
    /// Config file (default: <data_dir>/tsiken/config.json)
    #[arg(long, global = true, env = "TSIKEN_CONFIG")]
    config: Option<PathBuf>,

    /// Key-value store file (overrides the config)
    #[arg(long, global = true, env = "TSIKEN_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether one address answers as a camera server
    Probe {
        url: String,

        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Run one discovery pass and remember what it finds
    Discover {
        /// Per-probe timeout (default: session discovery timeout)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Open a session and report its state
    Connect {
        /// Address tried first (default: config server_url)
        #[arg(long)]
        url: Option<String>,

        /// Skip the supplied and cached addresses
        #[arg(long)]
        force_discover: bool,

        /// Keep polling telemetry until Ctrl+C
        #[arg(long)]
        watch: bool,

        /// Save a frame here whenever a predator is spotted (with --watch)
        #[arg(long)]
        capture_dir: Option<PathBuf>,
    },

    /// Save one JPEG frame from the camera
    Snapshot {
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// One-time sign-in codes
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },

    /// Show or write the configuration file
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum OtpAction {
    Request { identity: String },
    Verify { identity: String, code: String },
    Status { identity: String },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tsiken=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::path);
    let config = AppConfig::load_from(&config_path);
    let store_path = cli
        .store
        .clone()
        .or_else(|| config.store_path.clone())
        .unwrap_or_else(JsonFileStore::default_path);
    let store = Arc::new(JsonFileStore::new(store_path));

    match cli.command {
        Command::Probe { url, timeout_ms } => {
            let locator = locator(&config, store);
            match locator.probe(&url, Duration::from_millis(timeout_ms)).await {
                ProbeOutcome::Live(address) => println!("{address} is online"),
                ProbeOutcome::Unreachable => bail!("{url} is not reachable"),
            }
        }
        Command::Discover { timeout_ms } => {
            let locator = locator(&config, store);
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.session.discovery_timeout());
            match locator.discover(timeout).await {
                DiscoveryOutcome::Found(address) => {
                    locator.save_last_known(&address);
                    println!("Found camera server at {address}");
                }
                DiscoveryOutcome::NotFound => bail!("No camera server found"),
            }
        }
        Command::Connect {
            url,
            force_discover,
            watch,
            capture_dir,
        } => {
            let url = url.unwrap_or_else(|| config.server_url.clone());
            let locator = Arc::new(locator(&config, store));
            let mut session = StreamSession::new(locator, url, config.session.clone());
            connect(&mut session, force_discover, watch, capture_dir.as_deref()).await?;
        }
        Command::Snapshot { url, out } => {
            let url = url.unwrap_or_else(|| config.server_url.clone());
            let locator = Arc::new(locator(&config, store));
            let mut session = StreamSession::new(locator, url, config.session.clone());
            let state = session.start().await.clone();
            ensure_connected(&state)?;
            let jpeg = session.capture_snapshot().await?;
            std::fs::write(&out, &jpeg)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Saved {} bytes to {}", jpeg.len(), out.display());
            session.close();
        }
        Command::Otp { action } => otp(OtpService::new(store, LogDelivery), action)?,
        Command::Config { init } => {
            if init {
                config.save(&config_path)?;
            }
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn locator(config: &AppConfig, store: Arc<JsonFileStore>) -> HttpLocator {
    Locator::with_candidates(HttpTransport::new(), store, config.candidates.clone())
}

async fn connect(
    session: &mut StreamSession<HttpTransport, Arc<JsonFileStore>>,
    force_discover: bool,
    watch: bool,
    capture_dir: Option<&Path>,
) -> Result<()> {
    let mut events = session.subscribe();

    let state = if force_discover {
        session.force_discover().await.clone()
    } else {
        session.start().await.clone()
    };

    ensure_connected(&state)?;

    println!("State: {state}");
    if let Some(stream) = session.stream_url() {
        println!("Stream: {stream}");
    }
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ServerDiscovered(address) = event {
            println!("Camera server moved to {address}; remembered for next time");
        }
    }

    if !watch {
        return Ok(());
    }

    println!("Watching telemetry. Press Ctrl+C to stop.");
    println!("────────────────────────────────────────");

    let mut last_line = String::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::TelemetryUpdated) => {
                    let Some(snapshot) = session.telemetry() else { continue };
                    let objects = snapshot
                        .objects
                        .iter()
                        .map(|o| format!("{} {:.0}%", o.class, o.confidence))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let line = format!(
                        "FPS: {:>5.1} | Objects: {:>2} | {}",
                        snapshot.fps, snapshot.count, objects
                    );
                    // Only print if changed (reduce spam)
                    if line != last_line {
                        println!("[{}] {}", Local::now().format("%H:%M:%S"), line);
                        last_line = line;
                    }
                }
                Ok(SessionEvent::PredatorSpotted(predator)) => {
                    println!(
                        "!! Predator spotted: {} ({:.1}%)",
                        predator.class, predator.confidence
                    );
                    if let Some(dir) = capture_dir {
                        capture(session, dir, &predator.class).await;
                    }
                }
                Ok(SessionEvent::StateChanged(state)) => println!("State: {state}"),
                Ok(SessionEvent::ServerDiscovered(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped session events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping...");
                break;
            }
        }
    }

    for entry in session.history() {
        println!(
            "  {} {:.1}% at {}",
            entry.class,
            entry.confidence,
            entry.seen_at.with_timezone(&Local).format("%H:%M:%S")
        );
    }
    println!("Done.");
    Ok(())
}

/// Print the failure reason and its guidance, then bail
fn ensure_connected(state: &ConnectionState) -> Result<()> {
    if let ConnectionState::Failed(reason) = state {
        println!("Could not connect: {reason}");
        for hint in reason.guidance() {
            println!("  - {hint}");
        }
        bail!("Camera server unavailable");
    }
    Ok(())
}

/// Save a predator frame as `<dir>/<class>-<timestamp>.jpg`; failures are logged
async fn capture(
    session: &StreamSession<HttpTransport, Arc<JsonFileStore>>,
    dir: &Path,
    class: &str,
) {
    let path = dir.join(format!("{}-{}.jpg", class, Local::now().format("%Y%m%d-%H%M%S")));
    let result = async {
        let jpeg = session.capture_snapshot().await?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, jpeg)?;
        anyhow::Ok(())
    }
    .await;

    match result {
        Ok(()) => info!(path = %path.display(), "Predator frame saved"),
        Err(e) => warn!(error = %e, "Failed to save predator frame"),
    }
}

fn otp(service: OtpService<Arc<JsonFileStore>, LogDelivery>, action: OtpAction) -> Result<()> {
    match action {
        OtpAction::Request { identity } => {
            service.request_code(&identity)?;
            println!("Code sent to {identity}");
        }
        OtpAction::Verify { identity, code } => {
            service.verify_code(&identity, &code)?;
            println!("Verified");
        }
        OtpAction::Status { identity } => {
            let status = service.resend_status(&identity);
            if status.can_resend {
                println!("A new code can be requested");
            } else {
                println!("Wait {} seconds before requesting a new code", status.remaining_secs);
            }
        }
        OtpAction::Clear => {
            service.clear()?;
            println!("Pending code cleared");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsiken::FailureReason;

    #[test]
    fn test_failed_session_is_reported_as_error() {
        let failed = ConnectionState::Failed(FailureReason::NoServerFound);
        let err = ensure_connected(&failed).unwrap_err();
        assert_eq!(err.to_string(), "Camera server unavailable");
    }

    #[test]
    fn test_connected_session_passes() {
        let connected = ConnectionState::Connected("http://192.168.1.19:5000".to_string());
        assert!(ensure_connected(&connected).is_ok());
    }
}
