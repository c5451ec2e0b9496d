//! Stream session: connection state machine over the locator
//!
//! ```text
//! Initializing ──live──────────────────────────► Connected(addr)
//!      │ supplied + cached unreachable               │ telemetry poll every 1s
//!      ▼                                             │ (failures keep state)
//! Discovering ──found──────────────────────────► Connected(addr)
//!      │ not found / deadline (between batches)
//!      ▼
//! Failed(reason) ── retry() ──► Initializing
//!                └─ force_discover() ──► Discovering
//! ```
//!
//! The session is driven by `&mut self` calls, so dropping an in-flight
//! [`StreamSession::start`] future abandons its probes without applying
//! their results. Dropping the session aborts the telemetry poller.

pub mod state;

use crate::locator::{DeadlineExceeded, DiscoveryOutcome, Locator, ProbeOutcome};
use crate::storage::KeyValueStore;
use crate::telemetry::predator::PredatorAlert;
use crate::telemetry::{fetch_snapshot, HistoryEntry, TelemetrySnapshot, TelemetryState};
use crate::transport::{endpoint, Transport, TransportError};
use crate::SessionConfig;
use chrono::{DateTime, Utc};
use state::{ConnectionState, FailureReason, SessionEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors from caller operations that need a live connection
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Best-effort live session with one camera server
pub struct StreamSession<T, S> {
    locator: Arc<Locator<T, S>>,
    config: SessionConfig,
    /// Caller-supplied address, tried first on every start
    server_url: String,
    state: ConnectionState,
    telemetry: Arc<Mutex<TelemetryState>>,
    /// Address the current telemetry belongs to
    telemetry_source: Option<String>,
    events: broadcast::Sender<SessionEvent>,
    poller: Option<JoinHandle<()>>,
}

impl<T: Transport, S: KeyValueStore> StreamSession<T, S> {
    pub fn new(locator: Arc<Locator<T, S>>, server_url: impl Into<String>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            locator,
            config,
            server_url: server_url.into(),
            state: ConnectionState::Initializing,
            telemetry: Arc::new(Mutex::new(TelemetryState::default())),
            telemetry_source: None,
            events,
            poller: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Subscribe to state changes, discoveries, and telemetry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Last polled snapshot; may be stale if recent polls failed
    pub fn telemetry(&self) -> Option<TelemetrySnapshot> {
        self.telemetry.lock().ok().and_then(|t| t.snapshot.clone())
    }

    pub fn telemetry_updated_at(&self) -> Option<DateTime<Utc>> {
        self.telemetry.lock().ok().and_then(|t| t.updated_at)
    }

    /// Recent detections, newest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.telemetry
            .lock()
            .map(|t| t.history.entries().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// MJPEG stream URL for the rendering layer
    pub fn stream_url(&self) -> Option<String> {
        self.state.address().map(|a| endpoint(a, "video_feed"))
    }

    /// Run the full start sequence: supplied address, cached address, discovery
    pub async fn start(&mut self) -> &ConnectionState {
        self.stop_polling();
        self.transition(ConnectionState::Initializing);

        let locator = Arc::clone(&self.locator);
        let direct_timeout = self.config.direct_timeout();
        let supplied = self.server_url.clone();

        if let ProbeOutcome::Live(address) = locator.probe(&supplied, direct_timeout).await {
            self.connect(address, false);
            return &self.state;
        }
        debug!(address = %supplied, "Supplied address unreachable");

        if let Some(cached) = locator.load_last_known().filter(|c| *c != supplied) {
            if let ProbeOutcome::Live(address) = locator.probe(&cached, direct_timeout).await {
                self.connect(address, true);
                return &self.state;
            }
            debug!(address = %cached, "Cached address unreachable");
        }

        self.run_discovery().await;
        &self.state
    }

    /// Restart from `Initializing`
    pub async fn retry(&mut self) -> &ConnectionState {
        info!("Retrying camera connection");
        self.start().await
    }

    /// Skip the supplied and cached addresses and go straight to discovery
    pub async fn force_discover(&mut self) -> &ConnectionState {
        self.stop_polling();
        self.run_discovery().await;
        &self.state
    }

    /// Replace the supplied address and restart against it
    pub async fn set_server_url(&mut self, server_url: impl Into<String>) -> &ConnectionState {
        self.server_url = server_url.into();
        self.start().await
    }

    /// Fetch a single JPEG frame from the connected server
    pub async fn capture_snapshot(&self) -> Result<Vec<u8>, SessionError> {
        let address = self.state.address().ok_or(SessionError::NotConnected)?;
        let bytes = self
            .locator
            .transport()
            .get_bytes(&endpoint(address, "snapshot"), self.config.telemetry_timeout())
            .await?;
        Ok(bytes)
    }

    /// Tear the session down
    pub fn close(mut self) {
        self.stop_polling();
        debug!("Session closed");
    }

    async fn run_discovery(&mut self) {
        self.transition(ConnectionState::Discovering);

        let locator = Arc::clone(&self.locator);
        let deadline = tokio::time::Instant::now() + self.config.discovery_deadline();
        match locator
            .discover_until(self.config.discovery_timeout(), Some(deadline))
            .await
        {
            Ok(DiscoveryOutcome::Found(address)) => self.connect(address, true),
            Ok(DiscoveryOutcome::NotFound) => {
                self.transition(ConnectionState::Failed(FailureReason::NoServerFound))
            }
            Err(DeadlineExceeded) => {
                warn!(
                    deadline_ms = self.config.discovery_deadline_ms,
                    "Discovery exceeded its deadline"
                );
                self.transition(ConnectionState::Failed(FailureReason::Timeout))
            }
        }
    }

    fn connect(&mut self, address: String, announce: bool) {
        self.locator.save_last_known(&address);

        if self.telemetry_source.as_deref() != Some(address.as_str()) {
            if let Ok(mut telemetry) = self.telemetry.lock() {
                telemetry.clear();
            }
            self.telemetry_source = Some(address.clone());
        }

        if announce {
            info!(%address, "Camera server discovered");
            let _ = self.events.send(SessionEvent::ServerDiscovered(address.clone()));
        }

        self.transition(ConnectionState::Connected(address.clone()));
        self.spawn_poller(address);
    }

    fn transition(&mut self, state: ConnectionState) {
        info!(%state, "Session state changed");
        self.state = state.clone();
        let _ = self.events.send(SessionEvent::StateChanged(state));
    }

    fn spawn_poller(&mut self, address: String) {
        self.stop_polling();

        let poller = TelemetryPoller {
            locator: Arc::clone(&self.locator),
            address,
            telemetry: Arc::clone(&self.telemetry),
            events: self.events.clone(),
            interval: self.config.telemetry_interval(),
            timeout: self.config.telemetry_timeout(),
        };
        self.poller = Some(tokio::spawn(poller.run()));
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

impl<T, S> Drop for StreamSession<T, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

/// Periodic `/detections` poll bound to one address
struct TelemetryPoller<T, S> {
    locator: Arc<Locator<T, S>>,
    address: String,
    telemetry: Arc<Mutex<TelemetryState>>,
    events: broadcast::Sender<SessionEvent>,
    interval: Duration,
    timeout: Duration,
}

impl<T: Transport, S: KeyValueStore> TelemetryPoller<T, S> {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut alert = PredatorAlert::default();

        loop {
            ticker.tick().await;

            match fetch_snapshot(self.locator.transport(), &self.address, self.timeout).await {
                Ok(snapshot) => {
                    let spotted = alert.check(&snapshot, tokio::time::Instant::now().into_std());
                    if let Ok(mut telemetry) = self.telemetry.lock() {
                        telemetry.apply(snapshot, Utc::now());
                    }
                    let _ = self.events.send(SessionEvent::TelemetryUpdated);
                    if let Some(predator) = spotted {
                        info!(class = %predator.class, confidence = predator.confidence, "Predator spotted");
                        let _ = self.events.send(SessionEvent::PredatorSpotted(predator));
                    }
                }
                Err(e) => {
                    // Snapshot stays stale; connection state is not affected
                    debug!(address = %self.address, error = %e, "Telemetry poll failed");
                }
            }
        }
    }
}
