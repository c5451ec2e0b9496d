//! Camera server locator
//!
//! Resolves a live address for the camera server on an unknown network:
//!
//! 1. Ask fixed same-subnet peers for a self-reported public address
//! 2. Probe the well-known `.local` hostnames
//! 3. Sweep common subnet prefixes × common last octets in batches
//!
//! Each probe is bounded by its own timeout. Batches wait for every member
//! to settle before the next batch is issued; nothing is retried within a
//! single [`Locator::discover`] pass. [`Locator::discover_until`] checks an
//! overall deadline only between steps, so an issued batch always settles.

pub mod candidates;

use crate::storage::KeyValueStore;
use crate::transport::{endpoint, Transport};
use crate::LAST_KNOWN_KEY;
use candidates::CandidateConfig;
use futures_util::future::join_all;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default per-probe timeout for discovery steps
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Outcome of probing one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Live(String),
    Unreachable,
}

impl ProbeOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, ProbeOutcome::Live(_))
    }
}

/// Outcome of one full discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(String),
    NotFound,
}

impl DiscoveryOutcome {
    pub fn address(&self) -> Option<&str> {
        match self {
            DiscoveryOutcome::Found(address) => Some(address),
            DiscoveryOutcome::NotFound => None,
        }
    }
}

/// A deadline-bounded pass stopped before its next step
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("discovery deadline passed before the next step")]
pub struct DeadlineExceeded;

fn check_deadline(deadline: Option<Instant>) -> Result<(), DeadlineExceeded> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(DeadlineExceeded),
        _ => Ok(()),
    }
}

/// `GET /status` body
#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
}

/// `GET /get_public_url` body
#[derive(Deserialize)]
struct PublicUrlBody {
    #[serde(default)]
    url: Option<String>,
}

/// Server locator over an injected transport and store
pub struct Locator<T, S> {
    transport: T,
    store: S,
    candidates: CandidateConfig,
}

impl<T: Transport, S: KeyValueStore> Locator<T, S> {
    /// Create a locator with the default candidate lists
    pub fn new(transport: T, store: S) -> Self {
        Self::with_candidates(transport, store, CandidateConfig::default())
    }

    pub fn with_candidates(transport: T, store: S, candidates: CandidateConfig) -> Self {
        Self {
            transport,
            store,
            candidates,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn candidates(&self) -> &CandidateConfig {
        &self.candidates
    }

    /// Check `{address}/status` for `"status": "online"`
    ///
    /// Never fails: timeouts, refusals, bad bodies, and malformed addresses
    /// all come back as [`ProbeOutcome::Unreachable`].
    pub async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let url = endpoint(address, "status");
        match self.transport.get_json(&url, timeout).await {
            Ok(body) => match serde_json::from_value::<StatusBody>(body) {
                Ok(StatusBody {
                    status: Some(status),
                }) if status == "online" => ProbeOutcome::Live(address.to_string()),
                Ok(_) => {
                    debug!(%address, "Server answered but is not online");
                    ProbeOutcome::Unreachable
                }
                Err(e) => {
                    debug!(%address, error = %e, "Malformed status body");
                    ProbeOutcome::Unreachable
                }
            },
            Err(e) => {
                debug!(%address, error = %e, "Probe failed");
                ProbeOutcome::Unreachable
            }
        }
    }

    /// Run the full layered discovery strategy once
    pub async fn discover(&self, timeout: Duration) -> DiscoveryOutcome {
        self.discover_until(timeout, None)
            .await
            .unwrap_or(DiscoveryOutcome::NotFound)
    }

    /// Like [`Locator::discover`], but stop once `deadline` has passed
    ///
    /// The deadline is checked before each peer, hostname, and sweep batch.
    /// Probes already issued are never cancelled by it.
    pub async fn discover_until(
        &self,
        timeout: Duration,
        deadline: Option<Instant>,
    ) -> Result<DiscoveryOutcome, DeadlineExceeded> {
        info!("Discovering camera server");

        if let Some(address) = self.peer_reported(timeout, deadline).await? {
            info!(%address, "Found camera server via peer-reported address");
            return Ok(DiscoveryOutcome::Found(address));
        }

        for address in self.candidates.hostname_addresses() {
            check_deadline(deadline)?;
            if let ProbeOutcome::Live(address) = self.probe(&address, timeout).await {
                info!(%address, "Found camera server by hostname");
                return Ok(DiscoveryOutcome::Found(address));
            }
        }

        let sweep = self.candidates.sweep_addresses();
        let batch_size = self.candidates.effective_batch_size();
        for (index, batch) in sweep.chunks(batch_size).enumerate() {
            check_deadline(deadline)?;
            debug!(batch = index + 1, size = batch.len(), "Probing sweep batch");
            // Wait for every member; siblings are never cancelled
            let outcomes = join_all(batch.iter().map(|address| self.probe(address, timeout))).await;
            if let Some(ProbeOutcome::Live(address)) = outcomes.into_iter().find(ProbeOutcome::is_live)
            {
                info!(%address, batch = index + 1, "Found camera server in subnet sweep");
                return Ok(DiscoveryOutcome::Found(address));
            }
        }

        warn!(
            candidates = sweep.len(),
            "No camera server found on any candidate address"
        );
        Ok(DiscoveryOutcome::NotFound)
    }

    /// Ask each peer for its public URL and probe the first one reported
    async fn peer_reported(
        &self,
        timeout: Duration,
        deadline: Option<Instant>,
    ) -> Result<Option<String>, DeadlineExceeded> {
        for peer in self.candidates.peer_addresses() {
            check_deadline(deadline)?;
            let url = endpoint(&peer, "get_public_url");
            let reported = match self.transport.get_json(&url, timeout).await {
                Ok(body) => serde_json::from_value::<PublicUrlBody>(body)
                    .ok()
                    .and_then(|b| b.url)
                    .filter(|u| !u.trim().is_empty()),
                Err(e) => {
                    debug!(%peer, error = %e, "Peer did not report a public URL");
                    None
                }
            };

            if let Some(candidate) = reported {
                debug!(%peer, %candidate, "Peer reported public URL");
                if let ProbeOutcome::Live(address) = self.probe(&candidate, timeout).await {
                    return Ok(Some(address));
                }
            }
        }
        Ok(None)
    }

    /// Read the persisted last-known address; storage errors read as `None`
    pub fn load_last_known(&self) -> Option<String> {
        match self.store.get(LAST_KNOWN_KEY) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read last known camera server");
                None
            }
        }
    }

    /// Persist a confirmed-live address; storage errors are dropped
    pub fn save_last_known(&self, address: &str) {
        if let Err(e) = self.store.set(LAST_KNOWN_KEY, address) {
            warn!(%address, error = %e, "Failed to save last known camera server");
        }
    }
}
