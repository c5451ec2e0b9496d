//! Detection telemetry polled from the camera server
//!
//! - Snapshot wire types for `GET /detections`
//! - A short rolling history of recently seen objects
//! - Predator classification ([`predator`])

pub mod predator;

use crate::transport::{endpoint, Transport, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Number of entries kept in [`DetectionHistory`]
pub const HISTORY_SIZE: usize = 5;

/// One object reported by the detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Detector class name (e.g. "cat")
    #[serde(default)]
    pub class: String,
    /// Confidence in percent (0-100)
    #[serde(default)]
    pub confidence: f64,
    /// Bounding box `[x1, y1, x2, y2]` in frame pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

/// Body of `GET /detections`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub count: u32,
    /// Server-side capture time, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Fetch one snapshot from `{address}/detections`
pub async fn fetch_snapshot<T: Transport>(
    transport: &T,
    address: &str,
    timeout: Duration,
) -> Result<TelemetrySnapshot, TransportError> {
    let body = transport
        .get_json(&endpoint(address, "detections"), timeout)
        .await?;
    serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// A detection stamped with the poll that observed it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub class: String,
    pub confidence: f64,
    pub seen_at: DateTime<Utc>,
}

/// Most recent detections, newest first
#[derive(Debug, Clone, Default)]
pub struct DetectionHistory {
    entries: VecDeque<HistoryEntry>,
}

impl DetectionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend the snapshot's objects, keeping entries unique by
    /// `(class, seen_at)` and at most [`HISTORY_SIZE`] long
    pub fn record(&mut self, snapshot: &TelemetrySnapshot, seen_at: DateTime<Utc>) {
        if snapshot.objects.is_empty() {
            return;
        }

        let fresh = snapshot.objects.iter().map(|obj| HistoryEntry {
            class: obj.class.clone(),
            confidence: obj.confidence,
            seen_at,
        });

        let mut merged: VecDeque<HistoryEntry> = VecDeque::with_capacity(HISTORY_SIZE);
        for entry in fresh.chain(self.entries.drain(..)) {
            if merged.len() == HISTORY_SIZE {
                break;
            }
            let duplicate = merged
                .iter()
                .any(|e| e.class == entry.class && e.seen_at == entry.seen_at);
            if !duplicate {
                merged.push_back(entry);
            }
        }
        self.entries = merged;
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Telemetry owned by a connected session
#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    /// Last successfully polled snapshot (stale on poll failure)
    pub snapshot: Option<TelemetrySnapshot>,
    /// Local time of the last successful poll
    pub updated_at: Option<DateTime<Utc>>,
    pub history: DetectionHistory,
}

impl TelemetryState {
    /// Replace the snapshot wholesale and extend the history
    pub fn apply(&mut self, snapshot: TelemetrySnapshot, now: DateTime<Utc>) {
        self.history.record(&snapshot, now);
        self.snapshot = Some(snapshot);
        self.updated_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.updated_at = None;
        self.history.clear();
    }
}
