//! Connection states and events published by a stream session

use crate::telemetry::DetectedObject;
use std::fmt;

/// Why a session gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every discovery step came back empty
    NoServerFound,
    /// The discovery deadline passed before the next step could start
    Timeout,
}

impl FailureReason {
    /// Advice shown next to the retry action
    pub fn guidance(&self) -> &'static [&'static str] {
        &[
            "Make sure the camera server is running",
            "Make sure this device is on the same network as the camera",
            "Enter the camera server address manually",
        ]
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoServerFound => write!(f, "no server found"),
            FailureReason::Timeout => write!(f, "timed out searching for the camera server"),
        }
    }
}

/// Session connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Checking the supplied and cached addresses
    Initializing,
    /// Running full discovery
    Discovering,
    /// Live at this address; telemetry polling is active
    Connected(String),
    /// Waiting for the caller to retry
    Failed(FailureReason),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            ConnectionState::Connected(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Initializing => write!(f, "initializing"),
            ConnectionState::Discovering => write!(f, "discovering"),
            ConnectionState::Connected(address) => write!(f, "connected to {address}"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Notifications broadcast to session subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// Connected somewhere other than the supplied address
    ServerDiscovered(String),
    /// A telemetry poll succeeded
    TelemetryUpdated,
    /// A high-confidence predator showed up outside the alert cooldown
    PredatorSpotted(DetectedObject),
}
