//! Tsiken Core - Camera server discovery, stream session, and telemetry
//!
//! This library finds the farm camera server on whatever local network the
//! client happens to be on and keeps a session with it alive:
//! - Layered auto-discovery with a persisted fast-path address ([`locator`])
//! - Connection state machine with decoupled telemetry polling ([`session`])
//! - Detection snapshot, history, and predator checks ([`telemetry`])
//! - One-time code persistence for the sign-in flow ([`otp`])

pub mod config;
pub mod locator;
pub mod otp;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, SessionConfig};
pub use locator::candidates::CandidateConfig;
pub use locator::{DeadlineExceeded, DiscoveryOutcome, Locator, ProbeOutcome};
pub use otp::{CodeDelivery, LogDelivery, OtpError, OtpService};
pub use session::state::{ConnectionState, FailureReason, SessionEvent};
pub use session::{SessionError, StreamSession};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};
pub use telemetry::{DetectedObject, TelemetrySnapshot};
pub use transport::{HttpTransport, Transport, TransportError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage key holding the most recent confirmed-live server address
pub const LAST_KNOWN_KEY: &str = "camera_server_url";

/// Address the app ships with before anything has been discovered
pub const DEFAULT_SERVER_URL: &str = "http://rpi5desktop.local:5000";
