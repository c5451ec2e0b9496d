//! Tsiken - Farm camera client for Internet of Tsiken
//!
//! This library re-exports camera discovery, the stream session, and
//! telemetry types from `tsiken-core`.

pub use tsiken_core::{config, locator, otp, session, storage, telemetry, transport};

pub use tsiken_core::{
    AppConfig, CandidateConfig, ConnectionState, DetectedObject, DiscoveryOutcome, FailureReason,
    HttpTransport, JsonFileStore, KeyValueStore, Locator, MemoryStore, OtpService, ProbeOutcome,
    SessionConfig, SessionEvent, StreamSession, TelemetrySnapshot,
};
pub use tsiken_core::{DEFAULT_SERVER_URL, LAST_KNOWN_KEY, VERSION};
