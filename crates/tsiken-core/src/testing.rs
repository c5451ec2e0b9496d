//! In-memory fakes shared by unit tests

use crate::storage::{KeyValueStore, StorageError};
use crate::transport::{Transport, TransportError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted transport: URLs without a scripted body fail as refused
#[derive(Clone, Default)]
pub struct FakeTransport {
    responses: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Arc<Mutex<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: Value) {
        self.responses.lock().unwrap().insert(url.to_string(), body);
    }

    /// Script `{address}/status` as online
    pub fn online(&self, address: &str) {
        self.respond(&format!("{address}/status"), json!({"status": "online"}));
    }

    /// Make every request take `delay` (tokio time, so pausable)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn forget(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, suffix: &str) -> usize {
        self.calls().iter().filter(|c| c.ends_with(suffix)).count()
    }
}

impl Transport for FakeTransport {
    async fn get_json(&self, url: &str, _timeout: Duration) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = *self.delay.lock().unwrap();
        if delay.is_zero() {
            // Yield so batch members genuinely interleave
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        let body = self.responses.lock().unwrap().get(url).cloned();
        body.ok_or_else(|| TransportError::Request("connection refused".to_string()))
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let body = self.get_json(url, timeout).await?;
        Ok(body.to_string().into_bytes())
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk unavailable")))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk unavailable")))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk unavailable")))
    }
}
