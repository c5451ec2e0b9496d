//! One-time sign-in codes
//!
//! A single pending code is persisted under [`OTP_STORAGE_KEY`] in the same
//! key-value store the locator uses. Requests for the same identity are
//! rate limited; codes expire after [`OTP_EXPIRY_MS`].

use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Storage key holding the pending code record
pub const OTP_STORAGE_KEY: &str = "otp_data";

/// Minimum spacing between two codes for the same identity
pub const OTP_RESEND_DELAY_MS: i64 = 60_000;

/// Lifetime of an issued code
pub const OTP_EXPIRY_MS: i64 = 10 * 60 * 1000;

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Please wait {remaining_secs} seconds before requesting a new code")]
    Cooldown { remaining_secs: u64 },

    #[error("Code has expired or was never requested")]
    NotRequested,

    #[error("Code was requested for a different identity")]
    IdentityMismatch,

    #[error("Code has expired")]
    Expired,

    #[error("Incorrect code")]
    Incorrect,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to deliver code: {0}")]
    Delivery(String),
}

/// Persisted pending code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    pub identity: String,
    pub code: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_sent_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// Whether a new code may be requested yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendStatus {
    pub can_resend: bool,
    pub remaining_secs: u64,
}

/// Sends a code to the user (SMS, e-mail, ...)
pub trait CodeDelivery: Send + Sync {
    fn deliver(&self, identity: &str, code: &str) -> Result<(), String>;
}

/// Delivery that only writes the code to the log; for development
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl CodeDelivery for LogDelivery {
    fn deliver(&self, identity: &str, code: &str) -> Result<(), String> {
        info!(%identity, %code, "One-time code issued");
        Ok(())
    }
}

pub struct OtpService<S, D = LogDelivery> {
    store: S,
    delivery: D,
}

impl<S: KeyValueStore, D: CodeDelivery> OtpService<S, D> {
    pub fn new(store: S, delivery: D) -> Self {
        Self { store, delivery }
    }

    /// Issue and deliver a fresh code, returning it
    pub fn request_code(&self, identity: &str) -> Result<String, OtpError> {
        self.request_code_at(identity, Utc::now())
    }

    pub fn request_code_at(&self, identity: &str, now: DateTime<Utc>) -> Result<String, OtpError> {
        if let Some(record) = self.load()? {
            if record.identity == identity {
                let remaining = remaining_cooldown(&record, now);
                if remaining > 0 {
                    debug!(%identity, remaining_secs = remaining, "Code requested during cooldown");
                    return Err(OtpError::Cooldown {
                        remaining_secs: remaining,
                    });
                }
            }
        }

        let code = generate_code();
        let record = OtpRecord {
            identity: identity.to_string(),
            code: code.clone(),
            created_at: now,
            last_sent_at: now,
            expires_at: now + Duration::milliseconds(OTP_EXPIRY_MS),
        };
        self.store
            .set(OTP_STORAGE_KEY, &serde_json::to_string(&record).map_err(StorageError::from)?)?;

        self.delivery
            .deliver(identity, &code)
            .map_err(OtpError::Delivery)?;
        Ok(code)
    }

    /// Check an entered code; the record is consumed on success
    pub fn verify_code(&self, identity: &str, code: &str) -> Result<(), OtpError> {
        self.verify_code_at(identity, code, Utc::now())
    }

    pub fn verify_code_at(&self, identity: &str, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let record = self.load()?.ok_or(OtpError::NotRequested)?;

        if record.identity != identity {
            return Err(OtpError::IdentityMismatch);
        }
        if now > record.expires_at {
            self.store.remove(OTP_STORAGE_KEY)?;
            return Err(OtpError::Expired);
        }
        if record.code != code.trim() {
            return Err(OtpError::Incorrect);
        }

        self.store.remove(OTP_STORAGE_KEY)?;
        info!(%identity, "One-time code verified");
        Ok(())
    }

    pub fn resend_status(&self, identity: &str) -> ResendStatus {
        self.resend_status_at(identity, Utc::now())
    }

    /// Unreadable storage reports "can resend"
    pub fn resend_status_at(&self, identity: &str, now: DateTime<Utc>) -> ResendStatus {
        let remaining = match self.load() {
            Ok(Some(record)) if record.identity == identity => remaining_cooldown(&record, now),
            Ok(_) => 0,
            Err(e) => {
                warn!(error = %e, "Failed to read pending code");
                0
            }
        };
        ResendStatus {
            can_resend: remaining == 0,
            remaining_secs: remaining,
        }
    }

    /// Drop any pending code
    pub fn clear(&self) -> Result<(), OtpError> {
        self.store.remove(OTP_STORAGE_KEY)?;
        Ok(())
    }

    /// A record that no longer parses reads as absent so a new request can replace it
    fn load(&self) -> Result<Option<OtpRecord>, OtpError> {
        let Some(raw) = self.store.get(OTP_STORAGE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable code record");
                Ok(None)
            }
        }
    }
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

/// Whole seconds until a resend is allowed, rounded up
fn remaining_cooldown(record: &OtpRecord, now: DateTime<Utc>) -> u64 {
    let remaining_ms = OTP_RESEND_DELAY_MS - (now - record.last_sent_at).num_milliseconds();
    if remaining_ms <= 0 {
        0
    } else {
        (remaining_ms as u64).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::BrokenStore;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    const PHONE: &str = "+639171234567";

    #[derive(Default, Clone)]
    struct Outbox(Arc<Mutex<Vec<(String, String)>>>);

    impl CodeDelivery for Outbox {
        fn deliver(&self, identity: &str, code: &str) -> Result<(), String> {
            self.0.lock().unwrap().push((identity.to_string(), code.to_string()));
            Ok(())
        }
    }

    struct FailingDelivery;

    impl CodeDelivery for FailingDelivery {
        fn deliver(&self, _identity: &str, _code: &str) -> Result<(), String> {
            Err("gateway down".to_string())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn service() -> (OtpService<Arc<MemoryStore>, Outbox>, Arc<MemoryStore>, Outbox) {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::default();
        (OtpService::new(Arc::clone(&store), outbox.clone()), store, outbox)
    }

    #[test]
    fn test_request_stores_and_delivers_six_digits() {
        let (otp, store, outbox) = service();
        let code = otp.request_code_at(PHONE, t0()).unwrap();

        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(outbox.0.lock().unwrap().as_slice(), &[(PHONE.to_string(), code.clone())]);

        let raw = store.get(OTP_STORAGE_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["identity"], PHONE);
        assert_eq!(json["code"], code.as_str());
        assert_eq!(json["createdAt"], t0().timestamp_millis());
        assert_eq!(json["expiresAt"], t0().timestamp_millis() + OTP_EXPIRY_MS);
    }

    #[test]
    fn test_cooldown_rounds_up() {
        let (otp, _, _) = service();
        otp.request_code_at(PHONE, t0()).unwrap();

        let err = otp
            .request_code_at(PHONE, t0() + Duration::milliseconds(20_500))
            .unwrap_err();
        assert!(matches!(err, OtpError::Cooldown { remaining_secs: 40 }));

        assert!(otp.request_code_at(PHONE, t0() + Duration::seconds(60)).is_ok());
    }

    #[test]
    fn test_other_identity_is_not_rate_limited() {
        let (otp, _, _) = service();
        otp.request_code_at(PHONE, t0()).unwrap();
        assert!(otp.request_code_at("+639998887777", t0() + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_verify_success_consumes_record() {
        let (otp, store, _) = service();
        let code = otp.request_code_at(PHONE, t0()).unwrap();

        otp.verify_code_at(PHONE, &code, t0() + Duration::minutes(2)).unwrap();
        assert_eq!(store.get(OTP_STORAGE_KEY).unwrap(), None);
        assert!(matches!(
            otp.verify_code_at(PHONE, &code, t0() + Duration::minutes(2)),
            Err(OtpError::NotRequested)
        ));
    }

    #[test]
    fn test_verify_rejections() {
        let (otp, store, _) = service();
        let code = otp.request_code_at(PHONE, t0()).unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        assert!(matches!(
            otp.verify_code_at("+630000000000", &code, t0()),
            Err(OtpError::IdentityMismatch)
        ));
        assert!(matches!(
            otp.verify_code_at(PHONE, wrong, t0()),
            Err(OtpError::Incorrect)
        ));
        // Wrong guesses leave the record in place
        assert!(store.get(OTP_STORAGE_KEY).unwrap().is_some());
    }

    #[test]
    fn test_expired_code_is_removed() {
        let (otp, store, _) = service();
        let code = otp.request_code_at(PHONE, t0()).unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        // Exactly at expiry is still checked against the code
        let at_expiry = t0() + Duration::milliseconds(OTP_EXPIRY_MS);
        assert!(matches!(
            otp.verify_code_at(PHONE, wrong, at_expiry),
            Err(OtpError::Incorrect)
        ));

        let err = otp
            .verify_code_at(PHONE, &code, at_expiry + Duration::milliseconds(1))
            .unwrap_err();
        assert!(matches!(err, OtpError::Expired));
        assert_eq!(store.get(OTP_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_resend_status() {
        let (otp, _, _) = service();
        assert_eq!(
            otp.resend_status_at(PHONE, t0()),
            ResendStatus { can_resend: true, remaining_secs: 0 }
        );

        otp.request_code_at(PHONE, t0()).unwrap();
        assert_eq!(
            otp.resend_status_at(PHONE, t0() + Duration::seconds(15)),
            ResendStatus { can_resend: false, remaining_secs: 45 }
        );
        assert!(otp.resend_status_at("+630000000000", t0()).can_resend);
        assert!(otp.resend_status_at(PHONE, t0() + Duration::seconds(61)).can_resend);
    }

    #[test]
    fn test_clear() {
        let (otp, store, _) = service();
        otp.request_code_at(PHONE, t0()).unwrap();
        otp.clear().unwrap();
        assert_eq!(store.get(OTP_STORAGE_KEY).unwrap(), None);
        assert!(otp.resend_status_at(PHONE, t0()).can_resend);
    }

    #[test]
    fn test_corrupt_record_is_replaced() {
        let (otp, store, _) = service();
        store.set(OTP_STORAGE_KEY, "{not json").unwrap();
        assert!(matches!(
            otp.verify_code_at(PHONE, "123456", t0()),
            Err(OtpError::NotRequested)
        ));
        assert!(otp.request_code_at(PHONE, t0()).is_ok());
    }

    #[test]
    fn test_delivery_failure_surfaces() {
        let otp = OtpService::new(MemoryStore::new(), FailingDelivery);
        assert!(matches!(
            otp.request_code_at(PHONE, t0()),
            Err(OtpError::Delivery(msg)) if msg == "gateway down"
        ));
    }

    #[test]
    fn test_storage_failure_surfaces() {
        let otp = OtpService::new(BrokenStore, LogDelivery);
        assert!(matches!(otp.request_code(PHONE), Err(OtpError::Storage(_))));
        assert!(otp.resend_status(PHONE).can_resend);
    }
}
