//! Shared fixtures for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::crypto::{MacSigner, SignerError};
use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};
use crate::types::SigningKeyRef;

/// A whole-second instant so token timestamps compare exactly.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Deterministic stand-in for the remote authority.
///
/// The "MAC" is SHA-256 over a per-instance secret, the key name and the
/// data, which is enough for tests to tell keys and payloads apart.
pub struct FakeSigner {
    secret: [u8; 16],
    failure: Mutex<Option<SignerError>>,
    verify_calls: AtomicUsize,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self {
            secret: *b"fake-signer-seed",
            failure: Mutex::new(None),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Make every later call fail with `err`.
    pub fn fail_with(&self, err: SignerError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), SignerError> {
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn mac(&self, key: &SigningKeyRef, data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(key.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(data);
        hasher.finalize().to_vec()
    }
}

#[async_trait]
impl MacSigner for FakeSigner {
    async fn sign(&self, key: &SigningKeyRef, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.check_failure()?;
        Ok(self.mac(key, data))
    }

    async fn verify(
        &self,
        key: &SigningKeyRef,
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool, SignerError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.mac(key, data) == mac)
    }
}

/// Fresh in-memory database with the schema applied.
pub async fn memory_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}
