//! Time source used by every expiry rule.

use chrono::{DateTime, Utc};

/// Source of the current instant.
///
/// Injected into the token codec and the credential managers so expiry is
/// computed from one place and can be driven by tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
