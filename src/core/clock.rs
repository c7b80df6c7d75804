//! Time source shared by the limiter, caches and the usage ledger

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Source of "now"
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same instant, so a test can hold one handle and give
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at the given instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Move forward by `step`
    pub fn advance(&self, step: Duration) {
        self.millis
            .fetch_add(step.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }
}

/// Milliseconds elapsed from `since` to `now`, zero if the clock went backwards
pub(crate) fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}
