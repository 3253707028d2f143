//! Time source abstraction.
//!
//! `now()` in the surface language resolves through a [`NowSource`] so rule
//! productions stay deterministic under test. Constraints may not call
//! `now()` at all; the analyzer rejects it there.

use std::sync::Arc;

/// Supplies the current wall-clock time in milliseconds since the Unix epoch.
pub trait NowSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Production clock backed by the OS.
#[derive(Debug, Default)]
pub struct SystemClock;

impl NowSource for SystemClock {
    fn now_ms(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Fixed clock for tests and replay.
#[derive(Debug)]
pub struct FixedClock(pub i64);

impl NowSource for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// Shared clock handle.
pub type Clock = Arc<dyn NowSource>;

/// The default production clock.
pub fn system_clock() -> Clock {
    Arc::new(SystemClock)
}

/// A clock pinned to a fixed instant.
pub fn fixed_clock(ms: i64) -> Clock {
    Arc::new(FixedClock(ms))
}
