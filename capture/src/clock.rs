//! The "shared monotonic-wall-clock reader" (§4.4) every sensor callback timestamps a
//! sample with on arrival. Kept behind a trait so pipeline tests can inject a fixed or
//! scripted clock instead of racing the real one.

use chrono::Utc;

/// Milliseconds-since-epoch clock. `now_millis` must never go backwards within one process
/// run, matching the monotonic-wall-clock contract the sampling pipeline relies on for its
/// lag filter.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The real clock, backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
