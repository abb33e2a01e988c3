//! Wall-clock abstraction.
//!
//! All timestamps in Muster are epoch milliseconds. Services read the time
//! through [`Clock`] so that tests can pin it with [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub trait Clock: Send + Sync {
  /// Current time in epoch milliseconds.
  fn now_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 { Utc::now().timestamp_millis() }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(now_ms: i64) -> Self { Self { now: AtomicI64::new(now_ms) } }

  pub fn set(&self, now_ms: i64) { self.now.store(now_ms, Ordering::SeqCst); }

  pub fn advance(&self, delta_ms: i64) {
    self.now.fetch_add(delta_ms, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_ms(&self) -> i64 { self.now.load(Ordering::SeqCst) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    clock.advance(250);
    assert_eq!(clock.now_ms(), 1_250);
    clock.set(42);
    assert_eq!(clock.now_ms(), 42);
  }
}
