//! Wall-clock abstraction for deadline checks.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time in seconds since the epoch.
pub trait Clock: Send + Sync {
	fn now(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> i64 {
		i64::try_from(super::current_timestamp()).unwrap_or(i64::MAX)
	}
}

/// A clock that only moves when told to. Used for local simulation and tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
	pub fn new(now: i64) -> Self {
		Self(AtomicI64::new(now))
	}

	pub fn set(&self, now: i64) {
		self.0.store(now, Ordering::SeqCst);
	}

	pub fn advance(&self, seconds: i64) {
		self.0.fetch_add(seconds, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> i64 {
		self.0.load(Ordering::SeqCst)
	}
}
