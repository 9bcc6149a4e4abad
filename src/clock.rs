//! Injectable UTC time source.

// std
use std::{fmt::Debug, sync::Mutex};
// self
use crate::_prelude::*;

/// Supplies the current UTC time.
pub trait Clock: Debug + Send + Sync {
	/// Current wall-clock time.
	fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedClock {
	now: Mutex<DateTime<Utc>>,
}
impl FixedClock {
	/// Create a clock frozen at `now`.
	pub fn new(now: DateTime<Utc>) -> Arc<Self> {
		Arc::new(Self { now: Mutex::new(now) })
	}

	/// Move the clock to an absolute instant.
	pub fn set(&self, now: DateTime<Utc>) {
		*self.lock() = now;
	}

	/// Advance the clock by `delta`.
	pub fn advance(&self, delta: TimeDelta) {
		let mut guard = self.lock();

		*guard += delta;
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
		// A poisoned clock still holds a valid timestamp.
		self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		*self.lock()
	}
}
