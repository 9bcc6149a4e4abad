//! Cached key-set snapshot.

// self
use crate::{_prelude::*, keys::SigningKey};

/// Margin subtracted from the advertised lifetime to tolerate clock drift.
pub const EXPIRY_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Immutable snapshot of a fetched key set, swapped wholesale on refresh.
#[derive(Clone, Debug)]
pub struct KeyCache {
	/// Keys published by the remote service.
	pub keys: Arc<[SigningKey]>,
	/// When the snapshot was fetched.
	pub fetched_at: DateTime<Utc>,
	/// Instant at or after which the snapshot must be refreshed.
	pub expires_at: DateTime<Utc>,
}
impl KeyCache {
	/// Build a snapshot from a fetch completed at `now` whose response advertised `ttl`.
	///
	/// A zero `ttl` (no `max-age`) expires immediately, so the next call refetches.
	pub fn new(keys: Arc<[SigningKey]>, now: DateTime<Utc>, ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			now
		} else {
			TimeDelta::from_std(ttl)
				.ok()
				.and_then(|ttl| ttl.checked_sub(&EXPIRY_MARGIN))
				.and_then(|lifetime| now.checked_add_signed(lifetime))
				.unwrap_or(now)
		};

		Self { keys, fetched_at: now, expires_at }
	}

	/// Whether the snapshot is past its expiry.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}
}
