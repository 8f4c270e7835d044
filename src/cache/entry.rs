//! Cache entry definitions.

// self
use crate::_prelude::*;

/// A cached value together with the validator needed to revalidate it.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
	value: V,
	validator: Option<String>,
	inserted_at: Instant,
	refreshed_at: DateTime<Utc>,
}
impl<V> CacheEntry<V> {
	/// Timestamp a new entry now. Empty validators are not kept.
	pub fn new(value: V, validator: Option<String>) -> Self {
		Self {
			value,
			validator: validator.filter(|token| !token.is_empty()),
			inserted_at: Instant::now(),
			refreshed_at: Utc::now(),
		}
	}

	/// Cached value.
	pub fn value(&self) -> &V {
		&self.value
	}

	/// Validator returned alongside the value, if any.
	pub fn validator(&self) -> Option<&str> {
		self.validator.as_deref()
	}

	/// Monotonic insertion instant used for TTL checks.
	pub fn inserted_at(&self) -> Instant {
		self.inserted_at
	}

	/// Wall-clock time the value was stored.
	pub fn refreshed_at(&self) -> DateTime<Utc> {
		self.refreshed_at
	}

	/// Time elapsed since insertion.
	pub fn age(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.inserted_at)
	}

	/// Whether the entry is still within `ttl` at `now`.
	pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
		self.age(now) < ttl
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::time;
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn freshness_is_strictly_below_ttl() {
		let entry = CacheEntry::new("v", Some("e1".into()));
		let ttl = Duration::from_secs(10);

		assert!(entry.is_fresh(Instant::now(), ttl));

		time::advance(Duration::from_secs(10)).await;

		assert!(!entry.is_fresh(Instant::now(), ttl));
		assert_eq!(entry.age(Instant::now()), ttl);
	}

	#[test]
	fn empty_validators_are_dropped() {
		let entry = CacheEntry::new(1_u8, Some(String::new()));

		assert!(entry.validator().is_none());
		assert_eq!(*entry.value(), 1);
	}
}
