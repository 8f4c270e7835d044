//! Capacity- and time-bounded cache that also tracks per-key validators.

// std
use std::num::NonZeroUsize;
// crates.io
use lru::LruCache;
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	cache::{entry::CacheEntry, stats::CacheStats},
	config::CacheConfig,
	fingerprint::Fingerprint,
	metrics,
};

/// LRU + TTL cache keyed by [`Fingerprint`].
///
/// Every operation, including reads that only update recency, runs under one mutex so callers
/// never observe a partially applied `set`. Expiry is lazy: an entry past its TTL is removed by
/// the first [`get`](Self::get) that finds it.
#[derive(Debug)]
pub struct ValidatedCache<V> {
	ttl: Duration,
	inner: Mutex<Inner<V>>,
}
impl<V> ValidatedCache<V>
where
	V: Clone,
{
	/// Build an empty cache from validated configuration.
	pub fn new(config: &CacheConfig) -> Result<Self> {
		config.validate()?;

		let capacity = NonZeroUsize::new(config.max_entries).ok_or_else(|| Error::Validation {
			field: "cache.max_entries",
			reason: "Must be greater than zero.".into(),
		})?;

		Ok(Self {
			ttl: config.ttl,
			inner: Mutex::new(Inner {
				entries: LruCache::new(capacity),
				hits: 0,
				misses: 0,
				evictions: 0,
			}),
		})
	}

	/// Configured time-to-live.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Look up a fresh value, promoting it to most-recently-used.
	///
	/// An expired entry is removed together with its validator and counted as a miss.
	pub async fn get(&self, fingerprint: &Fingerprint) -> Option<V> {
		let now = Instant::now();
		let mut guard = self.inner.lock().await;
		let inner = &mut *guard;
		let lookup = inner
			.entries
			.get(fingerprint)
			.map(|entry| entry.is_fresh(now, self.ttl).then(|| entry.value().clone()));

		match lookup {
			Some(Some(value)) => {
				inner.hits += 1;
				metrics::record_cache_hit();

				tracing::debug!(fingerprint = %fingerprint, "cache hit");

				Some(value)
			},
			Some(None) => {
				inner.entries.pop(fingerprint);
				inner.misses += 1;
				metrics::record_cache_miss();

				tracing::debug!(fingerprint = %fingerprint, "cache entry expired");

				None
			},
			None => {
				inner.misses += 1;
				metrics::record_cache_miss();

				tracing::debug!(fingerprint = %fingerprint, "cache miss");

				None
			},
		}
	}

	/// Fresh value without touching recency or counters.
	pub async fn peek(&self, fingerprint: &Fingerprint) -> Option<V> {
		let now = Instant::now();
		let inner = self.inner.lock().await;

		inner
			.entries
			.peek(fingerprint)
			.filter(|entry| entry.is_fresh(now, self.ttl))
			.map(|entry| entry.value().clone())
	}

	/// Insert or overwrite an entry as most-recently-used.
	///
	/// When the insert pushes the cache over capacity exactly one least-recently-used entry is
	/// evicted; its key is returned.
	pub async fn set(
		&self,
		fingerprint: Fingerprint,
		value: V,
		validator: Option<String>,
	) -> Option<Fingerprint> {
		let entry = CacheEntry::new(value, validator);
		let mut inner = self.inner.lock().await;

		match inner.entries.push(fingerprint.clone(), entry) {
			Some((evicted, _)) if evicted != fingerprint => {
				inner.evictions += 1;
				metrics::record_cache_eviction();

				tracing::info!(
					fingerprint = %fingerprint,
					evicted = %evicted,
					"evicted least recently used entry"
				);

				Some(evicted)
			},
			_ => None,
		}
	}

	/// Validator of a fresh entry. Does not affect recency or counters.
	pub async fn get_validator(&self, fingerprint: &Fingerprint) -> Option<String> {
		let now = Instant::now();
		let inner = self.inner.lock().await;

		inner
			.entries
			.peek(fingerprint)
			.filter(|entry| entry.is_fresh(now, self.ttl))
			.and_then(|entry| entry.validator().map(str::to_owned))
	}

	/// Snapshot of the stored keys, most recently used first.
	///
	/// Entries that expired but were not read since are still listed.
	pub async fn keys(&self) -> Vec<Fingerprint> {
		self.inner.lock().await.entries.iter().map(|(key, _)| key.clone()).collect()
	}

	/// Whether a fresh entry exists for `fingerprint`. Does not affect recency or counters.
	pub async fn contains(&self, fingerprint: &Fingerprint) -> bool {
		let now = Instant::now();

		self.inner
			.lock()
			.await
			.entries
			.peek(fingerprint)
			.is_some_and(|entry| entry.is_fresh(now, self.ttl))
	}

	/// Number of stored entries.
	pub async fn len(&self) -> usize {
		self.inner.lock().await.entries.len()
	}

	/// Whether the cache holds no entries.
	pub async fn is_empty(&self) -> bool {
		self.inner.lock().await.entries.is_empty()
	}

	/// Current counters.
	pub async fn stats(&self) -> CacheStats {
		let inner = self.inner.lock().await;

		CacheStats::new(inner.hits, inner.misses, inner.entries.len(), inner.evictions)
	}

	/// Drop every entry and validator and reset the counters.
	pub async fn clear(&self) {
		let mut inner = self.inner.lock().await;

		inner.entries.clear();
		inner.hits = 0;
		inner.misses = 0;
		inner.evictions = 0;

		tracing::info!("cache cleared");
	}
}

#[derive(Debug)]
struct Inner<V> {
	entries: LruCache<Fingerprint, CacheEntry<V>>,
	hits: u64,
	misses: u64,
	evictions: u64,
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::time;
	// self
	use super::*;

	fn cache(max_entries: usize, ttl_secs: u64) -> ValidatedCache<&'static str> {
		ValidatedCache::new(&CacheConfig { max_entries, ttl: Duration::from_secs(ttl_secs) })
			.expect("cache")
	}

	fn key(raw: &str) -> Fingerprint {
		Fingerprint::from_raw(raw)
	}

	#[tokio::test]
	async fn evicts_exactly_the_least_recently_inserted_entry() {
		let cache = cache(3, 300);

		assert!(cache.set(key("k1"), "v1", None).await.is_none());
		assert!(cache.set(key("k2"), "v2", None).await.is_none());
		assert!(cache.set(key("k3"), "v3", None).await.is_none());
		assert_eq!(cache.set(key("k4"), "v4", None).await, Some(key("k1")));

		assert_eq!(cache.get(&key("k1")).await, None);
		assert_eq!(cache.get(&key("k2")).await, Some("v2"));
		assert_eq!(cache.get(&key("k3")).await, Some("v3"));
		assert_eq!(cache.get(&key("k4")).await, Some("v4"));
		assert_eq!(cache.stats().await.evictions, 1);
	}

	#[tokio::test]
	async fn reads_refresh_recency() {
		let cache = cache(3, 300);

		cache.set(key("k1"), "v1", None).await;
		cache.set(key("k2"), "v2", None).await;
		cache.set(key("k3"), "v3", None).await;

		assert_eq!(cache.get(&key("k1")).await, Some("v1"));
		assert_eq!(cache.set(key("k4"), "v4", None).await, Some(key("k2")));
		assert!(cache.contains(&key("k1")).await);
		assert!(!cache.contains(&key("k2")).await);
	}

	#[tokio::test]
	async fn overwriting_a_key_never_evicts() {
		let cache = cache(2, 300);

		cache.set(key("k1"), "v1", Some("e1".into())).await;
		cache.set(key("k2"), "v2", None).await;

		assert!(cache.set(key("k1"), "v1b", None).await.is_none());
		assert_eq!(cache.len().await, 2);
		assert_eq!(cache.get(&key("k1")).await, Some("v1b"));
		assert_eq!(cache.get_validator(&key("k1")).await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn entries_expire_after_ttl_and_count_one_miss() {
		let cache = cache(3, 300);

		cache.set(key("k"), "v", Some("e1".into())).await;

		time::advance(Duration::from_secs(299)).await;

		assert_eq!(cache.get(&key("k")).await, Some("v"));

		time::advance(Duration::from_secs(2)).await;

		assert_eq!(cache.get_validator(&key("k")).await, None);
		assert_eq!(cache.get(&key("k")).await, None);

		let stats = cache.stats().await;

		assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 0));
		assert!(cache.keys().await.is_empty());

		assert_eq!(cache.get(&key("k")).await, None);
		assert_eq!(cache.stats().await.misses, 2);
	}

	#[tokio::test]
	async fn validators_follow_their_entries() {
		let cache = cache(1, 300);

		cache.set(key("k"), "v", Some("e1".into())).await;

		assert_eq!(cache.get_validator(&key("k")).await.as_deref(), Some("e1"));

		cache.set(key("other"), "w", None).await;

		assert_eq!(cache.get_validator(&key("k")).await, None);
		assert_eq!(cache.get_validator(&key("other")).await, None);
	}

	#[tokio::test]
	async fn validator_lookups_leave_counters_and_recency_alone() {
		let cache = cache(2, 300);

		cache.set(key("k1"), "v1", Some("e1".into())).await;
		cache.set(key("k2"), "v2", None).await;
		cache.get_validator(&key("k1")).await;
		cache.peek(&key("k1")).await;

		assert_eq!(cache.set(key("k3"), "v3", None).await, Some(key("k1")));
		assert_eq!(cache.stats().await, CacheStats::new(0, 0, 2, 1));
	}

	#[tokio::test]
	async fn stats_report_hits_misses_and_ratio() {
		let cache = cache(3, 300);

		cache.set(key("k"), "v", None).await;
		cache.get(&key("k")).await;
		cache.get(&key("missing")).await;

		let stats = cache.stats().await;

		assert_eq!((stats.hits, stats.misses, stats.total), (1, 1, 2));
		assert_eq!(stats.hit_ratio, 0.5);
	}

	#[tokio::test]
	async fn clear_resets_entries_and_counters() {
		let cache = cache(3, 300);

		cache.set(key("k"), "v", Some("e1".into())).await;
		cache.get(&key("k")).await;
		cache.clear().await;

		assert!(cache.is_empty().await);
		assert_eq!(cache.get_validator(&key("k")).await, None);
		assert_eq!(cache.stats().await, CacheStats::default());
	}

	#[test]
	fn zero_capacity_is_rejected() {
		let err = ValidatedCache::<u8>::new(&CacheConfig { max_entries: 0, ttl: Duration::from_secs(1) })
			.expect_err("zero capacity");

		assert!(matches!(err, Error::Validation { .. }));
	}
}
