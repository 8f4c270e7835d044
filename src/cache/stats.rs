//! Point-in-time cache counters.

// crates.io
use serde::Serialize;

/// Snapshot of the cache's hit/miss counters and occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
	/// Lookups served from a fresh entry.
	pub hits: u64,
	/// Lookups that found nothing or an expired entry.
	pub misses: u64,
	/// `hits + misses`.
	pub total: u64,
	/// `hits / max(1, total)`.
	pub hit_ratio: f64,
	/// Entries currently stored, including ones not yet lazily expired.
	pub entries: usize,
	/// Entries evicted for capacity since the last clear.
	pub evictions: u64,
}
impl CacheStats {
	/// Derive totals and the hit ratio from raw counters.
	pub fn new(hits: u64, misses: u64, entries: usize, evictions: u64) -> Self {
		let total = hits + misses;

		Self { hits, misses, total, hit_ratio: hits as f64 / total.max(1) as f64, entries, evictions }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hit_ratio_never_divides_by_zero() {
		assert_eq!(CacheStats::new(0, 0, 0, 0).hit_ratio, 0.0);

		let stats = CacheStats::new(1, 1, 3, 0);

		assert_eq!(stats.total, 2);
		assert_eq!(stats.hit_ratio, 0.5);
	}
}
