//! Metrics helpers for cache, revalidation and broadcast telemetry.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_HITS_TOTAL: &str = "catalog_cache_hits_total";
const METRIC_MISSES_TOTAL: &str = "catalog_cache_misses_total";
const METRIC_EVICTIONS_TOTAL: &str = "catalog_cache_evictions_total";
const METRIC_REVALIDATIONS_TOTAL: &str = "catalog_cache_revalidations_total";
const METRIC_REVALIDATION_DURATION: &str = "catalog_cache_revalidation_duration_seconds";
const METRIC_BROADCAST_DELIVERIES: &str = "catalog_cache_broadcast_deliveries_total";
const METRIC_TASKS_DROPPED: &str = "catalog_cache_tasks_dropped_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Result label attached to revalidation attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevalidationStatus {
	/// Upstream answered "not modified".
	NotModified,
	/// Fresh content was stored.
	Updated,
	/// The attempt failed.
	Error,
}
impl RevalidationStatus {
	fn as_label(self) -> &'static str {
		match self {
			Self::NotModified => "not_modified",
			Self::Updated => "updated",
			Self::Error => "error",
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a lookup served from a fresh entry.
pub fn record_cache_hit() {
	metrics::counter!(METRIC_HITS_TOTAL).increment(1);
}

/// Record a lookup that found nothing usable.
pub fn record_cache_miss() {
	metrics::counter!(METRIC_MISSES_TOTAL).increment(1);
}

/// Record a capacity eviction.
pub fn record_cache_eviction() {
	metrics::counter!(METRIC_EVICTIONS_TOTAL).increment(1);
}

/// Record one revalidation attempt and its latency.
pub fn record_revalidation(status: RevalidationStatus, duration: Duration) {
	metrics::counter!(METRIC_REVALIDATIONS_TOTAL, status_labels(status.as_label()).iter())
		.increment(1);
	metrics::histogram!(METRIC_REVALIDATION_DURATION).record(duration.as_secs_f64());
}

/// Record the per-subscriber results of one broadcast.
pub fn record_broadcast(delivered: usize, failed: usize) {
	if delivered > 0 {
		metrics::counter!(METRIC_BROADCAST_DELIVERIES, status_labels("delivered").iter())
			.increment(delivered as u64);
	}
	if failed > 0 {
		metrics::counter!(METRIC_BROADCAST_DELIVERIES, status_labels("failed").iter())
			.increment(failed as u64);
	}
}

/// Record a revalidation task dropped because the queue was full.
pub fn record_task_dropped() {
	metrics::counter!(METRIC_TASKS_DROPPED).increment(1);
}

fn status_labels(status: &'static str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("status", status));

	labels
}

#[cfg(test)]
mod tests {
	// std
	use std::borrow::Borrow;
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, f);

		snapshotter
			.snapshot()
			.into_vec()
			.into_iter()
			.map(|(key, _, _, value)| (key, value))
			.collect()
	}

	fn counter_value(
		snapshot: &[(CompositeKey, DebugValue)],
		name: &str,
		labels: &[(&str, &str)],
	) -> u64 {
		snapshot
			.iter()
			.find_map(|(key, value)| {
				(key.kind() == MetricKind::Counter
					&& Borrow::<str>::borrow(key.key().name()) == name
					&& labels_match(key, labels))
				.then(|| match value {
					DebugValue::Counter(value) => *value,
					_ => 0,
				})
			})
			.unwrap_or(0)
	}

	fn labels_match(key: &CompositeKey, expected: &[(&str, &str)]) -> bool {
		let labels: Vec<_> = key.key().labels().map(|label| (label.key(), label.value())).collect();

		labels.len() == expected.len()
			&& expected.iter().all(|(ek, ev)| labels.iter().any(|(lk, lv)| lk == ek && lv == ev))
	}

	#[test]
	fn records_cache_lookups_and_evictions() {
		let snapshot = capture_metrics(|| {
			record_cache_hit();
			record_cache_hit();
			record_cache_miss();
			record_cache_eviction();
		});

		assert_eq!(counter_value(&snapshot, "catalog_cache_hits_total", &[]), 2);
		assert_eq!(counter_value(&snapshot, "catalog_cache_misses_total", &[]), 1);
		assert_eq!(counter_value(&snapshot, "catalog_cache_evictions_total", &[]), 1);
	}

	#[test]
	#[cfg_attr(miri, ignore)]
	fn records_revalidations_broadcasts_and_drops() {
		let snapshot = capture_metrics(|| {
			record_revalidation(RevalidationStatus::Updated, Duration::from_millis(20));
			record_revalidation(RevalidationStatus::Error, Duration::from_millis(5));
			record_broadcast(2, 1);
			record_broadcast(0, 0);
			record_task_dropped();
		});

		assert_eq!(
			counter_value(&snapshot, "catalog_cache_revalidations_total", &[("status", "updated")]),
			1
		);
		assert_eq!(
			counter_value(&snapshot, "catalog_cache_revalidations_total", &[("status", "error")]),
			1
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"catalog_cache_broadcast_deliveries_total",
				&[("status", "delivered")]
			),
			2
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"catalog_cache_broadcast_deliveries_total",
				&[("status", "failed")]
			),
			1
		);
		assert_eq!(counter_value(&snapshot, "catalog_cache_tasks_dropped_total", &[]), 1);

		let recorded = snapshot.iter().any(|(key, value)| {
			key.kind() == MetricKind::Histogram
				&& Borrow::<str>::borrow(key.key().name())
					== "catalog_cache_revalidation_duration_seconds"
				&& matches!(value, DebugValue::Histogram(values) if values.len() == 2)
		});

		assert!(recorded, "revalidation durations recorded");
	}
}
