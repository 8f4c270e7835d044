//! Periodic scheduler that enqueues a revalidation for every cached key.

// crates.io
use tokio::time::{self, MissedTickBehavior};
// self
use crate::{
	_prelude::*,
	cache::manager::PageCache,
	metrics,
	refresh::{
		queue::{EnqueueError, TaskQueue},
		task::RevalidationTask,
	},
};

/// Counts from one scheduling tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
	/// Tasks accepted by the queue.
	pub scheduled: usize,
	/// Tasks dropped because the queue was full or closed.
	pub dropped: usize,
	/// Keys that could not be turned into a task.
	pub skipped: usize,
}

/// Ticks on a fixed period, independent of inbound traffic.
#[derive(Clone, Debug)]
pub struct RefreshScheduler {
	cache: Arc<PageCache>,
	queue: TaskQueue,
	interval: Duration,
}
impl RefreshScheduler {
	/// Create a scheduler feeding `queue` from `cache` every `interval`.
	pub fn new(cache: Arc<PageCache>, queue: TaskQueue, interval: Duration) -> Self {
		Self { cache, queue, interval }
	}

	/// Schedule one revalidation per cached key and report cache statistics.
	///
	/// Never waits on the queue; tasks that do not fit are dropped for this tick.
	pub async fn tick(&self) -> TickReport {
		let mut report = TickReport::default();

		for fingerprint in self.cache.keys().await {
			let task = match RevalidationTask::from_fingerprint(fingerprint.clone()) {
				Ok(task) => task,
				Err(err) => {
					tracing::warn!(fingerprint = %fingerprint, error = %err, "skipping unparsable key");

					report.skipped += 1;

					continue;
				},
			};

			match self.queue.try_enqueue(task) {
				Ok(()) => {
					report.scheduled += 1;

					tracing::debug!(fingerprint = %fingerprint, "revalidation enqueued");
				},
				Err(EnqueueError::Full(_) | EnqueueError::Closed(_)) => {
					report.dropped += 1;
					metrics::record_task_dropped();
				},
			}
		}

		if report.dropped > 0 {
			tracing::warn!(
				dropped = report.dropped,
				capacity = self.queue.capacity(),
				"revalidation queue full; tasks dropped for this tick"
			);
		}

		let stats = self.cache.stats().await;

		tracing::info!(
			hits = stats.hits,
			misses = stats.misses,
			total = stats.total,
			hit_ratio = stats.hit_ratio,
			entries = stats.entries,
			evictions = stats.evictions,
			scheduled = report.scheduled,
			"cache stats"
		);

		report
	}

	/// Tick forever. The first tick fires one full interval after start.
	pub async fn run(self) {
		let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;
			self.tick().await;
		}
	}
}
