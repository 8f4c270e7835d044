//! Composition root owning the cache, the registry and the background tasks.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	cache::{
		manager::{CacheManager, PageCache, PageRegistry},
		stats::CacheStats,
	},
	catalog::CharacterPage,
	config::{ServiceConfig, UpstreamConfig},
	fingerprint::CharacterQuery,
	http::client::{CatalogClient, Upstream},
	refresh::{
		queue::TaskQueue, scheduler::RefreshScheduler, task::RevalidationTask, worker::RetryWorker,
	},
	registry::Subscription,
};

/// Near-real-time invalidation cache in front of the character catalog.
///
/// Each service owns its own cache and registry; build one per process (or per test).
#[derive(Clone, Debug)]
pub struct CatalogService {
	config: Arc<ServiceConfig>,
	manager: CacheManager,
	queue: TaskQueue,
}
impl CatalogService {
	/// Build a service around an arbitrary upstream.
	pub fn new(config: ServiceConfig, upstream: Arc<dyn Upstream>) -> Result<Self> {
		config.validate()?;

		let cache = Arc::new(PageCache::new(&config.cache)?);
		let registry =
			Arc::new(PageRegistry::with_delivery_timeout(config.subscriptions.delivery_timeout));
		let queue = TaskQueue::new(config.refresh.queue_capacity)?;
		let manager = CacheManager::new(cache, registry, upstream);

		Ok(Self { config: Arc::new(config), manager, queue })
	}

	/// Build a service backed by [`CatalogClient`].
	pub fn with_catalog_client(config: ServiceConfig, upstream: UpstreamConfig) -> Result<Self> {
		Self::new(config, Arc::new(CatalogClient::new(upstream)?))
	}

	/// Build a service from `CACHE_*` and `MARVEL_API_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::with_catalog_client(ServiceConfig::from_env()?, UpstreamConfig::from_env()?)
	}

	/// Active configuration.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Shared cache.
	pub fn cache(&self) -> &Arc<PageCache> {
		self.manager.cache()
	}

	/// Shared subscription registry.
	pub fn registry(&self) -> &Arc<PageRegistry> {
		self.manager.registry()
	}

	/// Inbound read: serve from cache or fetch upstream.
	pub async fn get_characters(&self, query: &CharacterQuery) -> Result<Arc<CharacterPage>> {
		self.manager.resolve(query).await
	}

	/// Listen for refreshed results of `query`.
	pub fn subscribe(&self, query: &CharacterQuery) -> Subscription<Arc<CharacterPage>> {
		let topic = query.canonical().fingerprint();

		tracing::debug!(topic = %topic, "new subscription");

		self.registry().subscribe_channel(topic, self.config.subscriptions.channel_capacity)
	}

	/// Current cache counters.
	pub async fn cache_stats(&self) -> CacheStats {
		self.cache().stats().await
	}

	/// Empty the cache and reset its counters.
	pub async fn clear_cache(&self) {
		self.cache().clear().await;
	}

	/// Queue a revalidation of `query` outside the periodic schedule.
	pub fn enqueue_revalidation(&self, query: &CharacterQuery) -> Result<()> {
		let task = RevalidationTask::from_query(query);
		let fingerprint = task.fingerprint.clone();

		self.queue.try_enqueue(task)?;

		tracing::debug!(fingerprint = %fingerprint, "revalidation enqueued");

		Ok(())
	}

	/// Start the scheduler and the configured number of retry workers.
	pub fn spawn_background(&self) -> BackgroundTasks {
		let refresh = &self.config.refresh;
		let scheduler =
			RefreshScheduler::new(self.cache().clone(), self.queue.clone(), refresh.interval);
		let mut handles = Vec::with_capacity(refresh.workers + 1);

		handles.push(tokio::spawn(scheduler.run()));

		for id in 0..refresh.workers {
			let worker = RetryWorker::new(
				id,
				self.manager.clone(),
				self.queue.clone(),
				refresh.retry_policy.clone(),
			);

			handles.push(tokio::spawn(worker.run()));
		}

		tracing::info!(
			workers = refresh.workers,
			interval = ?refresh.interval,
			queue_capacity = refresh.queue_capacity,
			"background revalidation started"
		);

		BackgroundTasks { handles }
	}
}

/// Handles of the scheduler and worker tasks. Dropping it stops them.
#[derive(Debug)]
pub struct BackgroundTasks {
	handles: Vec<JoinHandle<()>>,
}
impl BackgroundTasks {
	/// Number of running tasks.
	pub fn len(&self) -> usize {
		self.handles.len()
	}

	/// Whether no task is running.
	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	/// Abort every task and wait for them to wind down.
	pub async fn shutdown(mut self) {
		let handles = std::mem::take(&mut self.handles);

		for handle in &handles {
			handle.abort();
		}
		for handle in handles {
			if let Err(err) = handle.await
				&& !err.is_cancelled()
			{
				tracing::warn!(error = %err, "background task ended abnormally");
			}
		}

		tracing::info!("background revalidation stopped");
	}
}
impl Drop for BackgroundTasks {
	fn drop(&mut self) {
		for handle in &self.handles {
			handle.abort();
		}
	}
}
