//! Read-through cache manager coordinating the cache, the upstream and subscribers.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// self
use crate::{
	_prelude::*,
	cache::store::ValidatedCache,
	catalog::CharacterPage,
	fingerprint::{CharacterQuery, Fingerprint},
	http::client::{Upstream, UpstreamResponse},
	metrics::{self, RevalidationStatus},
	refresh::task::{AttemptOutcome, RevalidationOutcome, RevalidationTask},
	registry::SubscriptionRegistry,
};

/// Cache of decoded character pages.
pub type PageCache = ValidatedCache<Arc<CharacterPage>>;
/// Registry pushing decoded character pages.
pub type PageRegistry = SubscriptionRegistry<Arc<CharacterPage>>;

/// Serves reads from the cache, fetching and publishing on a miss, and performs the single
/// revalidation attempts driven by the retry workers.
///
/// Upstream calls never run under the cache lock; only the final `set` re-acquires it.
#[derive(Clone)]
pub struct CacheManager {
	cache: Arc<PageCache>,
	registry: Arc<PageRegistry>,
	upstream: Arc<dyn Upstream>,
}
impl CacheManager {
	/// Wire a manager over shared state.
	pub fn new(
		cache: Arc<PageCache>,
		registry: Arc<PageRegistry>,
		upstream: Arc<dyn Upstream>,
	) -> Self {
		Self { cache, registry, upstream }
	}

	/// Underlying cache.
	pub fn cache(&self) -> &Arc<PageCache> {
		&self.cache
	}

	/// Underlying subscription registry.
	pub fn registry(&self) -> &Arc<PageRegistry> {
		&self.registry
	}

	/// Resolve a query, serving a fresh cached page or fetching it upstream.
	///
	/// A miss always fetches unconditionally, since an expired entry has already lost its
	/// validator. A fetched page is stored and pushed to the topic's subscribers in the background.
	/// Upstream failures are returned as-is; nothing stale is served.
	#[tracing::instrument(skip(self, query), fields(fingerprint = tracing::field::Empty))]
	pub async fn resolve(&self, query: &CharacterQuery) -> Result<Arc<CharacterPage>> {
		let query = query.canonical();
		let fingerprint = query.fingerprint();

		tracing::Span::current().record("fingerprint", tracing::field::display(&fingerprint));

		if let Some(page) = self.cache.get(&fingerprint).await {
			return Ok(page);
		}

		match self.upstream.fetch(&query, None).await? {
			UpstreamResponse::Modified { page, validator } => {
				let page = Arc::new(page);

				self.cache.set(fingerprint.clone(), page.clone(), validator).await;
				self.spawn_broadcast(fingerprint, page.clone());

				Ok(page)
			},
			UpstreamResponse::NotModified =>
				Err(Error::Cache("Received 304 status for an unconditional request.".into())),
		}
	}

	/// Run one revalidation attempt for `task`.
	///
	/// Sends the cached validator when one is known. "Not modified" leaves the cache untouched;
	/// fresh content replaces the entry and is broadcast before returning.
	#[tracing::instrument(
		skip(self, task),
		fields(fingerprint = %task.fingerprint, attempt = task.attempts)
	)]
	pub async fn revalidate(&self, task: &RevalidationTask) -> AttemptOutcome {
		let validator = self.cache.get_validator(&task.fingerprint).await;
		let start = Instant::now();
		let response = self.upstream.fetch(&task.query, validator.as_deref()).await;
		let elapsed = start.elapsed();

		match response {
			Ok(UpstreamResponse::NotModified) => {
				metrics::record_revalidation(RevalidationStatus::NotModified, elapsed);

				tracing::debug!("content unchanged");

				AttemptOutcome::Success(RevalidationOutcome::NotModified)
			},
			Ok(UpstreamResponse::Modified { page, validator }) => {
				let page = Arc::new(page);

				self.cache.set(task.fingerprint.clone(), page.clone(), validator).await;

				let report = self.registry.broadcast_if_subscribed(&task.fingerprint, page).await;

				metrics::record_revalidation(RevalidationStatus::Updated, elapsed);

				tracing::info!(
					delivered = report.delivered,
					failed = report.failed,
					"cache entry updated"
				);

				AttemptOutcome::Success(RevalidationOutcome::Updated {
					delivered: report.delivered,
					failed: report.failed,
				})
			},
			Err(err) => {
				metrics::record_revalidation(RevalidationStatus::Error, elapsed);

				AttemptOutcome::from_error(err)
			},
		}
	}

	fn spawn_broadcast(&self, topic: Fingerprint, page: Arc<CharacterPage>) {
		if self.registry.subscriber_count(&topic) == 0 {
			return;
		}

		let registry = self.registry.clone();

		tokio::spawn(async move {
			registry.broadcast_if_subscribed(&topic, page).await;
		});
	}
}
impl Debug for CacheManager {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("CacheManager")
			.field("cache", &self.cache)
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}
