//! Self-refreshing read-through cache for a character-catalog API, with ETag revalidation and
//! push notifications to long-lived subscribers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod fingerprint;
pub mod http;
pub mod metrics;
pub mod refresh;
pub mod registry;
pub mod service;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(test)]
mod _test {
	// std
	use std::{
		collections::VecDeque,
		sync::{
			Mutex,
			atomic::{AtomicUsize, Ordering},
		},
	};
	// crates.io
	use async_trait::async_trait;
	use tracing_subscriber as _;
	use wiremock as _;
	// self
	use crate::{
		_prelude::*,
		catalog::{Character, CharacterData, CharacterPage},
		error::DeliveryError,
		fingerprint::CharacterQuery,
		http::client::{Upstream, UpstreamResponse},
		registry::{Subscriber, SubscriberId},
	};

	/// One scripted upstream reply.
	#[derive(Clone, Debug)]
	pub(crate) enum Scripted {
		Page(CharacterPage, Option<String>),
		NotModified,
		Status(u16),
	}
	impl Scripted {
		pub(crate) fn page(name: &str, validator: Option<&str>) -> Self {
			Self::Page(sample_page(name), validator.map(str::to_owned))
		}

		fn into_response(self) -> Result<UpstreamResponse> {
			match self {
				Self::Page(page, validator) => Ok(UpstreamResponse::Modified { page, validator }),
				Self::NotModified => Ok(UpstreamResponse::NotModified),
				Self::Status(code) => Err(Error::HttpStatus {
					status: ::http::StatusCode::from_u16(code).expect("status code"),
					url: url::Url::parse("https://gateway.example/v1/public/characters")
						.expect("url"),
					body: None,
				}),
			}
		}
	}

	/// Upstream double replaying a script; the last reply repeats forever.
	#[derive(Debug)]
	pub(crate) struct ScriptedUpstream {
		script: Mutex<VecDeque<Scripted>>,
		validators: Mutex<Vec<Option<String>>>,
		calls: AtomicUsize,
	}
	impl ScriptedUpstream {
		pub(crate) fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
			Arc::new(Self {
				script: Mutex::new(script.into_iter().collect()),
				validators: Mutex::new(Vec::new()),
				calls: AtomicUsize::new(0),
			})
		}

		pub(crate) fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		pub(crate) fn validators(&self) -> Vec<Option<String>> {
			self.validators.lock().expect("validators lock").clone()
		}
	}
	#[async_trait]
	impl Upstream for ScriptedUpstream {
		async fn fetch(
			&self,
			_: &CharacterQuery,
			validator: Option<&str>,
		) -> Result<UpstreamResponse> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.validators.lock().expect("validators lock").push(validator.map(str::to_owned));

			let next = {
				let mut script = self.script.lock().expect("script lock");

				if script.len() > 1 { script.pop_front() } else { script.front().cloned() }
			};

			next.unwrap_or(Scripted::Status(503)).into_response()
		}
	}

	/// Sink whose delivery never completes.
	#[derive(Debug)]
	pub(crate) struct HungSubscriber(pub(crate) SubscriberId);
	impl HungSubscriber {
		pub(crate) fn new() -> Arc<Self> {
			Arc::new(Self(SubscriberId::allocate()))
		}
	}
	#[async_trait]
	impl<M> Subscriber<M> for HungSubscriber
	where
		M: Send + 'static,
	{
		fn id(&self) -> SubscriberId {
			self.0
		}

		async fn deliver(&self, _: M) -> std::result::Result<(), DeliveryError> {
			std::future::pending().await
		}
	}

	pub(crate) fn sample_page(name: &str) -> CharacterPage {
		CharacterPage {
			code: 200,
			status: "Ok".into(),
			copyright: String::new(),
			attribution_text: String::new(),
			attribution_html: String::new(),
			etag: None,
			data: CharacterData {
				offset: 0,
				limit: 20,
				total: 1,
				count: 1,
				results: vec![Character { id: 1, name: name.into(), ..Default::default() }],
			},
		}
	}
}

pub use crate::{
	cache::{
		manager::{CacheManager, PageCache, PageRegistry},
		stats::CacheStats,
		store::ValidatedCache,
	},
	catalog::CharacterPage,
	config::{
		CacheConfig, JitterStrategy, RefreshConfig, RetryPolicy, ServiceConfig, ServiceConfigBuilder,
		SubscriptionConfig, UpstreamConfig,
	},
	error::{DeliveryError, Error, Result},
	fingerprint::{CharacterQuery, Fingerprint, QueryParams},
	http::client::{CatalogClient, Upstream, UpstreamResponse},
	refresh::{
		queue::{EnqueueError, TaskQueue},
		scheduler::{RefreshScheduler, TickReport},
		task::{AttemptOutcome, RevalidationOutcome, RevalidationTask, TaskState},
		worker::RetryWorker,
	},
	registry::{
		BroadcastReport, ChannelSubscriber, Subscriber, SubscriberId, Subscription,
		SubscriptionRegistry,
	},
	service::{BackgroundTasks, CatalogService},
};
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
