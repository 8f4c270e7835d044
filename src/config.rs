//! Service configuration, validation, and retry policy.

// std
use std::{
	cell::RefCell,
	env,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Default maximum number of cached fingerprints.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;
/// Default time-to-live of a cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// Default period of the refresh scheduler.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20);
/// Default number of retry workers.
pub const DEFAULT_WORKERS: usize = 3;
/// Default capacity of the revalidation queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default attempt limit for a revalidation task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default per-subscriber buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// Default time a single subscriber may take to accept a pushed message.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default upstream endpoint.
pub const DEFAULT_BASE_URL: &str = "https://gateway.marvel.com/v1/public/characters";
/// Default upstream request timeout.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
/// Default size guard (4 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 4 * 1_048_576;

/// Supported jitter strategies for retry policies.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	None,
	/// Full jitter; randomize delay between 80% of the current backoff and the backoff itself.
	#[default]
	Full,
	/// Decorrelated jitter per AWS architecture guidance.
	Decorrelated,
}

/// Retry configuration for background revalidation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts per task, including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub initial_backoff: Duration,
	/// Upper bound applied to exponential backoff growth.
	pub max_backoff: Duration,
	/// Strategy used to randomize the computed backoff.
	#[serde(default)]
	pub jitter: JitterStrategy,
}
impl RetryPolicy {
	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.max_attempts == 0 {
			return Err(Error::Validation {
				field: "retry_policy.max_attempts",
				reason: "Must be at least 1.".into(),
			});
		}
		if self.initial_backoff.is_zero() {
			return Err(Error::Validation {
				field: "retry_policy.initial_backoff",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_backoff < self.initial_backoff {
			return Err(Error::Validation {
				field: "retry_policy.max_backoff",
				reason: "Must be greater than or equal to initial_backoff.".into(),
			});
		}

		Ok(())
	}

	/// Exponential backoff for the given zero-based retry, never below `initial_backoff`.
	pub fn compute_backoff(&self, retry: u32) -> Duration {
		let exponent = retry.min(32);
		let base = self.initial_backoff.mul_f64(2f64.powi(exponent as i32));
		let bounded = base.min(self.max_backoff).max(self.initial_backoff);

		self.apply_jitter(bounded, retry)
	}

	fn apply_jitter(&self, bounded: Duration, retry: u32) -> Duration {
		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full => {
				let lower = bounded.mul_f64(0.8).max(self.initial_backoff);
				let upper = bounded.min(self.max_backoff);

				random_within(lower, upper)
			},
			JitterStrategy::Decorrelated => {
				let prev = if retry == 0 { self.initial_backoff } else { bounded };
				let ceiling = self.max_backoff.min(prev.mul_f64(3.0));

				random_within(self.initial_backoff, ceiling.max(self.initial_backoff))
			},
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			initial_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(2),
			jitter: JitterStrategy::Full,
		}
	}
}

/// Capacity and freshness bounds of the validated cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
	/// Maximum number of entries before LRU eviction.
	#[serde(default = "default_max_entries")]
	pub max_entries: usize,
	/// Maximum age of an entry, measured from its last write.
	#[serde(default = "default_ttl")]
	pub ttl: Duration,
}
impl CacheConfig {
	/// Validate capacity and TTL.
	pub fn validate(&self) -> Result<()> {
		if self.max_entries == 0 {
			return Err(Error::Validation {
				field: "cache.max_entries",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.ttl.is_zero() {
			return Err(Error::Validation {
				field: "cache.ttl",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL }
	}
}

/// Scheduling and worker-pool settings for background revalidation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshConfig {
	/// Period between scheduler ticks.
	#[serde(default = "default_refresh_interval")]
	pub interval: Duration,
	/// Number of retry workers.
	#[serde(default = "default_workers")]
	pub workers: usize,
	/// Capacity of the revalidation queue; overflow is dropped.
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
	/// Retry policy applied to each task.
	#[serde(default)]
	pub retry_policy: RetryPolicy,
}
impl RefreshConfig {
	/// Validate scheduling settings.
	pub fn validate(&self) -> Result<()> {
		if self.interval.is_zero() {
			return Err(Error::Validation {
				field: "refresh.interval",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.workers == 0 {
			return Err(Error::Validation {
				field: "refresh.workers",
				reason: "Must be at least 1.".into(),
			});
		}
		if self.queue_capacity == 0 {
			return Err(Error::Validation {
				field: "refresh.queue_capacity",
				reason: "Must be greater than zero.".into(),
			});
		}

		self.retry_policy.validate()
	}
}
impl Default for RefreshConfig {
	fn default() -> Self {
		Self {
			interval: DEFAULT_REFRESH_INTERVAL,
			workers: DEFAULT_WORKERS,
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			retry_policy: RetryPolicy::default(),
		}
	}
}

/// Subscriber-side settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionConfig {
	/// Messages buffered per subscriber before it is considered too slow.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
	/// Upper bound on one delivery; a subscriber exceeding it is removed.
	#[serde(default = "default_delivery_timeout")]
	pub delivery_timeout: Duration,
}
impl SubscriptionConfig {
	/// Validate subscriber settings.
	pub fn validate(&self) -> Result<()> {
		if self.channel_capacity == 0 {
			return Err(Error::Validation {
				field: "subscriptions.channel_capacity",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.delivery_timeout.is_zero() {
			return Err(Error::Validation {
				field: "subscriptions.delivery_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for SubscriptionConfig {
	fn default() -> Self {
		Self {
			channel_capacity: DEFAULT_CHANNEL_CAPACITY,
			delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
		}
	}
}

/// Aggregate configuration consumed by [`CatalogService`](crate::service::CatalogService).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
	/// Cache bounds.
	#[serde(default)]
	pub cache: CacheConfig,
	/// Background refresh settings.
	#[serde(default)]
	pub refresh: RefreshConfig,
	/// Subscriber settings.
	#[serde(default)]
	pub subscriptions: SubscriptionConfig,
}
impl ServiceConfig {
	/// Create a [`ServiceConfigBuilder`].
	pub fn builder() -> ServiceConfigBuilder {
		ServiceConfigBuilder::default()
	}

	/// Defaults overridden by `CACHE_MAXSIZE` and `CACHE_TTL` (seconds) when set.
	pub fn from_env() -> Result<Self> {
		let mut config = Self::default();

		if let Some(max_entries) = env_number::<usize>("CACHE_MAXSIZE", "cache.max_entries")? {
			config.cache.max_entries = max_entries;
		}
		if let Some(ttl) = env_number::<u64>("CACHE_TTL", "cache.ttl")? {
			config.cache.ttl = Duration::from_secs(ttl);
		}

		config.validate()?;

		Ok(config)
	}

	/// Validate every section.
	pub fn validate(&self) -> Result<()> {
		self.cache.validate()?;
		self.refresh.validate()?;
		self.subscriptions.validate()
	}
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
	config: ServiceConfig,
}
impl ServiceConfigBuilder {
	/// Maximum number of cache entries.
	pub fn max_entries(mut self, value: usize) -> Self {
		self.config.cache.max_entries = value;

		self
	}

	/// Cache entry time-to-live.
	pub fn ttl(mut self, value: Duration) -> Self {
		self.config.cache.ttl = value;

		self
	}

	/// Scheduler period.
	pub fn refresh_interval(mut self, value: Duration) -> Self {
		self.config.refresh.interval = value;

		self
	}

	/// Number of retry workers.
	pub fn workers(mut self, value: usize) -> Self {
		self.config.refresh.workers = value;

		self
	}

	/// Revalidation queue capacity.
	pub fn queue_capacity(mut self, value: usize) -> Self {
		self.config.refresh.queue_capacity = value;

		self
	}

	/// Retry policy for revalidation tasks.
	pub fn retry_policy(mut self, value: RetryPolicy) -> Self {
		self.config.refresh.retry_policy = value;

		self
	}

	/// Per-subscriber buffer size.
	pub fn channel_capacity(mut self, value: usize) -> Self {
		self.config.subscriptions.channel_capacity = value;

		self
	}

	/// Per-delivery time limit.
	pub fn delivery_timeout(mut self, value: Duration) -> Self {
		self.config.subscriptions.delivery_timeout = value;

		self
	}

	/// Validate and finalise the configuration.
	pub fn build(self) -> Result<ServiceConfig> {
		self.config.validate()?;

		Ok(self.config)
	}
}

/// Connection settings for the upstream character API.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
	/// Character listing endpoint.
	pub base_url: Url,
	/// Public API key, sent as `apikey`.
	pub public_key: String,
	/// Private API key, only used to sign requests.
	pub private_key: String,
	/// Per-request timeout.
	#[serde(default = "default_upstream_timeout")]
	pub timeout: Duration,
	/// Maximum accepted body size in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
}
impl UpstreamConfig {
	/// Construct a configuration against the default endpoint.
	pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Result<Self> {
		Ok(Self {
			base_url: Url::parse(DEFAULT_BASE_URL)?,
			public_key: public_key.into(),
			private_key: private_key.into(),
			timeout: DEFAULT_UPSTREAM_TIMEOUT,
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
		})
	}

	/// Point the client at a different endpoint.
	pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Result<Self> {
		self.base_url = Url::parse(base_url.as_ref())?;

		Ok(self)
	}

	/// Read `MARVEL_API_PUBLIC_KEY`, `MARVEL_API_PRIVATE_KEY` and optional `MARVEL_API_TIMEOUT`
	/// (seconds, fractional allowed).
	pub fn from_env() -> Result<Self> {
		let public_key = env_required("MARVEL_API_PUBLIC_KEY", "public_key")?;
		let private_key = env_required("MARVEL_API_PRIVATE_KEY", "private_key")?;
		let mut config = Self::new(public_key, private_key)?;

		if let Some(secs) = env_number::<f64>("MARVEL_API_TIMEOUT", "timeout")? {
			config.timeout = Duration::try_from_secs_f64(secs).map_err(|err| Error::Validation {
				field: "timeout",
				reason: format!("Invalid MARVEL_API_TIMEOUT: {err}."),
			})?;
		}

		config.validate()?;

		Ok(config)
	}

	/// Validate credentials and limits.
	pub fn validate(&self) -> Result<()> {
		if self.public_key.trim().is_empty() {
			return Err(Error::Validation { field: "public_key", reason: "Must not be empty.".into() });
		}
		if self.private_key.trim().is_empty() {
			return Err(Error::Validation {
				field: "private_key",
				reason: "Must not be empty.".into(),
			});
		}
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(Error::Validation {
				field: "base_url",
				reason: "Must use http or https.".into(),
			});
		}
		if self.timeout < Duration::from_millis(100) {
			return Err(Error::Validation {
				field: "timeout",
				reason: "Must be at least 100 ms.".into(),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}

impl Debug for UpstreamConfig {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("UpstreamConfig")
			.field("base_url", &self.base_url.as_str())
			.field("public_key", &self.public_key)
			.field("private_key", &"<redacted>")
			.field("timeout", &self.timeout)
			.field("max_response_bytes", &self.max_response_bytes)
			.finish()
	}
}

fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}
	SMALL_RNG.with(|cell| {
		let mut rng = cell.borrow_mut();
		let nanos = max.as_nanos() - min.as_nanos();
		let jitter = rng.random_range(0..=nanos.min(u64::MAX as u128));

		min + Duration::from_nanos(jitter as u64)
	})
}

fn env_required(key: &str, field: &'static str) -> Result<String> {
	env::var(key).map_err(|_| Error::Validation { field, reason: format!("{key} is not set.") })
}

fn env_number<T>(key: &str, field: &'static str) -> Result<Option<T>>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	match env::var(key) {
		Ok(raw) => raw
			.trim()
			.parse()
			.map(Some)
			.map_err(|err| Error::Validation { field, reason: format!("Invalid {key}: {err}.") }),
		Err(_) => Ok(None),
	}
}

fn default_max_entries() -> usize {
	DEFAULT_MAX_ENTRIES
}

fn default_ttl() -> Duration {
	DEFAULT_TTL
}

fn default_refresh_interval() -> Duration {
	DEFAULT_REFRESH_INTERVAL
}

fn default_workers() -> usize {
	DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
	DEFAULT_QUEUE_CAPACITY
}

fn default_channel_capacity() -> usize {
	DEFAULT_CHANNEL_CAPACITY
}

fn default_delivery_timeout() -> Duration {
	DEFAULT_DELIVERY_TIMEOUT
}

fn default_upstream_timeout() -> Duration {
	DEFAULT_UPSTREAM_TIMEOUT
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}
