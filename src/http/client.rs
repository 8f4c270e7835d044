//! HTTP client integration for the upstream character API.

// crates.io
use async_trait::async_trait;
use http::{
	HeaderValue, StatusCode,
	header::{ETAG, IF_NONE_MATCH},
};
use reqwest::{Client, redirect::Policy};
// self
use crate::{
	_prelude::*,
	catalog::CharacterPage,
	config::UpstreamConfig,
	fingerprint::{CharacterQuery, DEFAULT_LIMIT},
	http::auth::Signature,
};

/// Outcome of a (possibly conditional) upstream fetch.
#[derive(Clone, Debug)]
pub enum UpstreamResponse {
	/// Fresh content with the validator the origin attached to it.
	Modified {
		/// Decoded listing.
		page: CharacterPage,
		/// Validator for later conditional requests.
		validator: Option<String>,
	},
	/// The presented validator is still current; no body was sent.
	NotModified,
}

/// Source of character listings supporting conditional requests.
#[async_trait]
pub trait Upstream: Send + Sync {
	/// Fetch a listing, presenting `validator` as `If-None-Match` when known.
	async fn fetch(
		&self,
		query: &CharacterQuery,
		validator: Option<&str>,
	) -> Result<UpstreamResponse>;
}

/// `reqwest`-backed [`Upstream`] for the public character endpoint.
#[derive(Clone, Debug)]
pub struct CatalogClient {
	config: Arc<UpstreamConfig>,
	client: Client,
}
impl CatalogClient {
	/// Build a client with the default reqwest settings.
	pub fn new(config: UpstreamConfig) -> Result<Self> {
		config.validate()?;

		let client = Client::builder()
			.redirect(Policy::limited(3))
			.user_agent(format!("catalog-cache/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Ok(Self::with_client(config, client))
	}

	/// Build a client around the supplied reqwest client (primarily for tests).
	pub fn with_client(config: UpstreamConfig, client: Client) -> Self {
		Self { config: Arc::new(config), client }
	}
}
#[async_trait]
impl Upstream for CatalogClient {
	#[tracing::instrument(skip(self, query, validator), fields(conditional = validator.is_some()))]
	async fn fetch(
		&self,
		query: &CharacterQuery,
		validator: Option<&str>,
	) -> Result<UpstreamResponse> {
		let params = request_params(&self.config, query, Utc::now());
		let mut builder = self
			.client
			.get(self.config.base_url.clone())
			.query(&params)
			.timeout(self.config.timeout);

		if let Some(validator) = validator {
			match HeaderValue::from_str(validator) {
				Ok(value) => builder = builder.header(IF_NONE_MATCH, value),
				Err(err) => tracing::warn!(error = %err, "ignoring unusable validator"),
			}
		}

		let start = Instant::now();
		let response = builder.send().await?;
		let elapsed = start.elapsed();
		let status = response.status();

		if status == StatusCode::NOT_MODIFIED {
			tracing::debug!(elapsed = ?elapsed, "upstream content not modified");

			return Ok(UpstreamResponse::NotModified);
		}
		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(Error::HttpStatus { status, url: self.config.base_url.clone(), body });
		}

		let header_validator = response
			.headers()
			.get(ETAG)
			.and_then(|value| value.to_str().ok())
			.map(|s| s.to_string());
		let limit = self.config.max_response_bytes;

		if let Some(length) = response.content_length()
			&& length > limit
		{
			return Err(oversize(length, limit));
		}

		let bytes = response.bytes().await?;

		if bytes.len() as u64 > limit {
			return Err(oversize(bytes.len() as u64, limit));
		}

		let page = CharacterPage::from_slice(&bytes)?;
		let validator = header_validator.or_else(|| page.etag.clone());

		tracing::debug!(
			status = %status,
			elapsed = ?elapsed,
			results = page.data.results.len(),
			"catalog fetch complete"
		);

		Ok(UpstreamResponse::Modified { page, validator })
	}
}

/// Wire query pairs for a signed listing request.
pub fn request_params(
	config: &UpstreamConfig,
	query: &CharacterQuery,
	now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
	let mut params = Vec::with_capacity(13);

	params.extend(Signature::new(config, now).into_pairs());
	params.push(("limit", query.limit.unwrap_or(DEFAULT_LIMIT).to_string()));
	params.push(("offset", query.offset.unwrap_or_default().to_string()));

	let text = [
		("name", &query.name),
		("nameStartsWith", &query.name_starts_with),
		("modifiedSince", &query.modified_since),
		("orderBy", &query.order_by),
	];

	for (name, value) in text {
		if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
			params.push((name, value.to_owned()));
		}
	}

	let ids = [
		("comics", &query.comics),
		("series", &query.series),
		("events", &query.events),
		("stories", &query.stories),
	];

	for (name, values) in ids {
		if !values.is_empty() {
			let joined = values.iter().map(u64::to_string).collect::<Vec<_>>().join(",");

			params.push((name, joined));
		}
	}

	params
}

fn oversize(size: u64, limit: u64) -> Error {
	Error::Validation {
		field: "max_response_bytes",
		reason: format!(
			"Response size {size} bytes exceeds the configured guard of {limit} bytes."
		),
	}
}
