//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the catalog cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Malformed upstream payload: {0}")]
	MalformedPayload(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Task queue error: {0}")]
	Queue(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether a background revalidation hitting this error should try again.
	///
	/// Transport failures, timeouts, server errors, throttling and malformed payloads are
	/// retryable; client errors and local validation failures are not.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Reqwest(err) => !err.is_builder(),
			Self::HttpStatus { status, .. } =>
				status.is_server_error()
					|| *status == http::StatusCode::REQUEST_TIMEOUT
					|| *status == http::StatusCode::TOO_MANY_REQUESTS,
			Self::Serde(_) | Self::MalformedPayload(_) | Self::Cache(_) => true,
			Self::Url(_) | Self::Metrics(_) | Self::Queue(_) | Self::Validation { .. } => false,
		}
	}
}

/// Failure to hand a message to a single subscriber.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
	/// The subscriber's stream has ended.
	#[error("Subscriber is closed.")]
	Closed,
	/// The subscriber is not keeping up and its buffer is full.
	#[error("Subscriber buffer is full.")]
	Full,
	/// The subscriber did not accept the message in time.
	#[error("Subscriber did not accept the message within {0:?}.")]
	TimedOut(std::time::Duration),
	/// Any other sink-specific failure.
	#[error("Delivery failed: {0}")]
	Other(String),
}
