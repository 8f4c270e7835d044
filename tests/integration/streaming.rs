//! Integration tests for background revalidation and subscriber push.

// std
use std::time::Duration;
// crates.io
use catalog_cache::{
	CatalogService, CharacterQuery, JitterStrategy, Result, RetryPolicy, ServiceConfig,
	UpstreamConfig,
};
use futures::StreamExt;
use serde_json::{Value, json};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};

const CHARACTERS_PATH: &str = "/v1/public/characters";

fn listing(name: &str) -> Value {
	json!({
		"code": 200,
		"status": "Ok",
		"data": { "offset": 0, "limit": 20, "total": 1, "count": 1, "results": [{ "id": 1, "name": name }] }
	})
}

fn service(server: &MockServer, config: ServiceConfig) -> CatalogService {
	let upstream = UpstreamConfig::new("public", "private")
		.and_then(|config| config.with_base_url(format!("{}{}", server.uri(), CHARACTERS_PATH)))
		.expect("upstream config");

	CatalogService::with_catalog_client(config, upstream).expect("service")
}

#[tokio::test]
async fn changed_content_is_pushed_to_subscribers() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.and(header("if-none-match", "\"v1\""))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(listing("Storm (updated)"))
				.insert_header("etag", "\"v2\""),
		)
		.up_to_n_times(1)
		.with_priority(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.and(header("if-none-match", "\"v2\""))
		.respond_with(ResponseTemplate::new(304))
		.with_priority(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(listing("Storm")).insert_header("etag", "\"v1\""),
		)
		.up_to_n_times(1)
		.mount(&server)
		.await;

	let config = ServiceConfig::builder().refresh_interval(Duration::from_millis(100)).build()?;
	let service = service(&server, config);
	let query = CharacterQuery::new().with_name("Storm");
	let initial = service.get_characters(&query).await?;

	assert_eq!(initial.characters()[0].name, "Storm");

	let mut subscription = service.subscribe(&query);
	let background = service.spawn_background();
	let pushed = tokio::time::timeout(Duration::from_secs(5), subscription.next())
		.await
		.expect("update pushed in time")
		.expect("subscription open");

	assert_eq!(pushed.characters()[0].name, "Storm (updated)");

	tokio::time::sleep(Duration::from_millis(300)).await;

	let current = service.get_characters(&query).await?;

	assert_eq!(current, pushed);
	assert_eq!(
		service.cache().get_validator(&query.fingerprint()).await.as_deref(),
		Some("\"v2\"")
	);

	background.shutdown().await;

	Ok(())
}

#[tokio::test]
async fn failing_revalidation_is_retried_then_abandoned() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.respond_with(ResponseTemplate::new(503))
		.expect(2)
		.mount(&server)
		.await;

	let config = ServiceConfig::builder()
		.refresh_interval(Duration::from_secs(3_600))
		.workers(1)
		.retry_policy(RetryPolicy {
			max_attempts: 2,
			initial_backoff: Duration::from_millis(10),
			max_backoff: Duration::from_millis(20),
			jitter: JitterStrategy::None,
		})
		.build()?;
	let service = service(&server, config);
	let query = CharacterQuery::new().with_name("Vision");
	let mut subscription = service.subscribe(&query);
	let background = service.spawn_background();

	service.enqueue_revalidation(&query)?;

	tokio::time::sleep(Duration::from_millis(500)).await;

	assert!(service.cache().is_empty().await);
	assert!(
		tokio::time::timeout(Duration::from_millis(50), subscription.next()).await.is_err(),
		"nothing pushed"
	);

	background.shutdown().await;
	server.verify().await;

	Ok(())
}
