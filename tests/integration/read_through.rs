//! Integration tests for the read-through path against a mocked catalog endpoint.

// std
use std::sync::Arc;
// crates.io
use catalog_cache::{
	CatalogClient, CatalogService, CharacterQuery, Error, Result, ServiceConfig, Upstream,
	UpstreamConfig, UpstreamResponse,
};
use serde_json::{Value, json};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path, query_param},
};

const CHARACTERS_PATH: &str = "/v1/public/characters";

fn listing(name: &str, etag: Option<&str>) -> Value {
	json!({
		"code": 200,
		"status": "Ok",
		"etag": etag,
		"data": {
			"offset": 0,
			"limit": 20,
			"total": 1,
			"count": 1,
			"results": [{ "id": 1009610, "name": name, "description": "" }]
		}
	})
}

fn upstream_config(server: &MockServer) -> UpstreamConfig {
	UpstreamConfig::new("public", "private")
		.and_then(|config| config.with_base_url(format!("{}{}", server.uri(), CHARACTERS_PATH)))
		.expect("upstream config")
}

fn service(server: &MockServer) -> CatalogService {
	CatalogService::with_catalog_client(ServiceConfig::default(), upstream_config(server))
		.expect("service")
}

#[tokio::test]
async fn second_read_is_served_from_cache() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.and(query_param("apikey", "public"))
		.and(query_param("name", "Spider-Man"))
		.and(query_param("limit", "10"))
		.and(query_param("offset", "0"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(listing("Spider-Man", None))
				.insert_header("etag", "\"v1\""),
		)
		.expect(1)
		.mount(&server)
		.await;

	let service = service(&server);
	let query = CharacterQuery::new().with_name("Spider-Man").with_limit(10);
	let first = service.get_characters(&query).await?;
	let second = service.get_characters(&query).await?;

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(first.characters()[0].name, "Spider-Man");
	assert_eq!(
		service.cache().get_validator(&query.fingerprint()).await.as_deref(),
		Some("\"v1\"")
	);

	let stats = service.cache_stats().await;

	assert_eq!((stats.hits, stats.misses, stats.total, stats.hit_ratio), (1, 1, 2, 0.5));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn upstream_errors_reach_the_caller_uncached() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.expect(2)
		.mount(&server)
		.await;

	let service = service(&server);
	let query = CharacterQuery::new().with_name("Hulk");

	for _ in 0..2 {
		let err = service.get_characters(&query).await.expect_err("upstream failure");

		assert!(matches!(
			err,
			Error::HttpStatus { status, ref body, .. }
				if status.as_u16() == 500 && body.as_deref() == Some("boom")
		));
	}

	assert!(service.cache().is_empty().await);

	server.verify().await;
}

#[tokio::test]
async fn payload_without_results_is_malformed() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "data": {} })))
		.mount(&server)
		.await;

	let err = service(&server)
		.get_characters(&CharacterQuery::new())
		.await
		.expect_err("malformed payload");

	assert!(matches!(err, Error::MalformedPayload(_)));
}

#[tokio::test]
async fn client_sends_validator_and_maps_not_modified() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.and(header("if-none-match", "\"v1\""))
		.respond_with(ResponseTemplate::new(304))
		.expect(1)
		.mount(&server)
		.await;

	let client = CatalogClient::new(upstream_config(&server))?;
	let response = client.fetch(&CharacterQuery::new(), Some("\"v1\"")).await?;

	assert!(matches!(response, UpstreamResponse::NotModified));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn body_etag_is_used_when_header_is_missing() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.and(query_param("comics", "1,5"))
		.respond_with(ResponseTemplate::new(200).set_body_json(listing("Wasp", Some("body-etag"))))
		.mount(&server)
		.await;

	let client = CatalogClient::new(upstream_config(&server))?;
	let query = CharacterQuery { comics: vec![1, 5], ..CharacterQuery::new() };

	match client.fetch(&query, None).await? {
		UpstreamResponse::Modified { page, validator } => {
			assert_eq!(validator.as_deref(), Some("body-etag"));
			assert_eq!(page.characters()[0].name, "Wasp");
		},
		UpstreamResponse::NotModified => panic!("expected fresh content"),
	}

	Ok(())
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(CHARACTERS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(listing("Galactus", None)))
		.mount(&server)
		.await;

	let mut config = upstream_config(&server);

	config.max_response_bytes = 16;

	let err = CatalogClient::new(config)
		.expect("client")
		.fetch(&CharacterQuery::new(), None)
		.await
		.expect_err("too large");

	assert!(matches!(err, Error::Validation { field: "max_response_bytes", .. }));
}
