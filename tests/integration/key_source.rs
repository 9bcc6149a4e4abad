//! Public key fetching, caching, and refresh.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use chrono::TimeDelta;
use identity_admin::{
	AuthErrorCode, Error, FixedClock, HttpClient, HttpClientOptions, HttpPublicKeySource,
	PublicKeySource, Result,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::common;

fn key_source(server: &MockServer, clock: Arc<FixedClock>) -> Result<HttpPublicKeySource> {
	let client = HttpClient::new(HttpClientOptions::default())?;

	Ok(HttpPublicKeySource::new(Url::parse(&format!("{}/certs", server.uri()))?, client)
		.with_clock(clock))
}

fn certificates(max_age: Option<u32>) -> ResponseTemplate {
	let template = ResponseTemplate::new(200)
		.set_body_string(common::certificate_map())
		.insert_header("content-type", "application/json");

	match max_age {
		Some(secs) => template.insert_header("cache-control", format!("public, max-age={secs}")),
		None => template,
	}
}

#[tokio::test]
async fn caches_keys_until_max_age_minus_margin() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(Some(3_600)))
		.expect(2)
		.mount(&server)
		.await;

	let clock = FixedClock::new(common::start());
	let source = key_source(&server, clock.clone())?;
	let cancel = CancellationToken::new();
	let keys = source.public_keys(&cancel).await?;

	assert_eq!(keys.len(), 1);
	assert_eq!(keys[0].id, "primary");

	clock.advance(TimeDelta::seconds(3_200));
	source.public_keys(&cancel).await?;

	assert_eq!(server.received_requests().await.map(|requests| requests.len()), Some(1));

	clock.advance(TimeDelta::seconds(200));
	source.public_keys(&cancel).await?;

	assert_eq!(server.received_requests().await.map(|requests| requests.len()), Some(2));

	let snapshot = source.snapshot().await.expect("cached keys");

	assert_eq!(snapshot.fetched_at, common::start() + TimeDelta::seconds(3_400));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn responses_without_max_age_are_not_cached() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(None))
		.expect(2)
		.mount(&server)
		.await;

	let source = key_source(&server, FixedClock::new(common::start()))?;
	let cancel = CancellationToken::new();

	source.public_keys(&cancel).await?;
	source.public_keys(&cancel).await?;

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_fetch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(Some(3_600)).set_delay(Duration::from_millis(100)))
		.expect(1)
		.mount(&server)
		.await;

	let source = key_source(&server, FixedClock::new(common::start()))?;
	let mut tasks = JoinSet::new();

	for _ in 0..8 {
		let source = source.clone();

		tasks.spawn(async move {
			source.public_keys(&CancellationToken::new()).await.map(|keys| keys.len())
		});
	}

	while let Some(joined) = tasks.join_next().await {
		assert_eq!(joined.expect("task completes")?, 1);
	}

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn empty_key_set_is_a_fetch_failure() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(ResponseTemplate::new(200).set_body_string("{}"))
		.expect(1)
		.mount(&server)
		.await;

	let source = key_source(&server, FixedClock::new(common::start()))?;
	let err = source.public_keys(&CancellationToken::new()).await.expect_err("empty map");

	assert!(matches!(err, Error::KeyFetch { .. }));
	assert_eq!(err.auth_code(), Some(AuthErrorCode::CertificateFetchFailed));
	assert!(source.snapshot().await.is_none());

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn expired_keys_are_not_served_when_refresh_fails() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(Some(600)))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.expect(1)
		.mount(&server)
		.await;

	let clock = FixedClock::new(common::start());
	let source = key_source(&server, clock.clone())?;
	let cancel = CancellationToken::new();

	source.public_keys(&cancel).await?;
	clock.advance(TimeDelta::seconds(600));

	let err = source.public_keys(&cancel).await.expect_err("refresh fails");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::CertificateFetchFailed));
	assert_eq!(err.http_response().map(|response| response.status.as_u16()), Some(500));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn cancelled_fetch_leaves_cache_untouched() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(Some(600)))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(certificates(Some(600)).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;

	let clock = FixedClock::new(common::start());
	let source = key_source(&server, clock.clone())?;

	source.public_keys(&CancellationToken::new()).await?;
	clock.advance(TimeDelta::seconds(600));

	let cancel = CancellationToken::new();
	let canceller = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		canceller.cancel();
	});

	let err = source.public_keys(&cancel).await.expect_err("cancelled refresh");

	assert!(matches!(err, Error::Cancelled));

	let snapshot = source.snapshot().await.expect("previous keys kept");

	assert_eq!(snapshot.fetched_at, common::start());

	server.verify().await;

	Ok(())
}
