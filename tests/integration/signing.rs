//! Custom token minting with local and remote signers.

// std
use std::sync::Arc;
// crates.io
use base64::{
	Engine,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use identity_admin::{
	Auth, AuthOptions, Credential, Endpoints, Error, ErrorCode, FixedClock, HttpClient,
	HttpClientOptions, HttpPublicKeySource, Result, TokenVerifier, token::jwt,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path, path_regex},
};
// self
use crate::common;

const DISCOVERED_ACCOUNT: &str = "discovered@mock-project-id.iam.gserviceaccount.com";
const FIXED_ACCOUNT: &str = "fixed@mock-project-id.iam.gserviceaccount.com";

fn iam_options(server: &MockServer) -> AuthOptions {
	AuthOptions::new()
		.with_project_id(common::PROJECT_ID)
		.with_credential(Credential::AccessToken("test-token".into()))
		.with_endpoints(Endpoints {
			metadata_email_url: format!("{}/email", server.uri()),
			iam_sign_blob_base: format!("{}/v1/projects/-/serviceAccounts", server.uri()),
			..Default::default()
		})
}

async fn mount_metadata(server: &MockServer, response: ResponseTemplate) {
	Mock::given(method("GET"))
		.and(path("/email"))
		.and(header("metadata-flavor", "Google"))
		.respond_with(response)
		.expect(1)
		.mount(server)
		.await;
}

#[tokio::test]
async fn service_account_tokens_verify_against_published_certificates() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(common::certificate_map())
				.insert_header("cache-control", "public, max-age=3600"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let account = common::service_account()?;
	let clock = FixedClock::new(chrono::Utc::now());
	let auth = Auth::builder(
		AuthOptions::new().with_credential(Credential::ServiceAccount(account.clone())),
	)
	.clock(clock.clone())
	.build()?;
	let developer = json!({ "premium": true, "tier": 3 });
	let cancel = CancellationToken::new();
	let token = auth
		.create_custom_token_with_claims("alice", developer.as_object().expect("object"), &cancel)
		.await?;
	let keys = HttpPublicKeySource::new(
		Url::parse(&format!("{}/certs", server.uri()))?,
		HttpClient::new(HttpClientOptions::default())?,
	)
	.with_clock(clock.clone());
	let verifier =
		TokenVerifier::custom_token(account.client_email.clone(), Arc::new(keys)).with_clock(clock);
	let claims = verifier.verify(&token, &cancel).await?;

	assert_eq!(auth.project_id(), Some(common::PROJECT_ID));
	assert_eq!(claims.uid, "alice");
	assert_eq!(claims.issuer, account.client_email);
	assert_eq!(Some(&claims.claims), developer.as_object());

	let plain = auth.create_custom_token("bob", &cancel).await?;

	assert_eq!(verifier.verify(&plain, &cancel).await?.uid, "bob");

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn metadata_discovery_runs_once_for_many_tokens() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	mount_metadata(&server, ResponseTemplate::new(200).set_body_string(DISCOVERED_ACCOUNT)).await;
	Mock::given(method("POST"))
		.and(path_regex(r"^/v1/projects/-/serviceAccounts/discovered.+:signBlob$"))
		.and(header("authorization", "Bearer test-token"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(json!({ "signature": STANDARD.encode(b"signed") })),
		)
		.expect(2)
		.mount(&server)
		.await;

	let auth = Auth::new(iam_options(&server))?;
	let cancel = CancellationToken::new();

	for uid in ["alice", "bob"] {
		let token = auth.create_custom_token(uid, &cancel).await?;
		let decoded = jwt::decode(&token)?;

		assert_eq!(decoded.header.alg, "RS256");
		assert_eq!(decoded.payload["iss"], DISCOVERED_ACCOUNT);
		assert_eq!(decoded.payload["sub"], DISCOVERED_ACCOUNT);
		assert_eq!(decoded.payload["uid"], uid);
		assert_eq!(decoded.signature, URL_SAFE_NO_PAD.encode(b"signed"));
	}

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn failed_discovery_is_remembered() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	mount_metadata(&server, ResponseTemplate::new(404)).await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;

	let auth = Auth::new(iam_options(&server))?;
	let cancel = CancellationToken::new();

	for _ in 0..2 {
		let err = auth.create_custom_token("alice", &cancel).await.expect_err("no account");

		assert!(matches!(err, Error::TokenCreation { .. }));
		assert_eq!(err.code(), ErrorCode::FailedPrecondition);
		assert!(err.to_string().contains("Failed to determine service account"));
	}

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn sign_blob_errors_surface_the_remote_message() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path_regex(r":signBlob$"))
		.respond_with(ResponseTemplate::new(403).set_body_json(json!({
			"error": {
				"code": 403,
				"status": "PERMISSION_DENIED",
				"message": "Permission 'iam.serviceAccounts.signBlob' denied",
			}
		})))
		.expect(1)
		.mount(&server)
		.await;

	let auth = Auth::new(iam_options(&server).with_service_account_id(FIXED_ACCOUNT))?;
	let err =
		auth.create_custom_token("alice", &CancellationToken::new()).await.expect_err("denied");

	assert_eq!(err.code(), ErrorCode::PermissionDenied);
	assert!(err.to_string().contains("iam.serviceAccounts.signBlob"));
	assert_eq!(err.http_response().map(|response| response.status.as_u16()), Some(403));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_signer() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;

	let auth = Auth::new(iam_options(&server).with_service_account_id(FIXED_ACCOUNT))?;
	let cancel = CancellationToken::new();

	assert!(matches!(
		auth.create_custom_token("", &cancel).await,
		Err(Error::InvalidArgument { field: "uid", .. })
	));
	assert!(matches!(
		auth.create_custom_token(&"x".repeat(129), &cancel).await,
		Err(Error::InvalidArgument { field: "uid", .. })
	));

	let reserved = json!({ "aud": "elsewhere" });
	let reserved = reserved.as_object().expect("object");

	assert!(matches!(
		auth.create_custom_token_with_claims("alice", reserved, &cancel).await,
		Err(Error::InvalidArgument { field: "developer_claims", .. })
	));

	server.verify().await;

	Ok(())
}
