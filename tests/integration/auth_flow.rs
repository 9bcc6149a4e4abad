//! End-to-end verification through [`Auth`], including revocation and tenants.

// std
use std::sync::Arc;
// crates.io
use identity_admin::{
	Auth, AuthErrorCode, AuthOptions, Credential, Endpoints, Error, ErrorCode, FixedClock, Result,
	StaticPublicKeySource, TokenFailure, token::jwt,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_partial_json, header, method, path},
};
// self
use crate::common;

const LOOKUP_PATH: &str = "/v1/projects/mock-project-id/accounts:lookup";

fn static_keys() -> Result<Arc<StaticPublicKeySource>> {
	Ok(Arc::new(StaticPublicKeySource::from_public_key_pems([("primary", common::PRIMARY_PUB)])?))
}

fn issued_at() -> i64 {
	common::start().timestamp() - 600
}

async fn id_token(uid: &str) -> Result<String> {
	common::sign_token("primary", &common::id_token_payload(uid, issued_at())).await
}

/// Instance with an access token credential whose REST calls go to `server`.
fn revocation_auth(server: &MockServer) -> Result<Auth> {
	let options = AuthOptions::new()
		.with_project_id(common::PROJECT_ID)
		.with_credential(Credential::AccessToken("test-token".into()))
		.with_endpoints(Endpoints { identity_toolkit_base: server.uri(), ..Default::default() });

	Auth::builder(options)
		.clock(FixedClock::new(common::start()))
		.id_token_keys(static_keys()?)
		.build()
}

async fn mount_lookup(server: &MockServer, uid: &str, response: ResponseTemplate) {
	Mock::given(method("POST"))
		.and(path(LOOKUP_PATH))
		.and(header("authorization", "Bearer test-token"))
		.and(body_partial_json(json!({ "localId": [uid] })))
		.respond_with(response)
		.expect(1)
		.mount(server)
		.await;
}

#[tokio::test]
async fn id_tokens_verify_against_fetched_certificates() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(common::certificate_map())
				.insert_header("cache-control", "public, max-age=21600"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let options = AuthOptions::new()
		.with_credential(Credential::ServiceAccount(common::service_account()?))
		.with_endpoints(Endpoints {
			id_token_certs_url: format!("{}/certs", server.uri()),
			..Default::default()
		});
	let auth = Auth::builder(options).clock(FixedClock::new(common::start())).build()?;
	let cancel = CancellationToken::new();
	let token = id_token("alice").await?;
	let claims = auth.verify_id_token(&token, &cancel).await?;

	assert_eq!(claims.uid, "alice");
	assert_eq!(claims.audience, common::PROJECT_ID);
	assert_eq!(claims.sign_in_provider.as_deref(), Some("password"));
	assert_eq!(claims.auth_time.map(|time| time.timestamp()), Some(issued_at()));
	assert!(claims.tenant_id.is_none());

	let again = auth.verify_id_token(&token, &cancel).await?;

	assert_eq!(again.subject, "alice");

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn expired_and_foreign_tokens_are_rejected() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let auth = Auth::builder(AuthOptions::new().with_project_id(common::PROJECT_ID))
		.clock(FixedClock::new(common::start()))
		.id_token_keys(static_keys()?)
		.build()?;
	let cancel = CancellationToken::new();
	let stale_payload = common::id_token_payload("alice", issued_at() - 7_200);
	let stale = common::sign_token("primary", &stale_payload).await?;
	let err = auth.verify_id_token(&stale, &cancel).await.expect_err("expired");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::ExpiredIdToken));
	assert_eq!(err.code(), ErrorCode::Unauthenticated);

	let mut payload = common::id_token_payload("alice", issued_at());

	payload["aud"] = json!("another-project");

	let foreign = common::sign_token("primary", &payload).await?;
	let err = auth.verify_id_token(&foreign, &cancel).await.expect_err("audience");

	assert_eq!(err.token_failure(), Some(TokenFailure::AudienceMismatch));
	assert_eq!(err.auth_code(), Some(AuthErrorCode::InvalidIdToken));
	assert!(err.to_string().contains("another-project"));

	Ok(())
}

#[tokio::test]
async fn revocation_compares_auth_time_with_valid_since() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	mount_lookup(
		&server,
		"alice",
		ResponseTemplate::new(200).set_body_json(json!({
			"users": [{ "localId": "alice", "validSince": (issued_at() + 60).to_string() }]
		})),
	)
	.await;
	mount_lookup(
		&server,
		"bob",
		ResponseTemplate::new(200).set_body_json(json!({
			"users": [{ "localId": "bob", "validSince": (issued_at() - 60).to_string() }]
		})),
	)
	.await;

	let auth = revocation_auth(&server)?;
	let cancel = CancellationToken::new();
	let revoked = id_token("alice").await?;
	let err = auth.verify_id_token_and_check_revoked(&revoked, &cancel).await.expect_err("revoked");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::RevokedIdToken));
	assert_eq!(err.token_failure(), Some(TokenFailure::Revoked));

	let valid = id_token("bob").await?;

	assert_eq!(auth.verify_id_token_and_check_revoked(&valid, &cancel).await?.uid, "bob");

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn disabled_and_unknown_users_fail_revocation_checks() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	mount_lookup(
		&server,
		"carol",
		ResponseTemplate::new(200)
			.set_body_json(json!({ "users": [{ "localId": "carol", "disabled": true }] })),
	)
	.await;
	mount_lookup(
		&server,
		"dave",
		ResponseTemplate::new(400).set_body_json(json!({
			"error": { "code": 400, "message": "USER_NOT_FOUND" }
		})),
	)
	.await;

	let auth = revocation_auth(&server)?;
	let cancel = CancellationToken::new();
	let disabled = id_token("carol").await?;
	let err =
		auth.verify_id_token_and_check_revoked(&disabled, &cancel).await.expect_err("disabled");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::UserDisabled));

	let unknown = id_token("dave").await?;
	let err = auth.verify_id_token_and_check_revoked(&unknown, &cancel).await.expect_err("unknown");

	assert_eq!(err.code(), ErrorCode::NotFound);
	assert_eq!(err.auth_code(), Some(AuthErrorCode::UserNotFound));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn revocation_without_access_token_is_a_configuration_error() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let auth = Auth::builder(
		AuthOptions::new().with_credential(Credential::ServiceAccount(common::service_account()?)),
	)
	.clock(FixedClock::new(common::start()))
	.id_token_keys(static_keys()?)
	.build()?;
	let token = id_token("alice").await?;
	let err = auth
		.verify_id_token_and_check_revoked(&token, &CancellationToken::new())
		.await
		.expect_err("no bearer");

	let message = err.to_string();

	assert!(matches!(err, Error::Configuration(_)));
	assert!(message.contains("Credential::AccessToken"));
	assert!(message.contains("AuthBuilder::revocation_source"));

	Ok(())
}

#[tokio::test]
async fn emulator_mode_skips_signatures_and_keys() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/certs"))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(format!("/identitytoolkit.googleapis.com{LOOKUP_PATH}")))
		.and(header("authorization", "Bearer owner"))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!({ "users": [{ "localId": "alice" }] })),
		)
		.expect(1)
		.mount(&server)
		.await;

	let options = AuthOptions::new()
		.with_project_id(common::PROJECT_ID)
		.with_emulator_host(server.address().to_string())
		.with_endpoints(Endpoints {
			id_token_certs_url: format!("{}/certs", server.uri()),
			..Default::default()
		});
	let auth = Auth::builder(options).clock(FixedClock::new(common::start())).build()?;
	let cancel = CancellationToken::new();
	let custom = auth.create_custom_token("alice", &cancel).await?;
	let decoded = jwt::decode(&custom)?;

	assert!(custom.ends_with('.'));
	assert_eq!(decoded.header.alg, "none");
	assert_eq!(decoded.payload["iss"], "firebase-auth-emulator@example.com");

	let token = common::unsigned_token(&common::id_token_payload("alice", issued_at()))?;

	assert_eq!(auth.verify_id_token(&token, &cancel).await?.uid, "alice");
	assert_eq!(auth.verify_id_token_and_check_revoked(&token, &cancel).await?.uid, "alice");

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn tenant_handles_scope_minting_and_verification() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let auth = Auth::builder(
		AuthOptions::new().with_credential(Credential::ServiceAccount(common::service_account()?)),
	)
	.clock(FixedClock::new(common::start()))
	.id_token_keys(static_keys()?)
	.build()?;
	let tenant = auth.tenant("tenant-a")?;
	let cancel = CancellationToken::new();
	let custom = tenant.create_custom_token("alice", &cancel).await?;

	assert_eq!(jwt::decode(&custom)?.payload["tenant_id"], "tenant-a");

	let mut payload = common::id_token_payload("alice", issued_at());

	payload["firebase"]["tenant"] = json!("tenant-a");

	let own = common::sign_token("primary", &payload).await?;

	assert_eq!(tenant.verify_id_token(&own, &cancel).await?.tenant_id.as_deref(), Some("tenant-a"));

	payload["firebase"]["tenant"] = json!("tenant-b");

	let other = common::sign_token("primary", &payload).await?;
	let err = tenant.verify_id_token(&other, &cancel).await.expect_err("mismatch");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::TenantIdMismatch));
	assert!(err.to_string().contains("tenant-b"));

	let untenanted = id_token("alice").await?;

	assert!(tenant.verify_id_token(&untenanted, &cancel).await.is_err());
	assert!(auth.verify_id_token(&other, &cancel).await.is_ok());

	Ok(())
}

#[tokio::test]
async fn session_cookies_use_their_own_issuer_and_codes() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();
	let auth = Auth::builder(AuthOptions::new().with_project_id(common::PROJECT_ID))
		.clock(FixedClock::new(common::start()))
		.id_token_keys(static_keys()?)
		.session_cookie_keys(static_keys()?)
		.build()?;
	let cancel = CancellationToken::new();
	let mut payload = common::id_token_payload("alice", issued_at());

	payload["iss"] = json!(format!("https://session.firebase.google.com/{}", common::PROJECT_ID));

	let cookie = common::sign_token("primary", &payload).await?;

	assert_eq!(auth.verify_session_cookie(&cookie, &cancel).await?.uid, "alice");

	let err = auth.verify_id_token(&cookie, &cancel).await.expect_err("wrong issuer");

	assert_eq!(err.token_failure(), Some(TokenFailure::IssuerMismatch));

	payload["exp"] = json!(issued_at() + 1);

	let expired = common::sign_token("primary", &payload).await?;
	let err = auth.verify_session_cookie(&expired, &cancel).await.expect_err("expired");

	assert_eq!(err.auth_code(), Some(AuthErrorCode::ExpiredSessionCookie));
	assert!(err.to_string().contains("manage-cookies"));

	auth.delete();

	assert!(matches!(
		auth.verify_session_cookie(&cookie, &cancel).await,
		Err(Error::IllegalState(_))
	));

	Ok(())
}
