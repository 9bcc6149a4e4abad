//! Fixtures shared by the integration tests.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use identity_admin::{
	Result, ServiceAccountKey, Signer,
	signer::ServiceAccountSigner,
	token::jwt::{self, JwtHeader},
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const PROJECT_ID: &str = "mock-project-id";
pub const SERVICE_ACCOUNT_JSON: &str = include_str!("../fixtures/service_account.json");
pub const PRIMARY_CERT: &str = include_str!("../fixtures/primary.cert.pem");
pub const PRIMARY_PUB: &str = include_str!("../fixtures/primary.pub.pem");

pub fn service_account() -> Result<ServiceAccountKey> {
	ServiceAccountKey::from_json(SERVICE_ACCOUNT_JSON)
}

pub fn start() -> DateTime<Utc> {
	DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp")
}

pub fn certificate_map() -> String {
	json!({ "primary": PRIMARY_CERT }).to_string()
}

pub fn id_token_payload(uid: &str, issued_at: i64) -> Value {
	json!({
		"iss": format!("https://securetoken.google.com/{PROJECT_ID}"),
		"aud": PROJECT_ID,
		"sub": uid,
		"iat": issued_at,
		"exp": issued_at + 3_600,
		"auth_time": issued_at,
		"firebase": { "sign_in_provider": "password" },
	})
}

/// Sign `payload` with the fixture service account key under `kid`.
pub async fn sign_token(kid: &str, payload: &Value) -> Result<String> {
	let signer = ServiceAccountSigner::new(&service_account()?)?;
	let header = JwtHeader { alg: "RS256".into(), kid: Some(kid.into()), typ: Some("JWT".into()) };
	let signing_input =
		format!("{}.{}", jwt::encode_segment(&header)?, jwt::encode_segment(payload)?);
	let signature = signer.sign(signing_input.as_bytes(), &CancellationToken::new()).await?;

	Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Unsigned token in the shape the auth emulator issues.
pub fn unsigned_token(payload: &Value) -> Result<String> {
	let header = JwtHeader { alg: "none".into(), kid: None, typ: Some("JWT".into()) };

	Ok(format!("{}.{}.", jwt::encode_segment(&header)?, jwt::encode_segment(payload)?))
}
