//! Custom token minting.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	metrics,
	signer::Signer,
	token::{
		CUSTOM_TOKEN_AUDIENCE, CUSTOM_TOKEN_LIFETIME_SECS, MAX_UID_LENGTH, RESERVED_CLAIMS,
		jwt::{self, JwtHeader},
	},
};

/// Builds custom tokens and signs them with a [`Signer`].
///
/// The factory never retries; remote signers retry inside their own HTTP calls.
#[derive(Clone, Debug)]
pub struct TokenFactory {
	signer: Arc<dyn Signer>,
	clock: Arc<dyn Clock>,
	tenant_id: Option<String>,
}
impl TokenFactory {
	/// Factory signing with `signer`.
	pub fn new(signer: Arc<dyn Signer>) -> Self {
		Self { signer, clock: Arc::new(SystemClock), tenant_id: None }
	}

	/// Replace the clock supplying `iat`.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Stamp every token with `tenant_id`.
	pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
		self.tenant_id = Some(tenant_id.into());

		self
	}

	/// Signer backing this factory.
	pub fn signer(&self) -> &Arc<dyn Signer> {
		&self.signer
	}

	/// Tenant stamped on minted tokens.
	pub fn tenant_id(&self) -> Option<&str> {
		self.tenant_id.as_deref()
	}

	/// Mint a custom token for `uid`, optionally carrying developer claims.
	///
	/// Arguments are validated before the signer is touched.
	#[tracing::instrument(
		skip(self, developer_claims, cancel),
		fields(signer = self.signer.name())
	)]
	pub async fn create_custom_token(
		&self,
		uid: &str,
		developer_claims: Option<&Map<String, Value>>,
		cancel: &CancellationToken,
	) -> Result<String> {
		validate_uid(uid)?;

		if let Some(claims) = developer_claims {
			validate_developer_claims(claims)?;
		}

		let account = self.signer.key_id(cancel).await.map_err(signing_failure)?;
		let issued_at = self.clock.now().timestamp();
		let header = JwtHeader {
			alg: self.signer.algorithm().as_str().into(),
			kid: None,
			typ: Some("JWT".into()),
		};
		let payload = CustomTokenPayload {
			uid,
			iss: &account,
			sub: &account,
			aud: CUSTOM_TOKEN_AUDIENCE,
			iat: issued_at,
			exp: issued_at + CUSTOM_TOKEN_LIFETIME_SECS,
			claims: developer_claims.filter(|claims| !claims.is_empty()),
			tenant_id: self.tenant_id.as_deref(),
		};
		let signing_input =
			format!("{}.{}", jwt::encode_segment(&header)?, jwt::encode_segment(&payload)?);
		let signature =
			self.signer.sign(signing_input.as_bytes(), cancel).await.map_err(signing_failure)?;

		metrics::record_token_signed(self.signer.name());
		tracing::debug!(%account, "custom token created");

		Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
	}
}

#[derive(Serialize)]
struct CustomTokenPayload<'a> {
	uid: &'a str,
	iss: &'a str,
	sub: &'a str,
	aud: &'static str,
	iat: i64,
	exp: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	claims: Option<&'a Map<String, Value>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	tenant_id: Option<&'a str>,
}

fn validate_uid(uid: &str) -> Result<()> {
	let length = uid.chars().count();

	if length == 0 || length > MAX_UID_LENGTH {
		return Err(Error::InvalidArgument {
			field: "uid",
			reason: format!(
				"Must be a non-empty string with at most {MAX_UID_LENGTH} characters; got {length}."
			),
		});
	}

	Ok(())
}

fn validate_developer_claims(claims: &Map<String, Value>) -> Result<()> {
	if let Some(reserved) = claims.keys().find(|name| RESERVED_CLAIMS.contains(&name.as_str())) {
		return Err(Error::InvalidArgument {
			field: "developer_claims",
			reason: format!("Claim `{reserved}` is reserved and cannot be specified."),
		});
	}

	Ok(())
}

fn signing_failure(err: Error) -> Error {
	match err {
		Error::Cancelled => Error::Cancelled,
		err => Error::TokenCreation { message: err.to_string(), source: Some(Box::new(err)) },
	}
}
