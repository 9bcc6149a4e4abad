//! Verification of ID tokens, session cookies, and custom tokens.

// crates.io
use jsonwebtoken::Algorithm;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::MAX_CLOCK_SKEW,
	error::{AuthErrorCode, TokenFailure},
	keys::PublicKeySource,
	metrics,
	token::{
		CUSTOM_TOKEN_AUDIENCE, MAX_UID_LENGTH,
		claims::{self, TokenClaims},
		jwt::{self, DecodedJwt},
	},
};

/// Issuer prefix of ID tokens; the project id follows.
pub const ID_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";
/// Issuer prefix of session cookies; the project id follows.
pub const SESSION_COOKIE_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";

const RS256: &str = "RS256";
const UNSIGNED: &str = "none";

/// Token flavour a verifier accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
	/// ID token issued to a client app.
	IdToken,
	/// Session cookie minted by the backend.
	SessionCookie,
	/// Custom token minted by [`TokenFactory`](crate::token::factory::TokenFactory).
	CustomToken,
}
impl TokenKind {
	/// Label used in logs and metrics.
	pub fn label(self) -> &'static str {
		match self {
			Self::IdToken => "id_token",
			Self::SessionCookie => "session_cookie",
			Self::CustomToken => "custom_token",
		}
	}
}

/// Naming, documentation and error codes of a token flavour.
#[derive(Clone, Debug)]
pub struct VerifierConfig {
	/// Flavour.
	pub kind: TokenKind,
	/// Human name used in messages, such as `ID token`.
	pub short_name: &'static str,
	/// Public operation named in messages.
	pub operation: &'static str,
	/// Page explaining how to obtain a valid token.
	pub doc_url: &'static str,
	/// Issuer prefix the project id is appended to.
	pub issuer_prefix: &'static str,
	/// Code for tokens failing verification.
	pub invalid_code: AuthErrorCode,
	/// Code for expired tokens.
	pub expired_code: AuthErrorCode,
	/// Code for revoked tokens.
	pub revoked_code: AuthErrorCode,
}
impl VerifierConfig {
	/// ID token flavour.
	pub fn id_token() -> Self {
		Self {
			kind: TokenKind::IdToken,
			short_name: "ID token",
			operation: "verify_id_token()",
			doc_url: "https://firebase.google.com/docs/auth/admin/verify-id-tokens",
			issuer_prefix: ID_TOKEN_ISSUER_PREFIX,
			invalid_code: AuthErrorCode::InvalidIdToken,
			expired_code: AuthErrorCode::ExpiredIdToken,
			revoked_code: AuthErrorCode::RevokedIdToken,
		}
	}

	/// Session cookie flavour.
	pub fn session_cookie() -> Self {
		Self {
			kind: TokenKind::SessionCookie,
			short_name: "session cookie",
			operation: "verify_session_cookie()",
			doc_url: "https://firebase.google.com/docs/auth/admin/manage-cookies",
			issuer_prefix: SESSION_COOKIE_ISSUER_PREFIX,
			invalid_code: AuthErrorCode::InvalidSessionCookie,
			expired_code: AuthErrorCode::ExpiredSessionCookie,
			revoked_code: AuthErrorCode::RevokedSessionCookie,
		}
	}

	/// Custom token flavour; the issuer is the signing service account.
	pub fn custom_token() -> Self {
		Self {
			kind: TokenKind::CustomToken,
			short_name: "custom token",
			operation: "verify_custom_token()",
			doc_url: "https://firebase.google.com/docs/auth/admin/create-custom-tokens",
			issuer_prefix: "",
			invalid_code: AuthErrorCode::InvalidIdToken,
			expired_code: AuthErrorCode::ExpiredIdToken,
			revoked_code: AuthErrorCode::RevokedIdToken,
		}
	}

	/// Build a verification error whose message ends with the documentation pointer.
	pub fn error(&self, failure: TokenFailure, detail: impl AsRef<str>) -> Error {
		let code = match failure {
			TokenFailure::Expired => self.expired_code,
			TokenFailure::Revoked => self.revoked_code,
			TokenFailure::TenantMismatch => AuthErrorCode::TenantIdMismatch,
			TokenFailure::UserDisabled => AuthErrorCode::UserDisabled,
			_ => self.invalid_code,
		};
		let vowel = self.short_name.chars().next().is_some_and(|c| "aeiouAEIOU".contains(c));
		let article = if vowel { "an" } else { "a" };
		let message = format!(
			"{} See {} for details on how to retrieve {article} {}.",
			detail.as_ref(),
			self.doc_url,
			self.short_name
		);

		Error::Token { code, failure, message, source: None }
	}

	fn subject(&self) -> String {
		format!("Firebase {}", self.short_name)
	}
}

/// Verifies tokens of one flavour against a [`PublicKeySource`].
#[derive(Clone, Debug)]
pub struct TokenVerifier {
	config: VerifierConfig,
	audience: Option<String>,
	issuer: Option<String>,
	keys: Arc<dyn PublicKeySource>,
	clock: Arc<dyn Clock>,
	clock_skew: Duration,
	emulator: bool,
}
impl TokenVerifier {
	/// Verifier for ID tokens of `project_id`.
	pub fn id_token(project_id: Option<String>, keys: Arc<dyn PublicKeySource>) -> Self {
		Self::for_project(VerifierConfig::id_token(), project_id, keys)
	}

	/// Verifier for session cookies of `project_id`.
	pub fn session_cookie(project_id: Option<String>, keys: Arc<dyn PublicKeySource>) -> Self {
		Self::for_project(VerifierConfig::session_cookie(), project_id, keys)
	}

	/// Verifier for custom tokens signed by `service_account`.
	pub fn custom_token(
		service_account: impl Into<String>,
		keys: Arc<dyn PublicKeySource>,
	) -> Self {
		Self::with_expectations(
			VerifierConfig::custom_token(),
			Some(CUSTOM_TOKEN_AUDIENCE.into()),
			Some(service_account.into()),
			keys,
		)
	}

	/// Verifier for a project-scoped flavour; `iss` is the flavour prefix plus `project_id`.
	pub fn for_project(
		config: VerifierConfig,
		project_id: Option<String>,
		keys: Arc<dyn PublicKeySource>,
	) -> Self {
		let project_id = project_id.filter(|id| !id.is_empty());
		let issuer = project_id.as_ref().map(|id| format!("{}{id}", config.issuer_prefix));

		Self::with_expectations(config, project_id, issuer, keys)
	}

	fn with_expectations(
		config: VerifierConfig,
		audience: Option<String>,
		issuer: Option<String>,
		keys: Arc<dyn PublicKeySource>,
	) -> Self {
		Self {
			config,
			audience,
			issuer,
			keys,
			clock: Arc::new(SystemClock),
			clock_skew: Duration::ZERO,
			emulator: false,
		}
	}

	/// Replace the clock used for `iat`/`exp` checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Tolerate up to `skew` of clock drift; at most one minute.
	pub fn with_clock_skew(mut self, skew: Duration) -> Result<Self> {
		if skew > MAX_CLOCK_SKEW {
			return Err(Error::Validation {
				field: "clock_skew",
				reason: format!("Must not exceed {} seconds.", MAX_CLOCK_SKEW.as_secs()),
			});
		}

		self.clock_skew = skew;

		Ok(self)
	}

	/// Accept unsigned emulator tokens and skip signature checks.
	pub fn with_emulator(mut self, emulator: bool) -> Self {
		self.emulator = emulator;

		self
	}

	/// Flavour configuration.
	pub fn config(&self) -> &VerifierConfig {
		&self.config
	}

	/// Verify `token` and return its claims.
	#[tracing::instrument(skip_all, fields(kind = self.config.kind.label()))]
	pub async fn verify(&self, token: &str, cancel: &CancellationToken) -> Result<TokenClaims> {
		let result = self.verify_token(token, cancel).await;
		let outcome = match &result {
			Ok(_) => "valid".to_owned(),
			Err(err) => err
				.token_failure()
				.map(|failure| failure.to_string())
				.unwrap_or_else(|| "error".into()),
		};

		match &result {
			Ok(claims) => tracing::debug!(uid = %claims.uid, "token verified"),
			Err(err) => tracing::debug!(error = %err, "token rejected"),
		}

		metrics::record_token_verification(self.config.kind.label(), outcome);

		result
	}

	async fn verify_token(&self, token: &str, cancel: &CancellationToken) -> Result<TokenClaims> {
		let (Some(audience), Some(issuer)) = (self.audience.as_deref(), self.issuer.as_deref())
		else {
			return Err(Error::Configuration(format!(
				"A project ID is required to call {}. Initialize the SDK with a service account \
				 credential or set the project ID explicitly, or set the GOOGLE_CLOUD_PROJECT \
				 environment variable.",
				self.config.operation
			)));
		};

		if token.is_empty() {
			return Err(Error::InvalidArgument {
				field: "token",
				reason: format!("The {} must be a non-empty string.", self.config.short_name),
			});
		}

		let decoded = jwt::decode(token).map_err(|err| {
			let err = match err {
				Error::Validation { reason, .. } => reason,
				other => other.to_string(),
			};

			self.config.error(
				TokenFailure::Malformed,
				format!(
					"Decoding {} failed: {err} Make sure you passed the entire string JWT which \
					 represents the {}.",
					self.config.subject(),
					self.config.short_name
				),
			)
		})?;

		self.check_header(&decoded)?;

		if !self.emulator {
			self.check_signature(&decoded, cancel).await?;
		}

		self.check_claims(&decoded.payload, audience, issuer)
	}

	fn check_header(&self, decoded: &DecodedJwt) -> Result<()> {
		let subject = self.config.subject();
		let alg = decoded.header.alg.as_str();

		if self.emulator && alg == UNSIGNED {
			return Ok(());
		}
		if decoded.header.kid.is_none() && self.config.kind != TokenKind::CustomToken {
			let audience = claims::string_claim(&decoded.payload, "aud");
			let detail = if self.config.kind == TokenKind::IdToken
				&& audience == Some(CUSTOM_TOKEN_AUDIENCE)
			{
				format!(
					"{} expects an ID token, but was given a custom token.",
					self.config.operation
				)
			} else {
				format!("{subject} has no \"kid\" claim.")
			};

			return Err(self.config.error(TokenFailure::Malformed, detail));
		}
		if alg != RS256 {
			return Err(self.config.error(
				TokenFailure::UnsupportedAlgorithm,
				format!(
					"{subject} has incorrect algorithm. Expected \"{RS256}\" but got \"{alg}\"."
				),
			));
		}

		Ok(())
	}

	async fn check_signature(
		&self,
		decoded: &DecodedJwt,
		cancel: &CancellationToken,
	) -> Result<()> {
		let subject = self.config.subject();
		let keys = self.keys.public_keys(cancel).await?;
		// Custom tokens carry no `kid`; any known key may have signed them.
		let candidates = match decoded.header.kid.as_deref() {
			Some(kid) => {
				let matching = keys.iter().filter(|key| key.id == kid).collect::<Vec<_>>();

				if matching.is_empty() {
					tracing::debug!(%kid, known = keys.len(), "no public key matches kid");

					return Err(self.config.error(
						TokenFailure::KeyNotFound,
						format!(
							"{subject} has \"kid\" claim \"{kid}\" which does not correspond to a \
							 known public key. Most likely the {} is expired, so get a fresh token \
							 from your client app and try again.",
							self.config.short_name
						),
					));
				}

				matching
			},
			None => keys.iter().collect(),
		};
		let verified = candidates.iter().any(|key| {
			jsonwebtoken::crypto::verify(
				&decoded.signature,
				decoded.signing_input.as_bytes(),
				&key.key,
				Algorithm::RS256,
			)
			.unwrap_or(false)
		});

		if !verified {
			return Err(self.config.error(
				TokenFailure::InvalidSignature,
				format!("{subject} has invalid signature."),
			));
		}

		Ok(())
	}

	fn check_claims(
		&self,
		payload: &Map<String, Value>,
		audience: &str,
		issuer: &str,
	) -> Result<TokenClaims> {
		let subject = self.config.subject();
		let short_name = self.config.short_name;

		if claims::string_claim(payload, "aud") != Some(audience) {
			return Err(self.config.error(
				TokenFailure::AudienceMismatch,
				format!(
					"{subject} has incorrect \"aud\" (audience) claim. Expected \"{audience}\" \
					 but got {}. Make sure the {short_name} comes from the same Firebase project \
					 as the credential used to initialize this SDK.",
					claims::describe(payload.get("aud"))
				),
			));
		}
		if claims::string_claim(payload, "iss") != Some(issuer) {
			return Err(self.config.error(
				TokenFailure::IssuerMismatch,
				format!(
					"{subject} has incorrect \"iss\" (issuer) claim. Expected \"{issuer}\" but got \
					 {}. Make sure the {short_name} comes from the same Firebase project as the \
					 credential used to initialize this SDK.",
					claims::describe(payload.get("iss"))
				),
			));
		}

		let sub = match claims::string_claim(payload, "sub") {
			Some(sub) if !sub.is_empty() && sub.chars().count() <= MAX_UID_LENGTH => sub,
			Some("") | None => {
				return Err(self.config.error(
					TokenFailure::InvalidSubject,
					format!(
						"{subject} has no \"sub\" (subject) claim or an empty one. Expected a \
						 non-empty string but got {}.",
						claims::describe(payload.get("sub"))
					),
				));
			},
			Some(_) => {
				return Err(self.config.error(
					TokenFailure::InvalidSubject,
					format!(
						"{subject} has \"sub\" (subject) claim longer than {MAX_UID_LENGTH} \
						 characters."
					),
				));
			},
		};
		let (Some(issued_at), Some(expires_at)) =
			(claims::numeric_date(payload, "iat"), claims::numeric_date(payload, "exp"))
		else {
			return Err(self.config.error(
				TokenFailure::Malformed,
				format!("{subject} must carry numeric \"iat\" and \"exp\" claims."),
			));
		};
		let now = self.clock.now();
		let skew = TimeDelta::from_std(self.clock_skew).unwrap_or_default();

		if issued_at > now + skew {
			return Err(self.config.error(
				TokenFailure::IssuedInFuture,
				format!(
					"{subject} has \"iat\" (issued-at) claim in the future. Expected a time no \
					 later than {} but got {}.",
					(now + skew).timestamp(),
					issued_at.timestamp()
				),
			));
		}
		if expires_at <= now - skew {
			return Err(self.config.error(
				TokenFailure::Expired,
				format!(
					"{subject} has expired. Expected \"exp\" after {} but got {}. Get a fresh \
					 {short_name} from your client app and try again.",
					(now - skew).timestamp(),
					expires_at.timestamp()
				),
			));
		}

		Ok(self.build_claims(payload, sub, audience, issuer, issued_at, expires_at))
	}

	fn build_claims(
		&self,
		payload: &Map<String, Value>,
		sub: &str,
		audience: &str,
		issuer: &str,
		issued_at: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> TokenClaims {
		let firebase = payload.get("firebase").and_then(Value::as_object);
		let firebase_str =
			|name: &str| firebase.and_then(|f| claims::string_claim(f, name)).map(str::to_owned);
		let (uid, tenant_id, sign_in_provider, extra) = match self.config.kind {
			TokenKind::CustomToken => (
				claims::string_claim(payload, "uid").unwrap_or(sub).to_owned(),
				claims::string_claim(payload, "tenant_id").map(str::to_owned),
				None,
				payload.get("claims").and_then(Value::as_object).cloned().unwrap_or_default(),
			),
			TokenKind::IdToken | TokenKind::SessionCookie => (
				sub.to_owned(),
				firebase_str("tenant"),
				firebase_str("sign_in_provider"),
				payload.clone(),
			),
		};

		TokenClaims {
			issuer: issuer.to_owned(),
			subject: sub.to_owned(),
			audience: audience.to_owned(),
			issued_at,
			expires_at,
			auth_time: claims::numeric_date(payload, "auth_time"),
			uid,
			tenant_id,
			sign_in_provider,
			claims: extra,
		}
	}
}
