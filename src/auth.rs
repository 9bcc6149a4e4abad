//! Entry point tying options, transport, signing, and verification together.

pub mod revocation;

pub use revocation::{AccountStatus, IdentityToolkitRevocationSource, RevocationSource};

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use url::Url;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::{AuthOptions, Credential},
	error::TokenFailure,
	http::client::HttpClient,
	keys::{HttpPublicKeySource, PublicKeySource},
	signer::{self, Signer},
	token::{
		claims::TokenClaims,
		factory::TokenFactory,
		verifier::{TokenVerifier, VerifierConfig},
	},
};

/// Builder for [`Auth`], mainly used to inject collaborators in tests.
#[derive(Debug)]
pub struct AuthBuilder {
	options: AuthOptions,
	clock: Arc<dyn Clock>,
	client: Option<HttpClient>,
	signer: Option<Arc<dyn Signer>>,
	id_token_keys: Option<Arc<dyn PublicKeySource>>,
	session_cookie_keys: Option<Arc<dyn PublicKeySource>>,
	revocation: Option<Arc<dyn RevocationSource>>,
}
impl AuthBuilder {
	/// Use `clock` for every expiry computation.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Use a prebuilt HTTP client instead of one built from the options.
	pub fn http_client(mut self, client: HttpClient) -> Self {
		self.client = Some(client);

		self
	}

	/// Sign custom tokens with `signer` instead of the one selected from the credentials.
	pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
		self.signer = Some(signer);

		self
	}

	/// Verify ID tokens against `keys`.
	pub fn id_token_keys(mut self, keys: Arc<dyn PublicKeySource>) -> Self {
		self.id_token_keys = Some(keys);

		self
	}

	/// Verify session cookies against `keys`.
	pub fn session_cookie_keys(mut self, keys: Arc<dyn PublicKeySource>) -> Self {
		self.session_cookie_keys = Some(keys);

		self
	}

	/// Resolve revocation state through `source`.
	pub fn revocation_source(mut self, source: Arc<dyn RevocationSource>) -> Self {
		self.revocation = Some(source);

		self
	}

	/// Validate the options and build the instance. Nothing touches the network yet.
	pub fn build(self) -> Result<Auth> {
		self.options.validate()?;

		let client = match self.client {
			Some(client) => client,
			None => HttpClient::new(self.options.http.clone())?,
		};
		let project_id = self.options.resolved_project_id();

		tracing::debug!(
			project_id = project_id.as_deref().unwrap_or_default(),
			emulator = self.options.is_emulator(),
			"auth instance created"
		);

		Ok(Auth {
			core: Arc::new(AuthCore {
				options: self.options,
				project_id,
				client,
				clock: self.clock,
				deleted: AtomicBool::new(false),
				signer: self.signer,
				id_token_keys: self.id_token_keys,
				session_cookie_keys: self.session_cookie_keys,
				revocation: self.revocation,
				factory: OnceCell::new(),
				id_token_verifier: OnceCell::new(),
				session_cookie_verifier: OnceCell::new(),
				revocation_source: OnceCell::new(),
			}),
		})
	}
}

/// Admin entry point for custom tokens and token verification.
///
/// Collaborators are built on first use. Once [`delete`](Self::delete)d, every operation fails
/// with [`Error::IllegalState`], including on [`TenantAwareAuth`] handles derived from it.
#[derive(Clone, Debug)]
pub struct Auth {
	core: Arc<AuthCore>,
}
impl Auth {
	/// Build an instance from `options`.
	pub fn new(options: AuthOptions) -> Result<Self> {
		Self::builder(options).build()
	}

	/// Start building an instance from `options`.
	pub fn builder(options: AuthOptions) -> AuthBuilder {
		AuthBuilder {
			options,
			clock: Arc::new(SystemClock),
			client: None,
			signer: None,
			id_token_keys: None,
			session_cookie_keys: None,
			revocation: None,
		}
	}

	/// Resolved project id.
	pub fn project_id(&self) -> Option<&str> {
		self.core.project_id.as_deref()
	}

	/// Shared HTTP client.
	pub fn http_client(&self) -> &HttpClient {
		&self.core.client
	}

	/// Mint a custom token for `uid`.
	pub async fn create_custom_token(
		&self,
		uid: &str,
		cancel: &CancellationToken,
	) -> Result<String> {
		self.core.ensure_active()?;
		self.core.factory().await?.create_custom_token(uid, None, cancel).await
	}

	/// Mint a custom token for `uid` carrying `claims`.
	pub async fn create_custom_token_with_claims(
		&self,
		uid: &str,
		claims: &Map<String, Value>,
		cancel: &CancellationToken,
	) -> Result<String> {
		self.core.ensure_active()?;
		self.core.factory().await?.create_custom_token(uid, Some(claims), cancel).await
	}

	/// Verify an ID token.
	pub async fn verify_id_token(
		&self,
		token: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;
		self.core.id_token_verifier().await?.verify(token, cancel).await
	}

	/// Verify an ID token and reject it when revoked or when the user is disabled.
	pub async fn verify_id_token_and_check_revoked(
		&self,
		token: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;

		let verifier = self.core.id_token_verifier().await?;
		let claims = verifier.verify(token, cancel).await?;

		self.core.check_revoked(verifier.config(), claims, None, cancel).await
	}

	/// Verify a session cookie.
	pub async fn verify_session_cookie(
		&self,
		cookie: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;
		self.core.session_cookie_verifier().await?.verify(cookie, cancel).await
	}

	/// Verify a session cookie and reject it when revoked or when the user is disabled.
	pub async fn verify_session_cookie_and_check_revoked(
		&self,
		cookie: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;

		let verifier = self.core.session_cookie_verifier().await?;
		let claims = verifier.verify(cookie, cancel).await?;

		self.core.check_revoked(verifier.config(), claims, None, cancel).await
	}

	/// Handle scoped to `tenant_id`.
	pub fn tenant(&self, tenant_id: &str) -> Result<TenantAwareAuth> {
		self.core.ensure_active()?;

		if tenant_id.is_empty() {
			return Err(Error::InvalidArgument {
				field: "tenant_id",
				reason: "Must be a non-empty string.".into(),
			});
		}

		Ok(TenantAwareAuth {
			core: self.core.clone(),
			tenant_id: tenant_id.to_owned(),
			factory: OnceCell::new(),
			revocation_source: OnceCell::new(),
		})
	}

	/// Dispose of the instance. Idempotent.
	pub fn delete(&self) {
		if !self.core.deleted.swap(true, Ordering::SeqCst) {
			tracing::debug!("auth instance deleted");
		}
	}

	/// Whether [`delete`](Self::delete) has been called.
	pub fn is_deleted(&self) -> bool {
		self.core.deleted.load(Ordering::SeqCst)
	}
}

/// Tenant-scoped view of an [`Auth`] instance.
///
/// Custom tokens carry the tenant id; verified tokens must belong to the tenant.
#[derive(Debug)]
pub struct TenantAwareAuth {
	core: Arc<AuthCore>,
	tenant_id: String,
	factory: OnceCell<TokenFactory>,
	revocation_source: OnceCell<Arc<dyn RevocationSource>>,
}
impl TenantAwareAuth {
	/// Tenant this handle is scoped to.
	pub fn tenant_id(&self) -> &str {
		&self.tenant_id
	}

	/// Mint a custom token for `uid` in this tenant.
	pub async fn create_custom_token(
		&self,
		uid: &str,
		cancel: &CancellationToken,
	) -> Result<String> {
		self.core.ensure_active()?;
		self.factory().await?.create_custom_token(uid, None, cancel).await
	}

	/// Mint a custom token for `uid` in this tenant, carrying `claims`.
	pub async fn create_custom_token_with_claims(
		&self,
		uid: &str,
		claims: &Map<String, Value>,
		cancel: &CancellationToken,
	) -> Result<String> {
		self.core.ensure_active()?;
		self.factory().await?.create_custom_token(uid, Some(claims), cancel).await
	}

	/// Verify an ID token issued to a user of this tenant.
	pub async fn verify_id_token(
		&self,
		token: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;

		let verifier = self.core.id_token_verifier().await?;
		let claims = verifier.verify(token, cancel).await?;

		self.check_tenant(verifier.config(), claims)
	}

	/// Verify an ID token of this tenant and reject it when revoked or disabled.
	pub async fn verify_id_token_and_check_revoked(
		&self,
		token: &str,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		self.core.ensure_active()?;

		let verifier = self.core.id_token_verifier().await?;
		let claims = self.check_tenant(verifier.config(), verifier.verify(token, cancel).await?)?;
		let source = self
			.revocation_source
			.get_or_try_init(|| async { self.core.build_revocation_source(Some(&self.tenant_id)) })
			.await?;

		self.core.check_revoked(verifier.config(), claims, Some(source.clone()), cancel).await
	}

	async fn factory(&self) -> Result<&TokenFactory> {
		self.factory
			.get_or_try_init(|| async {
				Ok(self.core.factory().await?.clone().with_tenant_id(self.tenant_id.clone()))
			})
			.await
	}

	fn check_tenant(&self, config: &VerifierConfig, claims: TokenClaims) -> Result<TokenClaims> {
		if claims.tenant_id.as_deref() != Some(self.tenant_id.as_str()) {
			return Err(config.error(
				TokenFailure::TenantMismatch,
				format!(
					"The tenant ID ({}) of the {} does not match the tenant ID ({}) of this \
					 client.",
					claims.tenant_id.as_deref().unwrap_or("none"),
					config.short_name,
					self.tenant_id
				),
			));
		}

		Ok(claims)
	}
}

#[derive(Debug)]
struct AuthCore {
	options: AuthOptions,
	project_id: Option<String>,
	client: HttpClient,
	clock: Arc<dyn Clock>,
	deleted: AtomicBool,
	signer: Option<Arc<dyn Signer>>,
	id_token_keys: Option<Arc<dyn PublicKeySource>>,
	session_cookie_keys: Option<Arc<dyn PublicKeySource>>,
	revocation: Option<Arc<dyn RevocationSource>>,
	factory: OnceCell<TokenFactory>,
	id_token_verifier: OnceCell<TokenVerifier>,
	session_cookie_verifier: OnceCell<TokenVerifier>,
	revocation_source: OnceCell<Arc<dyn RevocationSource>>,
}
impl AuthCore {
	fn ensure_active(&self) -> Result<()> {
		if self.deleted.load(Ordering::SeqCst) {
			return Err(Error::IllegalState("The auth instance has been deleted.".into()));
		}

		Ok(())
	}

	async fn factory(&self) -> Result<&TokenFactory> {
		self.factory
			.get_or_try_init(|| async {
				let signer = match &self.signer {
					Some(signer) => signer.clone(),
					None => signer::select(&self.options, &self.client)?,
				};

				tracing::debug!(signer = signer.name(), "token factory initialized");

				Ok(TokenFactory::new(signer).with_clock(self.clock.clone()))
			})
			.await
	}

	async fn id_token_verifier(&self) -> Result<&TokenVerifier> {
		self.id_token_verifier
			.get_or_try_init(|| async {
				let keys = self
					.key_source(&self.id_token_keys, &self.options.endpoints.id_token_certs_url)?;

				self.verifier(VerifierConfig::id_token(), keys)
			})
			.await
	}

	async fn session_cookie_verifier(&self) -> Result<&TokenVerifier> {
		self.session_cookie_verifier
			.get_or_try_init(|| async {
				let keys = self.key_source(
					&self.session_cookie_keys,
					&self.options.endpoints.session_cookie_certs_url,
				)?;

				self.verifier(VerifierConfig::session_cookie(), keys)
			})
			.await
	}

	fn key_source(
		&self,
		configured: &Option<Arc<dyn PublicKeySource>>,
		url: &str,
	) -> Result<Arc<dyn PublicKeySource>> {
		if let Some(keys) = configured {
			return Ok(keys.clone());
		}

		let source = HttpPublicKeySource::new(Url::parse(url)?, self.client.clone())
			.with_clock(self.clock.clone());

		Ok(Arc::new(source))
	}

	fn verifier(
		&self,
		config: VerifierConfig,
		keys: Arc<dyn PublicKeySource>,
	) -> Result<TokenVerifier> {
		Ok(TokenVerifier::for_project(config, self.project_id.clone(), keys)
			.with_clock(self.clock.clone())
			.with_clock_skew(self.options.clock_skew)?
			.with_emulator(self.options.is_emulator()))
	}

	fn build_revocation_source(
		&self,
		tenant_id: Option<&str>,
	) -> Result<Arc<dyn RevocationSource>> {
		if let Some(source) = &self.revocation {
			return Ok(source.clone());
		}

		let project_id = self.project_id.as_deref().ok_or_else(|| {
			Error::Configuration(
				"A project ID is required to check token revocation. Initialize the SDK with a \
				 service account credential or set the project ID explicitly."
					.into(),
			)
		})?;
		let bearer = self.options.credential.as_ref().and_then(Credential::bearer_token).ok_or_else(
			|| {
				Error::Configuration(
					"Checking token revocation calls the Identity Toolkit API with a bearer token. \
					 Configure `Credential::AccessToken`, or inject a lookup through \
					 `AuthBuilder::revocation_source`."
						.into(),
				)
			},
		)?;

		Ok(Arc::new(IdentityToolkitRevocationSource::new(
			self.client.clone(),
			&self.options.identity_toolkit_url(),
			project_id,
			tenant_id,
			Some(bearer),
		)))
	}

	async fn check_revoked(
		&self,
		config: &VerifierConfig,
		claims: TokenClaims,
		source: Option<Arc<dyn RevocationSource>>,
		cancel: &CancellationToken,
	) -> Result<TokenClaims> {
		let source = match source {
			Some(source) => source,
			None => self
				.revocation_source
				.get_or_try_init(|| async { self.build_revocation_source(None) })
				.await?
				.clone(),
		};
		let status = source.account_status(&claims.uid, cancel).await?;

		if status.disabled {
			return Err(config.error(
				TokenFailure::UserDisabled,
				format!("The user record of the {} is disabled.", config.short_name),
			));
		}

		let authenticated_at = claims.auth_time.unwrap_or(claims.issued_at);

		if let Some(valid_after) = status.tokens_valid_after
			&& authenticated_at < valid_after
		{
			tracing::debug!(uid = %claims.uid, %valid_after, "token revoked");

			return Err(config.error(
				TokenFailure::Revoked,
				format!(
					"The Firebase {} has been revoked: it was issued at {} and tokens are only \
					 valid after {}.",
					config.short_name,
					authenticated_at.timestamp(),
					valid_after.timestamp()
				),
			));
		}

		Ok(claims)
	}
}
