//! SDK options: project, credentials, endpoints, and emulator wiring.

// std
use std::{
	env,
	fmt::{Debug, Formatter, Result as FmtResult},
	fs,
	path::Path,
};
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	http::client::HttpClientOptions,
	keys::{ID_TOKEN_CERT_URL, SESSION_COOKIE_CERT_URL},
	signer::iam::{IAM_SIGN_BLOB_BASE, METADATA_EMAIL_URL},
};

/// Environment variable naming the auth emulator `host:port`.
pub const EMULATOR_HOST_ENV: &str = "FIREBASE_AUTH_EMULATOR_HOST";
/// Environment variables consulted, in order, for the project id.
pub const PROJECT_ID_ENV: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];
/// Identity Toolkit REST base.
pub const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com";
/// Largest accepted clock skew tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);
/// Placeholder bearer token accepted by the auth emulator.
pub const EMULATOR_BEARER: &str = "owner";

/// Standard service account key file.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
	/// Credential type; always `service_account`.
	#[serde(rename = "type")]
	pub kind: String,
	/// Project owning the service account.
	#[serde(default)]
	pub project_id: Option<String>,
	/// Identifier of the private key.
	#[serde(default)]
	pub private_key_id: Option<String>,
	/// PEM private key.
	pub private_key: String,
	/// Service account email, used as custom token issuer.
	pub client_email: String,
}
impl ServiceAccountKey {
	/// Parse a service account key from its JSON representation.
	pub fn from_json(json: &str) -> Result<Self> {
		let key: Self = serde_json::from_str(json)?;

		key.validate()?;

		Ok(key)
	}

	/// Read and parse a service account key file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		Self::from_json(&fs::read_to_string(path)?)
	}

	/// Validate required fields.
	pub fn validate(&self) -> Result<()> {
		if self.kind != "service_account" {
			return Err(Error::Validation {
				field: "service_account.type",
				reason: format!("Expected `service_account`, got `{}`.", self.kind),
			});
		}
		if self.private_key.trim().is_empty() {
			return Err(Error::Validation {
				field: "service_account.private_key",
				reason: "Must not be empty.".into(),
			});
		}
		if self.client_email.trim().is_empty() {
			return Err(Error::Validation {
				field: "service_account.client_email",
				reason: "Must not be empty.".into(),
			});
		}

		Ok(())
	}
}
impl Debug for ServiceAccountKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ServiceAccountKey")
			.field("project_id", &self.project_id)
			.field("private_key_id", &self.private_key_id)
			.field("client_email", &self.client_email)
			.finish_non_exhaustive()
	}
}

/// Credential attached to outbound requests and used for signing.
#[derive(Clone)]
pub enum Credential {
	/// Service account with a private key; tokens are signed in process.
	ServiceAccount(ServiceAccountKey),
	/// Pre-minted OAuth2 access token.
	AccessToken(String),
	/// Placeholder credential for the auth emulator.
	Emulator,
}
impl Credential {
	/// Bearer token for REST calls, when the credential carries one.
	pub fn bearer_token(&self) -> Option<&str> {
		match self {
			Self::AccessToken(token) => Some(token),
			Self::Emulator => Some(EMULATOR_BEARER),
			Self::ServiceAccount(_) => None,
		}
	}

	/// Service account key, when the credential is one.
	pub fn service_account(&self) -> Option<&ServiceAccountKey> {
		match self {
			Self::ServiceAccount(key) => Some(key),
			_ => None,
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
			Self::AccessToken(_) => f.write_str("AccessToken(..)"),
			Self::Emulator => f.write_str("Emulator"),
		}
	}
}

/// Remote endpoints, overridable for tests and private deployments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
	/// Certificates signing ID tokens.
	#[serde(default = "default_id_token_certs_url")]
	pub id_token_certs_url: String,
	/// Public keys signing session cookies.
	#[serde(default = "default_session_cookie_certs_url")]
	pub session_cookie_certs_url: String,
	/// IAM service account collection exposing `signBlob`.
	#[serde(default = "default_iam_sign_blob_base")]
	pub iam_sign_blob_base: String,
	/// Metadata server endpoint reporting the default service account.
	#[serde(default = "default_metadata_email_url")]
	pub metadata_email_url: String,
	/// Identity Toolkit REST base, without the version segment.
	#[serde(default = "default_identity_toolkit_base")]
	pub identity_toolkit_base: String,
}
impl Endpoints {
	/// Ensure every endpoint is an absolute URL.
	pub fn validate(&self) -> Result<()> {
		for (field, value) in [
			("endpoints.id_token_certs_url", &self.id_token_certs_url),
			("endpoints.session_cookie_certs_url", &self.session_cookie_certs_url),
			("endpoints.iam_sign_blob_base", &self.iam_sign_blob_base),
			("endpoints.metadata_email_url", &self.metadata_email_url),
			("endpoints.identity_toolkit_base", &self.identity_toolkit_base),
		] {
			Url::parse(value).map_err(|err| Error::Validation {
				field,
				reason: format!("`{value}` is not a valid URL: {err}."),
			})?;
		}

		Ok(())
	}
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			id_token_certs_url: default_id_token_certs_url(),
			session_cookie_certs_url: default_session_cookie_certs_url(),
			iam_sign_blob_base: default_iam_sign_blob_base(),
			metadata_email_url: default_metadata_email_url(),
			identity_toolkit_base: default_identity_toolkit_base(),
		}
	}
}

/// Options an [`Auth`](crate::auth::Auth) instance is built from.
///
/// Environment variables are only read by [`from_env`](Self::from_env) and
/// [`with_emulator_from_env`](Self::with_emulator_from_env); the resulting values are then
/// fixed for the lifetime of the instance.
#[derive(Clone, Debug, Default)]
pub struct AuthOptions {
	/// Project the tokens belong to.
	pub project_id: Option<String>,
	/// Project id read from the environment; used only when neither `project_id` nor the
	/// service account key names one.
	pub env_project_id: Option<String>,
	/// Service account used for IAM signing when no private key is available.
	pub service_account_id: Option<String>,
	/// Credential for signing and REST calls.
	pub credential: Option<Credential>,
	/// Auth emulator `host:port`; switches the SDK into emulator mode.
	pub emulator_host: Option<String>,
	/// Transport options shared by every remote call.
	pub http: HttpClientOptions,
	/// Tolerance applied to `iat`/`exp` checks.
	pub clock_skew: Duration,
	/// Remote endpoints.
	pub endpoints: Endpoints,
}
impl AuthOptions {
	/// Empty options targeting the production endpoints.
	pub fn new() -> Self {
		Self::default()
	}

	/// Options seeded from the process environment: emulator host and project id.
	pub fn from_env() -> Self {
		let mut options = Self::new().with_emulator_from_env();

		options.env_project_id =
			PROJECT_ID_ENV.iter().find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()));

		options
	}

	/// Read [`EMULATOR_HOST_ENV`] once and apply it.
	pub fn with_emulator_from_env(self) -> Self {
		match env::var(EMULATOR_HOST_ENV) {
			Ok(host) if !host.is_empty() => self.with_emulator_host(host),
			_ => self,
		}
	}

	/// Set the project id.
	pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
		self.project_id = Some(project_id.into());

		self
	}

	/// Set the service account used for IAM signing.
	pub fn with_service_account_id(mut self, id: impl Into<String>) -> Self {
		self.service_account_id = Some(id.into());

		self
	}

	/// Set the credential.
	pub fn with_credential(mut self, credential: Credential) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Target the auth emulator at `host` and switch to the placeholder credential.
	pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
		self.emulator_host = Some(host.into());
		self.credential = Some(Credential::Emulator);

		self
	}

	/// Replace the transport options.
	pub fn with_http(mut self, http: HttpClientOptions) -> Self {
		self.http = http;

		self
	}

	/// Set the `iat`/`exp` tolerance.
	pub fn with_clock_skew(mut self, skew: Duration) -> Self {
		self.clock_skew = skew;

		self
	}

	/// Replace the remote endpoints.
	pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Project id in precedence order: explicit, service account key, then environment.
	pub fn resolved_project_id(&self) -> Option<String> {
		let explicit = self.project_id.clone().filter(|id| !id.is_empty());
		let from_key = || {
			self.credential
				.as_ref()
				.and_then(Credential::service_account)
				.and_then(|key| key.project_id.clone())
				.filter(|id| !id.is_empty())
		};
		let from_env = || self.env_project_id.clone().filter(|id| !id.is_empty());

		explicit.or_else(from_key).or_else(from_env)
	}

	/// Whether the auth emulator is targeted.
	pub fn is_emulator(&self) -> bool {
		self.emulator_host.is_some()
	}

	/// Identity Toolkit versioned base URL, redirected to the emulator when configured.
	pub fn identity_toolkit_url(&self) -> String {
		match &self.emulator_host {
			Some(host) => format!("http://{host}/identitytoolkit.googleapis.com/v1"),
			None => format!("{}/v1", self.endpoints.identity_toolkit_base.trim_end_matches('/')),
		}
	}

	/// Validate the options.
	pub fn validate(&self) -> Result<()> {
		if self.clock_skew > MAX_CLOCK_SKEW {
			return Err(Error::Validation {
				field: "clock_skew",
				reason: format!("Must not exceed {} seconds.", MAX_CLOCK_SKEW.as_secs()),
			});
		}
		if let Some(host) = &self.emulator_host
			&& (host.contains("://") || host.contains('/'))
		{
			return Err(Error::Validation {
				field: "emulator_host",
				reason: format!("Expected `host:port`, got `{host}`."),
			});
		}
		if let Some(Credential::ServiceAccount(key)) = &self.credential {
			key.validate()?;
		}

		self.endpoints.validate()?;
		self.http.validate()
	}
}

fn default_id_token_certs_url() -> String {
	ID_TOKEN_CERT_URL.into()
}

fn default_session_cookie_certs_url() -> String {
	SESSION_COOKIE_CERT_URL.into()
}

fn default_iam_sign_blob_base() -> String {
	IAM_SIGN_BLOB_BASE.into()
}

fn default_metadata_email_url() -> String {
	METADATA_EMAIL_URL.into()
}

fn default_identity_toolkit_base() -> String {
	IDENTITY_TOOLKIT_BASE.into()
}
