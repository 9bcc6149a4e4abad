//! Account lookups backing the `check_revoked` verification variants.

// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
// self
use crate::{
	_prelude::*,
	error::{AuthErrorCode, ErrorCode},
	http::{client::HttpClient, errors::AuthErrorHandler},
};

/// Revocation-relevant state of a user account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountStatus {
	/// Tokens issued (authenticated) before this instant are revoked.
	pub tokens_valid_after: Option<DateTime<Utc>>,
	/// Whether the account is disabled.
	pub disabled: bool,
}

/// Looks up the revocation state of a user.
#[async_trait]
pub trait RevocationSource: std::fmt::Debug + Send + Sync {
	/// Fetch the status of `uid`; unknown users are a `NotFound` error.
	async fn account_status(&self, uid: &str, cancel: &CancellationToken) -> Result<AccountStatus>;
}

/// Reads account state through the Identity Toolkit `accounts:lookup` API.
#[derive(Clone, Debug)]
pub struct IdentityToolkitRevocationSource {
	client: HttpClient,
	lookup_url: String,
	bearer: Option<String>,
}
impl IdentityToolkitRevocationSource {
	/// Source for `project_id`, optionally scoped to `tenant_id`, under the versioned `base`.
	pub fn new(
		client: HttpClient,
		base: &str,
		project_id: &str,
		tenant_id: Option<&str>,
		bearer: Option<&str>,
	) -> Self {
		let base = base.trim_end_matches('/');
		let lookup_url = match tenant_id {
			Some(tenant) =>
				format!("{base}/projects/{project_id}/tenants/{tenant}/accounts:lookup"),
			None => format!("{base}/projects/{project_id}/accounts:lookup"),
		};

		Self { client, lookup_url, bearer: bearer.map(str::to_owned) }
	}

	/// Endpoint the lookups are posted to.
	pub fn lookup_url(&self) -> &str {
		&self.lookup_url
	}
}
#[async_trait]
impl RevocationSource for IdentityToolkitRevocationSource {
	#[tracing::instrument(skip(self, cancel))]
	async fn account_status(&self, uid: &str, cancel: &CancellationToken) -> Result<AccountStatus> {
		let mut builder = self
			.client
			.inner()
			.post(&self.lookup_url)
			.json(&LookupRequest { local_id: [uid] });

		if let Some(token) = &self.bearer {
			builder = builder.bearer_auth(token);
		}

		let (body, response) = self
			.client
			.send_and_deserialize::<LookupResponse, _>(builder.build()?, &AuthErrorHandler, cancel)
			.await?;
		let Some(user) = body.users.into_iter().next() else {
			return Err(Error::Platform {
				code: ErrorCode::NotFound,
				auth_code: Some(AuthErrorCode::UserNotFound),
				message: format!("No user record found for the provided user ID: {uid}."),
				response: Some(Box::new(response)),
				source: None,
			});
		};
		let tokens_valid_after =
			user.valid_since.and_then(|secs| DateTime::from_timestamp(secs, 0));

		tracing::debug!(?tokens_valid_after, disabled = user.disabled, "account status loaded");

		Ok(AccountStatus { tokens_valid_after, disabled: user.disabled })
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
	local_id: [&'a str; 1],
}

#[derive(Deserialize)]
struct LookupResponse {
	#[serde(default)]
	users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
	#[serde(default, deserialize_with = "seconds_from_string_or_number")]
	valid_since: Option<i64>,
	#[serde(default)]
	disabled: bool,
}

/// `validSince` is documented as an int64 and therefore serialized as a JSON string.
fn seconds_from_string_or_number<'de, D>(
	deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Seconds {
		Text(String),
		Number(i64),
	}

	match Option::<Seconds>::deserialize(deserializer)? {
		Some(Seconds::Text(text)) => text.parse().map(Some).map_err(serde::de::Error::custom),
		Some(Seconds::Number(number)) => Ok(Some(number)),
		None => Ok(None),
	}
}
