//! Remote signing through the IAM credentials `signBlob` API.

// crates.io
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;
// self
use crate::{
	_prelude::*,
	error::{AuthErrorCode, ErrorCode},
	http::{
		client::{HttpClient, HttpResponse},
		errors::{ErrorBody, ErrorResponseHandler, PlatformErrorHandler},
	},
	signer::Signer,
};

/// Collection URL of the service accounts exposing `signBlob`.
pub const IAM_SIGN_BLOB_BASE: &str = "https://iam.googleapis.com/v1/projects/-/serviceAccounts";
/// Metadata server endpoint reporting the default service account.
pub const METADATA_EMAIL_URL: &str =
	"http://metadata/computeMetadata/v1/instance/service-accounts/default/email";

/// Thin client for `POST {base}/{account}:signBlob`.
#[derive(Clone, Debug)]
pub struct IamSignBlobClient {
	client: HttpClient,
	base: String,
	bearer: Option<String>,
}
impl IamSignBlobClient {
	/// Client posting to `base`, authenticated with `bearer` when provided.
	pub fn new(client: HttpClient, base: &str, bearer: Option<&str>) -> Result<Self> {
		Url::parse(base)?;

		Ok(Self {
			client,
			base: base.trim_end_matches('/').to_owned(),
			bearer: bearer.map(str::to_owned),
		})
	}

	/// Sign `data` as `account`, returning the decoded signature.
	#[tracing::instrument(skip(self, data, cancel))]
	pub async fn sign_blob(
		&self,
		account: &str,
		data: &[u8],
		cancel: &CancellationToken,
	) -> Result<Vec<u8>> {
		let mut builder = self
			.client
			.inner()
			.post(format!("{}/{account}:signBlob", self.base))
			.json(&SignBlobRequest { bytes_to_sign: STANDARD.encode(data) });

		if let Some(token) = &self.bearer {
			builder = builder.bearer_auth(token);
		}

		let (body, response) = self
			.client
			.send_and_deserialize::<SignBlobResponse, _>(builder.build()?, &IamErrorHandler, cancel)
			.await?;

		STANDARD.decode(&body.signature).map_err(|err| Error::Platform {
			code: ErrorCode::Unknown,
			auth_code: Some(AuthErrorCode::UnexpectedResponse),
			message: format!("IAM returned a signature that is not valid base64: {err}."),
			response: Some(Box::new(response)),
			source: Some(Box::new(err)),
		})
	}

	fn http(&self) -> &HttpClient {
		&self.client
	}
}

/// Signs as the default service account, discovered once from the metadata server.
///
/// The first completed discovery, successful or not, is reused by every later call. A
/// cancelled discovery is not remembered.
#[derive(Debug)]
pub struct IamSigner {
	iam: IamSignBlobClient,
	metadata_url: Url,
	account: OnceCell<std::result::Result<String, String>>,
}
impl IamSigner {
	/// Signer discovering its account from `metadata_url`.
	pub fn new(iam: IamSignBlobClient, metadata_url: Url) -> Self {
		Self { iam, metadata_url, account: OnceCell::new() }
	}

	async fn discover(&self, cancel: &CancellationToken) -> Result<String> {
		let client = self.iam.http();
		let request = client
			.inner()
			.get(self.metadata_url.clone())
			.header("Metadata-Flavor", "Google")
			.build()?;
		let response = client.send_and_read(request, &PlatformErrorHandler, cancel).await?;
		let email = response.body.trim();

		if email.is_empty() {
			return Err(Error::platform(
				ErrorCode::Unknown,
				"Metadata server returned an empty service account email.",
			));
		}

		Ok(email.to_owned())
	}
}
#[async_trait]
impl Signer for IamSigner {
	fn name(&self) -> &'static str {
		"iam"
	}

	async fn key_id(&self, cancel: &CancellationToken) -> Result<String> {
		let discovered = self
			.account
			.get_or_try_init(|| async {
				match self.discover(cancel).await {
					Ok(account) => {
						tracing::info!(%account, "discovered service account from metadata server");

						Ok(Ok(account))
					},
					Err(Error::Cancelled) => Err(Error::Cancelled),
					Err(err) => {
						tracing::warn!(error = %err, "service account discovery failed");

						Ok(Err(format!(
							"Failed to determine service account: {err}. Initialize the SDK with \
							 a service account credential, or set a service account ID that holds \
							 the iam.serviceAccounts.signBlob permission."
						)))
					},
				}
			})
			.await?;

		discovered.clone().map_err(Error::Configuration)
	}

	async fn sign(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
		let account = self.key_id(cancel).await?;

		self.iam.sign_blob(&account, data, cancel).await
	}
}

/// Signs as a service account named up front; no discovery.
#[derive(Debug)]
pub struct FixedAccountIamSigner {
	iam: IamSignBlobClient,
	account: String,
}
impl FixedAccountIamSigner {
	/// Signer for `account`.
	pub fn new(iam: IamSignBlobClient, account: String) -> Self {
		Self { iam, account }
	}
}
#[async_trait]
impl Signer for FixedAccountIamSigner {
	fn name(&self) -> &'static str {
		"iam_fixed"
	}

	async fn key_id(&self, _: &CancellationToken) -> Result<String> {
		Ok(self.account.clone())
	}

	async fn sign(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
		self.iam.sign_blob(&self.account, data, cancel).await
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobRequest {
	bytes_to_sign: String,
}

#[derive(Deserialize)]
struct SignBlobResponse {
	signature: String,
}

/// IAM errors carry the reason in `error.message`; surface it verbatim.
struct IamErrorHandler;
impl ErrorResponseHandler for IamErrorHandler {
	fn handle(&self, response: &HttpResponse) -> Error {
		let detail = ErrorBody::parse(&response.body);
		let code = detail
			.status
			.as_deref()
			.and_then(ErrorCode::from_platform_status)
			.unwrap_or_else(|| ErrorCode::from_status(response.status));
		let message = match detail.message {
			Some(message) => format!("IAM signBlob request failed: {message}"),
			None => format!(
				"Unexpected HTTP response with status: {}; body: {}",
				response.status.as_u16(),
				response.body
			),
		};

		Error::Platform {
			code,
			auth_code: None,
			message,
			response: Some(Box::new(response.clone())),
			source: None,
		}
	}
}
