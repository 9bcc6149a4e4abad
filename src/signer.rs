//! Signers producing custom token signatures, and the policy that picks one.

pub mod emulator;
pub mod iam;
pub mod local;

pub use emulator::EmulatorSigner;
pub use iam::{FixedAccountIamSigner, IamSignBlobClient, IamSigner};
pub use local::ServiceAccountSigner;

// std
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
// crates.io
use async_trait::async_trait;
// self
use crate::{
	_prelude::*,
	config::{AuthOptions, Credential},
	http::client::HttpClient,
};

/// JWS algorithm a signer produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
	/// RSASSA-PKCS1-v1_5 with SHA-256.
	Rs256,
	/// Unsecured JWS, only ever produced for the auth emulator.
	None,
}
impl SigningAlgorithm {
	/// Value written to the JWT `alg` header.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Rs256 => "RS256",
			Self::None => "none",
		}
	}
}
impl Display for SigningAlgorithm {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Produces signatures for custom tokens.
#[async_trait]
pub trait Signer: Debug + Send + Sync {
	/// Short identifier used in logs and metrics.
	fn name(&self) -> &'static str;

	/// Algorithm the signatures are produced with.
	fn algorithm(&self) -> SigningAlgorithm {
		SigningAlgorithm::Rs256
	}

	/// Service account that tokens are issued by.
	async fn key_id(&self, cancel: &CancellationToken) -> Result<String>;

	/// Sign `data`, returning the raw signature bytes.
	async fn sign(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Pick the signer matching the configured credentials.
///
/// Order: auth emulator, service account private key, explicit service account id, then
/// metadata-server discovery.
pub fn select(options: &AuthOptions, client: &HttpClient) -> Result<Arc<dyn Signer>> {
	if options.emulator_host.is_some() {
		tracing::debug!("auth emulator configured; custom tokens are unsigned");

		return Ok(Arc::new(EmulatorSigner));
	}
	if let Some(Credential::ServiceAccount(key)) = &options.credential {
		return Ok(Arc::new(ServiceAccountSigner::new(key)?));
	}

	let iam = IamSignBlobClient::new(
		client.clone(),
		&options.endpoints.iam_sign_blob_base,
		options.credential.as_ref().and_then(Credential::bearer_token),
	)?;

	match &options.service_account_id {
		Some(id) => Ok(Arc::new(FixedAccountIamSigner::new(iam, id.clone()))),
		None => {
			let metadata_url = options.endpoints.metadata_email_url.parse()?;

			Ok(Arc::new(IamSigner::new(iam, metadata_url)))
		},
	}
}
