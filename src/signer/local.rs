//! RS256 signing with a service account private key held in process.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey};
// self
use crate::{_prelude::*, config::ServiceAccountKey, signer::Signer};

/// Signs with the private key of a service account credential.
#[derive(Clone)]
pub struct ServiceAccountSigner {
	client_email: String,
	key: EncodingKey,
}
impl ServiceAccountSigner {
	/// Load the PEM private key of `account`.
	pub fn new(account: &ServiceAccountKey) -> Result<Self> {
		let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|err| {
			Error::Validation {
				field: "private_key",
				reason: format!("Failed to parse the service account private key: {err}."),
			}
		})?;

		Ok(Self { client_email: account.client_email.clone(), key })
	}
}
impl Debug for ServiceAccountSigner {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ServiceAccountSigner")
			.field("client_email", &self.client_email)
			.finish_non_exhaustive()
	}
}
#[async_trait]
impl Signer for ServiceAccountSigner {
	fn name(&self) -> &'static str {
		"service_account"
	}

	async fn key_id(&self, _: &CancellationToken) -> Result<String> {
		Ok(self.client_email.clone())
	}

	async fn sign(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let encoded = jsonwebtoken::crypto::sign(data, &self.key, Algorithm::RS256)?;

		URL_SAFE_NO_PAD.decode(encoded).map_err(|err| Error::TokenCreation {
			message: format!("Signature was not valid base64url: {err}."),
			source: None,
		})
	}
}
